//! NEC-extended IR frame encoder.
//!
//! A frame is a sequence of carrier-on (`Mark`) and carrier-off (`Space`)
//! intervals:
//!
//! ```text
//! header mark (9000) || header space (4500)
//! || 32 × (bit mark (562) || space (562 = 0, 1687 = 1))
//! || trailer mark (562) || frame gap (40000)
//! ```
//!
//! The 32 data bits are sent LSB-first, the 16-bit command first and the
//! 16-bit address second. The LED controllers on the receiving side never
//! acknowledge, so every logical command goes out as `IR_REPEATS` frames
//! separated by a short repeat gap.
//!
//! All durations are microseconds.

use alloc::vec::Vec;

use crate::traits::IrEmitter;
use crate::types::{RemoteFunction, COLOR_COUNT};

pub const HEADER_MARK_US: u32 = 9000;
pub const HEADER_SPACE_US: u32 = 4500;
pub const BIT_MARK_US: u32 = 562;
pub const ZERO_SPACE_US: u32 = 562;
pub const ONE_SPACE_US: u32 = 1687;
pub const TRAILER_MARK_US: u32 = 562;
pub const FRAME_GAP_US: u32 = 40_000;
pub const REPEAT_GAP_US: u32 = 10_000;

/// Number of symbols in one frame, gap included.
pub const FRAME_SYMBOLS: usize = 2 + 2 * 32 + 2;

/// Address of the 24-key LED controller remote.
pub const REMOTE_ADDRESS: u16 = 0xEF00;

/// Controller command per palette index. The last entry is pink.
const COLOR_COMMANDS: [u16; COLOR_COUNT as usize] = [
    0x04, // red
    0x05, // green
    0x06, // blue
    0x07, // white
    0x08, // orange
    0x09, // pea green
    0x0A, // dark blue
    0x0C, // dark yellow
    0x0D, // cyan
    0x0E, // brown
    0x10, // yellow
    0x11, // light blue
    0x12, // purple
    0x15, // teal
    0x16, // pink
];

/// One timed interval of the IR carrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol {
    /// Carrier on for the given microseconds.
    Mark(u32),
    /// Carrier off for the given microseconds.
    Space(u32),
}

/// Address/command pair of one NEC-extended frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NecCode {
    pub address: u16,
    pub command: u16,
}

impl NecCode {
    pub const fn new(address: u16, command: u16) -> Self {
        Self { address, command }
    }

    /// Code selecting a palette color. Out-of-range indices select pink.
    pub fn color(index: u8) -> Self {
        let i = (index as usize).min(COLOR_COMMANDS.len() - 1);
        Self::new(REMOTE_ADDRESS, COLOR_COMMANDS[i])
    }

    /// Code for a fixed remote function.
    pub fn function(function: RemoteFunction) -> Self {
        let command = match function {
            RemoteFunction::On => 0x03,
            RemoteFunction::Off => 0x02,
            RemoteFunction::Flash => 0x0B,
            RemoteFunction::Strobe => 0x0F,
        };
        Self::new(REMOTE_ADDRESS, command)
    }

    /// The 32 data bits in transmit order (bit 0 first).
    pub fn data_bits(&self) -> u32 {
        (self.address as u32) << 16 | self.command as u32
    }
}

/// Iterator over the symbols of a single frame.
pub struct Frame {
    data: u32,
    pos: usize,
}

impl Frame {
    pub fn new(code: NecCode) -> Self {
        Self {
            data: code.data_bits(),
            pos: 0,
        }
    }
}

impl Iterator for Frame {
    type Item = Symbol;

    fn next(&mut self) -> Option<Symbol> {
        let symbol = match self.pos {
            0 => Symbol::Mark(HEADER_MARK_US),
            1 => Symbol::Space(HEADER_SPACE_US),
            p if p < 2 + 64 => {
                let bit = (p - 2) / 2;
                if (p - 2) % 2 == 0 {
                    Symbol::Mark(BIT_MARK_US)
                } else if self.data >> bit & 1 == 1 {
                    Symbol::Space(ONE_SPACE_US)
                } else {
                    Symbol::Space(ZERO_SPACE_US)
                }
            }
            66 => Symbol::Mark(TRAILER_MARK_US),
            67 => Symbol::Space(FRAME_GAP_US),
            _ => return None,
        };
        self.pos += 1;
        Some(symbol)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = FRAME_SYMBOLS.saturating_sub(self.pos);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Frame {}

/// Emit `repeats` frames of `code`, separated by the repeat gap.
///
/// The emitter blocks for every symbol, so this holds the caller's loop
/// for the whole transmission: about 60ms per frame plus the gaps between
/// frames. The gap after the last frame is not emitted. Taps shorter than
/// the transmission can be missed while it runs.
pub fn transmit<E: IrEmitter>(emitter: &mut E, code: NecCode, repeats: u8) {
    for r in 0..repeats {
        if r > 0 {
            emitter.emit(Symbol::Space(REPEAT_GAP_US));
        }
        let last = r + 1 == repeats;
        let len = if last { FRAME_SYMBOLS - 1 } else { FRAME_SYMBOLS };
        for symbol in Frame::new(code).take(len) {
            emitter.emit(symbol);
        }
    }
}

/// Total microseconds `transmit` spends emitting `repeats` frames of `code`.
pub fn transmit_duration_us(code: NecCode, repeats: u8) -> u64 {
    let frame: u64 = Frame::new(code)
        .map(|s| match s {
            Symbol::Mark(us) | Symbol::Space(us) => us as u64,
        })
        .sum();
    match repeats {
        0 => 0,
        n => {
            let n = n as u64;
            n * frame - FRAME_GAP_US as u64 + (n - 1) * REPEAT_GAP_US as u64
        }
    }
}

/// Decode every well-formed frame in a symbol stream.
///
/// Timings are matched with a ±25% tolerance. Anything that does not
/// parse as a frame is skipped until the next header mark.
pub fn decode_frames(symbols: &[Symbol]) -> Vec<NecCode> {
    fn near(actual: u32, nominal: u32) -> bool {
        let tol = nominal / 4;
        actual >= nominal - tol && actual <= nominal + tol
    }

    let mut codes = Vec::new();
    let mut i = 0;
    while i + 2 + 64 < symbols.len() {
        let header = matches!(symbols[i], Symbol::Mark(m) if near(m, HEADER_MARK_US))
            && matches!(symbols[i + 1], Symbol::Space(s) if near(s, HEADER_SPACE_US));
        if !header {
            i += 1;
            continue;
        }

        let mut data = 0u32;
        let mut ok = true;
        for bit in 0..32 {
            let mark = symbols[i + 2 + bit * 2];
            let space = symbols[i + 3 + bit * 2];
            match (mark, space) {
                (Symbol::Mark(m), Symbol::Space(s)) if near(m, BIT_MARK_US) => {
                    if near(s, ONE_SPACE_US) {
                        data |= 1 << bit;
                    } else if !near(s, ZERO_SPACE_US) {
                        ok = false;
                        break;
                    }
                }
                _ => {
                    ok = false;
                    break;
                }
            }
        }

        if ok && matches!(symbols[i + 66], Symbol::Mark(m) if near(m, TRAILER_MARK_US)) {
            codes.push(NecCode::new((data >> 16) as u16, data as u16));
            i += 67;
        } else {
            i += 1;
        }
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_impls::MockIr;
    use crate::types::PINK_INDEX;
    use alloc::vec;

    #[test]
    fn test_frame_structure() {
        let symbols: Vec<Symbol> = Frame::new(NecCode::new(0xEF00, 0x16)).collect();
        assert_eq!(symbols.len(), FRAME_SYMBOLS);
        assert_eq!(symbols[0], Symbol::Mark(HEADER_MARK_US));
        assert_eq!(symbols[1], Symbol::Space(HEADER_SPACE_US));
        assert_eq!(symbols[66], Symbol::Mark(TRAILER_MARK_US));
        assert_eq!(symbols[67], Symbol::Space(FRAME_GAP_US));
        for bit in 0..32 {
            assert_eq!(symbols[2 + bit * 2], Symbol::Mark(BIT_MARK_US));
        }
    }

    #[test]
    fn test_bits_lsb_first_command_then_address() {
        // command 0x0001, address 0x8000: first data bit is 1, last is 1,
        // everything else 0.
        let symbols: Vec<Symbol> = Frame::new(NecCode::new(0x8000, 0x0001)).collect();
        let spaces: Vec<u32> = (0..32)
            .map(|bit| match symbols[3 + bit * 2] {
                Symbol::Space(s) => s,
                Symbol::Mark(_) => panic!("expected space"),
            })
            .collect();

        assert_eq!(spaces[0], ONE_SPACE_US);
        assert_eq!(spaces[31], ONE_SPACE_US);
        assert!(spaces[1..31].iter().all(|&s| s == ZERO_SPACE_US));
    }

    #[test]
    fn test_transmit_repeats_with_gap() {
        let mut ir = MockIr::new();
        transmit(&mut ir, NecCode::color(0), 3);

        assert_eq!(ir.symbols.len(), 3 * FRAME_SYMBOLS + 2 - 1);
        assert_eq!(ir.symbols[FRAME_SYMBOLS], Symbol::Space(REPEAT_GAP_US));
        // Nothing trails the last frame's trailer mark.
        assert_eq!(ir.symbols.last(), Some(&Symbol::Mark(TRAILER_MARK_US)));
        assert_eq!(
            ir.take_codes(),
            vec![NecCode::color(0), NecCode::color(0), NecCode::color(0)]
        );
    }

    #[test]
    fn test_transmission_length_is_bounded() {
        let total_us: u64 = Frame::new(NecCode::color(PINK_INDEX))
            .map(|s| match s {
                Symbol::Mark(us) | Symbol::Space(us) => us as u64,
            })
            .sum();
        // Header + 32 bits + trailer + gap stays well under 150ms.
        assert!(total_us < 150_000, "frame takes {}us", total_us);
    }

    #[test]
    fn test_transmit_duration_matches_emitted_symbols() {
        let code = NecCode::color(PINK_INDEX);
        let mut ir = MockIr::new();
        transmit(&mut ir, code, 3);

        let emitted: u64 = ir
            .symbols
            .iter()
            .map(|s| match *s {
                Symbol::Mark(us) | Symbol::Space(us) => us as u64,
            })
            .sum();
        assert_eq!(emitted, transmit_duration_us(code, 3));
        // Three frames without the trailing gap.
        assert!(emitted < 300_000, "command takes {}us", emitted);
        assert_eq!(transmit_duration_us(code, 0), 0);
    }

    #[test]
    fn test_single_frame_has_no_trailing_gap() {
        let mut ir = MockIr::new();
        transmit(&mut ir, NecCode::color(3), 1);
        assert_eq!(ir.symbols.len(), FRAME_SYMBOLS - 1);
        assert_eq!(ir.take_codes(), vec![NecCode::color(3)]);
    }

    #[test]
    fn test_code_tables() {
        assert_eq!(NecCode::color(PINK_INDEX).command, 0x16);
        assert_eq!(NecCode::color(200), NecCode::color(PINK_INDEX));
        assert_eq!(NecCode::function(RemoteFunction::Strobe).command, 0x0F);
        assert_eq!(NecCode::function(RemoteFunction::On).address, REMOTE_ADDRESS);
    }

    #[test]
    fn test_decoder_skips_garbage() {
        let mut symbols = vec![Symbol::Space(300), Symbol::Mark(9000), Symbol::Space(100)];
        symbols.extend(Frame::new(NecCode::new(0x1234, 0xABCD)));
        assert_eq!(decode_frames(&symbols), vec![NecCode::new(0x1234, 0xABCD)]);
    }
}
