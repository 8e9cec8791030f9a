//! Pause machine around entering the distinguished state.
//!
//! ```text
//! Idle --arm--> SendBefore --pulses done--> Hold --hold_until--> SendAfter --pulses done--> Idle
//! ```
//!
//! Each SendBefore/SendAfter step asks the orb for one LIGHT(1) pulse, but
//! only when the reliable engine is idle. The pulse counter decrements
//! whether or not a pulse went out, so the hold starts at a deterministic
//! time no matter how contended the link is.

use tracing::debug;

use crate::config::ProtocolConfig;
use crate::time::{Duration, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PauseState {
    Idle,
    SendBefore,
    Hold,
    SendAfter,
}

/// Timing of the pause machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PauseTiming {
    pub pulses: u8,
    pub hold: Duration,
    pub spacing: Duration,
}

impl PauseTiming {
    pub fn from_config<C: ProtocolConfig>() -> Self {
        Self {
            pulses: C::PINK_PULSES,
            hold: C::PINK_HOLD,
            spacing: C::PULSE_SPACING,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PinkPause {
    state: PauseState,
    before_remaining: u8,
    after_remaining: u8,
    hold_until: Timestamp,
    next_step_at: Timestamp,
}

impl Default for PinkPause {
    fn default() -> Self {
        Self::new()
    }
}

impl PinkPause {
    pub const fn new() -> Self {
        Self {
            state: PauseState::Idle,
            before_remaining: 0,
            after_remaining: 0,
            hold_until: Timestamp::ZERO,
            next_step_at: Timestamp::ZERO,
        }
    }

    pub fn state(&self) -> PauseState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == PauseState::Idle
    }

    pub fn before_remaining(&self) -> u8 {
        self.before_remaining
    }

    pub fn after_remaining(&self) -> u8 {
        self.after_remaining
    }

    pub fn hold_until(&self) -> Timestamp {
        self.hold_until
    }

    /// Start the sequence. The first step runs on the next tick.
    pub fn arm(&mut self, timing: &PauseTiming, now: Timestamp) {
        self.state = PauseState::SendBefore;
        self.before_remaining = timing.pulses;
        self.after_remaining = timing.pulses;
        self.next_step_at = now;
        debug!(pulses = timing.pulses, "pause armed");
    }

    /// Advance on a tick.
    ///
    /// Returns true when the caller should attempt one LIGHT(1) pulse now.
    pub fn tick(&mut self, now: Timestamp, engine_idle: bool, timing: &PauseTiming) -> bool {
        match self.state {
            PauseState::Idle => false,
            PauseState::Hold => {
                if self.hold_until.reached(now) {
                    debug!("pause hold elapsed");
                    self.state = PauseState::SendAfter;
                    self.next_step_at = now;
                }
                false
            }
            PauseState::SendBefore | PauseState::SendAfter => {
                if !self.next_step_at.reached(now) {
                    return false;
                }
                self.next_step_at = now + timing.spacing;

                if self.state == PauseState::SendBefore {
                    self.before_remaining = self.before_remaining.saturating_sub(1);
                    if self.before_remaining == 0 {
                        self.hold_until = now + timing.hold;
                        self.state = PauseState::Hold;
                        debug!(hold_ms = timing.hold.as_millis(), "pause holding");
                    }
                } else {
                    self.after_remaining = self.after_remaining.saturating_sub(1);
                    if self.after_remaining == 0 {
                        self.state = PauseState::Idle;
                        debug!("pause complete");
                    }
                }
                engine_idle
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;

    fn timing() -> PauseTiming {
        PauseTiming::from_config::<DefaultConfig>()
    }

    /// Tick every 10ms until idle; returns (pulses requested, completion time).
    fn run_to_idle(pause: &mut PinkPause, start: u32, engine_idle: bool) -> (u32, u32) {
        let timing = timing();
        let mut pulses = 0;
        let mut ms = start;
        while !pause.is_idle() {
            if pause.tick(Timestamp::from_millis(ms), engine_idle, &timing) {
                pulses += 1;
            }
            ms += 10;
            assert!(ms < start + 60_000, "pause never finished");
        }
        (pulses, ms - 10)
    }

    #[test]
    fn test_full_sequence() {
        let mut pause = PinkPause::new();
        pause.arm(&timing(), Timestamp::from_millis(1000));
        assert_eq!(pause.state(), PauseState::SendBefore);

        let t = timing();
        assert!(pause.tick(Timestamp::from_millis(1000), true, &t));
        assert_eq!(pause.before_remaining(), 1);
        // Spacing not yet elapsed.
        assert!(!pause.tick(Timestamp::from_millis(1050), true, &t));
        assert!(pause.tick(Timestamp::from_millis(1100), true, &t));
        assert_eq!(pause.state(), PauseState::Hold);
        assert_eq!(pause.hold_until(), Timestamp::from_millis(4100));

        assert!(!pause.tick(Timestamp::from_millis(4090), true, &t));
        assert_eq!(pause.state(), PauseState::Hold);
        assert!(!pause.tick(Timestamp::from_millis(4100), true, &t));
        assert_eq!(pause.state(), PauseState::SendAfter);

        assert!(pause.tick(Timestamp::from_millis(4110), true, &t));
        assert!(pause.tick(Timestamp::from_millis(4210), true, &t));
        assert!(pause.is_idle());
    }

    #[test]
    fn test_hold_elapses_regardless_of_contention() {
        for engine_idle in [true, false] {
            let mut pause = PinkPause::new();
            pause.arm(&timing(), Timestamp::from_millis(500));
            let (pulses, done) = run_to_idle(&mut pause, 500, engine_idle);

            assert!(
                done - 500 >= DefaultConfig::PINK_HOLD.as_millis(),
                "finished after {}ms",
                done - 500
            );
            let expected = if engine_idle { 4 } else { 0 };
            assert_eq!(pulses, expected);
        }
    }

    #[test]
    fn test_counters_decrement_when_busy() {
        let mut pause = PinkPause::new();
        let t = timing();
        pause.arm(&t, Timestamp::ZERO);

        assert!(!pause.tick(Timestamp::ZERO, false, &t));
        assert_eq!(pause.before_remaining(), 1);
        assert!(!pause.tick(Timestamp::from_millis(100), false, &t));
        assert_eq!(pause.state(), PauseState::Hold);
    }

    #[test]
    fn test_idle_does_nothing() {
        let mut pause = PinkPause::new();
        assert!(!pause.tick(Timestamp::from_millis(5), true, &timing()));
        assert!(pause.is_idle());
    }
}
