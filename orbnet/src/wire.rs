//! Wire format serialization and deserialization.
//!
//! Every message is one fixed-size datagram, identical in both directions:
//!
//! ```text
//! type (1) || sender_node_id (1) || ack_type (1) || flags (1)
//! || seq (4) || ack_seq (4) || value (4)
//! ```
//!
//! Multi-byte fields are little-endian (the native order of the radios the
//! fleet runs on). `ack_type`/`ack_seq` are only meaningful in ACK packets
//! and are written as zero otherwise. `flags` is reserved.
//!
//! ## Cycle configuration word
//!
//! ```text
//! bits 24..=27: count (clamped to 0..=6)
//! bits 4i..=4i+3: palette index of entry i, for i in 0..count
//! ```

use alloc::vec::Vec;

use crate::types::{MAX_CYCLE_ENTRIES, NodeId};

/// Size of every packet on the wire.
pub const PACKET_SIZE: usize = 16;

const CYCLE_COUNT_SHIFT: u32 = 24;
const CYCLE_COUNT_MASK: u32 = 0x0F;
const CYCLE_ENTRY_BITS: u32 = 4;

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Unexpected end of buffer.
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    /// Datagram is not exactly one packet long.
    #[error("invalid datagram length")]
    InvalidLength,
    /// Unknown message type byte.
    #[error("invalid message type")]
    InvalidMessageType,
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a new reader over a byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Returns true if there are no more bytes to read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let v = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(v)
    }

    /// Read four bytes.
    fn read_array4(&mut self) -> Result<[u8; 4], DecodeError> {
        if self.remaining() < 4 {
            return Err(DecodeError::UnexpectedEof);
        }
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(out)
    }

    /// Read a u32 in little-endian format.
    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array4()?))
    }

    /// Read an i32 in little-endian format.
    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.read_array4()?))
    }
}

/// Writer for encoding messages.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create a writer sized for one packet.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(PACKET_SIZE),
        }
    }

    /// Returns the current length of written data.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no data has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a u32 in little-endian format.
    pub fn write_u32_le(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an i32 in little-endian format.
    pub fn write_i32_le(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Consume the writer and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    /// Encode this value to the writer.
    fn encode(&self, w: &mut Writer);

    /// Encode and return the bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    /// Decode a value from the reader.
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode from a byte slice (strict: rejects trailing bytes).
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let result = Self::decode(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(result)
    }
}

/// Message type byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Hello = 1,
    Status = 2,
    Ping = 3,
    Pong = 4,
    Set = 5,
    Ack = 6,
    Light = 7,
    Consensus = 8,
    RemoteFunc = 9,
    CycleConfig = 10,
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, DecodeError> {
        Ok(match v {
            1 => Self::Hello,
            2 => Self::Status,
            3 => Self::Ping,
            4 => Self::Pong,
            5 => Self::Set,
            6 => Self::Ack,
            7 => Self::Light,
            8 => Self::Consensus,
            9 => Self::RemoteFunc,
            10 => Self::CycleConfig,
            _ => return Err(DecodeError::InvalidMessageType),
        })
    }
}

/// A decoded message body: one variant per message type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    /// Discovery announce (orb to broadcast). Value carries the orb's state.
    Hello(i32),
    /// Current state report (orb to hub), 1..=15.
    Status(i32),
    /// Liveness probe; the value is echoed in the PONG.
    Ping(i32),
    /// Liveness reply.
    Pong(i32),
    /// Assign a state (hub to orb).
    Set(i32),
    /// Acknowledges the packet `(ack_type, ack_seq)`.
    Ack { ack_type: MessageType, ack_seq: u32 },
    /// Distinguished-state pulse: true entering, false leaving.
    Light(bool),
    /// Fleet-wide consensus flag (hub to orb).
    Consensus(bool),
    /// Trigger a fixed remote function (raw value, validated by the receiver).
    RemoteFunc(i32),
    /// Bit-packed cycle configuration word.
    CycleConfig(i32),
}

impl Message {
    /// The message type byte of this message.
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::Status(_) => MessageType::Status,
            Message::Ping(_) => MessageType::Ping,
            Message::Pong(_) => MessageType::Pong,
            Message::Set(_) => MessageType::Set,
            Message::Ack { .. } => MessageType::Ack,
            Message::Light(_) => MessageType::Light,
            Message::Consensus(_) => MessageType::Consensus,
            Message::RemoteFunc(_) => MessageType::RemoteFunc,
            Message::CycleConfig(_) => MessageType::CycleConfig,
        }
    }

    /// The value field as written on the wire.
    pub fn value(&self) -> i32 {
        match *self {
            Message::Hello(v)
            | Message::Status(v)
            | Message::Ping(v)
            | Message::Pong(v)
            | Message::Set(v)
            | Message::RemoteFunc(v)
            | Message::CycleConfig(v) => v,
            Message::Light(on) | Message::Consensus(on) => on as i32,
            Message::Ack { .. } => 0,
        }
    }
}

/// One datagram: header fields plus the decoded message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Sender's node id (0 = hub).
    pub sender: NodeId,
    /// Reserved flags byte, carried through unchanged.
    pub flags: u8,
    /// Sender-assigned sequence number.
    pub seq: u32,
    /// Message body.
    pub message: Message,
}

impl Packet {
    /// Build a packet with cleared flags.
    pub fn new(sender: NodeId, seq: u32, message: Message) -> Self {
        Self {
            sender,
            flags: 0,
            seq,
            message,
        }
    }

    /// Build the acknowledgement for this packet.
    pub fn ack(&self, sender: NodeId, seq: u32) -> Packet {
        Packet::new(
            sender,
            seq,
            Message::Ack {
                ack_type: self.message.kind(),
                ack_seq: self.seq,
            },
        )
    }
}

impl Encode for Packet {
    fn encode(&self, w: &mut Writer) {
        let (ack_type, ack_seq) = match self.message {
            Message::Ack { ack_type, ack_seq } => (ack_type as u8, ack_seq),
            _ => (0, 0),
        };
        w.write_u8(self.message.kind() as u8);
        w.write_u8(self.sender);
        w.write_u8(ack_type);
        w.write_u8(self.flags);
        w.write_u32_le(self.seq);
        w.write_u32_le(ack_seq);
        w.write_i32_le(self.message.value());
    }
}

impl Decode for Packet {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let kind = MessageType::try_from(r.read_u8()?)?;
        let sender = r.read_u8()?;
        let ack_type = r.read_u8()?;
        let flags = r.read_u8()?;
        let seq = r.read_u32_le()?;
        let ack_seq = r.read_u32_le()?;
        let value = r.read_i32_le()?;

        let message = match kind {
            MessageType::Hello => Message::Hello(value),
            MessageType::Status => Message::Status(value),
            MessageType::Ping => Message::Ping(value),
            MessageType::Pong => Message::Pong(value),
            MessageType::Set => Message::Set(value),
            MessageType::Ack => Message::Ack {
                ack_type: MessageType::try_from(ack_type)?,
                ack_seq,
            },
            MessageType::Light => Message::Light(value != 0),
            MessageType::Consensus => Message::Consensus(value != 0),
            MessageType::RemoteFunc => Message::RemoteFunc(value),
            MessageType::CycleConfig => Message::CycleConfig(value),
        };

        Ok(Packet {
            sender,
            flags,
            seq,
            message,
        })
    }

    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != PACKET_SIZE {
            return Err(DecodeError::InvalidLength);
        }
        let mut r = Reader::new(data);
        Self::decode(&mut r)
    }
}

/// Pack up to six palette indices into a cycle configuration word.
///
/// Extra entries are ignored; each index is truncated to four bits.
pub fn pack_cycle_config(indices: &[u8]) -> i32 {
    let count = indices.len().min(MAX_CYCLE_ENTRIES);
    let mut word = (count as u32) << CYCLE_COUNT_SHIFT;
    for (i, &index) in indices.iter().take(count).enumerate() {
        word |= ((index as u32) & 0x0F) << (CYCLE_ENTRY_BITS * i as u32);
    }
    word as i32
}

/// Unpack the raw palette indices of a cycle configuration word.
///
/// No filtering is applied beyond clamping the count to six.
pub fn unpack_cycle_config(word: i32) -> Vec<u8> {
    let word = word as u32;
    let count = (((word >> CYCLE_COUNT_SHIFT) & CYCLE_COUNT_MASK) as usize).min(MAX_CYCLE_ENTRIES);
    (0..count)
        .map(|i| ((word >> (CYCLE_ENTRY_BITS * i as u32)) & 0x0F) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_packet_layout_is_bit_exact() {
        let packet = Packet::new(3, 0x0102_0304, Message::Status(-2));
        let bytes = packet.encode_to_vec();

        assert_eq!(bytes.len(), PACKET_SIZE);
        assert_eq!(
            bytes,
            vec![
                2, 3, 0, 0, // type, sender, ack_type, flags
                0x04, 0x03, 0x02, 0x01, // seq (LE)
                0, 0, 0, 0, // ack_seq
                0xFE, 0xFF, 0xFF, 0xFF, // value -2 (LE)
            ]
        );
    }

    #[test]
    fn test_ack_fields() {
        let status = Packet::new(5, 77, Message::Status(4));
        let ack = status.ack(0, 9);
        let bytes = ack.encode_to_vec();

        assert_eq!(bytes[0], MessageType::Ack as u8);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[2], MessageType::Status as u8);
        assert_eq!(&bytes[8..12], &77u32.to_le_bytes());

        let decoded = Packet::decode_from_slice(&bytes).unwrap();
        assert_eq!(
            decoded.message,
            Message::Ack {
                ack_type: MessageType::Status,
                ack_seq: 77
            }
        );
        assert_eq!(decoded.seq, 9);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let bytes = Packet::new(1, 1, Message::Hello(1)).encode_to_vec();

        assert_eq!(
            Packet::decode_from_slice(&bytes[..15]),
            Err(DecodeError::InvalidLength)
        );
        let mut long = bytes.clone();
        long.push(0);
        assert_eq!(
            Packet::decode_from_slice(&long),
            Err(DecodeError::InvalidLength)
        );
        assert_eq!(Packet::decode_from_slice(&[]), Err(DecodeError::InvalidLength));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = Packet::new(1, 1, Message::Ping(0)).encode_to_vec();
        bytes[0] = 0;
        assert_eq!(
            Packet::decode_from_slice(&bytes),
            Err(DecodeError::InvalidMessageType)
        );
        bytes[0] = 11;
        assert_eq!(
            Packet::decode_from_slice(&bytes),
            Err(DecodeError::InvalidMessageType)
        );
    }

    #[test]
    fn test_flags_carried_through() {
        let mut packet = Packet::new(2, 10, Message::Light(true));
        packet.flags = 0xA5;
        let decoded = Packet::decode_from_slice(&packet.encode_to_vec()).unwrap();
        assert_eq!(decoded.flags, 0xA5);
        assert_eq!(decoded.message, Message::Light(true));
    }

    #[test]
    fn test_boolean_values_accept_any_nonzero() {
        let mut bytes = Packet::new(0, 3, Message::Consensus(true)).encode_to_vec();
        bytes[12] = 7;
        let decoded = Packet::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded.message, Message::Consensus(true));
        assert_eq!(Message::Light(false).value(), 0);
    }

    #[test]
    fn test_cycle_config_packing() {
        let word = pack_cycle_config(&[0, 2, 4]);
        assert_eq!(word as u32, (3 << 24) | (4 << 8) | (2 << 4));
        assert_eq!(unpack_cycle_config(word), vec![0, 2, 4]);
    }

    #[test]
    fn test_cycle_config_count_clamped() {
        let word = pack_cycle_config(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!((word as u32 >> 24) & 0x0F, 6);
        assert_eq!(unpack_cycle_config(word), vec![1, 2, 3, 4, 5, 6]);

        // A hand-built word claiming 15 entries still yields at most six.
        let forged = ((15u32 << 24) | 0x0054_3210) as i32;
        assert_eq!(unpack_cycle_config(forged), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_cycle_config() {
        assert_eq!(pack_cycle_config(&[]), 0);
        assert!(unpack_cycle_config(0).is_empty());
    }
}
