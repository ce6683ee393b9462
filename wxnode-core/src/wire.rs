//! Framing: 8-byte header (version, type, sequence LE, timestamp LE) + 1-byte length + payload.

use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::{PacketType, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

/// version(1) + type(1) + sequence(2) + timestamp(4).
pub const HEADER_SIZE: usize = 8;
const LEN_SIZE: usize = 1;

/// Smallest buffer that can hold a frame: header plus the length byte.
pub const MIN_FRAME_LEN: usize = HEADER_SIZE + LEN_SIZE;

/// Largest encoded frame.
pub const MAX_FRAME_LEN: usize = MIN_FRAME_LEN + MAX_PAYLOAD_SIZE;

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: PacketType,
    /// Advisory only; never used for ordering or dedup.
    pub sequence: u16,
    pub timestamp_ms: u32,
    pub payload: Vec<u8>,
}

/// Encode a frame. Payloads longer than `MAX_PAYLOAD_SIZE` are truncated, never rejected.
pub fn encode_frame(
    packet_type: PacketType,
    sequence: u16,
    timestamp_ms: u32,
    payload: &[u8],
) -> Vec<u8> {
    let len = payload.len().min(MAX_PAYLOAD_SIZE);
    let mut out = BytesMut::with_capacity(MIN_FRAME_LEN + len);
    out.put_u8(PROTOCOL_VERSION);
    out.put_u8(packet_type.to_byte());
    out.put_u16_le(sequence);
    out.put_u32_le(timestamp_ms);
    out.put_u8(len as u8);
    out.put_slice(&payload[..len]);
    out.to_vec()
}

/// Decode one frame from a whole datagram. Bytes past the declared payload are ignored.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameDecodeError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameDecodeError::TooShort(bytes.len()));
    }
    let mut buf = bytes;
    let version = buf.get_u8();
    let type_byte = buf.get_u8();
    let sequence = buf.get_u16_le();
    let timestamp_ms = buf.get_u32_le();
    let len = buf.get_u8() as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(FrameDecodeError::PayloadTooLarge(len));
    }
    if len > buf.remaining() {
        return Err(FrameDecodeError::LengthMismatch {
            declared: len,
            available: buf.remaining(),
        });
    }
    if version != PROTOCOL_VERSION {
        return Err(FrameDecodeError::VersionMismatch(version));
    }
    let packet_type =
        PacketType::from_byte(type_byte).ok_or(FrameDecodeError::UnknownType(type_byte))?;
    Ok(Frame {
        packet_type,
        sequence,
        timestamp_ms,
        payload: buf[..len].to_vec(),
    })
}

/// Reason a datagram was not accepted as a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("declared payload {declared} exceeds {available} available bytes")]
    LengthMismatch { declared: usize, available: usize },
    #[error("declared payload {0} exceeds maximum")]
    PayloadTooLarge(usize),
    #[error("unsupported protocol version {0}")]
    VersionMismatch(u8),
    #[error("unknown packet type {0}")]
    UnknownType(u8),
}
