//! Wire packet framing
//!
//! Each UDP datagram carries exactly one audio frame:
//!
//! ```text
//! offset 0  : sequence          u32 (big-endian)
//! offset 4  : capture timestamp u64 (big-endian, microseconds)
//! offset 12 : payload length    u32 (big-endian)
//! offset 16 : payload           opaque compressed audio
//! ```
//!
//! Decoding rejects datagrams whose total length does not match the declared
//! payload length exactly, so truncated or padded input never reaches the
//! decoder.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::HEADER_SIZE;
use crate::error::NetworkError;

/// One parsed wire packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Stream sequence number, wraps at 2^32
    pub sequence: u32,
    /// Capture timestamp in microseconds since stream start
    pub timestamp: u64,
    /// Opaque compressed audio payload
    pub payload: Bytes,
}

impl Packet {
    /// Total size on the wire
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Serialize a packet header plus payload into a single datagram buffer.
///
/// The caller guarantees the payload fits one UDP datagram; no limit is
/// enforced here.
pub fn encode(sequence: u32, timestamp: u64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u32(sequence);
    buf.put_u64(timestamp);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Parse a received datagram.
///
/// Fails with [`NetworkError::InvalidPacket`] if the input is shorter than
/// the header or the declared payload length does not equal the remaining
/// bytes.
pub fn decode(data: &[u8]) -> Result<Packet, NetworkError> {
    if data.len() < HEADER_SIZE {
        return Err(NetworkError::InvalidPacket);
    }

    let mut buf = data;
    let sequence = buf.get_u32();
    let timestamp = buf.get_u64();
    let payload_length = buf.get_u32() as usize;

    if payload_length != data.len() - HEADER_SIZE {
        return Err(NetworkError::InvalidPacket);
    }

    Ok(Packet {
        sequence,
        timestamp,
        payload: Bytes::copy_from_slice(buf),
    })
}
