// SensorLink - Packet & BCD Codec
//
// Packet layout:
//
//   id      len     payload
//   2 byte  2 byte  len - 4 bytes (at most 124)
//   01 00   06 00   00 01
//
// Header fields are little-endian.  `len` counts the header itself and is the
// only framing information: there is no checksum.

use heapless::Vec;

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 4;
pub const MAX_PACKET_LEN: usize = 128;
pub const MAX_PAYLOAD_LEN: usize = MAX_PACKET_LEN - HEADER_LEN;

/// Encoded frame ready for the transport.
pub type Frame = Vec<u8, MAX_PACKET_LEN>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    pub id: u16,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl CommandPacket {
    pub fn new(id: u16, payload: &[u8]) -> Result<Self> {
        let payload = Vec::from_slice(payload)
            .map_err(|_| Error::MalformedPacket("payload exceeds 124 bytes"))?;
        Ok(Self { id, payload })
    }

    /// Total encoded length, header included.
    pub fn len(&self) -> u16 {
        (HEADER_LEN + self.payload.len()) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Decode one packet from a transport buffer.
    ///
    /// The header's `len` is trusted: bytes past it are ignored, and a `len`
    /// that points past the delivered bytes or beyond 128 is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (id, len) = peek_header(bytes)?;
        if len > bytes.len() {
            return Err(Error::MalformedPacket("declared length exceeds received bytes"));
        }
        if bytes.len() > len {
            log::debug!("ignoring {} trailing bytes after packet 0x{:04x}", bytes.len() - len, id);
        }
        Self::new(id, &bytes[HEADER_LEN..len])
    }

    pub fn encode(&self) -> Frame {
        let mut frame = Frame::new();
        // Payload is bounded at construction, the header always fits.
        let _ = frame.extend_from_slice(&self.id.to_le_bytes());
        let _ = frame.extend_from_slice(&self.len().to_le_bytes());
        let _ = frame.extend_from_slice(&self.payload);
        frame
    }
}

/// Validate the 4-byte header and return `(id, len)`.
///
/// Stream transports use this to find out how many more bytes belong to the
/// packet before calling [`CommandPacket::decode`].
pub fn peek_header(bytes: &[u8]) -> Result<(u16, usize)> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::MalformedPacket("shorter than header"));
    }
    let id = u16::from_le_bytes([bytes[0], bytes[1]]);
    let len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    if len < HEADER_LEN {
        return Err(Error::MalformedPacket("declared length shorter than header"));
    }
    if len > MAX_PACKET_LEN {
        return Err(Error::MalformedPacket("declared length exceeds 128 bytes"));
    }
    Ok((id, len))
}

/// Header followed by the payload fields exactly as laid out by the caller.
pub fn encode_reply(id: u16, payload: &[u8]) -> Result<Frame> {
    Ok(CommandPacket::new(id, payload)?.encode())
}

// ---------------------------------------------------------------------------
// BCD (RTC register format)
// ---------------------------------------------------------------------------

/// Pack a decimal 0..=99 into tens/units nibbles.
pub fn dec_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Unpack tens/units nibbles.  Status bits must already be masked off.
pub fn bcd_to_dec(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_little_endian() {
        let p = CommandPacket::new(0x0102, &[0xAA]).unwrap();
        assert_eq!(p.encode().as_slice(), &[0x02, 0x01, 0x05, 0x00, 0xAA]);
    }

    #[test]
    fn bcd_nibbles() {
        assert_eq!(dec_to_bcd(59), 0x59);
        assert_eq!(bcd_to_dec(0x23), 23);
    }
}
