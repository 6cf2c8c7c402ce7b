//! Command packet encoding
//!
//! Packet format:
//! - LENGTH (2 bytes, big-endian): 3 + payload length. The value counts
//!   the length field and the opcode but not the checksum byte, so a
//!   packet is `LENGTH + 1` bytes on the wire.
//! - CHECKSUM (1 byte): 8-bit wrapping sum of OPCODE and every PAYLOAD byte
//! - OPCODE (1 byte)
//! - PAYLOAD (0-4120 bytes)
//!
//! GetVersionInfo with no payload is `00 03 2F 2F`.

use crate::opcode::Opcode;

/// Bytes before the payload
pub const HEADER_SIZE: usize = 4;

/// Length field + opcode, the fixed part of the LENGTH value
pub const LENGTH_OVERHEAD: usize = 3;

/// Largest payload: a 4096-byte FS-program chunk with its 8-byte
/// header and a 16-byte key
pub const MAX_PAYLOAD_SIZE: usize = 4096 + 24;

/// Largest complete packet
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Errors from packet encoding and decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Buffer too small for encoding
    BufferTooSmall,
    /// Header too short or LENGTH below its minimum
    InvalidFrame,
    /// Checksum mismatch
    InvalidChecksum,
}

/// 8-bit wrapping sum of the opcode and all payload bytes
///
/// The payload may be given in several parts; they are summed as if
/// concatenated.
pub fn checksum(opcode: u8, payload: &[&[u8]]) -> u8 {
    payload
        .iter()
        .flat_map(|part| part.iter())
        .fold(opcode, |sum, &byte| sum.wrapping_add(byte))
}

/// Fixed-layout packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketHeader {
    /// LENGTH value, host order
    pub length: u16,
    pub checksum: u8,
    pub opcode: u8,
}

impl PacketHeader {
    /// Header for `opcode` carrying the concatenation of `payload`
    pub fn new(opcode: Opcode, payload: &[&[u8]]) -> Result<Self, FrameError> {
        let payload_len: usize = payload.iter().map(|part| part.len()).sum();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge);
        }

        Ok(Self {
            length: (LENGTH_OVERHEAD + payload_len) as u16,
            checksum: checksum(opcode.as_u8(), payload),
            opcode: opcode.as_u8(),
        })
    }

    /// Payload bytes that follow this header
    pub fn payload_len(&self) -> usize {
        self.length as usize - LENGTH_OVERHEAD
    }

    /// Whole packet size on the wire
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// Header bytes in wire order
    ///
    /// The length goes out most significant byte first.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [hi, lo] = self.length.to_be_bytes();
        [hi, lo, self.checksum, self.opcode]
    }

    /// Parse a header from wire bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::InvalidFrame);
        }
        let length = u16::from_be_bytes([bytes[0], bytes[1]]);
        if (length as usize) < LENGTH_OVERHEAD {
            return Err(FrameError::InvalidFrame);
        }
        Ok(Self {
            length,
            checksum: bytes[2],
            opcode: bytes[3],
        })
    }

    /// Check a received payload against this header
    pub fn verify(&self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() != self.payload_len() {
            return Err(FrameError::InvalidFrame);
        }
        if checksum(self.opcode, &[payload]) != self.checksum {
            return Err(FrameError::InvalidChecksum);
        }
        Ok(())
    }
}

/// Encode a complete packet into `buffer`
///
/// Returns the number of bytes written.
pub fn encode(opcode: Opcode, payload: &[&[u8]], buffer: &mut [u8]) -> Result<usize, FrameError> {
    let header = PacketHeader::new(opcode, payload)?;
    let frame_len = header.frame_len();
    if buffer.len() < frame_len {
        return Err(FrameError::BufferTooSmall);
    }

    buffer[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    let mut pos = HEADER_SIZE;
    for part in payload {
        buffer[pos..pos + part.len()].copy_from_slice(part);
        pos += part.len();
    }

    Ok(frame_len)
}
