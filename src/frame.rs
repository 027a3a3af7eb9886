//! Building and validating the fixed 26-byte frames of the BK1788B protocol.
//!
//! | Offset | Size | Meaning |
//! |---|---|---|
//! | 0 | 1 | Start marker, `0xAA` |
//! | 1 | 1 | Device address |
//! | 2 | 1 | Command code |
//! | 3 | 22 | Payload, zero padded |
//! | 25 | 1 | Sum of bytes 0-24, modulo 256 |

use crate::{error::DecodeError, types::StatusCode};

/// Every frame, in both directions, is exactly this long.
pub const FRAME_LEN: usize = 26;
/// Payload bytes carried by one frame.
pub const PAYLOAD_LEN: usize = 22;
pub const START_MARKER: u8 = 0xAA;

const PAYLOAD_OFFSET: usize = 3;
const CHECKSUM_OFFSET: usize = FRAME_LEN - 1;

/// Modulo-256 sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// A checksummed 26-byte frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Build an outbound frame.
    ///
    /// Payloads longer than 22 bytes are cut at 22, the same as the device does.
    pub fn encode(address: u8, command: impl Into<u8>, payload: &[u8]) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = START_MARKER;
        bytes[1] = address;
        bytes[2] = command.into();

        let len = payload.len().min(PAYLOAD_LEN);
        bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len].copy_from_slice(&payload[..len]);

        bytes[CHECKSUM_OFFSET] = checksum(&bytes[..CHECKSUM_OFFSET]);
        Self { bytes }
    }

    /// Validate a received buffer.
    ///
    /// The payload is not interpreted here. An all-zero buffer is rejected before the
    /// checksum is looked at, even though its checksum of zero is self-consistent.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let bytes: [u8; FRAME_LEN] = raw
            .try_into()
            .map_err(|_| DecodeError::LengthMismatch { len: raw.len() })?;

        if bytes.iter().all(|&byte| byte == 0) {
            return Err(DecodeError::AllZero);
        }

        let expected = checksum(&bytes[..CHECKSUM_OFFSET]);
        let actual = bytes[CHECKSUM_OFFSET];
        if expected != actual {
            return Err(DecodeError::ChecksumMismatch { expected, actual });
        }

        Ok(Self { bytes })
    }

    pub fn address(&self) -> u8 {
        self.bytes[1]
    }

    /// Raw command byte. Replies may carry codes that are not a [`Command`](crate::types::Command).
    pub fn command(&self) -> u8 {
        self.bytes[2]
    }

    /// Always [`PAYLOAD_LEN`] bytes.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[PAYLOAD_OFFSET..CHECKSUM_OFFSET]
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[CHECKSUM_OFFSET]
    }

    /// The first payload byte read as an acknowledgement status.
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_repr(self.bytes[PAYLOAD_OFFSET])
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }
}
