//! Our error types for the BK1788B driver.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Reasons a received 26-byte buffer is rejected by [`Frame::decode`](crate::frame::Frame::decode).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Expected a 26 byte frame, got {len} bytes")]
    LengthMismatch { len: usize },
    /// Every byte was zero, which is what a timed out read leaves behind.
    #[error("Response was all zeroes")]
    AllZero,
    #[error("Checksum mismatch: computed {expected:#04x}, frame carries {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Which setpoint an out of range value was meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Voltage,
    Current,
}

/// Custom error type for BK1788B communications.
///
/// `I` is the error type of the underlying [`Transport`](crate::transport::Transport).
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Not connected to the power supply")]
    NotConnected,
    #[error("Failed to open the serial port: {0:?}")]
    OpenFailed(I),
    #[error("Serial communication error: {0:?}")]
    Serial(I),
    #[error("No response before timeout")]
    Timeout,
    #[error("Short read: {received} of 26 bytes")]
    ShortRead { received: usize },
    #[error("Invalid response frame: {0}")]
    Decode(#[from] DecodeError),
    #[error("{quantity:?} {value} outside of {min}..={max}")]
    OutOfRange {
        quantity: Quantity,
        value: f64,
        min: f64,
        max: f64,
    },
}
