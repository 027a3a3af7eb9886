//! The byte link to the power supply.
//!
//! Any [embedded_io::Read] + [embedded_io::Write] interface can carry the protocol once it
//! also knows how to throw away unread input, see [`Transport`]. With the `serialport`
//! feature enabled, [`SerialTransport`] opens a real port with the framing the 1788B expects.

#[cfg(feature = "serialport")]
use crate::config::{Config, to_std};

/// A link the [`Bk1788b`](crate::psu::Bk1788b) driver can exchange frames over.
pub trait Transport: embedded_io::Read + embedded_io::Write {
    /// Drop any bytes already sitting in the inbound buffer.
    ///
    /// Called right before every request so a late reply to an earlier request can never
    /// be mistaken for the answer to a new one.
    fn discard_input(&mut self) -> Result<(), Self::Error>;

    /// Limit how long the next [`read`](embedded_io::Read::read) may block.
    ///
    /// The driver calls this before every read with the time left until the response
    /// deadline. Links without a per-read timeout can keep the default, which does nothing.
    fn set_read_timeout(&mut self, _timeout: std::time::Duration) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// [std::io::Error] wearing an [embedded_io::Error] hat.
#[derive(Debug)]
pub struct IoError(pub std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<std::io::Error> for IoError {
    fn from(value: std::io::Error) -> Self {
        IoError(value)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            // Some platforms report an expired serial read timeout as WouldBlock.
            std::io::ErrorKind::WouldBlock => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

#[cfg(feature = "serialport")]
pub use serial::SerialTransport;

#[cfg(feature = "serialport")]
mod serial {
    use super::*;
    use log::debug;
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

    /// Give the adapter a moment after opening before the buffers are cleared.
    const OPEN_SETTLE: std::time::Duration = std::time::Duration::from_millis(100);

    /// A serial port configured 8N1 without flow control.
    pub struct SerialTransport(Box<dyn SerialPort>);

    impl SerialTransport {
        /// Open `config.endpoint()` at the configured baud rate.
        ///
        /// The port read timeout starts at the configured response timeout and is narrowed
        /// to the time remaining before each read of a reply.
        pub fn open(config: &Config) -> Result<Self, IoError> {
            let port = serialport::new(config.endpoint(), config.baud_rate().into())
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(to_std(config.timeout()))
                .open()
                .map_err(|e| IoError(e.into()))?;

            std::thread::sleep(OPEN_SETTLE);
            port.clear(ClearBuffer::All).map_err(|e| IoError(e.into()))?;
            debug!(
                "Opened {} at {} baud",
                config.endpoint(),
                u32::from(config.baud_rate())
            );

            Ok(Self(port))
        }
    }

    impl embedded_io::ErrorType for SerialTransport {
        type Error = IoError;
    }

    impl embedded_io::Read for SerialTransport {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            std::io::Read::read(&mut self.0, buf).map_err(IoError)
        }
    }

    impl embedded_io::Write for SerialTransport {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            std::io::Write::write(&mut self.0, buf).map_err(IoError)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            std::io::Write::flush(&mut self.0).map_err(IoError)
        }
    }

    impl Transport for SerialTransport {
        fn discard_input(&mut self) -> Result<(), Self::Error> {
            self.0
                .clear(ClearBuffer::Input)
                .map_err(|e| IoError(e.into()))
        }

        fn set_read_timeout(&mut self, timeout: std::time::Duration) -> Result<(), Self::Error> {
            self.0.set_timeout(timeout).map_err(|e| IoError(e.into()))
        }
    }
}
