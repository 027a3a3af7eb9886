//! Connection settings for one power supply.

use fugit::MillisDurationU32;

use crate::types::BaudRate;

/// Settings used to open and talk to a power supply.
///
/// ```
/// use bk1788b_psu::{config::Config, types::BaudRate};
/// use fugit::MillisDurationU32;
///
/// let config = Config::new("/dev/ttyUSB0")
///     .with_baud_rate(BaudRate::_9600)
///     .with_timeout(MillisDurationU32::millis(500));
/// assert_eq!(config.address(), 0x00);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    endpoint: String,
    baud_rate: BaudRate,
    /// Default for the 1788B is 0x00.
    address: u8,
    timeout: MillisDurationU32,
    settle_delay: MillisDurationU32,
}

impl Config {
    /// How long to wait for a full 26-byte reply.
    pub const DEFAULT_TIMEOUT: MillisDurationU32 = MillisDurationU32::millis(1000);
    /// Pause between writing a request and reading the reply.
    pub const DEFAULT_SETTLE_DELAY: MillisDurationU32 = MillisDurationU32::millis(50);

    /// `endpoint` is the serial port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            baud_rate: BaudRate::default(),
            address: 0x00,
            timeout: Self::DEFAULT_TIMEOUT,
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: BaudRate) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: MillisDurationU32) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.baud_rate
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn timeout(&self) -> MillisDurationU32 {
        self.timeout
    }

    pub fn settle_delay(&self) -> MillisDurationU32 {
        self.settle_delay
    }
}

/// Convert to the std type used by `thread::sleep` and the serial port.
pub(crate) fn to_std(duration: MillisDurationU32) -> std::time::Duration {
    std::time::Duration::from_millis(duration.to_millis() as u64)
}
