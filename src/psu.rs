use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use embedded_io::Error as _;
use log::{debug, info, trace, warn};

use crate::{
    config::{Config, to_std},
    error::{Error, Quantity, Result},
    frame::{FRAME_LEN, Frame, PAYLOAD_LEN},
    transport::Transport,
    types::{Command, OperatingMode, StatusBits, StatusCode},
};

/// Highest voltage setpoint the 1788B accepts, in volts.
pub const MAX_VOLTAGE: f64 = 32.0;
/// Highest current limit the 1788B accepts, in amps.
pub const MAX_CURRENT: f64 = 6.0;

/// Consecutive failed exchanges between two warnings in the log.
const FAILURE_WARN_EVERY: u32 = 5;

/// One decoded read-status reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    /// Measured output voltage in volts.
    pub actual_voltage: f64,
    /// Measured output current in amps.
    pub actual_current: f64,
    pub voltage_setpoint: f64,
    pub current_setpoint: f64,
    pub output_on: bool,
    pub mode: OperatingMode,
    pub remote_mode: bool,
    pub over_temperature: bool,
    /// Raw 3-bit fan level, 0 (off) to 7. The 1788B only reports 0 to 5.
    pub fan_speed: u8,
}

impl StatusSnapshot {
    /// Decode the fields of a reply to [`Command::ReadStatus`].
    ///
    /// Offsets are within the full 26-byte frame.
    pub fn from_frame(frame: &Frame) -> Self {
        let raw = frame.as_bytes();
        let current_ma = u16::from_le_bytes([raw[3], raw[4]]);
        let voltage_mv = u32::from_le_bytes([raw[5], raw[6], raw[7], raw[8]]);
        let bits = StatusBits::from(raw[9]);
        let current_setpoint_ma = u16::from_le_bytes([raw[10], raw[11]]);
        let voltage_setpoint_mv = u32::from_le_bytes([raw[16], raw[17], raw[18], raw[19]]);

        Self {
            actual_voltage: voltage_mv as f64 / 1000.0,
            actual_current: current_ma as f64 / 1000.0,
            voltage_setpoint: voltage_setpoint_mv as f64 / 1000.0,
            current_setpoint: current_setpoint_ma as f64 / 1000.0,
            output_on: bits.output_on(),
            mode: bits.mode(),
            remote_mode: bits.remote_mode(),
            over_temperature: bits.over_temperature(),
            fan_speed: bits.fan_speed(),
        }
    }

    /// Output power in watts.
    pub fn power_w(&self) -> f64 {
        self.actual_voltage * self.actual_current
    }
}

/// Everything guarded by the handle's lock.
struct Link<T> {
    /// `None` once closed.
    transport: Option<T>,
    consecutive_failures: u32,
}

/// One connection to a BK Precision 1788B.
///
/// You can create a Bk1788b using any [`Transport`], or open a serial port with [`Bk1788b::open`].
///
/// All methods take `&self`; wrap the handle in an [`Arc`](std::sync::Arc) to share it between a
/// foreground thread issuing commands and a background poller. Every exchange runs under a
/// single lock, so at most one request is on the wire at a time. Use [`Bk1788b::session`] when
/// several commands must reach the device without anything in between.
///
/// "set" methods return `Ok(false)` when the device did not confirm the command (no reply,
/// a corrupt reply or a rejection) and `read_status` returns `Ok(None)` in the same cases. A
/// closed handle, a failing serial port or an out of range setpoint is an `Err`.
pub struct Bk1788b<T: Transport> {
    link: Mutex<Link<T>>,
    config: Config,
}

#[cfg(feature = "serialport")]
impl Bk1788b<crate::transport::SerialTransport> {
    /// Open the serial port described by `config`.
    pub fn open(config: Config) -> Result<Self, crate::transport::IoError> {
        let transport =
            crate::transport::SerialTransport::open(&config).map_err(Error::OpenFailed)?;
        info!(
            "Connected to {} at {} baud, address {:#04x}",
            config.endpoint(),
            u32::from(config.baud_rate()),
            config.address()
        );
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Bk1788b<T> {
    /// Wrap an already open transport. The endpoint and baud rate in `config` are only informative here.
    pub fn new(transport: T, config: Config) -> Self {
        Self {
            link: Mutex::new(Link {
                transport: Some(transport),
                consecutive_failures: 0,
            }),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the transport is still held.
    ///
    /// Waits for any exchange in progress.
    pub fn is_open(&self) -> bool {
        self.lock().transport.is_some()
    }

    /// Close the link and hand back the transport.
    ///
    /// Takes the same lock as an exchange, so an exchange already in progress on another
    /// thread completes first. Every later call fails with [`Error::NotConnected`].
    /// Closing twice is harmless and returns `None` the second time.
    pub fn close(&self) -> Option<T> {
        let transport = self.lock().transport.take();
        if transport.is_some() {
            info!("Disconnected from {}", self.config.endpoint());
        }
        transport
    }

    /// Number of exchanges in a row that have failed. Reset by the next successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Hold the link for a sequence of commands.
    ///
    /// Nothing else reaches the device until the returned [`Session`] is dropped.
    pub fn session(&self) -> Result<Session<'_, T>, T::Error> {
        let link = self.lock();
        if link.transport.is_none() {
            return Err(Error::NotConnected);
        }
        Ok(Session {
            link,
            config: &self.config,
        })
    }

    /// Send one request and return the validated reply. No retries.
    pub fn exchange(&self, command: Command, payload: &[u8]) -> Result<Frame, T::Error> {
        self.session()?.exchange(command, payload)
    }

    /// Enable remote mode (front panel locked) or hand control back to the panel.
    pub fn set_remote_mode(&self, enable: bool) -> Result<bool, T::Error> {
        self.session()?.set_remote_mode(enable)
    }

    /// Switch the output on or off.
    pub fn set_output(&self, enable: bool) -> Result<bool, T::Error> {
        self.session()?.set_output(enable)
    }

    /// Set the output voltage, `0.0..=32.0` volts.
    pub fn set_voltage(&self, volts: f64) -> Result<bool, T::Error> {
        self.session()?.set_voltage(volts)
    }

    /// Set the current limit, `0.0..=6.0` amps.
    pub fn set_current(&self, amps: f64) -> Result<bool, T::Error> {
        self.session()?.set_current(amps)
    }

    pub fn read_status(&self) -> Result<Option<StatusSnapshot>, T::Error> {
        self.session()?.read_status()
    }

    /// Measured `(volts, amps)`.
    pub fn get_voltage_current(&self) -> Result<Option<(f64, f64)>, T::Error> {
        self.session()?.get_voltage_current()
    }

    fn lock(&self) -> MutexGuard<'_, Link<T>> {
        // A panic mid-exchange leaves the transport usable; stale input goes on the next request.
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive use of the link, obtained from [`Bk1788b::session`].
///
/// Offers the same commands as [`Bk1788b`]; all of them run under the one lock held by the session.
pub struct Session<'a, T: Transport> {
    link: MutexGuard<'a, Link<T>>,
    config: &'a Config,
}

impl<T: Transport> Session<'_, T> {
    /// Send one request and wait for its 26-byte reply.
    ///
    /// Discards stale input, writes the request, waits the settle delay, then reads until a
    /// whole frame arrived or the response timeout expired. Once the request is written the
    /// read is always waited out.
    pub fn exchange(&mut self, command: Command, payload: &[u8]) -> Result<Frame, T::Error> {
        let result = self.exchange_once(command, payload);
        match &result {
            Ok(_) => self.link.consecutive_failures = 0,
            Err(Error::NotConnected) => {}
            Err(err) => {
                self.link.consecutive_failures += 1;
                let failures = self.link.consecutive_failures;
                if failures % FAILURE_WARN_EVERY == 0 {
                    warn!("{failures} exchanges in a row have failed, last: {err}");
                }
            }
        }
        result
    }

    fn exchange_once(&mut self, command: Command, payload: &[u8]) -> Result<Frame, T::Error> {
        let request = Frame::encode(self.config.address(), command, payload);
        let settle = to_std(self.config.settle_delay());
        let timeout = to_std(self.config.timeout());
        let transport = self.link.transport.as_mut().ok_or(Error::NotConnected)?;

        transport.discard_input().map_err(Error::Serial)?;
        transport
            .write_all(request.as_bytes())
            .map_err(Error::Serial)?;
        transport.flush().map_err(Error::Serial)?;
        debug!("TX {:02x?}", request.as_bytes());

        if !settle.is_zero() {
            std::thread::sleep(settle);
        }

        let mut raw = [0u8; FRAME_LEN];
        let deadline = Instant::now() + timeout;
        let mut received = 0;
        while received < FRAME_LEN {
            // Each read only gets what is left, so the whole reply shares one timeout.
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            transport
                .set_read_timeout(remaining)
                .map_err(Error::Serial)?;
            match transport.read(&mut raw[received..]) {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(e) => match e.kind() {
                    embedded_io::ErrorKind::TimedOut => break,
                    embedded_io::ErrorKind::Interrupted => {}
                    _ => return Err(Error::Serial(e)),
                },
            }
        }

        match received {
            0 => return Err(Error::Timeout),
            FRAME_LEN => {}
            received => {
                trace!("RX (short) {:02x?}", &raw[..received]);
                return Err(Error::ShortRead { received });
            }
        }
        debug!("RX {raw:02x?}");

        Ok(Frame::decode(&raw)?)
    }

    /// Enable remote mode (front panel locked) or hand control back to the panel.
    pub fn set_remote_mode(&mut self, enable: bool) -> Result<bool, T::Error> {
        self.write_command(Command::SetRemote, &[enable as u8])
    }

    /// Switch the output on or off.
    pub fn set_output(&mut self, enable: bool) -> Result<bool, T::Error> {
        self.write_command(Command::SetOutput, &[enable as u8])
    }

    /// Set the output voltage, `0.0..=32.0` volts.
    ///
    /// Sent as whole millivolts, truncated toward zero.
    pub fn set_voltage(&mut self, volts: f64) -> Result<bool, T::Error> {
        let millivolts = to_milli::<T::Error>(Quantity::Voltage, volts, MAX_VOLTAGE)?;
        self.write_command(Command::SetVoltage, &millivolts.to_le_bytes())
    }

    /// Set the current limit, `0.0..=6.0` amps.
    ///
    /// Sent as whole milliamps, truncated toward zero.
    pub fn set_current(&mut self, amps: f64) -> Result<bool, T::Error> {
        let milliamps = to_milli::<T::Error>(Quantity::Current, amps, MAX_CURRENT)? as u16;
        self.write_command(Command::SetCurrent, &milliamps.to_le_bytes())
    }

    /// Read everything the supply reports about itself.
    pub fn read_status(&mut self) -> Result<Option<StatusSnapshot>, T::Error> {
        match self.exchange(Command::ReadStatus, &[0u8; PAYLOAD_LEN]) {
            Ok(reply) if reply.command() == Command::ReadStatus as u8 => {
                Ok(Some(StatusSnapshot::from_frame(&reply)))
            }
            Ok(reply) => {
                warn!(
                    "Status read answered with command {:#04x}, expected {:#04x}",
                    reply.command(),
                    Command::ReadStatus as u8
                );
                Ok(None)
            }
            Err(err) => not_taken(Command::ReadStatus, err).map(|()| None),
        }
    }

    /// Measured `(volts, amps)`.
    pub fn get_voltage_current(&mut self) -> Result<Option<(f64, f64)>, T::Error> {
        Ok(self
            .read_status()?
            .map(|status| (status.actual_voltage, status.actual_current)))
    }

    /// Run `f` with remote mode enabled, then put the front panel back in charge.
    ///
    /// If the supply already was in remote mode it is left that way. Returns `Ok(None)` when
    /// remote mode could not be checked or enabled, in which case `f` is not run. The
    /// front panel is restored even when `f` fails.
    pub fn with_remote_mode<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, T::Error>,
    ) -> Result<Option<R>, T::Error> {
        let Some(status) = self.read_status()? else {
            return Ok(None);
        };
        if status.remote_mode {
            return f(self).map(Some);
        }

        if !self.set_remote_mode(true)? {
            return Ok(None);
        }
        let result = f(self);
        if !self.set_remote_mode(false)? {
            warn!("Could not hand control back to the front panel");
        }
        result.map(Some)
    }

    fn write_command(&mut self, command: Command, payload: &[u8]) -> Result<bool, T::Error> {
        match self.exchange(command, payload) {
            Ok(reply) => Ok(acknowledged(command, &reply)),
            Err(err) => not_taken(command, err).map(|()| false),
        }
    }
}

/// Whether `reply` confirms `command` took effect.
fn acknowledged(command: Command, reply: &Frame) -> bool {
    if reply.command() != Command::StatusResponse as u8 {
        warn!(
            "{command:?} answered with command {:#04x} instead of a status response",
            reply.command()
        );
        return false;
    }
    match reply.status_code() {
        Some(StatusCode::Success) => true,
        Some(code) => {
            warn!("{command:?} rejected by the supply: {code:?}");
            false
        }
        None => {
            warn!(
                "{command:?} answered with unknown status {:#04x}",
                reply.payload()[0]
            );
            false
        }
    }
}

/// Keep connection and serial port errors, log everything else as "did not take effect".
fn not_taken<I: embedded_io::Error>(command: Command, err: Error<I>) -> Result<(), I> {
    match err {
        Error::NotConnected
        | Error::OpenFailed(_)
        | Error::Serial(_)
        | Error::OutOfRange { .. } => Err(err),
        err => {
            debug!("{command:?} failed: {err}");
            Ok(())
        }
    }
}

/// Validate `value` against `0.0..=max` and convert to whole milli-units.
fn to_milli<I: embedded_io::Error>(quantity: Quantity, value: f64, max: f64) -> Result<u32, I> {
    if !(0.0..=max).contains(&value) {
        return Err(Error::OutOfRange {
            quantity,
            value,
            min: 0.0,
            max,
        });
    }
    Ok((value * 1000.0) as u32)
}
