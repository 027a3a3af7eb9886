//! This crate provides an interface for controlling the BK Precision 1788B programmable power supply
//! (0-32 V, 0-6 A) over its RS-232/TTL link.
//!
//! The supply speaks a fixed-length binary protocol: every request and every reply is a 26-byte
//! [frame](frame::Frame) with a modulo-256 checksum. One request is answered by exactly one reply,
//! so the driver keeps at most one exchange on the wire and a single [`Bk1788b`](psu::Bk1788b)
//! handle can be shared between threads, e.g. a UI issuing set commands and a
//! [`Monitor`](monitor::Monitor) polling the status.
//!
//! The serial port used for PSU comms should be configured like so (done for you by
//! [`Bk1788b::open`](psu::Bk1788b::open)):
//! * Default baud rate: 4800 (9600, 19200 and 38400 are selectable on the supply)
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//! * No flow control
//!
//! ```no_run
//! # #[cfg(feature = "serialport")]
//! # {
//! use bk1788b_psu::{config::Config, psu::Bk1788b};
//!
//! let psu = Bk1788b::open(Config::new("/dev/ttyUSB0")).unwrap();
//! psu.set_remote_mode(true).unwrap();
//! psu.set_voltage(5.0).unwrap();
//! if let Some(status) = psu.read_status().unwrap() {
//!     println!("{:.3} V, {:.3} A", status.actual_voltage, status.actual_current);
//! }
//! psu.set_remote_mode(false).unwrap();
//! # }
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod psu;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock_serial;
