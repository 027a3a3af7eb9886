//! This module contains the protocol constants of the BK1788B and the status bit-field.

use modular_bitfield::prelude::*;
use strum_macros::{EnumIter, FromRepr};

/// Command byte at offset 2 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[repr(u8)]
pub enum Command {
    /// Payload byte 0: `1` enables remote mode, `0` hands control back to the front panel.
    SetRemote = 0x20,
    /// Payload byte 0: `1` output on, `0` output off.
    SetOutput = 0x21,
    /// Payload bytes 0..4: setpoint in millivolts, little-endian.
    SetVoltage = 0x23,
    /// Payload bytes 0..2: setpoint in milliamps, little-endian.
    SetCurrent = 0x24,
    /// The device echoes this code in its status reply.
    ReadStatus = 0x26,
    /// Marker the device uses when acknowledging a set command.
    StatusResponse = 0x12,
}

impl From<Command> for u8 {
    fn from(value: Command) -> Self {
        value as u8
    }
}

/// First payload byte of a [`Command::StatusResponse`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0x80,
    ChecksumError = 0x90,
    ParamError = 0xA0,
    UnknownCommand = 0xB0,
    InvalidCommand = 0xC0,
}

/// Regulation mode reported in bits 2-3 of the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, FromRepr)]
#[repr(u8)]
pub enum OperatingMode {
    #[default]
    Unknown = 0,
    /// Constant voltage regulation.
    ConstantVoltage = 1,
    /// Constant current regulation.
    ConstantCurrent = 2,
    Unregulated = 3,
}

/// Serial baud rates the 1788B can be configured for on its front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter)]
pub enum BaudRate {
    /// This is the factory default.
    #[default]
    _4800,
    _9600,
    _19200,
    _38400,
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        match value {
            BaudRate::_4800 => 4800,
            BaudRate::_9600 => 9600,
            BaudRate::_19200 => 19200,
            BaudRate::_38400 => 38400,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    /// The unsupported rate is handed back.
    type Error = u32;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            4800 => Ok(BaudRate::_4800),
            9600 => Ok(BaudRate::_9600),
            19200 => Ok(BaudRate::_19200),
            38400 => Ok(BaudRate::_38400),
            other => Err(other),
        }
    }
}

/// The status byte at offset 9 of a read-status reply, least significant bit first.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy)]
pub struct StatusBits {
    pub output_on: bool,
    pub over_temperature: bool,
    /// Index into [`OperatingMode`].
    pub mode_index: B2,
    pub fan_speed: B3,
    pub remote_mode: bool,
}

impl StatusBits {
    /// Decode the regulation mode. All four 2-bit patterns are defined.
    pub fn mode(&self) -> OperatingMode {
        OperatingMode::from_repr(self.mode_index()).unwrap_or_default()
    }
}

impl From<u8> for StatusBits {
    fn from(value: u8) -> Self {
        StatusBits::from_bytes([value])
    }
}
