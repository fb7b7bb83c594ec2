//! Core protocol enumerations
//!
//! Function codes and request priority classes with their exact wire values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Modbus function codes supported by the master
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionCode {
    /// Read Coils (FC01)
    ReadCoils = 0x01,
    /// Read Discrete Inputs (FC02)
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (FC03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (FC04)
    ReadInputRegisters = 0x04,
    /// Write Single Coil (FC05)
    WriteSingleCoil = 0x05,
    /// Write Single Holding Register (FC06)
    WriteSingleHoldingRegister = 0x06,
    /// Write Multiple Coils (FC15)
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Holding Registers (FC16)
    WriteMultipleHoldingRegisters = 0x10,
    /// Read/Write Multiple Registers (FC23)
    ReadWriteMultipleRegisters = 0x17,
}

impl FunctionCode {
    /// Human-readable description, exception bit ignored
    pub fn description(self) -> &'static str {
        match self {
            FunctionCode::ReadCoils => "Read Coils",
            FunctionCode::ReadDiscreteInputs => "Read Discrete Inputs",
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::ReadInputRegisters => "Read Input Registers",
            FunctionCode::WriteSingleCoil => "Write Single Coil",
            FunctionCode::WriteSingleHoldingRegister => "Write Single Register",
            FunctionCode::WriteMultipleCoils => "Write Multiple Coils",
            FunctionCode::WriteMultipleHoldingRegisters => "Write Multiple Registers",
            FunctionCode::ReadWriteMultipleRegisters => "Read/Write Multiple Registers",
        }
    }

    /// Whether responses to this function code echo the request
    /// (address + value at offset 2) instead of carrying a byte count.
    pub fn is_single_write_echo(self) -> bool {
        matches!(
            self,
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleHoldingRegister
        )
    }
}

impl From<FunctionCode> for u8 {
    fn from(fc: FunctionCode) -> u8 {
        fc as u8
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        let fc = match value {
            0x01 => FunctionCode::ReadCoils,
            0x02 => FunctionCode::ReadDiscreteInputs,
            0x03 => FunctionCode::ReadHoldingRegisters,
            0x04 => FunctionCode::ReadInputRegisters,
            0x05 => FunctionCode::WriteSingleCoil,
            0x06 => FunctionCode::WriteSingleHoldingRegister,
            0x0F => FunctionCode::WriteMultipleCoils,
            0x10 => FunctionCode::WriteMultipleHoldingRegisters,
            0x17 => FunctionCode::ReadWriteMultipleRegisters,
            other => return Err(other),
        };
        Ok(fc)
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FC{:02X} ({})", *self as u8, self.description())
    }
}

/// Urgency class of a request
///
/// Smaller value means higher priority. The worker always drains a higher
/// class before touching a lower one; starvation of `Status` traffic under
/// sustained `Emergency` load is accepted by design.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    /// Emergency shutdown and failsafe traffic
    Emergency = 0,
    /// Safety-relevant sensor reads
    Sensor = 1,
    /// Relay commands and mode switches
    Relay = 2,
    /// Status and diagnostic reads
    Status = 3,
}

/// Number of priority classes (and queues)
pub const PRIORITY_COUNT: usize = 4;

impl Priority {
    /// All classes, highest priority first
    pub const ALL: [Priority; PRIORITY_COUNT] = [
        Priority::Emergency,
        Priority::Sensor,
        Priority::Relay,
        Priority::Status,
    ];

    /// Queue index of this class
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Relay
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Emergency => "emergency",
            Priority::Sensor => "sensor",
            Priority::Relay => "relay",
            Priority::Status => "status",
        };
        f.write_str(name)
    }
}
