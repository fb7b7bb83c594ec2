//! Error types
//!
//! Two planes exist on purpose. [`RtuError`] is the crate-internal error
//! used by constructors, the link layer and configuration validation.
//! [`ErrorKind`] is the wire-stable failure taxonomy delivered through the
//! `on_error` callback; its discriminants combine the standard Modbus
//! exception codes (0x01-0x08) with local failure kinds (0xE0-0xE8) and
//! survive round-trips through any C-compatible boundary. 0x00 is reserved
//! for success and never appears in the enum.

use std::fmt;
use thiserror::Error;

use crate::types::Priority;

/// Result type for fallible operations inside the crate
pub type Result<T> = std::result::Result<T, RtuError>;

/// Internal error plane: synchronous rejections and link-level failures
#[derive(Debug, Error, Clone)]
pub enum RtuError {
    /// Request parameters violate protocol bounds
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The target priority queue is at capacity
    #[error("{0} queue full")]
    QueueFull(Priority),

    /// The worker task has not been started or has already shut down
    #[error("worker not running")]
    WorkerNotRunning,

    /// The worker task is already running
    #[error("worker already running")]
    AlreadyRunning,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serial link error
    #[error("serial link error: {0}")]
    Link(String),
}

impl RtuError {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        RtuError::InvalidParameter(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        RtuError::Config(msg.into())
    }

    pub fn link(msg: impl Into<String>) -> Self {
        RtuError::Link(msg.into())
    }
}

impl From<std::io::Error> for RtuError {
    fn from(err: std::io::Error) -> Self {
        RtuError::Link(err.to_string())
    }
}

/// Failure taxonomy visible at the callback boundary
///
/// Values 0x01-0x08 are slave exception codes preserved verbatim from the
/// wire; values 0xE0-0xE8 are failures detected locally by the master.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Slave exception 0x01
    IllegalFunction = 0x01,
    /// Slave exception 0x02
    IllegalDataAddress = 0x02,
    /// Slave exception 0x03
    IllegalDataValue = 0x03,
    /// Slave exception 0x04
    ServerDeviceFailure = 0x04,
    /// Slave exception 0x05
    Acknowledge = 0x05,
    /// Slave exception 0x06
    ServerDeviceBusy = 0x06,
    /// Slave exception 0x07
    NegativeAcknowledge = 0x07,
    /// Slave exception 0x08
    MemoryParityError = 0x08,
    /// No complete response before the deadline
    Timeout = 0xE0,
    /// Response carries a different slave address than the request
    InvalidSlave = 0xE1,
    /// Unsupported function requested
    InvalidFunction = 0xE2,
    /// Response CRC does not match the frame contents
    CrcError = 0xE3,
    /// General communication failure on the serial link
    CommError = 0xE4,
    /// Request parameters rejected before enqueue
    InvalidParameter = 0xE5,
    /// Priority queue was full at enqueue time
    QueueFull = 0xE6,
    /// Memory allocation failed while servicing a request
    AllocationFailed = 0xE7,
    /// Response failed validation (function code mismatch)
    InvalidResponse = 0xE8,
}

impl ErrorKind {
    /// Map a wire exception code to an error kind.
    ///
    /// Codes outside the standard 0x01-0x08 range are collapsed to
    /// `InvalidResponse` since they cannot be represented verbatim.
    pub fn from_exception(code: u8) -> Self {
        match code {
            0x01 => ErrorKind::IllegalFunction,
            0x02 => ErrorKind::IllegalDataAddress,
            0x03 => ErrorKind::IllegalDataValue,
            0x04 => ErrorKind::ServerDeviceFailure,
            0x05 => ErrorKind::Acknowledge,
            0x06 => ErrorKind::ServerDeviceBusy,
            0x07 => ErrorKind::NegativeAcknowledge,
            0x08 => ErrorKind::MemoryParityError,
            _ => ErrorKind::InvalidResponse,
        }
    }

    /// Whether this kind carries a slave-reported exception code
    pub fn is_wire_exception(self) -> bool {
        (self as u8) <= 0x08
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::IllegalFunction => "illegal function",
            ErrorKind::IllegalDataAddress => "illegal data address",
            ErrorKind::IllegalDataValue => "illegal data value",
            ErrorKind::ServerDeviceFailure => "server device failure",
            ErrorKind::Acknowledge => "acknowledge",
            ErrorKind::ServerDeviceBusy => "server device busy",
            ErrorKind::NegativeAcknowledge => "negative acknowledge",
            ErrorKind::MemoryParityError => "memory parity error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidSlave => "invalid slave address",
            ErrorKind::InvalidFunction => "invalid function",
            ErrorKind::CrcError => "CRC error",
            ErrorKind::CommError => "communication error",
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::QueueFull => "request queue full",
            ErrorKind::AllocationFailed => "memory allocation failed",
            ErrorKind::InvalidResponse => "invalid response",
        }
    }
}

impl From<ErrorKind> for u8 {
    fn from(kind: ErrorKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for ErrorKind {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        let kind = match value {
            0x01..=0x08 => ErrorKind::from_exception(value),
            0xE0 => ErrorKind::Timeout,
            0xE1 => ErrorKind::InvalidSlave,
            0xE2 => ErrorKind::InvalidFunction,
            0xE3 => ErrorKind::CrcError,
            0xE4 => ErrorKind::CommError,
            0xE5 => ErrorKind::InvalidParameter,
            0xE6 => ErrorKind::QueueFull,
            0xE7 => ErrorKind::AllocationFailed,
            0xE8 => ErrorKind::InvalidResponse,
            other => return Err(other),
        };
        Ok(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), *self as u8)
    }
}
