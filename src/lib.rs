//! # Voltage RTU - Priority-Scheduled Modbus RTU Master
//!
//! A client-side Modbus RTU master for half-duplex serial field buses.
//! Requests from any number of tasks are multiplexed onto a single
//! strictly-sequential serial line by a background worker that honors the
//! protocol's inter-frame silence, drives the RS-485 direction pin,
//! enforces per-request timeouts and feeds an external liveness monitor.
//!
//! ## Architecture
//!
//! ```text
//! voltage-rtu
//!     ├── RtuMaster   (public handle: submit, callbacks, lifecycle)
//!     ├── queues      (4 bounded FIFOs: Emergency > Sensor > Relay > Status)
//!     ├── Worker      (owns the bus: dequeue -> space -> TX -> RX -> dispatch)
//!     ├── Request     (per-function-code frame encoders + CRC)
//!     ├── Response    (completeness rule + failure classification)
//!     └── SerialLink / DirectionPin / Watchdog  (platform seams)
//! ```
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Holding Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Holding Registers |
//! | 0x17 | Read/Write Multiple Registers |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voltage_rtu::{Priority, RtuMaster, SerialConfig, TokioSerialLink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = TokioSerialLink::open(&SerialConfig {
//!         port: "/dev/ttyUSB0".to_string(),
//!         baud_rate: 9600,
//!         ..Default::default()
//!     })?;
//!
//!     let mut master = RtuMaster::new(link, None);
//!     master.on_data(|slave, fc, address, payload| {
//!         println!("slave 0x{slave:02X} {fc} @{address}: {payload:02X?}");
//!     });
//!     master.on_error(|kind| eprintln!("request failed: {kind}"));
//!     master.begin()?;
//!
//!     // Routine poll at the default Relay priority
//!     master.read_holding_registers(0x11, 0x006B, 3);
//!     // Failsafe command that jumps the queue
//!     master.write_single_coil_with_priority(0x11, 0x0001, false, Priority::Emergency);
//!
//!     master.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! Exactly one of `on_data` / `on_error` fires per accepted request, from
//! the worker's task. Submitters return `false` (and nothing fires) when
//! parameters are invalid, the worker is not running, or the class queue
//! is full.

/// CRC-16/Modbus engine
pub mod crc;

/// Protocol limits, queue capacities and timing defaults
pub mod constants;

/// Error types: internal plane and the wire-stable callback taxonomy
pub mod error;

/// Function codes and priority classes
pub mod types;

/// Request descriptors and frame encoders
pub mod request;

/// Response accumulation and classification
pub mod response;

/// Serial link, direction pin and their tokio-serial implementation
pub mod link;

/// Liveness monitor seam
pub mod watchdog;

/// In-memory link for tests and simulations
pub mod mock;

/// Public master handle
pub mod master;

mod queue;
mod worker;

pub use error::{ErrorKind, Result, RtuError};
pub use link::{DirectionPin, SerialConfig, SerialLink, TokioSerialLink};
pub use master::{MasterConfig, OnData, OnError, RtuMaster};
pub use request::Request;
pub use response::Response;
pub use types::{FunctionCode, Priority};
pub use watchdog::{NoopWatchdog, Watchdog};
