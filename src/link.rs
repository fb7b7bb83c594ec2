//! Serial link and direction-pin abstractions
//!
//! The worker owns the bus through these seams. [`SerialLink`] is the
//! byte-stream device; [`DirectionPin`] is the DE/RE toggle of an RS-485
//! transceiver. [`TokioSerialLink`] adapts a real port via `tokio-serial`;
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::constants::RECEIVE_POLL;
use crate::error::{Result, RtuError};

/// Half-duplex serial byte stream
///
/// `send` must not return before the bytes have been handed to the
/// device and its transmit buffer flushed. `receive` returns whatever is
/// currently available, `Ok(0)` when nothing is pending; it must never
/// block for longer than roughly one poll tick.
#[async_trait]
pub trait SerialLink: Send + fmt::Debug {
    /// Configured baud rate, used to derive inter-frame timing
    fn baud_rate(&self) -> u32;

    /// Write a complete frame and flush the transmit buffer
    async fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Read currently-available bytes into `buf`
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// RS-485 driver-enable / receiver-enable toggle
///
/// Implementations wrap whatever GPIO driver the platform provides. The
/// worker drives it high for the duration of a transmit and low
/// otherwise.
pub trait DirectionPin: Send + fmt::Debug {
    /// Switch the transceiver to the transmit half
    fn set_transmit(&mut self);

    /// Switch the transceiver to the receive half
    fn set_receive(&mut self);
}

/// Serial port parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port path (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity ("None", "Even", "Odd")
    pub parity: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: "None".to_string(),
        }
    }
}

impl SerialConfig {
    /// Validate parameters before opening the port
    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(RtuError::config("port path cannot be empty"));
        }
        if self.baud_rate == 0 {
            return Err(RtuError::config("baud rate must be greater than zero"));
        }
        if ![5, 6, 7, 8].contains(&self.data_bits) {
            return Err(RtuError::config("data bits must be 5, 6, 7, or 8"));
        }
        if ![1, 2].contains(&self.stop_bits) {
            return Err(RtuError::config("stop bits must be 1 or 2"));
        }
        if !["None", "Even", "Odd"].contains(&self.parity.as_str()) {
            return Err(RtuError::config("parity must be None, Even, or Odd"));
        }
        Ok(())
    }

    fn parse_parity(&self) -> tokio_serial::Parity {
        match self.parity.as_str() {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }

    fn parse_data_bits(&self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn parse_stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }
}

/// [`SerialLink`] backed by a `tokio-serial` stream
#[derive(Debug)]
pub struct TokioSerialLink {
    port: SerialStream,
    baud_rate: u32,
}

impl TokioSerialLink {
    /// Open the configured port
    pub fn open(config: &SerialConfig) -> Result<Self> {
        config.validate()?;
        debug!("opening serial port {} @{}baud", config.port, config.baud_rate);

        let mut port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(config.parse_data_bits())
            .parity(config.parse_parity())
            .stop_bits(config.parse_stop_bits())
            .timeout(Duration::from_millis(10))
            .open_native_async()
            .map_err(|e| {
                RtuError::link(format!("failed to open serial port {}: {e}", config.port))
            })?;

        #[cfg(unix)]
        port.set_exclusive(false)
            .map_err(|e| RtuError::link(format!("failed to set exclusive mode: {e}")))?;

        info!("serial port {} opened", config.port);
        Ok(Self {
            port,
            baud_rate: config.baud_rate,
        })
    }
}

#[async_trait]
impl SerialLink for TokioSerialLink {
    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame).await?;
        self.port.flush().await?;
        debug!(
            tx = %frame.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" "),
            "serial TX {} bytes",
            frame.len()
        );
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        match timeout(RECEIVE_POLL, self.port.read(buf)).await {
            Ok(Ok(n)) => {
                if n > 0 {
                    debug!(
                        rx = %buf[..n].iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" "),
                        "serial RX {n} bytes"
                    );
                }
                Ok(n)
            }
            Ok(Err(e)) => Err(RtuError::link(format!("serial read failed: {e}"))),
            Err(_) => Ok(0),
        }
    }
}
