//! Modbus RTU protocol constants and worker defaults
//!
//! Limits are derived from the Modbus-over-serial-line specification:
//! the RS485 ADU is capped at 256 bytes, which bounds every per-request
//! quantity below.

use std::time::Duration;

// ============================================================================
// Frame layout
// ============================================================================

/// Maximum ADU size on a serial line: address(1) + PDU(253) + CRC(2)
pub const MAX_FRAME_SIZE: usize = 256;

/// Smallest well-formed frame: address(1) + function(1) + CRC(2)
pub const MIN_FRAME_SIZE: usize = 4;

/// Exception responses are always address(1) + fc|0x80(1) + code(1) + CRC(2)
pub const EXCEPTION_RESPONSE_LEN: usize = 5;

/// Smallest response a buffer must be able to hold (exception frame)
pub const MIN_RESPONSE_LEN: usize = EXCEPTION_RESPONSE_LEN;

/// Number of trailing CRC bytes in every frame
pub const CRC_LEN: usize = 2;

/// Bit 7 of the response function code marks an exception frame
pub const ERROR_FLAG: u8 = 0x80;

/// Wire value for "coil on" in FC05 requests
pub const COIL_ON: u16 = 0xFF00;

/// Wire value for "coil off" in FC05 requests
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Per-request quantity limits
// ============================================================================

/// Maximum registers in a single read or write request
///
/// Read response PDU: fc(1) + byte count(1) + 125 * 2 = 252 <= 253.
pub const MAX_REGISTERS_PER_REQUEST: u16 = 125;

/// Maximum coils in a single read or write request
pub const MAX_COILS_PER_REQUEST: u16 = 2000;

// ============================================================================
// Priority queue capacities (28 outstanding requests total)
// ============================================================================

/// Emergency queue depth (failsafe and shutdown traffic)
pub const EMERGENCY_QUEUE_LEN: usize = 4;

/// Sensor queue depth (safety-relevant measurement reads)
pub const SENSOR_QUEUE_LEN: usize = 8;

/// Relay queue depth (commands and mode switches)
pub const RELAY_QUEUE_LEN: usize = 12;

/// Status queue depth (diagnostics and verification reads)
pub const STATUS_QUEUE_LEN: usize = 4;

// ============================================================================
// Worker timing
// ============================================================================

/// Default per-request response timeout
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Idle sleep between queue polls when no request is pending
pub const IDLE_POLL: Duration = Duration::from_millis(100);

/// Sleep between receive polls while waiting for response bytes
pub const RECEIVE_POLL: Duration = Duration::from_millis(1);

/// Liveness feed cadence during a long receive
pub const WATCHDOG_FEED_INTERVAL: Duration = Duration::from_millis(500);

/// Floor for the inter-frame silent interval, in microseconds
pub const MIN_INTERFRAME_US: u64 = 1000;

/// Margin added to the one-character drain wait after a transmit, in
/// microseconds. `flush` only guarantees the bytes left the UART FIFO, not
/// the wire, so the direction pin must be held a little longer.
pub const POST_TX_MARGIN_US: u64 = 500;

/// Name under which the worker registers with the liveness monitor
pub const WORKER_TASK_NAME: &str = "rtu-master-worker";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_limit_fits_frame() {
        // Read response: addr(1) + fc(1) + byte count(1) + data + CRC(2)
        let response = 5 + MAX_REGISTERS_PER_REQUEST as usize * 2;
        assert!(response <= MAX_FRAME_SIZE);
    }

    #[test]
    fn test_coil_limit_fits_frame() {
        let response = 5 + (MAX_COILS_PER_REQUEST as usize).div_ceil(8);
        assert!(response <= MAX_FRAME_SIZE);
    }

    #[test]
    fn test_total_queue_capacity() {
        let total =
            EMERGENCY_QUEUE_LEN + SENSOR_QUEUE_LEN + RELAY_QUEUE_LEN + STATUS_QUEUE_LEN;
        assert_eq!(total, 28);
    }
}
