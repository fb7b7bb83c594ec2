//! Public master handle
//!
//! [`RtuMaster`] owns the configuration and the producer side of the
//! priority queues. `begin` hands the serial link, direction pin,
//! callbacks and liveness monitor to the worker task; from then on the
//! handle only enqueues requests and flips shared flags.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_RESPONSE_TIMEOUT_MS, EMERGENCY_QUEUE_LEN, RELAY_QUEUE_LEN, SENSOR_QUEUE_LEN,
    STATUS_QUEUE_LEN,
};
use crate::error::{ErrorKind, Result, RtuError};
use crate::link::{DirectionPin, SerialLink};
use crate::queue::{request_queues, QueueConsumers, QueueProducers};
use crate::request::Request;
use crate::types::{FunctionCode, Priority};
use crate::watchdog::{NoopWatchdog, Watchdog};
use crate::worker::{Worker, WorkerShared};

/// Success callback: `(slave, function code, logical address, payload)`
pub type OnData = Box<dyn Fn(u8, FunctionCode, u16, &[u8]) + Send>;

/// Failure callback, invoked with the classified error kind
pub type OnError = Box<dyn Fn(ErrorKind) + Send>;

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Per-request response timeout in milliseconds
    pub response_timeout_ms: u64,
    /// Emergency queue capacity
    pub emergency_queue_len: usize,
    /// Sensor queue capacity
    pub sensor_queue_len: usize,
    /// Relay queue capacity
    pub relay_queue_len: usize,
    /// Status queue capacity
    pub status_queue_len: usize,
    /// Whether liveness feeding starts enabled
    pub watchdog_enabled: bool,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            emergency_queue_len: EMERGENCY_QUEUE_LEN,
            sensor_queue_len: SENSOR_QUEUE_LEN,
            relay_queue_len: RELAY_QUEUE_LEN,
            status_queue_len: STATUS_QUEUE_LEN,
            watchdog_enabled: true,
        }
    }
}

impl MasterConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.response_timeout_ms == 0 {
            return Err(RtuError::config("response timeout must be nonzero"));
        }
        let queues = [
            self.emergency_queue_len,
            self.sensor_queue_len,
            self.relay_queue_len,
            self.status_queue_len,
        ];
        if queues.iter().any(|&len| len == 0) {
            return Err(RtuError::config("queue capacities must be nonzero"));
        }
        Ok(())
    }
}

/// Modbus RTU master with a priority-scheduled request pipeline
pub struct RtuMaster {
    link: Option<Box<dyn SerialLink>>,
    rts: Option<Box<dyn DirectionPin>>,
    watchdog: Option<Box<dyn Watchdog>>,
    on_data: Option<OnData>,
    on_error: Option<OnError>,
    producers: QueueProducers,
    consumers: Option<QueueConsumers>,
    shared: WorkerShared,
    worker: Option<JoinHandle<()>>,
}

impl RtuMaster {
    /// Create a master over `link`, optionally driving an RS-485
    /// direction pin, with default configuration.
    pub fn new(link: impl SerialLink + 'static, rts: Option<Box<dyn DirectionPin>>) -> Self {
        Self::build(Box::new(link), rts, MasterConfig::default())
    }

    /// Create a master with explicit configuration
    pub fn with_config(
        link: impl SerialLink + 'static,
        rts: Option<Box<dyn DirectionPin>>,
        config: MasterConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(Box::new(link), rts, config))
    }

    fn build(
        link: Box<dyn SerialLink>,
        rts: Option<Box<dyn DirectionPin>>,
        config: MasterConfig,
    ) -> Self {
        let (producers, consumers) = request_queues([
            config.emergency_queue_len,
            config.sensor_queue_len,
            config.relay_queue_len,
            config.status_queue_len,
        ]);
        let shared = WorkerShared {
            timeout_ms: Arc::new(AtomicU64::new(config.response_timeout_ms)),
            watchdog_enabled: Arc::new(AtomicBool::new(config.watchdog_enabled)),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        };
        Self {
            link: Some(link),
            rts,
            watchdog: None,
            on_data: None,
            on_error: None,
            producers,
            consumers: Some(consumers),
            shared,
            worker: None,
        }
    }

    /// Register the success callback. Must be called before
    /// [`begin`](Self::begin); registrations after the worker started are
    /// ignored.
    pub fn on_data(&mut self, handler: impl Fn(u8, FunctionCode, u16, &[u8]) + Send + 'static) {
        if self.worker.is_some() {
            warn!("on_data ignored: worker already running");
            return;
        }
        self.on_data = Some(Box::new(handler));
    }

    /// Register the failure callback. Must be called before
    /// [`begin`](Self::begin).
    pub fn on_error(&mut self, handler: impl Fn(ErrorKind) + Send + 'static) {
        if self.worker.is_some() {
            warn!("on_error ignored: worker already running");
            return;
        }
        self.on_error = Some(Box::new(handler));
    }

    /// Install a liveness monitor back-end. Must be called before
    /// [`begin`](Self::begin); the default is a no-op monitor.
    pub fn set_watchdog(&mut self, monitor: impl Watchdog + 'static) {
        if self.worker.is_some() {
            warn!("set_watchdog ignored: worker already running");
            return;
        }
        self.watchdog = Some(Box::new(monitor));
    }

    /// Spawn the worker task. Requires a running tokio runtime.
    pub fn begin(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(RtuError::AlreadyRunning);
        }
        let link = self
            .link
            .take()
            .ok_or_else(|| RtuError::config("master cannot be restarted after shutdown"))?;
        let consumers = self
            .consumers
            .take()
            .ok_or_else(|| RtuError::config("master cannot be restarted after shutdown"))?;
        let watchdog = self
            .watchdog
            .take()
            .unwrap_or_else(|| Box::new(NoopWatchdog));

        let worker = Worker::new(
            link,
            self.rts.take(),
            consumers,
            self.on_data.take(),
            self.on_error.take(),
            watchdog,
            self.shared.clone(),
        );
        self.worker = Some(tokio::spawn(worker.run()));
        info!("modbus RTU master started");
        Ok(())
    }

    /// Whether the worker task has been started and not yet shut down
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    // ========================================================================
    // Request submitters, default priority (Relay)
    // ========================================================================

    /// FC01: read coils
    pub fn read_coils(&self, slave: u8, address: u16, count: u16) -> bool {
        self.submit(Request::read_coils(slave, address, count))
    }

    /// FC02: read discrete inputs
    pub fn read_discrete_inputs(&self, slave: u8, address: u16, count: u16) -> bool {
        self.submit(Request::read_discrete_inputs(slave, address, count))
    }

    /// FC03: read holding registers
    pub fn read_holding_registers(&self, slave: u8, address: u16, count: u16) -> bool {
        self.submit(Request::read_holding_registers(slave, address, count))
    }

    /// FC04: read input registers
    pub fn read_input_registers(&self, slave: u8, address: u16, count: u16) -> bool {
        self.submit(Request::read_input_registers(slave, address, count))
    }

    /// FC05: write a single coil
    pub fn write_single_coil(&self, slave: u8, address: u16, value: bool) -> bool {
        self.submit(Request::write_single_coil(slave, address, value))
    }

    /// FC06: write a single holding register
    pub fn write_single_holding_register(&self, slave: u8, address: u16, value: u16) -> bool {
        self.submit(Request::write_single_holding_register(slave, address, value))
    }

    /// FC15: write multiple coils
    pub fn write_multiple_coils(&self, slave: u8, address: u16, values: &[bool]) -> bool {
        self.submit(Request::write_multiple_coils(slave, address, values))
    }

    /// FC16: write multiple holding registers
    pub fn write_multiple_holding_registers(
        &self,
        slave: u8,
        address: u16,
        values: &[u16],
    ) -> bool {
        self.submit(Request::write_multiple_holding_registers(slave, address, values))
    }

    /// FC23: write then read registers in one transaction
    pub fn read_write_multiple_registers(
        &self,
        slave: u8,
        read_address: u16,
        read_count: u16,
        write_address: u16,
        values: &[u16],
    ) -> bool {
        self.submit(Request::read_write_multiple_registers(
            slave,
            read_address,
            read_count,
            write_address,
            values,
        ))
    }

    // ========================================================================
    // Request submitters with explicit priority
    // ========================================================================

    /// FC01 with an explicit urgency class
    pub fn read_coils_with_priority(
        &self,
        slave: u8,
        address: u16,
        count: u16,
        priority: Priority,
    ) -> bool {
        self.submit(Request::read_coils(slave, address, count).map(|r| r.with_priority(priority)))
    }

    /// FC02 with an explicit urgency class
    pub fn read_discrete_inputs_with_priority(
        &self,
        slave: u8,
        address: u16,
        count: u16,
        priority: Priority,
    ) -> bool {
        self.submit(
            Request::read_discrete_inputs(slave, address, count)
                .map(|r| r.with_priority(priority)),
        )
    }

    /// FC03 with an explicit urgency class
    pub fn read_holding_registers_with_priority(
        &self,
        slave: u8,
        address: u16,
        count: u16,
        priority: Priority,
    ) -> bool {
        self.submit(
            Request::read_holding_registers(slave, address, count)
                .map(|r| r.with_priority(priority)),
        )
    }

    /// FC04 with an explicit urgency class
    pub fn read_input_registers_with_priority(
        &self,
        slave: u8,
        address: u16,
        count: u16,
        priority: Priority,
    ) -> bool {
        self.submit(
            Request::read_input_registers(slave, address, count)
                .map(|r| r.with_priority(priority)),
        )
    }

    /// FC05 with an explicit urgency class
    pub fn write_single_coil_with_priority(
        &self,
        slave: u8,
        address: u16,
        value: bool,
        priority: Priority,
    ) -> bool {
        self.submit(
            Request::write_single_coil(slave, address, value).map(|r| r.with_priority(priority)),
        )
    }

    /// FC06 with an explicit urgency class
    pub fn write_single_holding_register_with_priority(
        &self,
        slave: u8,
        address: u16,
        value: u16,
        priority: Priority,
    ) -> bool {
        self.submit(
            Request::write_single_holding_register(slave, address, value)
                .map(|r| r.with_priority(priority)),
        )
    }

    /// FC15 with an explicit urgency class
    pub fn write_multiple_coils_with_priority(
        &self,
        slave: u8,
        address: u16,
        values: &[bool],
        priority: Priority,
    ) -> bool {
        self.submit(
            Request::write_multiple_coils(slave, address, values)
                .map(|r| r.with_priority(priority)),
        )
    }

    /// FC16 with an explicit urgency class
    pub fn write_multiple_holding_registers_with_priority(
        &self,
        slave: u8,
        address: u16,
        values: &[u16],
        priority: Priority,
    ) -> bool {
        self.submit(
            Request::write_multiple_holding_registers(slave, address, values)
                .map(|r| r.with_priority(priority)),
        )
    }

    /// FC23 with an explicit urgency class
    pub fn read_write_multiple_registers_with_priority(
        &self,
        slave: u8,
        read_address: u16,
        read_count: u16,
        write_address: u16,
        values: &[u16],
        priority: Priority,
    ) -> bool {
        self.submit(
            Request::read_write_multiple_registers(
                slave,
                read_address,
                read_count,
                write_address,
                values,
            )
            .map(|r| r.with_priority(priority)),
        )
    }

    // ========================================================================
    // Runtime settings
    // ========================================================================

    /// Adjust the response timeout. Zero is ignored; some slaves need
    /// longer than the 5000 ms default, fast buses can go much shorter.
    pub fn set_timeout(&self, timeout_ms: u64) {
        if timeout_ms == 0 {
            warn!("set_timeout ignored: timeout must be nonzero");
            return;
        }
        self.shared.timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    /// Current response timeout in milliseconds
    pub fn timeout(&self) -> u64 {
        self.shared.timeout_ms.load(Ordering::Relaxed)
    }

    /// Enable or disable liveness feeding at runtime
    pub fn set_watchdog_enabled(&self, enabled: bool) {
        self.shared
            .watchdog_enabled
            .store(enabled, Ordering::Relaxed);
    }

    /// Whether liveness feeding is currently enabled
    pub fn is_watchdog_enabled(&self) -> bool {
        self.shared.watchdog_enabled.load(Ordering::Relaxed)
    }

    /// Stop the worker: pending requests are dropped without callbacks,
    /// an in-flight request is abandoned, and the call returns once the
    /// worker task has exited.
    pub async fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                warn!("worker task join failed: {e}");
            }
        }
    }

    fn submit(&self, request: Result<Request>) -> bool {
        if self.worker.is_none() {
            warn!("request rejected: worker not running");
            return false;
        }
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!("request rejected: {e}");
                return false;
            }
        };
        match self.producers.try_enqueue(request) {
            Ok(()) => {
                self.shared.wake.notify_one();
                true
            }
            Err(e) => {
                warn!("request rejected: {e}");
                false
            }
        }
    }
}

impl Drop for RtuMaster {
    fn drop(&mut self) {
        if self.worker.take().is_some() {
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.wake.notify_one();
            debug!("master dropped without shutdown(); worker will exit on its own");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLink;

    #[test]
    fn test_config_default_matches_constants() {
        let config = MasterConfig::default();
        assert_eq!(config.response_timeout_ms, 5000);
        assert_eq!(config.emergency_queue_len, 4);
        assert_eq!(config.sensor_queue_len, 8);
        assert_eq!(config.relay_queue_len, 12);
        assert_eq!(config.status_queue_len, 4);
        assert!(config.watchdog_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_values() {
        let config = MasterConfig {
            response_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MasterConfig {
            relay_queue_len: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = MasterConfig {
            response_timeout_ms: 750,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).expect("serialize config");
        let restored: MasterConfig = serde_json::from_str(&json).expect("deserialize config");
        assert_eq!(restored.response_timeout_ms, 750);
        assert_eq!(restored.sensor_queue_len, config.sensor_queue_len);
    }

    #[test]
    fn test_submit_requires_running_worker() {
        let (link, _handle) = MockLink::new(9600);
        let master = RtuMaster::new(link, None);
        assert!(!master.read_coils(1, 0, 8));
        assert!(!master.write_single_coil(1, 0, true));
    }

    #[test]
    fn test_set_timeout_ignores_zero() {
        let (link, _handle) = MockLink::new(9600);
        let master = RtuMaster::new(link, None);
        master.set_timeout(250);
        assert_eq!(master.timeout(), 250);
        master.set_timeout(0);
        assert_eq!(master.timeout(), 250);
    }

    #[test]
    fn test_watchdog_flag_toggles() {
        let (link, _handle) = MockLink::new(9600);
        let master = RtuMaster::new(link, None);
        assert!(master.is_watchdog_enabled());
        master.set_watchdog_enabled(false);
        assert!(!master.is_watchdog_enabled());
        master.set_watchdog_enabled(true);
        assert!(master.is_watchdog_enabled());
    }

    #[tokio::test]
    async fn test_begin_twice_fails() {
        let (link, _handle) = MockLink::new(9600);
        let mut master = RtuMaster::new(link, None);
        master.begin().expect("first begin succeeds");
        assert!(matches!(master.begin(), Err(RtuError::AlreadyRunning)));
        master.shutdown().await;
    }

    #[tokio::test]
    async fn test_begin_after_shutdown_fails() {
        let (link, _handle) = MockLink::new(9600);
        let mut master = RtuMaster::new(link, None);
        master.begin().expect("begin succeeds");
        master.shutdown().await;
        assert!(!master.is_running());
        assert!(master.begin().is_err());
    }

    #[tokio::test]
    async fn test_invalid_parameters_rejected_synchronously() {
        let (link, _handle) = MockLink::new(9600);
        let mut master = RtuMaster::new(link, None);
        master.begin().expect("begin succeeds");
        assert!(!master.read_holding_registers(1, 0, 0));
        assert!(!master.read_holding_registers(1, 0, 126));
        assert!(!master.write_multiple_coils(1, 0, &[]));
        master.shutdown().await;
    }
}
