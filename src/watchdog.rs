//! Liveness monitor integration
//!
//! The worker proves it has not stalled by feeding an external monitor.
//! The monitor itself (hardware watchdog, supervisor process, none at
//! all) is a capability handed to the master; the worker only ever calls
//! these three methods from its own task.

use std::fmt;

/// External liveness monitor
pub trait Watchdog: Send + fmt::Debug {
    /// Announce the worker to the monitor
    fn register(&mut self);

    /// Signal that the worker is still making progress
    fn feed(&mut self);

    /// Remove the worker from the monitor before it exits
    fn deregister(&mut self);
}

/// Default monitor that ignores every signal
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWatchdog;

impl Watchdog for NoopWatchdog {
    fn register(&mut self) {}

    fn feed(&mut self) {}

    fn deregister(&mut self) {}
}
