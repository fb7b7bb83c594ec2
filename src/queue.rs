//! Priority request queues
//!
//! Four independent bounded MPSC channels, one per urgency class.
//! Producers push without blocking; the worker scans the classes from
//! `Emergency` down to `Status` and takes the first request it finds, so
//! strict priority is purely a dequeue-side policy and order inside a
//! class stays FIFO.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::trace;

use crate::error::{Result, RtuError};
use crate::request::Request;
use crate::types::{Priority, PRIORITY_COUNT};

/// Producer half, shared by every API caller
#[derive(Debug, Clone)]
pub(crate) struct QueueProducers {
    senders: [mpsc::Sender<Request>; PRIORITY_COUNT],
}

/// Consumer half, owned exclusively by the worker
#[derive(Debug)]
pub(crate) struct QueueConsumers {
    receivers: [mpsc::Receiver<Request>; PRIORITY_COUNT],
}

/// Create the four class queues with the given capacities, ordered
/// `[Emergency, Sensor, Relay, Status]`.
pub(crate) fn request_queues(
    capacities: [usize; PRIORITY_COUNT],
) -> (QueueProducers, QueueConsumers) {
    let (emergency_tx, emergency_rx) = mpsc::channel(capacities[0]);
    let (sensor_tx, sensor_rx) = mpsc::channel(capacities[1]);
    let (relay_tx, relay_rx) = mpsc::channel(capacities[2]);
    let (status_tx, status_rx) = mpsc::channel(capacities[3]);
    (
        QueueProducers {
            senders: [emergency_tx, sensor_tx, relay_tx, status_tx],
        },
        QueueConsumers {
            receivers: [emergency_rx, sensor_rx, relay_rx, status_rx],
        },
    )
}

impl QueueProducers {
    /// Non-blocking push into the queue matching the request's priority.
    /// On failure the request is dropped here; ownership never reaches
    /// the worker.
    pub(crate) fn try_enqueue(&self, request: Request) -> Result<()> {
        let priority = request.priority();
        match self.senders[priority.index()].try_send(request) {
            Ok(()) => {
                trace!("enqueued {priority} request");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(RtuError::QueueFull(priority)),
            Err(TrySendError::Closed(_)) => Err(RtuError::WorkerNotRunning),
        }
    }
}

impl QueueConsumers {
    /// Non-blocking strict-priority dequeue: first request found scanning
    /// Emergency, Sensor, Relay, Status.
    pub(crate) fn try_dequeue(&mut self) -> Option<Request> {
        for receiver in &mut self.receivers {
            match receiver.try_recv() {
                Ok(request) => return Some(request),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => continue,
            }
        }
        None
    }
}
