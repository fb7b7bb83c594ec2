//! Serial worker
//!
//! A single long-lived task owns the serial link, the direction pin and
//! the consumer half of the priority queues. Every wire interaction and
//! every user callback happens here, so the bus sees exactly one request
//! at a time and callers never touch shared I/O state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::constants::{
    IDLE_POLL, MAX_FRAME_SIZE, MIN_INTERFRAME_US, POST_TX_MARGIN_US, RECEIVE_POLL,
    WATCHDOG_FEED_INTERVAL, WORKER_TASK_NAME,
};
use crate::error::ErrorKind;
use crate::link::{DirectionPin, SerialLink};
use crate::master::{OnData, OnError};
use crate::queue::QueueConsumers;
use crate::request::Request;
use crate::response::Response;
use crate::watchdog::Watchdog;

/// State shared between the master handle and the worker task
#[derive(Debug, Clone)]
pub(crate) struct WorkerShared {
    /// Response timeout in milliseconds, runtime-adjustable
    pub(crate) timeout_ms: Arc<AtomicU64>,
    /// Whether liveness feeding is active
    pub(crate) watchdog_enabled: Arc<AtomicBool>,
    /// Set once to initiate shutdown
    pub(crate) shutdown: Arc<AtomicBool>,
    /// Wakes the worker out of its idle sleep
    pub(crate) wake: Arc<Notify>,
}

pub(crate) struct Worker {
    link: Box<dyn SerialLink>,
    rts: Option<Box<dyn DirectionPin>>,
    queues: QueueConsumers,
    on_data: Option<OnData>,
    on_error: Option<OnError>,
    watchdog: Box<dyn Watchdog>,
    registered: bool,
    shared: WorkerShared,
    /// Silent interval the bus must observe between frames
    interval: Duration,
    /// Wait after flush before releasing the direction pin, covering the
    /// final character still draining out of the UART
    post_tx_wait: Duration,
    /// Completion instant of the most recent bus activity
    last_io: Instant,
}

impl Worker {
    pub(crate) fn new(
        link: Box<dyn SerialLink>,
        rts: Option<Box<dyn DirectionPin>>,
        queues: QueueConsumers,
        on_data: Option<OnData>,
        on_error: Option<OnError>,
        watchdog: Box<dyn Watchdog>,
        shared: WorkerShared,
    ) -> Self {
        let baud = u64::from(link.baud_rate()).max(1);
        // 4 character times (40 bits) approximates the 3.5-character
        // silent interval, floored at 1 ms
        let interval = Duration::from_micros((40_000_000 / baud).max(MIN_INTERFRAME_US));
        let post_tx_wait = Duration::from_micros(10_000_000 / baud + POST_TX_MARGIN_US);
        Self {
            link,
            rts,
            queues,
            on_data,
            on_error,
            watchdog,
            registered: false,
            shared,
            interval,
            post_tx_wait,
            last_io: Instant::now(),
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            "{WORKER_TASK_NAME} started: interval {:?}, post-tx wait {:?}",
            self.interval, self.post_tx_wait
        );

        loop {
            self.sync_watchdog();
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            match self.queues.try_dequeue() {
                Some(request) => {
                    self.process(request).await;
                    self.feed();
                }
                None => {
                    tokio::select! {
                        _ = self.shared.wake.notified() => {}
                        _ = time::sleep(IDLE_POLL) => {}
                    }
                    self.feed();
                }
            }
        }

        // Anything still queued is dropped without I/O or callbacks
        let mut dropped = 0usize;
        while self.queues.try_dequeue().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("dropped {dropped} pending requests during shutdown");
        }
        if self.registered {
            self.watchdog.deregister();
            self.registered = false;
        }
        info!("{WORKER_TASK_NAME} stopped");
    }

    /// One full request/response cycle: spacing, transmit, receive,
    /// classify, dispatch. Exactly one callback fires per request unless
    /// shutdown was observed in the meantime.
    async fn process(&mut self, request: Request) {
        trace!(
            "processing {} for slave 0x{:02X} ({} priority)",
            request.function(),
            request.slave(),
            request.priority()
        );

        // Inter-frame silence
        let since_last = self.last_io.elapsed();
        if since_last < self.interval {
            time::sleep(self.interval - since_last).await;
        }

        // Stale bytes left over from a previous exchange must not bleed
        // into this request's response
        let mut scratch = [0u8; MAX_FRAME_SIZE];
        while let Ok(n) = self.link.receive(&mut scratch).await {
            if n == 0 {
                break;
            }
            trace!("discarded {n} stale bytes before transmit");
        }

        if let Some(pin) = self.rts.as_mut() {
            pin.set_transmit();
        }
        let send_start = Instant::now();
        let sent = self.link.send(request.frame()).await;
        // flush() only drains the UART FIFO; hold the direction pin until
        // the final character has left the wire
        time::sleep(self.post_tx_wait).await;
        if let Some(pin) = self.rts.as_mut() {
            pin.set_receive();
        }
        self.last_io = Instant::now();

        if let Err(e) = sent {
            error!(
                "transmit to slave 0x{:02X} failed: {e}",
                request.slave()
            );
            self.dispatch_error(ErrorKind::CommError);
            return;
        }

        let response = self.receive_response(&request, send_start).await;

        match response.classify() {
            Ok(()) => {
                debug!(
                    "{} ok: slave 0x{:02X}, {} payload bytes",
                    request.function(),
                    response.slave_address(),
                    response.payload().len()
                );
                self.dispatch_data(&request, &response);
            }
            Err(kind) => {
                error!(
                    "{} failed for slave 0x{:02X}: {kind}",
                    request.function(),
                    request.slave()
                );
                self.dispatch_error(kind);
            }
        }
        self.last_io = Instant::now();
    }

    /// Accumulate response bytes until complete or the deadline passes.
    async fn receive_response(&mut self, request: &Request, send_start: Instant) -> Response {
        let mut response = Response::new(request);
        let deadline =
            Duration::from_millis(self.shared.timeout_ms.load(Ordering::Relaxed).max(1));
        let mut last_feed = Instant::now();
        let mut scratch = [0u8; MAX_FRAME_SIZE];

        while !response.is_complete() && send_start.elapsed() <= deadline {
            // Drain everything currently pending, bounded by the bytes
            // the response can still accept
            loop {
                let want = response.remaining().min(scratch.len());
                if want == 0 {
                    break;
                }
                match self.link.receive(&mut scratch[..want]).await {
                    Ok(0) => break,
                    Ok(n) => response.extend(&scratch[..n]),
                    Err(e) => {
                        warn!("serial receive failed: {e}");
                        break;
                    }
                }
            }

            if response.is_complete() {
                self.last_io = Instant::now();
                trace!(
                    rx = %response.frame().iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" "),
                    "response complete: {} bytes",
                    response.len()
                );
                break;
            }
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            if last_feed.elapsed() >= WATCHDOG_FEED_INTERVAL {
                self.feed();
                last_feed = Instant::now();
            } else {
                time::sleep(RECEIVE_POLL).await;
            }
        }

        if !response.is_complete() {
            debug!(
                "response timeout after {:?} ({}/{} bytes)",
                deadline,
                response.len(),
                request.expected_response_len()
            );
        }
        response
    }

    fn dispatch_data(&self, request: &Request, response: &Response) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        if let Some(on_data) = &self.on_data {
            on_data(
                response.slave_address(),
                request.function(),
                request.address(),
                response.payload(),
            );
        }
    }

    fn dispatch_error(&self, kind: ErrorKind) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        if let Some(on_error) = &self.on_error {
            on_error(kind);
        }
    }

    /// Reconcile liveness registration with the runtime enable flag
    fn sync_watchdog(&mut self) {
        let enabled = self.shared.watchdog_enabled.load(Ordering::Relaxed);
        if enabled && !self.registered {
            self.watchdog.register();
            self.registered = true;
            debug!("{WORKER_TASK_NAME} registered with liveness monitor");
        } else if !enabled && self.registered {
            self.watchdog.deregister();
            self.registered = false;
            debug!("{WORKER_TASK_NAME} deregistered from liveness monitor");
        }
    }

    fn feed(&mut self) {
        if self.registered && !self.shared.shutdown.load(Ordering::Relaxed) {
            self.watchdog.feed();
        }
    }
}
