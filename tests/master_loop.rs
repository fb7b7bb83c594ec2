//! End-to-end worker tests against an in-memory serial link
//!
//! Time is paused, so the worker's inter-frame spacing, receive polling
//! and timeout handling run deterministically under virtual time.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use voltage_rtu::mock::{MockLink, MockLinkHandle, MockPin};
use voltage_rtu::{ErrorKind, FunctionCode, Priority, RtuMaster, Watchdog};

/// Callback capture shared between the test and the worker task
#[derive(Debug, Clone, Default)]
struct Capture {
    data: Arc<Mutex<Vec<(u8, FunctionCode, u16, Vec<u8>)>>>,
    errors: Arc<Mutex<Vec<(ErrorKind, Instant)>>>,
}

impl Capture {
    fn wire(&self, master: &mut RtuMaster) {
        let data = self.data.clone();
        master.on_data(move |slave, fc, address, payload| {
            data.lock()
                .expect("capture poisoned")
                .push((slave, fc, address, payload.to_vec()));
        });
        let errors = self.errors.clone();
        master.on_error(move |kind| {
            errors
                .lock()
                .expect("capture poisoned")
                .push((kind, Instant::now()));
        });
    }

    fn data(&self) -> Vec<(u8, FunctionCode, u16, Vec<u8>)> {
        self.data.lock().expect("capture poisoned").clone()
    }

    fn errors(&self) -> Vec<ErrorKind> {
        self.errors
            .lock()
            .expect("capture poisoned")
            .iter()
            .map(|(kind, _)| *kind)
            .collect()
    }

    fn error_instants(&self) -> Vec<Instant> {
        self.errors
            .lock()
            .expect("capture poisoned")
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }
}

fn started_master(baud: u32) -> (RtuMaster, MockLinkHandle, Capture) {
    let (link, handle) = MockLink::new(baud);
    let mut master = RtuMaster::new(link, None);
    let capture = Capture::default();
    capture.wire(&mut master);
    master.begin().expect("worker starts");
    (master, handle, capture)
}

/// Start address encoded in a request frame
fn frame_address(frame: &[u8]) -> u16 {
    u16::from_be_bytes([frame[2], frame[3]])
}

#[tokio::test(start_paused = true)]
async fn test_read_roundtrip_dispatches_payload() {
    let (mut master, handle, capture) = started_master(9600);

    assert!(master.read_holding_registers(0x11, 0x006B, 3));
    // Serve the reply once the request is on the wire
    sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.sent_count(), 1);
    handle.push_response(&[
        0x11, 0x03, 0x06, 0xAE, 0x41, 0x56, 0x52, 0x43, 0x40, 0x49, 0xAD,
    ]);
    sleep(Duration::from_millis(100)).await;

    let sent = handle.sent_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0],
        vec![0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]
    );

    let data = capture.data();
    assert_eq!(data.len(), 1);
    let (slave, fc, address, payload) = &data[0];
    assert_eq!(*slave, 0x11);
    assert_eq!(*fc, FunctionCode::ReadHoldingRegisters);
    assert_eq!(*address, 0x006B);
    assert_eq!(payload, &[0xAE, 0x41, 0x56, 0x52, 0x43, 0x40]);
    assert!(capture.errors().is_empty());

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_write_echo_roundtrip() {
    let (mut master, handle, capture) = started_master(9600);
    handle.set_auto_respond(true);

    assert!(master.write_single_coil(0x01, 0x00AC, true));
    sleep(Duration::from_millis(100)).await;

    let data = capture.data();
    assert_eq!(data.len(), 1);
    let (_, fc, address, payload) = &data[0];
    assert_eq!(*fc, FunctionCode::WriteSingleCoil);
    assert_eq!(*address, 0x00AC);
    assert_eq!(payload, &[0x00, 0xAC, 0xFF, 0x00]);

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_strict_priority_transmission_order() {
    let (mut master, handle, capture) = started_master(9600);
    handle.set_auto_respond(true);

    // Enqueued in the order Relay, Status, Emergency, Sensor; the wire
    // must see Emergency, Sensor, Relay, Status.
    assert!(master.read_holding_registers(0x01, 1, 1));
    assert!(master.read_holding_registers_with_priority(0x01, 2, 1, Priority::Status));
    assert!(master.read_holding_registers_with_priority(0x01, 3, 1, Priority::Emergency));
    assert!(master.read_holding_registers_with_priority(0x01, 4, 1, Priority::Sensor));

    sleep(Duration::from_secs(1)).await;

    let order: Vec<u16> = handle
        .sent_frames()
        .iter()
        .map(|frame| frame_address(frame))
        .collect();
    assert_eq!(order, vec![3, 4, 1, 2]);
    assert_eq!(capture.data().len(), 4);

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fifo_within_class() {
    let (mut master, handle, _capture) = started_master(9600);
    handle.set_auto_respond(true);

    for address in [10, 11, 12] {
        assert!(master.read_input_registers_with_priority(0x01, address, 1, Priority::Sensor));
    }
    sleep(Duration::from_secs(1)).await;

    let order: Vec<u16> = handle
        .sent_frames()
        .iter()
        .map(|frame| frame_address(frame))
        .collect();
    assert_eq!(order, vec![10, 11, 12]);

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_exception_response_surfaces_code() {
    let (mut master, handle, capture) = started_master(9600);

    assert!(master.read_holding_registers(0x11, 0x006B, 3));
    sleep(Duration::from_millis(20)).await;
    handle.push_response(&[0x11, 0x83, 0x02, 0xC0, 0xF1]);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(capture.errors(), vec![ErrorKind::IllegalDataAddress]);
    assert!(capture.data().is_empty());

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_response_surfaces_crc_error() {
    let (mut master, handle, capture) = started_master(9600);

    assert!(master.read_holding_registers(0x11, 0x006B, 3));
    sleep(Duration::from_millis(20)).await;
    handle.push_response(&[
        0x11, 0x03, 0x06, 0xAE, 0x41, 0x56, 0x52, 0x43, 0x40, 0x00, 0x00,
    ]);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(capture.errors(), vec![ErrorKind::CrcError]);
    assert!(capture.data().is_empty());

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_slave_times_out_once() {
    let (mut master, handle, capture) = started_master(9600);
    master.set_timeout(250);

    let submitted = Instant::now();
    assert!(master.read_holding_registers(0x11, 0x0000, 1));
    sleep(Duration::from_secs(2)).await;

    assert_eq!(handle.sent_count(), 1);
    assert_eq!(capture.errors(), vec![ErrorKind::Timeout]);
    assert!(capture.data().is_empty());

    // The deadline runs from the start of transmit; allow the spacing
    // guard, the post-TX drain wait and one receive-poll tick on top.
    let elapsed = capture.error_instants()[0] - submitted;
    assert!(elapsed >= Duration::from_millis(250), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(300), "elapsed {elapsed:?}");

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_disturb_following_requests() {
    let (mut master, handle, capture) = started_master(9600);
    master.set_timeout(100);

    // Both requests are queued up front; the first is met with silence.
    assert!(master.read_holding_registers(0x11, 0x0001, 1));
    assert!(master.read_holding_registers(0x11, 0x006B, 3));

    // 150 ms in, the first request has timed out and the second is in
    // its receive window; serve it now.
    sleep(Duration::from_millis(150)).await;
    assert_eq!(capture.errors(), vec![ErrorKind::Timeout]);
    handle.push_response(&[
        0x11, 0x03, 0x06, 0xAE, 0x41, 0x56, 0x52, 0x43, 0x40, 0x49, 0xAD,
    ]);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.sent_count(), 2);
    assert_eq!(capture.errors(), vec![ErrorKind::Timeout]);
    assert_eq!(capture.data().len(), 1);

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_inter_frame_gap_is_respected() {
    let baud = 9600;
    let (mut master, handle, _capture) = started_master(baud);
    handle.set_auto_respond(true);

    assert!(master.read_holding_registers(0x01, 1, 1));
    assert!(master.read_holding_registers(0x01, 2, 1));
    assert!(master.read_holding_registers(0x01, 3, 1));
    sleep(Duration::from_secs(1)).await;

    let instants = handle.sent_instants();
    assert_eq!(instants.len(), 3);
    let min_gap = Duration::from_micros(40_000_000 / u64::from(baud));
    for pair in instants.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= min_gap, "gap {gap:?} below {min_gap:?}");
    }

    master.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_queue_full_rejects_without_callback() {
    let (mut master, handle, capture) = started_master(9600);

    // The worker has not run yet, so the Relay queue (capacity 12) fills
    for i in 0..12 {
        assert!(master.read_holding_registers(0x01, i, 1));
    }
    assert!(!master.read_holding_registers(0x01, 99, 1));

    // Other classes still accept
    assert!(master.read_holding_registers_with_priority(0x01, 100, 1, Priority::Status));

    master.shutdown().await;
    assert!(capture.data().is_empty());
    assert!(capture.errors().is_empty());
    assert_eq!(handle.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_pending_without_callbacks() {
    let (mut master, handle, capture) = started_master(9600);

    assert!(master.read_holding_registers(0x01, 1, 1));
    assert!(master.write_single_coil(0x01, 2, true));
    assert!(master.read_coils_with_priority(0x01, 3, 1, Priority::Emergency));

    // The worker observes the shutdown flag before its first dequeue
    master.shutdown().await;

    assert_eq!(handle.sent_count(), 0);
    assert!(capture.data().is_empty());
    assert!(capture.errors().is_empty());
    assert!(!master.read_holding_registers(0x01, 4, 1));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_in_flight_request() {
    let (mut master, handle, capture) = started_master(9600);

    // Silent slave: the worker sits in its receive loop
    assert!(master.read_holding_registers(0x01, 1, 1));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.sent_count(), 1);

    master.shutdown().await;

    // The abandoned request produces no callback at all
    assert!(capture.data().is_empty());
    assert!(capture.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_direction_pin_toggles_around_transmit() {
    let (link, handle) = MockLink::new(9600);
    let pin = MockPin::new();
    let pin_view = pin.clone();
    let mut master = RtuMaster::new(link, Some(Box::new(pin)));
    let capture = Capture::default();
    capture.wire(&mut master);
    master.begin().expect("worker starts");
    handle.set_auto_respond(true);

    assert!(master.read_holding_registers(0x01, 1, 1));
    sleep(Duration::from_millis(100)).await;

    // One TX assertion followed by one release per frame
    assert_eq!(pin_view.transitions(), vec![true, false]);
    assert_eq!(capture.data().len(), 1);

    master.shutdown().await;
}

/// Liveness monitor that counts every interaction
#[derive(Debug, Clone, Default)]
struct CountingWatchdog {
    registers: Arc<Mutex<u32>>,
    feeds: Arc<Mutex<u32>>,
    deregisters: Arc<Mutex<u32>>,
}

impl CountingWatchdog {
    fn counts(&self) -> (u32, u32, u32) {
        (
            *self.registers.lock().expect("watchdog poisoned"),
            *self.feeds.lock().expect("watchdog poisoned"),
            *self.deregisters.lock().expect("watchdog poisoned"),
        )
    }
}

impl Watchdog for CountingWatchdog {
    fn register(&mut self) {
        *self.registers.lock().expect("watchdog poisoned") += 1;
    }

    fn feed(&mut self) {
        *self.feeds.lock().expect("watchdog poisoned") += 1;
    }

    fn deregister(&mut self) {
        *self.deregisters.lock().expect("watchdog poisoned") += 1;
    }
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_lifecycle() {
    let (link, handle) = MockLink::new(9600);
    handle.set_auto_respond(true);
    let monitor = CountingWatchdog::default();
    let counts = monitor.clone();

    let mut master = RtuMaster::new(link, None);
    master.set_watchdog(monitor);
    master.begin().expect("worker starts");

    // Idle feeding
    sleep(Duration::from_secs(1)).await;
    let (registers, feeds, deregisters) = counts.counts();
    assert_eq!(registers, 1);
    assert!(feeds > 0, "idle loop must feed");
    assert_eq!(deregisters, 0);

    // Per-request feeding
    assert!(master.read_holding_registers(0x01, 1, 1));
    sleep(Duration::from_millis(200)).await;
    let (_, feeds_after_request, _) = counts.counts();
    assert!(feeds_after_request > feeds);

    master.shutdown().await;
    let (registers, _, deregisters) = counts.counts();
    assert_eq!(registers, 1);
    assert_eq!(deregisters, 1);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_disable_deregisters() {
    let (link, _handle) = MockLink::new(9600);
    let monitor = CountingWatchdog::default();
    let counts = monitor.clone();

    let mut master = RtuMaster::new(link, None);
    master.set_watchdog(monitor);
    master.begin().expect("worker starts");
    sleep(Duration::from_millis(300)).await;

    master.set_watchdog_enabled(false);
    sleep(Duration::from_millis(300)).await;
    let (registers, feeds_when_disabled, deregisters) = counts.counts();
    assert_eq!((registers, deregisters), (1, 1));

    // No further feeds while disabled
    sleep(Duration::from_millis(300)).await;
    let (_, feeds_later, _) = counts.counts();
    assert_eq!(feeds_later, feeds_when_disabled);

    // Re-enabling registers again
    master.set_watchdog_enabled(true);
    sleep(Duration::from_millis(300)).await;
    let (registers, _, _) = counts.counts();
    assert_eq!(registers, 2);

    master.shutdown().await;
    let (_, _, deregisters) = counts.counts();
    assert_eq!(deregisters, 2);
}

#[tokio::test(start_paused = true)]
async fn test_every_function_code_reaches_the_wire() {
    let (mut master, handle, capture) = started_master(19200);
    handle.set_auto_respond(true);

    assert!(master.read_coils(0x01, 0, 8));
    assert!(master.read_discrete_inputs(0x01, 0, 8));
    assert!(master.read_holding_registers(0x01, 0, 2));
    assert!(master.read_input_registers(0x01, 0, 2));
    assert!(master.write_single_coil(0x01, 0, true));
    assert!(master.write_single_holding_register(0x01, 0, 0x1234));
    assert!(master.write_multiple_coils(0x01, 0, &[true, false, true]));
    assert!(master.write_multiple_holding_registers(0x01, 0, &[1, 2]));
    assert!(master.read_write_multiple_registers(0x01, 0, 2, 0x10, &[7]));

    sleep(Duration::from_secs(2)).await;

    let sent = handle.sent_frames();
    let codes: Vec<u8> = sent.iter().map(|frame| frame[1]).collect();
    assert_eq!(
        codes,
        vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10, 0x17]
    );
    // Exactly one callback per request, all successful
    assert_eq!(capture.data().len(), 9);
    assert!(capture.errors().is_empty());

    master.shutdown().await;
}
