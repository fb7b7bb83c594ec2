//! In-memory serial link for testing
//!
//! [`MockLink`] records transmitted frames and serves scripted response
//! bytes, so protocol and worker logic can be exercised without a serial
//! port. The paired [`MockLinkHandle`] stays with the test after the
//! link moves into the worker.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use crate::crc::{crc16, crc_bytes};
use crate::error::Result;
use crate::link::{DirectionPin, SerialLink};

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<Vec<u8>>,
    sent_at: Vec<Instant>,
    receive_queue: VecDeque<Vec<u8>>,
    auto_respond: bool,
}

/// Test-side control handle for a [`MockLink`]
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLinkHandle {
    /// Queue bytes to be served by subsequent `receive` calls
    pub fn push_response(&self, frame: &[u8]) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.receive_queue.push_back(frame.to_vec());
    }

    /// Frames transmitted so far, in order
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        let state = self.state.lock().expect("mock state poisoned");
        state.sent.clone()
    }

    /// Number of frames transmitted so far
    pub fn sent_count(&self) -> usize {
        let state = self.state.lock().expect("mock state poisoned");
        state.sent.len()
    }

    /// Transmit instants, parallel to [`sent_frames`](Self::sent_frames)
    pub fn sent_instants(&self) -> Vec<Instant> {
        let state = self.state.lock().expect("mock state poisoned");
        state.sent_at.clone()
    }

    /// When enabled, every transmitted request is answered immediately
    /// with a well-formed all-zero (or echoed) response
    pub fn set_auto_respond(&self, enabled: bool) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.auto_respond = enabled;
    }
}

/// [`SerialLink`] that never touches hardware
#[derive(Debug)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    baud_rate: u32,
}

impl MockLink {
    /// Create a link and its control handle
    pub fn new(baud_rate: u32) -> (Self, MockLinkHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: state.clone(),
                baud_rate,
            },
            MockLinkHandle { state },
        )
    }
}

/// Build a plausible response for a recorded request frame
fn auto_response(frame: &[u8]) -> Option<Vec<u8>> {
    if frame.len() < 8 {
        return None;
    }
    let slave = frame[0];
    let fc = frame[1];
    let mut body = match fc {
        0x01 | 0x02 => {
            let count = u16::from_be_bytes([frame[4], frame[5]]) as usize;
            let n = count.div_ceil(8);
            let mut body = vec![slave, fc, n as u8];
            body.resize(3 + n, 0x00);
            body
        }
        0x03 | 0x04 => {
            let count = u16::from_be_bytes([frame[4], frame[5]]) as usize;
            let mut body = vec![slave, fc, (2 * count) as u8];
            body.resize(3 + 2 * count, 0x00);
            body
        }
        // Single writes echo the request frame verbatim
        0x05 | 0x06 => return Some(frame.to_vec()),
        0x0F | 0x10 => vec![slave, fc, frame[2], frame[3], frame[4], frame[5]],
        0x17 => {
            let read_count = u16::from_be_bytes([frame[4], frame[5]]) as usize;
            let mut body = vec![slave, fc, (2 * read_count) as u8];
            body.resize(3 + 2 * read_count, 0x00);
            body
        }
        _ => return None,
    };
    let (lo, hi) = crc_bytes(crc16(&body));
    body.push(lo);
    body.push(hi);
    Some(body)
}

#[async_trait]
impl SerialLink for MockLink {
    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.sent.push(frame.to_vec());
        state.sent_at.push(Instant::now());
        if state.auto_respond {
            if let Some(response) = auto_response(frame) {
                state.receive_queue.push_back(response);
            }
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock().expect("mock state poisoned");
        let Some(front) = state.receive_queue.front_mut() else {
            return Ok(0);
        };
        let n = front.len().min(buf.len());
        buf[..n].copy_from_slice(&front[..n]);
        if n == front.len() {
            state.receive_queue.pop_front();
        } else {
            front.drain(..n);
        }
        Ok(n)
    }
}

/// [`DirectionPin`] that records every transition
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    transitions: Arc<Mutex<Vec<bool>>>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded transitions, `true` for transmit
    pub fn transitions(&self) -> Vec<bool> {
        self.transitions.lock().expect("pin state poisoned").clone()
    }
}

impl DirectionPin for MockPin {
    fn set_transmit(&mut self) {
        self.transitions
            .lock()
            .expect("pin state poisoned")
            .push(true);
    }

    fn set_receive(&mut self) {
        self.transitions
            .lock()
            .expect("pin state poisoned")
            .push(false);
    }
}
