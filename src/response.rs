//! Response accumulation and validation
//!
//! A [`Response`] is created from the request's metadata (slave address,
//! function code, expected length) when the worker enters its receive
//! phase, filled as bytes arrive, and classified once complete or timed
//! out. It never holds a reference back to the request.

use crate::constants::{
    CRC_LEN, ERROR_FLAG, EXCEPTION_RESPONSE_LEN, MAX_FRAME_SIZE, MIN_RESPONSE_LEN,
};
use crate::crc::{crc16, crc_bytes};
use crate::error::ErrorKind;
use crate::request::Request;
use crate::types::FunctionCode;

/// Bytes received for one in-flight request
#[derive(Debug)]
pub struct Response {
    slave: u8,
    function: FunctionCode,
    expected_len: usize,
    buf: Vec<u8>,
}

impl Response {
    /// Create an empty buffer sized for `request`'s expected response
    pub fn new(request: &Request) -> Self {
        let expected_len = request
            .expected_response_len()
            .clamp(MIN_RESPONSE_LEN, MAX_FRAME_SIZE);
        Self {
            slave: request.slave(),
            function: request.function(),
            expected_len,
            buf: Vec::with_capacity(expected_len),
        }
    }

    /// Bytes still missing before the buffer reaches the expected length
    pub fn remaining(&self) -> usize {
        self.expected_len.saturating_sub(self.buf.len())
    }

    /// Append received bytes, silently discarding anything beyond the
    /// expected length
    pub fn extend(&mut self, bytes: &[u8]) {
        let take = bytes.len().min(self.remaining());
        self.buf.extend_from_slice(&bytes[..take]);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// A response is complete at exactly the expected length, or at five
    /// bytes when the function-code byte has the error bit set.
    pub fn is_complete(&self) -> bool {
        if self.buf.len() >= 2
            && self.buf[1] & ERROR_FLAG != 0
            && self.buf.len() == EXCEPTION_RESPONSE_LEN
        {
            return true;
        }
        self.buf.len() == self.expected_len
    }

    /// Classify the buffer contents.
    ///
    /// Check order is fixed: incomplete (timeout), wire exception, CRC,
    /// slave address, function code. An exception frame is reported as
    /// its exception code even when its CRC is damaged, and a corrupt
    /// frame from the wrong slave is reported as a CRC error.
    pub fn classify(&self) -> Result<(), ErrorKind> {
        if !self.is_complete() {
            return Err(ErrorKind::Timeout);
        }
        if self.buf[1] & ERROR_FLAG != 0 {
            return Err(ErrorKind::from_exception(self.buf[2]));
        }
        if !self.crc_valid() {
            return Err(ErrorKind::CrcError);
        }
        if self.buf[0] != self.slave {
            return Err(ErrorKind::InvalidSlave);
        }
        if self.buf[1] != self.function as u8 {
            return Err(ErrorKind::InvalidResponse);
        }
        Ok(())
    }

    fn crc_valid(&self) -> bool {
        let len = self.buf.len();
        if len < CRC_LEN + 2 {
            return false;
        }
        let (lo, hi) = crc_bytes(crc16(&self.buf[..len - CRC_LEN]));
        self.buf[len - 2] == lo && self.buf[len - 1] == hi
    }

    /// Slave address echoed in the response
    pub fn slave_address(&self) -> u8 {
        self.buf[0]
    }

    /// Payload bytes of a successful response.
    ///
    /// Single-write echoes (FC05/FC06) expose the four bytes at offset 2
    /// (address + value); every other response carries a byte count at
    /// offset 2 and its payload from offset 3. Only meaningful after
    /// [`classify`](Self::classify) returned `Ok`.
    pub fn payload(&self) -> &[u8] {
        if self.function.is_single_write_echo() {
            return &self.buf[2..6];
        }
        let declared = self.buf[2] as usize;
        let available = self.buf.len() - MIN_RESPONSE_LEN;
        &self.buf[3..3 + declared.min(available)]
    }

    /// Raw frame received so far
    pub fn frame(&self) -> &[u8] {
        &self.buf
    }
}
