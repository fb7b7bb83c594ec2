//! Request descriptors and frame encoders
//!
//! One constructor per function code builds the fully-encoded ADU
//! (slave address, function code, payload, CRC) and records the exact
//! response length the slave must produce. Parameters are validated here,
//! before the request can ever reach a queue.

use crate::constants::{
    COIL_OFF, COIL_ON, MAX_COILS_PER_REQUEST, MAX_FRAME_SIZE, MAX_REGISTERS_PER_REQUEST,
};
use crate::crc::{crc16, crc_bytes};
use crate::error::{Result, RtuError};
use crate::types::{FunctionCode, Priority};

/// A single encoded request, owned by the queue and then the worker
#[derive(Debug, Clone)]
pub struct Request {
    slave: u8,
    function: FunctionCode,
    address: u16,
    expected_response_len: usize,
    priority: Priority,
    frame: Vec<u8>,
}

/// Accumulates frame bytes and appends the CRC over everything written
/// before it, so the checksum span never needs to be computed by hand.
struct FrameBuilder {
    buf: Vec<u8>,
}

impl FrameBuilder {
    fn new(slave: u8, function: FunctionCode) -> Self {
        let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
        buf.push(slave);
        buf.push(function as u8);
        Self { buf }
    }

    fn byte(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    fn word(mut self, value: u16) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn words(mut self, values: &[u16]) -> Self {
        for &value in values {
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
        self
    }

    /// Pack coil states eight per byte, bit i of byte j = coil 8j + i;
    /// unused high bits of the last byte stay zero.
    fn bits(mut self, values: &[bool]) -> Self {
        for chunk in values.chunks(8) {
            let mut byte = 0u8;
            for (bit, &on) in chunk.iter().enumerate() {
                if on {
                    byte |= 1 << bit;
                }
            }
            self.buf.push(byte);
        }
        self
    }

    fn finish(mut self) -> Vec<u8> {
        let (lo, hi) = crc_bytes(crc16(&self.buf));
        self.buf.push(lo);
        self.buf.push(hi);
        self.buf
    }
}

/// Bytes needed to carry `count` coil states
fn coil_bytes(count: u16) -> usize {
    (count as usize).div_ceil(8)
}

fn check_register_count(count: u16) -> Result<()> {
    if count == 0 || count > MAX_REGISTERS_PER_REQUEST {
        return Err(RtuError::InvalidParameter(format!(
            "register count {count} outside 1..={MAX_REGISTERS_PER_REQUEST}"
        )));
    }
    Ok(())
}

fn check_coil_count(count: u16) -> Result<()> {
    if count == 0 || count > MAX_COILS_PER_REQUEST {
        return Err(RtuError::InvalidParameter(format!(
            "coil count {count} outside 1..={MAX_COILS_PER_REQUEST}"
        )));
    }
    Ok(())
}

fn check_frame_len(len: usize) -> Result<()> {
    if len > MAX_FRAME_SIZE {
        return Err(RtuError::InvalidParameter(format!(
            "frame length {len} exceeds {MAX_FRAME_SIZE}"
        )));
    }
    Ok(())
}

impl Request {
    /// FC01: read `count` coils starting at `address`
    pub fn read_coils(slave: u8, address: u16, count: u16) -> Result<Self> {
        check_coil_count(count)?;
        let frame = FrameBuilder::new(slave, FunctionCode::ReadCoils)
            .word(address)
            .word(count)
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::ReadCoils,
            address,
            expected_response_len: 5 + coil_bytes(count),
            priority: Priority::default(),
            frame,
        })
    }

    /// FC02: read `count` discrete inputs starting at `address`
    pub fn read_discrete_inputs(slave: u8, address: u16, count: u16) -> Result<Self> {
        check_coil_count(count)?;
        let frame = FrameBuilder::new(slave, FunctionCode::ReadDiscreteInputs)
            .word(address)
            .word(count)
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::ReadDiscreteInputs,
            address,
            expected_response_len: 5 + coil_bytes(count),
            priority: Priority::default(),
            frame,
        })
    }

    /// FC03: read `count` holding registers starting at `address`
    pub fn read_holding_registers(slave: u8, address: u16, count: u16) -> Result<Self> {
        check_register_count(count)?;
        let frame = FrameBuilder::new(slave, FunctionCode::ReadHoldingRegisters)
            .word(address)
            .word(count)
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::ReadHoldingRegisters,
            address,
            expected_response_len: 5 + 2 * count as usize,
            priority: Priority::default(),
            frame,
        })
    }

    /// FC04: read `count` input registers starting at `address`
    pub fn read_input_registers(slave: u8, address: u16, count: u16) -> Result<Self> {
        check_register_count(count)?;
        let frame = FrameBuilder::new(slave, FunctionCode::ReadInputRegisters)
            .word(address)
            .word(count)
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::ReadInputRegisters,
            address,
            expected_response_len: 5 + 2 * count as usize,
            priority: Priority::default(),
            frame,
        })
    }

    /// FC05: write a single coil; the wire value is 0xFF00 for on,
    /// 0x0000 for off
    pub fn write_single_coil(slave: u8, address: u16, value: bool) -> Result<Self> {
        let frame = FrameBuilder::new(slave, FunctionCode::WriteSingleCoil)
            .word(address)
            .word(if value { COIL_ON } else { COIL_OFF })
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::WriteSingleCoil,
            address,
            expected_response_len: 8,
            priority: Priority::default(),
            frame,
        })
    }

    /// FC06: write a single holding register
    pub fn write_single_holding_register(slave: u8, address: u16, value: u16) -> Result<Self> {
        let frame = FrameBuilder::new(slave, FunctionCode::WriteSingleHoldingRegister)
            .word(address)
            .word(value)
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::WriteSingleHoldingRegister,
            address,
            expected_response_len: 8,
            priority: Priority::default(),
            frame,
        })
    }

    /// FC15: write multiple coils starting at `address`
    pub fn write_multiple_coils(slave: u8, address: u16, values: &[bool]) -> Result<Self> {
        let count = values.len() as u16;
        check_coil_count(count)?;
        check_frame_len(9 + coil_bytes(count))?;
        let frame = FrameBuilder::new(slave, FunctionCode::WriteMultipleCoils)
            .word(address)
            .word(count)
            .byte(coil_bytes(count) as u8)
            .bits(values)
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::WriteMultipleCoils,
            address,
            expected_response_len: 8,
            priority: Priority::default(),
            frame,
        })
    }

    /// FC16: write multiple holding registers starting at `address`
    pub fn write_multiple_holding_registers(
        slave: u8,
        address: u16,
        values: &[u16],
    ) -> Result<Self> {
        let count = values.len() as u16;
        check_register_count(count)?;
        check_frame_len(9 + 2 * values.len())?;
        let frame = FrameBuilder::new(slave, FunctionCode::WriteMultipleHoldingRegisters)
            .word(address)
            .word(count)
            .byte((2 * values.len()) as u8)
            .words(values)
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::WriteMultipleHoldingRegisters,
            address,
            expected_response_len: 8,
            priority: Priority::default(),
            frame,
        })
    }

    /// FC23: write `values` at `write_address` and read `read_count`
    /// registers at `read_address` in one transaction
    pub fn read_write_multiple_registers(
        slave: u8,
        read_address: u16,
        read_count: u16,
        write_address: u16,
        values: &[u16],
    ) -> Result<Self> {
        check_register_count(read_count)?;
        check_register_count(values.len() as u16)?;
        check_frame_len(13 + 2 * values.len())?;
        let frame = FrameBuilder::new(slave, FunctionCode::ReadWriteMultipleRegisters)
            .word(read_address)
            .word(read_count)
            .word(write_address)
            .word(values.len() as u16)
            .byte((2 * values.len()) as u8)
            .words(values)
            .finish();
        Ok(Self {
            slave,
            function: FunctionCode::ReadWriteMultipleRegisters,
            address: read_address,
            expected_response_len: 5 + 2 * read_count as usize,
            priority: Priority::default(),
            frame,
        })
    }

    /// Assign an explicit urgency class
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn slave(&self) -> u8 {
        self.slave
    }

    pub fn function(&self) -> FunctionCode {
        self.function
    }

    /// Logical address the request targets (read address for FC23)
    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Exact number of bytes a well-behaved slave will answer with
    pub fn expected_response_len(&self) -> usize {
        self.expected_response_len
    }

    /// The complete encoded frame including address prefix and CRC
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }
}
