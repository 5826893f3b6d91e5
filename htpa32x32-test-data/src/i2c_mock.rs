// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
extern crate alloc;

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::iter;

use embedded_hal::blocking::{delay, i2c};

use crate::eeprom_data::EEPROM_LENGTH;

/// The I²C address the EEPROM is at unless told otherwise.
pub const DEFAULT_EEPROM_ADDRESS: u8 = 0x50;

/// The number of bytes read from each half of a block.
pub const PAYLOAD_LENGTH: usize = 258;

const WIDTH: usize = 32;
const NUM_PIXELS: usize = 1024;
const NUM_REFERENCES: usize = 8;
const PIXELS_PER_PAYLOAD: usize = 128;
const NUM_BLOCKS: usize = 4;

const CONFIGURATION_REGISTER: u8 = 0x01;
const STATUS_REGISTER: u8 = 0x02;
const TOP_HALF_REGISTER: u8 = 0x0A;
const BOTTOM_HALF_REGISTER: u8 = 0x0B;
const START_BIT: u8 = 0x08;

const RECENT_OPERATIONS_QUEUE_LENGTH: usize = 512;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockError {
    /// An unknown I2C address was given.
    UnknownI2cAddress(u8),

    /// The sensor doesn't have the given register.
    UnknownRegister(u8),

    /// A read past the end of the EEPROM.
    OutOfBounds { offset: usize, length: usize },

    /// The requested operation is not allowed.
    ///
    /// This covers situations such as:
    /// * Writing to the EEPROM.
    /// * Writing anything other than a register and a single value to the sensor.
    /// * Reading the wrong number of bytes from a register.
    IllegalOperation,

    /// Failure requested with [`MockSensorBus::fail_after`].
    Injected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum I2cOperation {
    Write {
        i2c_address: u8,
        bytes: Vec<u8>,
    },
    WriteRead {
        i2c_address: u8,
        written: Vec<u8>,
        read_length: usize,
    },
}

/// The raw bytes read from the top and bottom halves of a block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockPayloads {
    pub top: [u8; PAYLOAD_LENGTH],
    pub bottom: [u8; PAYLOAD_LENGTH],
}

impl Default for BlockPayloads {
    fn default() -> Self {
        Self {
            top: [0u8; PAYLOAD_LENGTH],
            bottom: [0u8; PAYLOAD_LENGTH],
        }
    }
}

/// Encode a reference value and 128 pixels the way the sensor sends them (big-endian).
pub fn encode_payload(reference: u16, pixels: &[u16]) -> [u8; PAYLOAD_LENGTH] {
    assert_eq!(pixels.len(), PIXELS_PER_PAYLOAD);
    let mut payload = [0u8; PAYLOAD_LENGTH];
    let values = iter::once(&reference).chain(pixels);
    for (bytes, value) in payload.chunks_exact_mut(2).zip(values) {
        bytes.copy_from_slice(&value.to_be_bytes());
    }
    payload
}

/// Split a row-major frame into the payloads the sensor would send for each block.
///
/// The bottom half of each block starts from the bottom edge of the array, working up.
pub fn frame_to_payloads(
    pixels: &[u16; NUM_PIXELS],
    references: &[u16; NUM_REFERENCES],
) -> [BlockPayloads; NUM_BLOCKS] {
    let mut payloads = [BlockPayloads::default(); NUM_BLOCKS];
    for (block, payload) in payloads.iter_mut().enumerate() {
        let offset = block * PIXELS_PER_PAYLOAD;
        payload.top = encode_payload(
            references[block],
            &pixels[offset..(offset + PIXELS_PER_PAYLOAD)],
        );
        let mut bottom_pixels = [0u16; PIXELS_PER_PAYLOAD];
        for (n, row) in bottom_pixels.chunks_exact_mut(WIDTH).enumerate() {
            let start = NUM_PIXELS - WIDTH * (n + 1) - offset;
            row.copy_from_slice(&pixels[start..(start + WIDTH)]);
        }
        payload.bottom = encode_payload(references[NUM_REFERENCES - 1 - block], &bottom_pixels);
    }
    payloads
}

fn mode_index(blind: bool, vdd: bool) -> usize {
    (blind as usize) | ((vdd as usize) << 1)
}

#[derive(Clone, Debug)]
struct SensorState {
    /// Registers 0x00 through 0x09. The status register is kept at index 2.
    registers: [u8; 0x0A],

    /// How many status reads report "busy" after starting a conversion. `None` never finishes.
    polls_until_ready: Option<usize>,

    polls_remaining: Option<usize>,

    current_block: usize,

    current_mode: usize,

    /// Indexed by mode then block.
    payloads: [[BlockPayloads; NUM_BLOCKS]; 4],
}

impl SensorState {
    fn current_payloads(&self) -> &BlockPayloads {
        &self.payloads[self.current_mode][self.current_block]
    }

    fn read_status(&mut self) -> u8 {
        match self.polls_remaining {
            Some(0) => self.registers[STATUS_REGISTER as usize] &= !START_BIT,
            Some(remaining) => self.polls_remaining = Some(remaining - 1),
            None => (),
        }
        self.registers[STATUS_REGISTER as usize]
    }
}

/// A mock HTPA32x32 and its EEPROM, sharing one bus.
///
/// Clones share the same state, so a clone can be kept to inspect (and change) the mock after the
/// original has been handed to a driver.
#[derive(Clone, Debug)]
pub struct MockSensorBus {
    sensor_address: u8,
    eeprom_address: u8,
    eeprom: Rc<RefCell<[u8; EEPROM_LENGTH]>>,
    sensor: Rc<RefCell<SensorState>>,
    failure_countdown: Rc<Cell<Option<usize>>>,
    recent_operations: Rc<RefCell<VecDeque<I2cOperation>>>,
}

impl MockSensorBus {
    /// Create a new mock, with the EEPROM at [`DEFAULT_EEPROM_ADDRESS`].
    ///
    /// Every frame is all zeros until set otherwise, and each block reports busy once before
    /// finishing.
    pub fn new(sensor_address: u8, eeprom: [u8; EEPROM_LENGTH]) -> Self {
        let sensor = SensorState {
            registers: [0u8; 0x0A],
            polls_until_ready: Some(1),
            polls_remaining: None,
            current_block: 0,
            current_mode: 0,
            payloads: [[BlockPayloads::default(); NUM_BLOCKS]; 4],
        };
        Self {
            sensor_address,
            eeprom_address: DEFAULT_EEPROM_ADDRESS,
            eeprom: Rc::new(RefCell::new(eeprom)),
            sensor: Rc::new(RefCell::new(sensor)),
            failure_countdown: Rc::new(Cell::new(None)),
            recent_operations: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn with_eeprom_address(mut self, eeprom_address: u8) -> Self {
        self.eeprom_address = eeprom_address;
        self
    }

    /// Set the frame returned for captures in the given mode.
    pub fn set_frame(
        &self,
        blind: bool,
        vdd: bool,
        pixels: &[u16; NUM_PIXELS],
        references: &[u16; NUM_REFERENCES],
    ) {
        let payloads = frame_to_payloads(pixels, references);
        self.sensor.borrow_mut().payloads[mode_index(blind, vdd)] = payloads;
    }

    /// Set the raw bytes returned for a single block in the given mode.
    pub fn set_block_payloads(&self, blind: bool, vdd: bool, block: usize, payloads: BlockPayloads) {
        self.sensor.borrow_mut().payloads[mode_index(blind, vdd)][block] = payloads;
    }

    /// Set how many times the status register reports busy after a conversion is started.
    ///
    /// With `None`, conversions never finish.
    pub fn set_polls_until_ready(&self, polls: Option<usize>) {
        self.sensor.borrow_mut().polls_until_ready = polls;
    }

    /// Fail every operation after the given number of successful ones (or never, with `None`).
    pub fn fail_after(&self, successful_operations: Option<usize>) {
        self.failure_countdown.set(successful_operations);
    }

    /// The current value of a sensor register.
    pub fn register(&self, register: u8) -> u8 {
        self.sensor.borrow().registers[register as usize]
    }

    /// Successful operations, oldest first.
    pub fn operations(&self) -> Vec<I2cOperation> {
        self.recent_operations.borrow().iter().cloned().collect()
    }

    pub fn clear_operations(&self) {
        self.recent_operations.borrow_mut().clear()
    }

    fn check_failure(&self) -> Result<(), MockError> {
        match self.failure_countdown.get() {
            Some(0) => Err(MockError::Injected),
            Some(remaining) => {
                self.failure_countdown.set(Some(remaining - 1));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn add_operation(&self, operation: I2cOperation) {
        let mut recent_ops = self.recent_operations.borrow_mut();
        recent_ops.push_back(operation);
        while recent_ops.len() > RECENT_OPERATIONS_QUEUE_LENGTH {
            recent_ops.pop_front();
        }
    }

    fn write_sensor(&self, bytes: &[u8]) -> Result<(), MockError> {
        if bytes.len() != 2 {
            return Err(MockError::IllegalOperation);
        }
        let (register, value) = (bytes[0], bytes[1]);
        let mut sensor = self.sensor.borrow_mut();
        match register {
            CONFIGURATION_REGISTER => {
                sensor.registers[CONFIGURATION_REGISTER as usize] = value;
                sensor.registers[STATUS_REGISTER as usize] = value;
                if value & START_BIT != 0 {
                    sensor.polls_remaining = sensor.polls_until_ready;
                    sensor.current_block = usize::from((value >> 4) & 0b11);
                    sensor.current_mode = usize::from((value >> 1) & 0b11);
                }
            }
            0x03..=0x09 => sensor.registers[register as usize] = value,
            _ => return Err(MockError::UnknownRegister(register)),
        }
        Ok(())
    }

    fn read_sensor(&self, written: &[u8], out_buffer: &mut [u8]) -> Result<(), MockError> {
        if written.len() != 1 {
            return Err(MockError::IllegalOperation);
        }
        let register = written[0];
        let mut sensor = self.sensor.borrow_mut();
        match (register, out_buffer.len()) {
            (STATUS_REGISTER, 1) => out_buffer[0] = sensor.read_status(),
            (TOP_HALF_REGISTER, PAYLOAD_LENGTH) => {
                out_buffer.copy_from_slice(&sensor.current_payloads().top)
            }
            (BOTTOM_HALF_REGISTER, PAYLOAD_LENGTH) => {
                out_buffer.copy_from_slice(&sensor.current_payloads().bottom)
            }
            (CONFIGURATION_REGISTER | 0x03..=0x09, 1) => {
                out_buffer[0] = sensor.registers[register as usize]
            }
            (0x00..=BOTTOM_HALF_REGISTER, _) => return Err(MockError::IllegalOperation),
            _ => return Err(MockError::UnknownRegister(register)),
        }
        Ok(())
    }

    fn read_eeprom(&self, written: &[u8], out_buffer: &mut [u8]) -> Result<(), MockError> {
        if written.len() != 2 {
            return Err(MockError::IllegalOperation);
        }
        let offset = usize::from(u16::from_be_bytes([written[0], written[1]]));
        let end = offset + out_buffer.len();
        if end > EEPROM_LENGTH {
            return Err(MockError::OutOfBounds {
                offset,
                length: out_buffer.len(),
            });
        }
        out_buffer.copy_from_slice(&self.eeprom.borrow()[offset..end]);
        Ok(())
    }
}

impl i2c::Write for MockSensorBus {
    type Error = MockError;

    fn write(&mut self, i2c_address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.check_failure()?;
        if i2c_address == self.sensor_address {
            self.write_sensor(bytes)?;
        } else if i2c_address == self.eeprom_address {
            // Nothing should be writing to the calibration data.
            return Err(MockError::IllegalOperation);
        } else {
            return Err(MockError::UnknownI2cAddress(i2c_address));
        }
        self.add_operation(I2cOperation::Write {
            i2c_address,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

impl i2c::WriteRead for MockSensorBus {
    type Error = MockError;

    fn write_read(
        &mut self,
        i2c_address: u8,
        write_buffer: &[u8],
        out_buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.check_failure()?;
        if out_buffer.is_empty() {
            return Err(MockError::IllegalOperation);
        }
        if i2c_address == self.sensor_address {
            self.read_sensor(write_buffer, out_buffer)?;
        } else if i2c_address == self.eeprom_address {
            self.read_eeprom(write_buffer, out_buffer)?;
        } else {
            return Err(MockError::UnknownI2cAddress(i2c_address));
        }
        self.add_operation(I2cOperation::WriteRead {
            i2c_address,
            written: write_buffer.to_vec(),
            read_length: out_buffer.len(),
        });
        Ok(())
    }
}

/// A delay that doesn't wait, just keeps track of how long it was asked to wait.
///
/// Like [`MockSensorBus`], clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct MockDelay {
    total_ms: Rc<Cell<u32>>,
    calls: Rc<Cell<u32>>,
}

impl MockDelay {
    /// The total time waited, in milliseconds.
    pub fn total_ms(&self) -> u32 {
        self.total_ms.get()
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub fn reset(&self) {
        self.total_ms.set(0);
        self.calls.set(0);
    }
}

impl delay::DelayMs<u8> for MockDelay {
    fn delay_ms(&mut self, ms: u8) {
        self.total_ms.set(self.total_ms.get() + u32::from(ms));
        self.calls.set(self.calls.get() + 1);
    }
}

#[cfg(test)]
mod test {
    use embedded_hal::blocking::delay::DelayMs;
    use embedded_hal::blocking::i2c::{Write, WriteRead};

    use super::*;
    use crate::fixture_eeprom;

    #[test]
    fn payload_encoding() {
        let pixels: Vec<u16> = (0..128).collect();
        let payload = encode_payload(0xBEEF, &pixels);
        assert_eq!(payload[..2], [0xBE, 0xEF]);
        assert_eq!(payload[2..4], [0x00, 0x00]);
        assert_eq!(payload[256..], [0x00, 127]);
    }

    #[test]
    fn conversion_cycle() {
        let mut bus = MockSensorBus::new(0x1A, fixture_eeprom());
        bus.set_polls_until_ready(Some(2));
        bus.write(0x1A, &[0x01, 0x09]).unwrap();
        let mut status = [0u8];
        for _ in 0..2 {
            bus.write_read(0x1A, &[0x02], &mut status).unwrap();
            assert_eq!(status[0], 0x09);
        }
        bus.write_read(0x1A, &[0x02], &mut status).unwrap();
        assert_eq!(status[0], 0x01);
    }

    #[test]
    fn eeprom_reads() {
        let eeprom = fixture_eeprom();
        let mut bus = MockSensorBus::new(0x1A, eeprom);
        let mut buffer = [0u8; 4];
        bus.write_read(0x50, &[0x1F, 0x3C], &mut buffer).unwrap();
        assert_eq!(buffer[..], eeprom[0x1F3C..]);
        assert!(bus.write_read(0x50, &[0x1F, 0x3D], &mut buffer).is_err());
        assert!(bus.write(0x50, &[0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn injected_failures() {
        let mut bus = MockSensorBus::new(0x1A, fixture_eeprom());
        bus.fail_after(Some(1));
        assert!(bus.write(0x1A, &[0x01, 0x01]).is_ok());
        assert_eq!(bus.write(0x1A, &[0x01, 0x01]), Err(MockError::Injected));
        assert_eq!(bus.operations().len(), 1);
        bus.fail_after(None);
        assert!(bus.write(0x1A, &[0x01, 0x01]).is_ok());
    }

    #[test]
    fn delay_accumulates() {
        let delay = MockDelay::default();
        let mut shared = delay.clone();
        shared.delay_ms(5u8);
        shared.delay_ms(7u8);
        assert_eq!(delay.total_ms(), 12);
        assert_eq!(delay.calls(), 2);
        delay.reset();
        assert_eq!(delay.total_ms(), 0);
    }
}
