// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Capturing a full frame, one block at a time.
//!
//! The array is read out in four blocks. Each block is exposed by writing to the configuration
//! register, then the status register is polled until the sensor reports the block is done, and
//! finally the top and bottom halves of the block are read out. [`FrameCapture`] models this as a
//! state machine that performs exactly one bus operation per [step][FrameCapture::step], leaving
//! any waiting between polls up to the caller.
use embedded_hal::blocking::i2c;
use log::trace;

use crate::error::{Error, LibraryError};
use crate::register::{
    read_bulk, read_register, write_register, Block, CaptureMode, ConfigurationRegister, Register,
};
use crate::{NUM_PIXELS, NUM_REFERENCES, WIDTH};

/// The number of bytes read from each half of a block.
pub const PAYLOAD_LENGTH: usize = 258;

/// The number of 16-bit values in a payload. The first one is the reference reading.
const VALUES_PER_PAYLOAD: usize = PAYLOAD_LENGTH / 2;

const PIXELS_PER_PAYLOAD: usize = VALUES_PER_PAYLOAD - 1;

/// The default number of times the status register is checked before giving up on a block.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u16 = 100;

/// A full, unprocessed frame from the sensor.
///
/// Pixels are in row-major order, with the bottom half already put right side up.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    pixels: [u16; NUM_PIXELS],
    references: [u16; NUM_REFERENCES],
}

impl RawFrame {
    pub fn new(pixels: [u16; NUM_PIXELS], references: [u16; NUM_REFERENCES]) -> Self {
        Self { pixels, references }
    }

    pub fn pixels(&self) -> &[u16; NUM_PIXELS] {
        &self.pixels
    }

    /// The reference readings, one for each half of each block.
    ///
    /// These are PTAT readings for normal captures, and V<sub>DD</sub> readings for captures with
    /// [`CaptureMode::vdd`] set.
    pub fn references(&self) -> &[u16; NUM_REFERENCES] {
        &self.references
    }

    pub fn pixel(&self, row: usize, column: usize) -> u16 {
        self.pixels[row * WIDTH + column]
    }

    /// The average of the eight reference readings.
    pub fn reference_mean(&self) -> f32 {
        let sum: u32 = self.references.iter().copied().map(u32::from).sum();
        sum as f32 / NUM_REFERENCES as f32
    }
}

impl Default for RawFrame {
    fn default() -> Self {
        Self::new([0; NUM_PIXELS], [0; NUM_REFERENCES])
    }
}

/// Split a payload into 16-bit values.
///
/// The sensor sends each value most significant byte first.
pub fn decode_payload(payload: &[u8; PAYLOAD_LENGTH]) -> [u16; VALUES_PER_PAYLOAD] {
    let mut values = [0u16; VALUES_PER_PAYLOAD];
    values
        .iter_mut()
        .zip(payload.chunks_exact(2))
        .for_each(|(value, bytes)| *value = u16::from_be_bytes([bytes[0], bytes[1]]));
    values
}

/// Put the decoded halves of a block in their places in the frame.
///
/// The top half of block *b* covers rows 4*b* through 4*b* + 3. The bottom half is read out from
/// the bottom edge of the array towards the middle, so each 32 pixel row in it lands one row
/// higher than the one before it, starting at row 31 - 4*b*.
pub fn place_block(
    block: Block,
    top: &[u16; VALUES_PER_PAYLOAD],
    bottom: &[u16; VALUES_PER_PAYLOAD],
    frame: &mut RawFrame,
) {
    let block_offset = block.index() * PIXELS_PER_PAYLOAD;
    frame.pixels[block_offset..(block_offset + PIXELS_PER_PAYLOAD)].copy_from_slice(&top[1..]);
    for (n, row) in bottom[1..].chunks_exact(WIDTH).enumerate() {
        let start = NUM_PIXELS - WIDTH * (n + 1) - block_offset;
        frame.pixels[start..(start + WIDTH)].copy_from_slice(row);
    }
    frame.references[block.index()] = top[0];
    frame.references[NUM_REFERENCES - 1 - block.index()] = bottom[0];
}

/// Where a [`FrameCapture`] is in the capture sequence.
///
/// Each state names the bus operation performed by the next step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureState {
    /// Nothing has been done yet, or the last capture failed.
    Idle,

    /// Start converting a block.
    Expose(Block),

    /// Check the status register.
    WaitReady {
        block: Block,

        /// The number of times the status register has already been checked for this block.
        attempts: u16,
    },

    /// Read both halves of a block.
    ReadBlock(Block),

    /// Every block has been read.
    Complete,
}

/// A single frame capture in progress.
#[derive(Clone, Debug)]
pub struct FrameCapture {
    mode: CaptureMode,
    state: CaptureState,
    max_attempts: u16,
    frame: RawFrame,
}

impl FrameCapture {
    pub fn new(mode: CaptureMode) -> Self {
        Self::with_max_attempts(mode, DEFAULT_MAX_POLL_ATTEMPTS)
    }

    /// Create a capture that gives up after checking the status register `max_attempts` times
    /// for any single block.
    ///
    /// At least one attempt is always made.
    pub fn with_max_attempts(mode: CaptureMode, max_attempts: u16) -> Self {
        Self {
            mode,
            state: CaptureState::Idle,
            max_attempts: max_attempts.max(1),
            frame: RawFrame::default(),
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == CaptureState::Complete
    }

    /// The captured frame, once every block has been read.
    pub fn frame(&self) -> Option<&RawFrame> {
        if self.is_complete() {
            Some(&self.frame)
        } else {
            None
        }
    }

    pub fn into_frame(self) -> Option<RawFrame> {
        if self.is_complete() {
            Some(self.frame)
        } else {
            None
        }
    }

    /// Perform the next bus operation in the capture sequence, returning the new state.
    ///
    /// Any error (from the bus, or running out of attempts while waiting for a block) resets the
    /// capture back to [`CaptureState::Idle`], discarding whatever was read so far. Stepping a
    /// complete capture does nothing.
    pub fn step<I2C>(&mut self, bus: &mut I2C, i2c_address: u8) -> Result<CaptureState, Error<I2C>>
    where
        I2C: i2c::WriteRead + i2c::Write,
    {
        match self.advance(bus, i2c_address) {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(err) => {
                self.state = CaptureState::Idle;
                Err(err)
            }
        }
    }

    fn advance<I2C>(&mut self, bus: &mut I2C, i2c_address: u8) -> Result<CaptureState, Error<I2C>>
    where
        I2C: i2c::WriteRead + i2c::Write,
    {
        match self.state {
            CaptureState::Idle => {
                self.frame = RawFrame::default();
                Ok(CaptureState::Expose(Block::Zero))
            }
            CaptureState::Expose(block) => {
                let config = ConfigurationRegister::expose(block, self.mode);
                write_register(bus, i2c_address, Register::Configuration, config.into())?;
                trace!("Exposing block {:?} ({:?})", block, self.mode);
                Ok(CaptureState::WaitReady { block, attempts: 0 })
            }
            CaptureState::WaitReady { block, attempts } => {
                let status = read_register(bus, i2c_address, Register::Status)?;
                let attempts = attempts + 1;
                let finished = u8::from(ConfigurationRegister::finished(block, self.mode));
                if status == finished {
                    Ok(CaptureState::ReadBlock(block))
                } else if attempts >= self.max_attempts {
                    Err(LibraryError::CaptureTimeout { block, attempts }.into())
                } else {
                    trace!(
                        "Block {:?} not ready (status {:#04X}, attempt {})",
                        block,
                        status,
                        attempts
                    );
                    Ok(CaptureState::WaitReady { block, attempts })
                }
            }
            CaptureState::ReadBlock(block) => {
                let mut payload = [0u8; PAYLOAD_LENGTH];
                read_bulk(bus, i2c_address, Register::TopHalf, &mut payload)?;
                let top = decode_payload(&payload);
                read_bulk(bus, i2c_address, Register::BottomHalf, &mut payload)?;
                let bottom = decode_payload(&payload);
                place_block(block, &top, &bottom, &mut self.frame);
                Ok(match block.next() {
                    Some(next_block) => CaptureState::Expose(next_block),
                    None => CaptureState::Complete,
                })
            }
            CaptureState::Complete => Ok(CaptureState::Complete),
        }
    }
}

#[cfg(test)]
mod test {
    use htpa32x32_test_data::{fixture_eeprom, I2cOperation, MockSensorBus};

    use super::*;
    use crate::{HEIGHT, NUM_PIXELS, NUM_REFERENCES, WIDTH};

    const SENSOR_ADDRESS: u8 = 0x1A;

    fn run_to_completion(capture: &mut FrameCapture, bus: &mut MockSensorBus) {
        // Generous upper bound so that a broken state machine doesn't loop forever.
        for _ in 0..1000 {
            if capture.step(bus, SENSOR_ADDRESS).unwrap() == CaptureState::Complete {
                return;
            }
        }
        panic!("Capture never completed");
    }

    fn numbered_frame() -> RawFrame {
        let mut pixels = [0u16; NUM_PIXELS];
        pixels
            .iter_mut()
            .enumerate()
            .for_each(|(index, pixel)| *pixel = 1000 + index as u16);
        RawFrame::new(pixels, [30000, 30001, 30002, 30003, 30004, 30005, 30006, 30007])
    }

    #[test]
    fn decode_big_endian() {
        let mut payload = [0u8; PAYLOAD_LENGTH];
        payload[0] = 0x12;
        payload[1] = 0x34;
        payload[256] = 0xAB;
        payload[257] = 0xCD;
        let values = decode_payload(&payload);
        assert_eq!(values.len(), 129);
        assert_eq!(values[0], 0x1234);
        assert_eq!(values[128], 0xABCD);
    }

    #[test]
    fn reference_mean() {
        let frame = RawFrame::new([0; NUM_PIXELS], [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frame.reference_mean(), 4.5);
        let frame = RawFrame::new([0; NUM_PIXELS], [u16::MAX; NUM_REFERENCES]);
        assert_eq!(frame.reference_mean(), 65535.0);
    }

    #[test]
    fn block_placement() {
        // One sentinel per 32 pixel row of each bottom half, and one for each top half.
        let mut frame = RawFrame::default();
        for block in Block::ALL {
            let b = block.index() as u16;
            let mut top = [0x0100 + b; VALUES_PER_PAYLOAD];
            top[0] = 0x0A00 + b;
            let mut bottom = [0u16; VALUES_PER_PAYLOAD];
            bottom[0] = 0x0B00 + b;
            for (n, row) in bottom[1..].chunks_exact_mut(WIDTH).enumerate() {
                row.fill(0x1000 + b * 16 + n as u16);
            }
            place_block(block, &top, &bottom, &mut frame);
        }
        for block in Block::ALL {
            let b = block.index();
            for row in (4 * b)..(4 * b + 4) {
                for column in 0..WIDTH {
                    assert_eq!(frame.pixel(row, column), 0x0100 + b as u16);
                }
            }
            for n in 0..4 {
                let row = HEIGHT - 1 - n - 4 * b;
                let sentinel = 0x1000 + (b * 16 + n) as u16;
                for column in 0..WIDTH {
                    assert_eq!(
                        frame.pixel(row, column),
                        sentinel,
                        "Block {} sub-chunk {} misplaced",
                        b,
                        n
                    );
                }
            }
            assert_eq!(frame.references()[b], 0x0A00 + b as u16);
            assert_eq!(frame.references()[NUM_REFERENCES - 1 - b], 0x0B00 + b as u16);
        }
    }

    #[test]
    fn block_placement_covers_frame() {
        let mut frame = RawFrame::new([u16::MAX; NUM_PIXELS], [u16::MAX; NUM_REFERENCES]);
        let zeros = [0u16; VALUES_PER_PAYLOAD];
        for block in Block::ALL {
            place_block(block, &zeros, &zeros, &mut frame);
        }
        assert_eq!(frame, RawFrame::default());
    }

    #[test]
    fn full_capture() {
        let mut bus = MockSensorBus::new(SENSOR_ADDRESS, fixture_eeprom());
        let expected = numbered_frame();
        bus.set_frame(false, false, expected.pixels(), expected.references());
        let mut capture = FrameCapture::new(CaptureMode::NORMAL);
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(capture.frame().is_none());
        run_to_completion(&mut capture, &mut bus);
        assert_eq!(capture.frame(), Some(&expected));
        // Stepping a finished capture is a no-op
        bus.clear_operations();
        assert_eq!(
            capture.step(&mut bus, SENSOR_ADDRESS).unwrap(),
            CaptureState::Complete
        );
        assert!(bus.operations().is_empty());
    }

    #[test]
    fn capture_mode_selects_frame() {
        let mut bus = MockSensorBus::new(SENSOR_ADDRESS, fixture_eeprom());
        let normal = numbered_frame();
        let baseline = RawFrame::new([7; NUM_PIXELS], [35000; NUM_REFERENCES]);
        bus.set_frame(false, false, normal.pixels(), normal.references());
        bus.set_frame(true, true, baseline.pixels(), baseline.references());
        let mut capture = FrameCapture::new(CaptureMode::BASELINE);
        run_to_completion(&mut capture, &mut bus);
        assert_eq!(capture.into_frame(), Some(baseline));
    }

    #[test]
    fn exposure_sequence() {
        let mut bus = MockSensorBus::new(SENSOR_ADDRESS, fixture_eeprom());
        bus.set_polls_until_ready(Some(0));
        let mut capture = FrameCapture::new(CaptureMode::BASELINE);
        run_to_completion(&mut capture, &mut bus);
        let ops = bus.operations();
        // Expose, poll, read top, read bottom for each block
        assert_eq!(ops.len(), 4 * 4);
        for (block, block_ops) in ops.chunks_exact(4).enumerate() {
            let block = block as u8;
            assert_eq!(
                block_ops[0],
                I2cOperation::Write {
                    i2c_address: SENSOR_ADDRESS,
                    bytes: [0x01, 0x0F + (block << 4)].into(),
                }
            );
            assert_eq!(
                block_ops[1],
                I2cOperation::WriteRead {
                    i2c_address: SENSOR_ADDRESS,
                    written: [0x02].into(),
                    read_length: 1,
                }
            );
            assert_eq!(
                block_ops[2],
                I2cOperation::WriteRead {
                    i2c_address: SENSOR_ADDRESS,
                    written: [0x0A].into(),
                    read_length: PAYLOAD_LENGTH,
                }
            );
            assert_eq!(
                block_ops[3],
                I2cOperation::WriteRead {
                    i2c_address: SENSOR_ADDRESS,
                    written: [0x0B].into(),
                    read_length: PAYLOAD_LENGTH,
                }
            );
        }
    }

    #[test]
    fn polls_until_ready() {
        let mut bus = MockSensorBus::new(SENSOR_ADDRESS, fixture_eeprom());
        bus.set_polls_until_ready(Some(3));
        let mut capture = FrameCapture::new(CaptureMode::NORMAL);
        capture.step(&mut bus, SENSOR_ADDRESS).unwrap();
        capture.step(&mut bus, SENSOR_ADDRESS).unwrap();
        for attempts in 1..=3 {
            assert_eq!(
                capture.step(&mut bus, SENSOR_ADDRESS).unwrap(),
                CaptureState::WaitReady {
                    block: Block::Zero,
                    attempts
                }
            );
        }
        assert_eq!(
            capture.step(&mut bus, SENSOR_ADDRESS).unwrap(),
            CaptureState::ReadBlock(Block::Zero)
        );
    }

    #[test]
    fn timeout() {
        let mut bus = MockSensorBus::new(SENSOR_ADDRESS, fixture_eeprom());
        bus.set_polls_until_ready(None);
        let mut capture = FrameCapture::with_max_attempts(CaptureMode::NORMAL, 5);
        let mut result = Ok(CaptureState::Idle);
        for _ in 0..100 {
            result = capture.step(&mut bus, SENSOR_ADDRESS);
            if result.is_err() {
                break;
            }
        }
        match result {
            Err(Error::LibraryError(LibraryError::CaptureTimeout { block, attempts })) => {
                assert_eq!(block, Block::Zero);
                assert_eq!(attempts, 5);
            }
            other => panic!("Expected a timeout, got {:?}", other),
        }
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(capture.into_frame().is_none());
    }

    #[test]
    fn transport_error_resets() {
        let mut bus = MockSensorBus::new(SENSOR_ADDRESS, fixture_eeprom());
        bus.set_polls_until_ready(Some(0));
        let mut capture = FrameCapture::new(CaptureMode::NORMAL);
        // Let the first block go through, then fail partway into the second.
        bus.fail_after(Some(5));
        let mut error = None;
        for _ in 0..100 {
            match capture.step(&mut bus, SENSOR_ADDRESS) {
                Ok(_) => continue,
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }
        let error = error.expect("The capture should have failed");
        assert!(error.is_transport_error());
        assert_eq!(capture.state(), CaptureState::Idle);
        // Once the bus is working again, the capture starts over from the beginning.
        bus.fail_after(None);
        let expected = numbered_frame();
        bus.set_frame(false, false, expected.pixels(), expected.references());
        run_to_completion(&mut capture, &mut bus);
        assert_eq!(capture.frame(), Some(&expected));
    }
}
