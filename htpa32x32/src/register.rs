// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Sensor registers and the values written to them.
//!
//! Unlike the EEPROM, the sensor itself has a tiny, byte-wide register map. Everything the
//! driver does goes through [configuration register][Register::Configuration] writes, with the
//! [status register][Register::Status] polled to find out when a block is finished.
use embedded_hal::blocking::i2c;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::Error;
use crate::util::is_bit_set;

/// The sensor's register addresses.
// NOTE: To make it easier to compare against the datasheet, discriminant values should *always* be
// explicitly written out.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Register {
    /// Wake up, start a conversion, and select the block and measurement type.
    Configuration = 0x01,

    /// Mirrors the configuration register, with the start bit cleared once a conversion is done.
    Status = 0x02,

    /// ADC resolution and reference voltage.
    Mbit = 0x03,

    /// Bias current for the top half of the array.
    BiasTop = 0x04,

    /// Bias current for the bottom half of the array.
    BiasBottom = 0x05,

    /// Clock trim.
    Clock = 0x06,

    /// Bias for the preamplifier of the top half of the array.
    BpaTop = 0x07,

    /// Bias for the preamplifier of the bottom half of the array.
    BpaBottom = 0x08,

    /// SDA/SCL pull up resistance.
    PullUp = 0x09,

    /// Read out the top half of the last converted block.
    TopHalf = 0x0A,

    /// Read out the bottom half of the last converted block.
    BottomHalf = 0x0B,
}

/// One of the four blocks the array is multiplexed into.
///
/// Each block covers 128 pixels in the top half of the array, and the corresponding 128 pixels in
/// the (mirrored) bottom half.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Block {
    Zero = 0,
    One = 1,
    Two = 2,
    Three = 3,
}

impl Block {
    /// All of the blocks, in the order they are captured.
    pub const ALL: [Block; 4] = [Block::Zero, Block::One, Block::Two, Block::Three];

    /// The block captured after this one, if there is one.
    pub fn next(self) -> Option<Block> {
        match self {
            Block::Zero => Some(Block::One),
            Block::One => Some(Block::Two),
            Block::Two => Some(Block::Three),
            Block::Three => None,
        }
    }

    /// The block number as an index.
    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

/// What the sensor should be measuring during a capture.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct CaptureMode {
    /// Sample the shuttered ("blind") elements, measuring the electrical offset.
    pub blind: bool,

    /// Sample the supply voltage instead of the PTAT reference.
    pub vdd: bool,
}

impl CaptureMode {
    /// A normal capture of the thermal image.
    pub const NORMAL: CaptureMode = CaptureMode {
        blind: false,
        vdd: false,
    };

    /// The capture used to refresh the compensation baseline.
    pub const BASELINE: CaptureMode = CaptureMode {
        blind: true,
        vdd: true,
    };
}

/// The configuration register (0x01).
///
/// The status register (0x02) has the same layout, with the start bit cleared once the
/// conversion is finished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[rustfmt::skip]
pub struct ConfigurationRegister {
    // The fields in this struct are laid out in least to most significant bits they occupy in the
    // register.

    /// Whether the sensor is awake. Bit 0.
    pub(crate) wake_up: bool,

    /// Measure the blind elements instead of the array. Bit 1.
    pub(crate) blind: bool,

    /// Measure the supply voltage instead of PTAT. Bit 2.
    pub(crate) vdd: bool,

    /// Start a conversion. Bit 3.
    pub(crate) start: bool,

    /// Which block to convert. Bits 4 and 5.
    pub(crate) block: Block,

    // The top two bits are unused.
}

impl ConfigurationRegister {
    /// The value written to start converting a block.
    pub fn expose(block: Block, mode: CaptureMode) -> Self {
        Self {
            wake_up: true,
            blind: mode.blind,
            vdd: mode.vdd,
            start: true,
            block,
        }
    }

    /// The value the status register holds once the conversion of a block is done.
    pub fn finished(block: Block, mode: CaptureMode) -> Self {
        Self {
            start: false,
            ..Self::expose(block, mode)
        }
    }

    /// The value written to wake the sensor up.
    pub fn wake_up() -> Self {
        Self {
            wake_up: true,
            blind: false,
            vdd: false,
            start: false,
            block: Block::Zero,
        }
    }

    /// The value written to put the sensor to sleep.
    pub fn sleep() -> Self {
        Self {
            wake_up: false,
            ..Self::wake_up()
        }
    }

    pub fn wake_up_enabled(&self) -> bool {
        self.wake_up
    }

    pub fn start(&self) -> bool {
        self.start
    }

    pub fn block(&self) -> Block {
        self.block
    }

    pub fn mode(&self) -> CaptureMode {
        CaptureMode {
            blind: self.blind,
            vdd: self.vdd,
        }
    }
}

impl From<u8> for ConfigurationRegister {
    fn from(raw: u8) -> Self {
        // Only four possible values once masked, and all of them are blocks.
        let block = Block::try_from_primitive((raw >> 4) & 0b11).unwrap_or(Block::Three);
        Self {
            wake_up: is_bit_set(raw, 0),
            blind: is_bit_set(raw, 1),
            vdd: is_bit_set(raw, 2),
            start: is_bit_set(raw, 3),
            block,
        }
    }
}

impl From<ConfigurationRegister> for u8 {
    fn from(register: ConfigurationRegister) -> Self {
        let mut raw = 0u8;
        raw |= register.wake_up as u8;
        raw |= (register.blind as u8) << 1;
        raw |= (register.vdd as u8) << 2;
        raw |= (register.start as u8) << 3;
        raw |= u8::from(register.block) << 4;
        raw
    }
}

/// The analog front end settings written to the sensor at start up.
///
/// The factory-chosen values are also stored in the EEPROM (see
/// [`Calibration::factory_settings`][crate::Calibration::factory_settings]), but the EEPROM only
/// has a single value for the bias and preamplifier bias that's shared between both halves of the
/// array.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SensorSettings {
    pub mbit: u8,
    pub bias_top: u8,
    pub bias_bottom: u8,
    pub clock: u8,
    pub bpa_top: u8,
    pub bpa_bottom: u8,
    pub pull_up: u8,
}

impl SensorSettings {
    /// The registers backing each setting, in the order they are written.
    pub(crate) fn registers(&self) -> [(Register, u8); 7] {
        [
            (Register::Mbit, self.mbit),
            (Register::BiasTop, self.bias_top),
            (Register::BiasBottom, self.bias_bottom),
            (Register::Clock, self.clock),
            (Register::BpaTop, self.bpa_top),
            (Register::BpaBottom, self.bpa_bottom),
            (Register::PullUp, self.pull_up),
        ]
    }
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            mbit: 0x2C,
            bias_top: 0x05,
            bias_bottom: 0x05,
            clock: 0x15,
            bpa_top: 0x03,
            bpa_bottom: 0x03,
            pull_up: 0x88,
        }
    }
}

/// Read a single byte-wide register.
pub(crate) fn read_register<I2C>(
    bus: &mut I2C,
    i2c_address: u8,
    register: Register,
) -> Result<u8, Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    let mut value = [0u8; 1];
    read_bulk(bus, i2c_address, register, &mut value)?;
    Ok(value[0])
}

/// Fill `buffer` with whatever the sensor returns when reading from `register`.
pub(crate) fn read_bulk<I2C>(
    bus: &mut I2C,
    i2c_address: u8,
    register: Register,
    buffer: &mut [u8],
) -> Result<(), Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    bus.write_read(i2c_address, &[u8::from(register)], buffer)
        .map_err(Error::I2cWriteReadError)
}

pub(crate) fn write_register<I2C>(
    bus: &mut I2C,
    i2c_address: u8,
    register: Register,
    value: u8,
) -> Result<(), Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    bus.write(i2c_address, &[u8::from(register), value])
        .map_err(Error::I2cWriteError)
}
