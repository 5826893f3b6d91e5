// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The size of the HTPA32x32 calibration EEPROM, in bytes.
pub const EEPROM_LENGTH: usize = 8000;

const NUM_PIXELS: usize = 1024;

const VDD_SOURCE_LENGTH: usize = 256;

// EEPROM offsets. Everything is little-endian.
const P_MIN: usize = 0x0000;
const P_MAX: usize = 0x0004;
const GRAD_SCALE: usize = 0x0008;
const EPSILON: usize = 0x000D;
const MBIT: usize = 0x001A;
const BIAS: usize = 0x001B;
const CLOCK: usize = 0x001C;
const BPA: usize = 0x001D;
const PULL_UP: usize = 0x001E;
const VDD_THRESHOLD_1: usize = 0x0026;
const VDD_THRESHOLD_2: usize = 0x0028;
const PTAT_GRADIENT: usize = 0x0034;
const PTAT_OFFSET: usize = 0x0038;
const PTAT_THRESHOLD_1: usize = 0x003C;
const PTAT_THRESHOLD_2: usize = 0x003E;
const VDD_SCALE_GRADIENT: usize = 0x004E;
const VDD_SCALE_OFFSET: usize = 0x004F;
const GLOBAL_GAIN: usize = 0x0055;
const VDD_COMPENSATION_GRADIENT: usize = 0x0340;
const VDD_COMPENSATION_OFFSET: usize = 0x0540;
const THERMAL_GRADIENT: usize = 0x0740;
const THERMAL_OFFSET: usize = 0x0F40;
const PIXEL_CONSTANT: usize = 0x1740;

/// The ambient temperature (in decikelvin) reported with the [unity EEPROM][unity_eeprom].
///
/// This lands on one of the [lookup table fixture's][crate::table] column breakpoints.
pub const UNITY_AMBIENT: f32 = 2932.0;

/// Builder for synthetic EEPROM images.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EepromImage([u8; EEPROM_LENGTH]);

impl Default for EepromImage {
    fn default() -> Self {
        Self([0u8; EEPROM_LENGTH])
    }
}

impl EepromImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: [u8; EEPROM_LENGTH]) -> Self {
        Self(bytes)
    }

    fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        self.0[offset..(offset + bytes.len())].copy_from_slice(bytes);
        self
    }

    pub fn set_u8(&mut self, offset: usize, value: u8) -> &mut Self {
        self.set_bytes(offset, &[value])
    }

    pub fn set_u16(&mut self, offset: usize, value: u16) -> &mut Self {
        self.set_bytes(offset, &value.to_le_bytes())
    }

    pub fn set_i16(&mut self, offset: usize, value: i16) -> &mut Self {
        self.set_bytes(offset, &value.to_le_bytes())
    }

    pub fn set_f32(&mut self, offset: usize, value: f32) -> &mut Self {
        self.set_bytes(offset, &value.to_le_bytes())
    }

    /// Write consecutive unsigned values starting at `offset`.
    pub fn set_u16_values<I>(&mut self, offset: usize, values: I) -> &mut Self
    where
        I: IntoIterator<Item = u16>,
    {
        for (index, value) in values.into_iter().enumerate() {
            self.set_u16(offset + index * 2, value);
        }
        self
    }

    /// Write consecutive signed values starting at `offset`.
    pub fn set_i16_values<I>(&mut self, offset: usize, values: I) -> &mut Self
    where
        I: IntoIterator<Item = i16>,
    {
        for (index, value) in values.into_iter().enumerate() {
            self.set_i16(offset + index * 2, value);
        }
        self
    }

    pub fn bytes(&self) -> &[u8; EEPROM_LENGTH] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; EEPROM_LENGTH] {
        self.0
    }
}

/// The values stored in the [fixture EEPROM][fixture_eeprom].
///
/// The per-pixel functions take the index of the value as it is stored in the EEPROM (so before
/// the bottom half is flipped).
pub mod fixture {
    pub const P_MIN: f32 = 5.0e7;
    pub const P_MAX: f32 = 1.5e8;
    pub const GRAD_SCALE: u8 = 4;
    pub const EPSILON: u8 = 95;
    pub const MBIT: u8 = 0x2B;
    pub const BIAS: u8 = 0x0C;
    pub const CLOCK: u8 = 0x14;
    pub const BPA: u8 = 0x0C;
    pub const PULL_UP: u8 = 0x88;
    pub const VDD_THRESHOLDS: [u16; 2] = [35000, 36500];
    pub const PTAT_GRADIENT: f32 = 0.0625;
    pub const PTAT_OFFSET: f32 = 590.0;
    pub const PTAT_THRESHOLDS: [u16; 2] = [30000, 42000];
    pub const VDD_SCALE_GRADIENT: u8 = 16;
    pub const VDD_SCALE_OFFSET: u8 = 11;
    pub const GLOBAL_GAIN: u16 = 10050;

    pub fn thermal_gradient(index: usize) -> i16 {
        index as i16 - 512
    }

    pub fn thermal_offset(index: usize) -> i16 {
        3 * index as i16 - 1500
    }

    /// Only the first 256 values are stored.
    pub fn vdd_compensation_gradient(index: usize) -> i16 {
        index as i16 - 128
    }

    /// Only the first 256 values are stored.
    pub fn vdd_compensation_offset(index: usize) -> i16 {
        1000 - 7 * index as i16
    }

    pub fn pixel_constant(index: usize) -> u16 {
        (index * 64) as u16
    }
}

/// An EEPROM image with a distinct, known value in every field.
pub fn fixture_eeprom() -> [u8; EEPROM_LENGTH] {
    let mut image = EepromImage::new();
    image
        .set_f32(P_MIN, fixture::P_MIN)
        .set_f32(P_MAX, fixture::P_MAX)
        .set_u8(GRAD_SCALE, fixture::GRAD_SCALE)
        .set_u8(EPSILON, fixture::EPSILON)
        .set_u8(MBIT, fixture::MBIT)
        .set_u8(BIAS, fixture::BIAS)
        .set_u8(CLOCK, fixture::CLOCK)
        .set_u8(BPA, fixture::BPA)
        .set_u8(PULL_UP, fixture::PULL_UP)
        .set_u16(VDD_THRESHOLD_1, fixture::VDD_THRESHOLDS[0])
        .set_u16(VDD_THRESHOLD_2, fixture::VDD_THRESHOLDS[1])
        .set_f32(PTAT_GRADIENT, fixture::PTAT_GRADIENT)
        .set_f32(PTAT_OFFSET, fixture::PTAT_OFFSET)
        .set_u16(PTAT_THRESHOLD_1, fixture::PTAT_THRESHOLDS[0])
        .set_u16(PTAT_THRESHOLD_2, fixture::PTAT_THRESHOLDS[1])
        .set_u8(VDD_SCALE_GRADIENT, fixture::VDD_SCALE_GRADIENT)
        .set_u8(VDD_SCALE_OFFSET, fixture::VDD_SCALE_OFFSET)
        .set_u16(GLOBAL_GAIN, fixture::GLOBAL_GAIN)
        .set_i16_values(
            VDD_COMPENSATION_GRADIENT,
            (0..VDD_SOURCE_LENGTH).map(fixture::vdd_compensation_gradient),
        )
        .set_i16_values(
            VDD_COMPENSATION_OFFSET,
            (0..VDD_SOURCE_LENGTH).map(fixture::vdd_compensation_offset),
        )
        .set_i16_values(THERMAL_GRADIENT, (0..NUM_PIXELS).map(fixture::thermal_gradient))
        .set_i16_values(THERMAL_OFFSET, (0..NUM_PIXELS).map(fixture::thermal_offset))
        .set_u16_values(PIXEL_CONSTANT, (0..NUM_PIXELS).map(fixture::pixel_constant));
    image.into_bytes()
}

/// An EEPROM where every compensation stage is a no-op, and every pixel's sensitivity is exactly
/// 1.
///
/// The ambient temperature is always `ambient` (in decikelvin), regardless of the PTAT readings.
pub fn unity_eeprom_with_ambient(ambient: f32) -> [u8; EEPROM_LENGTH] {
    let mut image = EepromImage::new();
    image
        .set_f32(P_MIN, 1.0)
        .set_f32(P_MAX, 1.0)
        .set_u8(EPSILON, 100)
        .set_u16(GLOBAL_GAIN, 10000)
        .set_f32(PTAT_GRADIENT, 0.0)
        .set_f32(PTAT_OFFSET, ambient)
        .set_u16(PTAT_THRESHOLD_1, 1000)
        .set_u16(PTAT_THRESHOLD_2, 2000)
        .set_u16(VDD_THRESHOLD_1, 100)
        .set_u16(VDD_THRESHOLD_2, 200);
    image.into_bytes()
}

/// [`unity_eeprom_with_ambient`] with an ambient temperature of [`UNITY_AMBIENT`].
pub fn unity_eeprom() -> [u8; EEPROM_LENGTH] {
    unity_eeprom_with_ambient(UNITY_AMBIENT)
}
