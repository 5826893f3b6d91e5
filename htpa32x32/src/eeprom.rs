// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Factory calibration data, stored on an EEPROM next to the sensor.
//!
//! The EEPROM is a separate device on the bus (at [`DEFAULT_EEPROM_ADDRESS`] by default) holding
//! 8000 bytes of calibration data. Multi-byte values are little-endian, and the per-pixel grids
//! have their bottom halves stored upside down (just like the pixel data coming off of the
//! sensor).
use embedded_hal::blocking::i2c;
use log::debug;

use crate::address_enum_ops;
use crate::common::{Address, FromI2C};
use crate::error::{Error, LibraryError};
use crate::expose_member;
use crate::register::SensorSettings;
use crate::util::{flip_lower_half, Buffer};
use crate::{NUM_PIXELS, WIDTH};

/// The default I²C address of the calibration EEPROM.
pub const DEFAULT_EEPROM_ADDRESS: u8 = 0x50;

/// The size of the calibration data in bytes.
pub const EEPROM_LENGTH: usize = (EepromAddress::End as u16 - EepromAddress::Base as u16) as usize;

/// The EEPROM is read in two halves of this many bytes each.
const EEPROM_READ_LENGTH: usize = 4000;

/// The number of rows of V<sub>DD</sub> compensation data stored in the EEPROM.
const VDD_SOURCE_ROWS: usize = 8;

/// Each half of the V<sub>DD</sub> compensation source covers this many rows, and is repeated to
/// fill a half of the array.
const VDD_BLOCK_ROWS: usize = 4;

/// The number of V<sub>DD</sub> compensation values stored in the EEPROM.
pub(crate) const VDD_SOURCE_LENGTH: usize = VDD_SOURCE_ROWS * WIDTH;

/// EEPROM addresses for the HTPA32x32.
// NOTE: To make it easier to compare against the datasheet, discriminant values should *always* be
// explicitly written out.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u16)]
pub(crate) enum EepromAddress {
    /// The start of the EEPROM, also where P<sub>min</sub> is stored.
    Base = 0x0000,

    PixelConstantMax = 0x0004,

    GradientScale = 0x0008,

    Epsilon = 0x000D,

    Mbit = 0x001A,

    /// Shared between the top and bottom halves.
    Bias = 0x001B,

    Clock = 0x001C,

    /// Shared between the top and bottom halves.
    Bpa = 0x001D,

    PullUp = 0x001E,

    VddThreshold1 = 0x0026,

    VddThreshold2 = 0x0028,

    PtatGradient = 0x0034,

    PtatOffset = 0x0038,

    PtatThreshold1 = 0x003C,

    PtatThreshold2 = 0x003E,

    VddScaleGradient = 0x004E,

    VddScaleOffset = 0x004F,

    GlobalGain = 0x0055,

    /// 8 rows of 32 values, tiled across the array.
    VddCompensationGradient = 0x0340,

    /// 8 rows of 32 values, tiled across the array.
    VddCompensationOffset = 0x0540,

    ThermalGradient = 0x0740,

    ThermalOffset = 0x0F40,

    PixelConstant = 0x1740,

    /// One past the last address used.
    End = 0x1F40,
}

address_enum_ops!(EepromAddress);

impl EepromAddress {
    /// Slice the EEPROM data starting at this address.
    fn slice(self, data: &[u8]) -> &[u8] {
        &data[(self as usize)..]
    }
}

/// Calibration data for a specific HTPA32x32.
///
/// Everything in here is derived from a single EEPROM dump, and never changes after that. The
/// per-pixel values are all stored in row-major order, already un-mirrored.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    grad_scale: u8,

    ptat_gradient: f32,

    ptat_offset: f32,

    thermal_gradient: [i16; NUM_PIXELS],

    thermal_offset: [i16; NUM_PIXELS],

    pixel_constants: [f32; NUM_PIXELS],

    vdd_compensation_gradient: [f32; NUM_PIXELS],

    vdd_compensation_offset: [f32; NUM_PIXELS],

    vdd_scale_gradient: u8,

    vdd_scale_offset: u8,

    ptat_thresholds: [u16; 2],

    vdd_thresholds: [u16; 2],

    factory_settings: SensorSettings,
}

impl Calibration {
    /// Generate the constants needed for temperature calculations from a dump of the EEPROM.
    ///
    /// The buffer must be *exactly* the length of the EEPROM.
    pub fn from_data(data: &[u8]) -> Result<Self, LibraryError> {
        if data.len() != EEPROM_LENGTH {
            return Err(LibraryError::InvalidCalibration(
                "The EEPROM dump must be exactly 8000 bytes",
            ));
        }
        let grad_scale = EepromAddress::GradientScale.slice(data).get_u8();
        let ptat_gradient = EepromAddress::PtatGradient.slice(data).get_f32();
        let ptat_offset = EepromAddress::PtatOffset.slice(data).get_f32();
        let thermal_gradient = read_i16_grid(data, EepromAddress::ThermalGradient);
        let thermal_offset = read_i16_grid(data, EepromAddress::ThermalOffset);
        let pixel_constants = Self::pixel_constants_from_data(data);
        let vdd_compensation_gradient =
            tile_vdd_compensation(&read_vdd_source(data, EepromAddress::VddCompensationGradient));
        let vdd_compensation_offset =
            tile_vdd_compensation(&read_vdd_source(data, EepromAddress::VddCompensationOffset));
        let vdd_scale_gradient = EepromAddress::VddScaleGradient.slice(data).get_u8();
        let vdd_scale_offset = EepromAddress::VddScaleOffset.slice(data).get_u8();
        let ptat_thresholds = [
            EepromAddress::PtatThreshold1.slice(data).get_u16(),
            EepromAddress::PtatThreshold2.slice(data).get_u16(),
        ];
        let vdd_thresholds = [
            EepromAddress::VddThreshold1.slice(data).get_u16(),
            EepromAddress::VddThreshold2.slice(data).get_u16(),
        ];
        let factory_settings = Self::factory_settings_from_data(data);
        debug!(
            "Calibration: PTATTh1 {}, PTATTh2 {}, VddTh1 {}, VddTh2 {}, VddScGrad {}, VddScOff {}",
            ptat_thresholds[0],
            ptat_thresholds[1],
            vdd_thresholds[0],
            vdd_thresholds[1],
            vdd_scale_gradient,
            vdd_scale_offset
        );
        debug!("Factory sensor settings: {:?}", factory_settings);
        // Both of these end up as divisors in the compensation pipeline.
        if ptat_thresholds[0] == ptat_thresholds[1] {
            return Err(LibraryError::InvalidCalibration(
                "The PTAT thresholds must be different",
            ));
        }
        if pixel_constants.iter().any(|constant| *constant == 0f32) {
            return Err(LibraryError::InvalidCalibration(
                "Pixel sensitivity constants must be non-zero",
            ));
        }
        Ok(Self {
            grad_scale,
            ptat_gradient,
            ptat_offset,
            thermal_gradient,
            thermal_offset,
            pixel_constants,
            vdd_compensation_gradient,
            vdd_compensation_offset,
            vdd_scale_gradient,
            vdd_scale_offset,
            ptat_thresholds,
            vdd_thresholds,
            factory_settings,
        })
    }

    /// Calculate the per-pixel sensitivity constants (PixC).
    ///
    /// The raw values are 16-bit unsigned integers, scaled linearly between P<sub>min</sub> and
    /// P<sub>max</sub>, then adjusted for the emissivity and the global gain.
    fn pixel_constants_from_data(data: &[u8]) -> [f32; NUM_PIXELS] {
        let mut buf = EepromAddress::Base.slice(data);
        let p_min = buf.get_f32();
        let p_max = buf.get_f32();
        // Emissivity, in percent.
        let epsilon = f32::from(EepromAddress::Epsilon.slice(data).get_u8());
        let global_gain = f32::from(EepromAddress::GlobalGain.slice(data).get_u16());
        let mut buf = EepromAddress::PixelConstant.slice(data);
        let mut raw_constants = [0u16; NUM_PIXELS];
        raw_constants
            .iter_mut()
            .for_each(|constant| *constant = buf.get_u16());
        flip_lower_half(&mut raw_constants);
        raw_constants.map(|raw| {
            (f32::from(raw) * (p_max - p_min) / 65535f32 + p_min)
                * (epsilon / 100f32)
                * (global_gain / 10000f32)
        })
    }

    fn factory_settings_from_data(data: &[u8]) -> SensorSettings {
        let bias = EepromAddress::Bias.slice(data).get_u8();
        let bpa = EepromAddress::Bpa.slice(data).get_u8();
        SensorSettings {
            mbit: EepromAddress::Mbit.slice(data).get_u8(),
            bias_top: bias,
            bias_bottom: bias,
            clock: EepromAddress::Clock.slice(data).get_u8(),
            bpa_top: bpa,
            bpa_bottom: bpa,
            pull_up: EepromAddress::PullUp.slice(data).get_u8(),
        }
    }

    expose_member!(
        grad_scale,
        u8,
        "The power of two the thermal gradient is scaled by (gradScale)."
    );

    expose_member!(
        ptat_gradient,
        f32,
        "Slope converting the average PTAT reading to ambient temperature (PTATgrad)."
    );

    expose_member!(
        ptat_offset,
        f32,
        "Offset converting the average PTAT reading to ambient temperature (PTAToff)."
    );

    expose_member!(
        &thermal_gradient,
        [i16; NUM_PIXELS],
        "Per-pixel thermal offset slope against PTAT (ThGrad)."
    );

    expose_member!(
        &thermal_offset,
        [i16; NUM_PIXELS],
        "Per-pixel constant thermal offset (ThOffset)."
    );

    expose_member!(
        &pixel_constants,
        [f32; NUM_PIXELS],
        "Per-pixel sensitivity (PixC), with emissivity and the global gain already applied."
    );

    expose_member!(
        &vdd_compensation_gradient,
        [f32; NUM_PIXELS],
        "Per-pixel supply voltage compensation slope (VddCompGrad), tiled across the array."
    );

    expose_member!(
        &vdd_compensation_offset,
        [f32; NUM_PIXELS],
        "Per-pixel supply voltage compensation offset (VddCompOff), tiled across the array."
    );

    expose_member!(
        vdd_scale_gradient,
        u8,
        "The power of two the V<sub>DD</sub> compensation gradient is scaled by (VddScGrad)."
    );

    expose_member!(
        vdd_scale_offset,
        u8,
        "The power of two the V<sub>DD</sub> compensation is scaled by (VddScOff)."
    );

    expose_member!(
        ptat_thresholds,
        [u16; 2],
        "The PTAT readings the V<sub>DD</sub> thresholds were measured at (PTATTh1, PTATTh2)."
    );

    expose_member!(
        vdd_thresholds,
        [u16; 2],
        "The V<sub>DD</sub> readings taken during calibration (VddTh1, VddTh2)."
    );

    expose_member!(
        factory_settings,
        SensorSettings,
        "The sensor settings chosen at the factory."
    );
}

impl<I2C> FromI2C<I2C> for Calibration
where
    I2C: i2c::WriteRead + i2c::Write,
{
    type Error = Error<I2C>;
    type Ok = Self;

    /// Read the entire EEPROM from the given address, and parse it.
    fn from_i2c(bus: &mut I2C, i2c_address: u8) -> Result<Self, Self::Error> {
        let mut eeprom_data = [0u8; EEPROM_LENGTH];
        for (index, chunk) in eeprom_data.chunks_mut(EEPROM_READ_LENGTH).enumerate() {
            let offset = Address::new((index * EEPROM_READ_LENGTH) as u16);
            bus.write_read(i2c_address, &offset.as_bytes(), chunk)
                .map_err(Error::I2cWriteReadError)?;
        }
        debug!("Read {} bytes of calibration data", eeprom_data.len());
        Ok(Self::from_data(&eeprom_data)?)
    }
}

/// Read a full grid of signed values, correcting the mirrored bottom half.
fn read_i16_grid(data: &[u8], start: EepromAddress) -> [i16; NUM_PIXELS] {
    let mut buf = start.slice(data);
    let mut grid = [0i16; NUM_PIXELS];
    grid.iter_mut().for_each(|value| *value = buf.get_i16());
    flip_lower_half(&mut grid);
    grid
}

fn read_vdd_source(data: &[u8], start: EepromAddress) -> [i16; VDD_SOURCE_LENGTH] {
    let mut buf = start.slice(data);
    let mut source = [0i16; VDD_SOURCE_LENGTH];
    source.iter_mut().for_each(|value| *value = buf.get_i16());
    source
}

/// Expand the 8 rows of V<sub>DD</sub> compensation data to cover the entire array.
///
/// The first four rows are repeated four times to fill the top half of the array. The last four
/// rows are stored upside down, and once flipped are repeated to fill the bottom half.
pub(crate) fn tile_vdd_compensation(source: &[i16; VDD_SOURCE_LENGTH]) -> [f32; NUM_PIXELS] {
    const TILE_LENGTH: usize = VDD_BLOCK_ROWS * WIDTH;
    let (top_block, bottom_block) = source.split_at(TILE_LENGTH);
    let mut grid = [0f32; NUM_PIXELS];
    let (top_half, bottom_half) = grid.split_at_mut(NUM_PIXELS / 2);
    for tile in top_half.chunks_exact_mut(TILE_LENGTH) {
        tile.iter_mut()
            .zip(top_block)
            .for_each(|(value, source)| *value = f32::from(*source));
    }
    for tile in bottom_half.chunks_exact_mut(TILE_LENGTH) {
        let flipped_rows = bottom_block.chunks_exact(WIDTH).rev();
        for (row, source_row) in tile.chunks_exact_mut(WIDTH).zip(flipped_rows) {
            row.iter_mut()
                .zip(source_row)
                .for_each(|(value, source)| *value = f32::from(*source));
        }
    }
    grid
}
