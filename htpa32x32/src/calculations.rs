// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Compensating raw pixel values before temperature lookup.
//!
//! Each stage works on a buffer of `f32` values in row-major order, modifying it in place. They
//! have to be applied in the order [`thermal_compensation`], [`electrical_offset_compensation`],
//! [`voltage_compensation`], then [`sensitivity_compensation`], which is what
//! [`raw_to_compensated`] does.
// Only needed for the float functions when building without std.
#[allow(unused_imports)]
use num_traits::Float;

use crate::capture::RawFrame;
use crate::eeprom::Calibration;
use crate::NUM_PIXELS;

/// Scale applied during sensitivity compensation (PCSCALEVAL).
pub const SENSITIVITY_SCALE: f32 = 1e8;

/// The electrical offsets and supply voltage measured by a baseline ("blind" and
/// V<sub>DD</sub>) capture.
///
/// These drift over time, so they should be refreshed periodically.
#[derive(Clone, Debug, PartialEq)]
pub struct Baseline {
    electrical_offset: [f32; NUM_PIXELS],
    vdd_average: f32,
}

impl Baseline {
    pub fn new(electrical_offset: [f32; NUM_PIXELS], vdd_average: f32) -> Self {
        Self {
            electrical_offset,
            vdd_average,
        }
    }

    /// Create a new baseline from a frame captured with [`CaptureMode::BASELINE`].
    ///
    /// [`CaptureMode::BASELINE`]: crate::CaptureMode::BASELINE
    pub fn from_frame(frame: &RawFrame) -> Self {
        Self::new(frame.pixels().map(f32::from), frame.reference_mean())
    }

    /// The per-pixel electrical offset (elOff).
    pub fn electrical_offset(&self) -> &[f32; NUM_PIXELS] {
        &self.electrical_offset
    }

    /// The average of the V<sub>DD</sub> readings (vdd_av).
    pub fn vdd_average(&self) -> f32 {
        self.vdd_average
    }
}

impl Default for Baseline {
    fn default() -> Self {
        Self::new([0f32; NUM_PIXELS], 0f32)
    }
}

fn check_image_length(image: &[f32]) {
    assert_eq!(
        image.len(),
        NUM_PIXELS,
        "The image buffer must have a value for every pixel"
    );
}

/// Calculate the ambient temperature in decikelvin from the average PTAT reading.
pub fn ambient_temperature(calibration: &Calibration, ptat_average: f32) -> f32 {
    calibration.ptat_gradient() * ptat_average + calibration.ptat_offset()
}

/// Remove the thermal offset, which depends on the ambient (PTAT) temperature.
///
/// # Panics
/// If `image` isn't exactly [`NUM_PIXELS`] long. The same goes for the other stages.
pub fn thermal_compensation(calibration: &Calibration, ptat_average: f32, image: &mut [f32]) {
    check_image_length(image);
    let grad_scale = 2f32.powi(i32::from(calibration.grad_scale()));
    image
        .iter_mut()
        .zip(calibration.thermal_gradient())
        .zip(calibration.thermal_offset())
        .for_each(|((pixel, gradient), offset)| {
            *pixel -= f32::from(*gradient) * ptat_average / grad_scale + f32::from(*offset);
        });
}

/// Remove the electrical offset measured by the last baseline capture.
pub fn electrical_offset_compensation(baseline: &Baseline, image: &mut [f32]) {
    check_image_length(image);
    image
        .iter_mut()
        .zip(baseline.electrical_offset())
        .for_each(|(pixel, offset)| *pixel -= offset);
}

/// Remove the effect of supply voltage drift since calibration.
pub fn voltage_compensation(
    calibration: &Calibration,
    baseline: &Baseline,
    ptat_average: f32,
    image: &mut [f32],
) {
    check_image_length(image);
    let gradient_scale = 2f32.powi(i32::from(calibration.vdd_scale_gradient()));
    let offset_scale = 2f32.powi(i32::from(calibration.vdd_scale_offset()));
    let [vdd_threshold1, vdd_threshold2] = calibration.vdd_thresholds().map(f32::from);
    let [ptat_threshold1, ptat_threshold2] = calibration.ptat_thresholds().map(f32::from);
    // How far V_DD is from where it would be expected to be at this PTAT
    let vdd_delta = (baseline.vdd_average() - vdd_threshold1)
        - (vdd_threshold2 - vdd_threshold1) / (ptat_threshold2 - ptat_threshold1)
            * (ptat_average - ptat_threshold1);
    image
        .iter_mut()
        .zip(calibration.vdd_compensation_gradient())
        .zip(calibration.vdd_compensation_offset())
        .for_each(|((pixel, gradient), offset)| {
            let compensation = (gradient * ptat_average / gradient_scale + offset) / offset_scale;
            *pixel -= compensation * vdd_delta;
        });
}

/// Scale each pixel by its sensitivity.
pub fn sensitivity_compensation(calibration: &Calibration, image: &mut [f32]) {
    check_image_length(image);
    image
        .iter_mut()
        .zip(calibration.pixel_constants())
        .for_each(|(pixel, constant)| *pixel = SENSITIVITY_SCALE * *pixel / constant);
}

/// Run a raw frame through the full compensation pipeline.
///
/// The compensated values are written to `destination`, and the ambient temperature (in
/// decikelvin) is returned.
///
/// # Panics
/// If `destination` isn't exactly [`NUM_PIXELS`] long.
pub fn raw_to_compensated(
    calibration: &Calibration,
    baseline: &Baseline,
    frame: &RawFrame,
    destination: &mut [f32],
) -> f32 {
    check_image_length(destination);
    destination
        .iter_mut()
        .zip(frame.pixels())
        .for_each(|(output, raw)| *output = f32::from(*raw));
    let ptat_average = frame.reference_mean();
    thermal_compensation(calibration, ptat_average, destination);
    electrical_offset_compensation(baseline, destination);
    voltage_compensation(calibration, baseline, ptat_average, destination);
    sensitivity_compensation(calibration, destination);
    ambient_temperature(calibration, ptat_average)
}
