// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

use core::fmt::Debug;
use core::num::NonZeroU32;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c;
use log::{debug, trace, warn};
use paste::paste;

use crate::calculations::{raw_to_compensated, Baseline};
use crate::capture::{CaptureState, FrameCapture, RawFrame, DEFAULT_MAX_POLL_ATTEMPTS};
use crate::common::FromI2C;
use crate::eeprom::{Calibration, DEFAULT_EEPROM_ADDRESS};
use crate::error::Error;
use crate::interpolation::{
    compensated_to_temperatures, decikelvin_to_celsius, LookupTable, RangePolicy, RangeReport,
};
use crate::register::{write_register, CaptureMode, ConfigurationRegister, Register, SensorSettings};
use crate::{HEIGHT, NUM_PIXELS, WIDTH};

/// The default I²C address of the sensor.
pub const DEFAULT_SENSOR_ADDRESS: u8 = 0x1A;

/// How long to wait after writing a setting before doing anything else.
const SETTING_DELAY_MS: u8 = 5;

/// How long to wait between checks of the status register.
const POLL_DELAY_MS: u8 = 5;

/// DRY macro for the set_* methods in `Htpa32x32Driver` that write a single sensor setting.
macro_rules! set_sensor_setting {
    { $field:ident, $register:ident, $doc:literal } => {
    paste! {
        #[doc = $doc]
        ///
        /// Nothing is written if the value is unchanged.
        pub fn [< set_ $field >](&mut self, new_value: u8) -> Result<(), Error<I2C>> {
            if self.settings.$field != new_value {
                write_register(&mut self.bus, self.address, Register::$register, new_value)?;
                self.delay.delay_ms(SETTING_DELAY_MS);
                self.settings.$field = new_value;
            }
            Ok(())
        }
    }};
}

/// A fully processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TemperatureMap {
    temperatures: [f32; NUM_PIXELS],
    ambient_temperature: f32,
    range_report: RangeReport,
}

impl TemperatureMap {
    /// Pixel temperatures in degrees Celsius, in row-major order.
    pub fn temperatures(&self) -> &[f32; NUM_PIXELS] {
        &self.temperatures
    }

    /// The temperature of a single pixel, in degrees Celsius.
    pub fn temperature(&self, row: usize, column: usize) -> f32 {
        self.temperatures[row * WIDTH + column]
    }

    /// The ambient temperature, in decikelvin.
    pub fn ambient_temperature(&self) -> f32 {
        self.ambient_temperature
    }

    /// The ambient temperature, in degrees Celsius.
    pub fn ambient_celsius(&self) -> f32 {
        decikelvin_to_celsius(self.ambient_temperature)
    }

    /// What (if anything) was outside of the lookup table.
    pub fn range_report(&self) -> RangeReport {
        self.range_report
    }

    pub fn into_temperatures(self) -> [f32; NUM_PIXELS] {
        self.temperatures
    }
}

/// A driver for the Heimann HTPA32x32 thermopile array.
///
/// The sensor has no processing onboard, so on top of the calibration data stored in its EEPROM,
/// the driver needs a lookup table (see [`LookupTable`]) to turn compensated values into
/// temperatures. Captures are blocking, with the driver polling the sensor (and waiting between
/// polls with the provided delay) until each block of the array is ready.
///
/// The electrical offsets and supply voltage the compensation depends on drift over time, so
/// they should be refreshed every so often, either manually with
/// [`update_compensation_parameters`][Htpa32x32Driver::update_compensation_parameters] or
/// automatically by setting a [refresh interval][Htpa32x32Driver::set_refresh_interval].
#[derive(Clone, Debug)]
pub struct Htpa32x32Driver<I2C, D, T> {
    /// The I²C bus this sensor (and its EEPROM) are accessible on.
    bus: I2C,

    delay: D,

    /// The I²C address of the sensor.
    address: u8,

    /// The factory calibration data for this specific sensor.
    calibration: Calibration,

    /// The electrical offsets and supply voltage from the most recent baseline capture.
    baseline: Baseline,

    lookup_table: T,

    /// The analog settings currently written to the sensor.
    settings: SensorSettings,

    max_poll_attempts: u16,

    range_policy: RangePolicy,

    /// Refresh the baseline after this many captures.
    refresh_interval: Option<NonZeroU32>,

    captures_since_refresh: u32,

    /// The most recent ambient temperature, in decikelvin.
    ambient_temperature: Option<f32>,
}

impl<I2C, D, T> Htpa32x32Driver<I2C, D, T>
where
    I2C: i2c::WriteRead + i2c::Write,
    D: DelayMs<u8>,
    T: LookupTable,
{
    /// Create a new driver, reading the calibration data from the EEPROM at its default address.
    pub fn new(bus: I2C, delay: D, address: u8, lookup_table: T) -> Result<Self, Error<I2C>> {
        Self::new_with_eeprom_address(bus, delay, address, DEFAULT_EEPROM_ADDRESS, lookup_table)
    }

    /// Create a new driver, with the calibration EEPROM at a non-default address.
    pub fn new_with_eeprom_address(
        bus: I2C,
        delay: D,
        address: u8,
        eeprom_address: u8,
        lookup_table: T,
    ) -> Result<Self, Error<I2C>> {
        let mut bus = bus;
        let calibration = Calibration::from_i2c(&mut bus, eeprom_address)?;
        Self::new_with_calibration(bus, delay, address, calibration, lookup_table)
    }

    /// Create a driver for a sensor with already loaded calibration data.
    ///
    /// The sensor is woken up, configured with the [default settings][SensorSettings::default],
    /// and an initial baseline is captured before this returns.
    pub fn new_with_calibration(
        bus: I2C,
        delay: D,
        address: u8,
        calibration: Calibration,
        lookup_table: T,
    ) -> Result<Self, Error<I2C>> {
        let mut driver = Self {
            bus,
            delay,
            address,
            calibration,
            baseline: Baseline::default(),
            lookup_table,
            settings: SensorSettings::default(),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            range_policy: RangePolicy::default(),
            refresh_interval: None,
            captures_since_refresh: 0,
            ambient_temperature: None,
        };
        driver.wake_up()?;
        driver.write_settings()?;
        driver.update_compensation_parameters()?;
        Ok(driver)
    }

    fn wake_up(&mut self) -> Result<(), Error<I2C>> {
        let wake_up = ConfigurationRegister::wake_up();
        write_register(
            &mut self.bus,
            self.address,
            Register::Configuration,
            wake_up.into(),
        )?;
        self.delay.delay_ms(SETTING_DELAY_MS);
        debug!("Woke up sensor at {:#04X}", self.address);
        Ok(())
    }

    fn write_settings(&mut self) -> Result<(), Error<I2C>> {
        for (register, value) in self.settings.registers() {
            write_register(&mut self.bus, self.address, register, value)?;
            self.delay.delay_ms(SETTING_DELAY_MS);
        }
        debug!("Wrote sensor settings {:?}", self.settings);
        Ok(())
    }

    /// Write a complete set of analog settings to the sensor.
    ///
    /// To use the settings chosen at the factory, pass in
    /// [`Calibration::factory_settings`].
    pub fn apply_settings(&mut self, settings: SensorSettings) -> Result<(), Error<I2C>> {
        self.settings = settings;
        self.write_settings()
    }

    /// The analog settings currently in use.
    pub fn settings(&self) -> SensorSettings {
        self.settings
    }

    set_sensor_setting! {
        mbit,
        Mbit,
        "Set the ADC resolution and reference voltage (MBIT_TRIM)."
    }

    set_sensor_setting! {
        bias_top,
        BiasTop,
        "Set the bias current for the top half of the array."
    }

    set_sensor_setting! {
        bias_bottom,
        BiasBottom,
        "Set the bias current for the bottom half of the array."
    }

    set_sensor_setting! {
        clock,
        Clock,
        "Set the clock trim."
    }

    set_sensor_setting! {
        bpa_top,
        BpaTop,
        "Set the preamplifier bias current for the top half of the array."
    }

    set_sensor_setting! {
        bpa_bottom,
        BpaBottom,
        "Set the preamplifier bias current for the bottom half of the array."
    }

    set_sensor_setting! {
        pull_up,
        PullUp,
        "Set the SDA and SCL pull up resistors."
    }

    /// Capture a full frame, without any processing.
    pub fn capture_raw(&mut self, mode: CaptureMode) -> Result<RawFrame, Error<I2C>> {
        let mut capture = FrameCapture::with_max_attempts(mode, self.max_poll_attempts);
        loop {
            match capture.step(&mut self.bus, self.address)? {
                CaptureState::WaitReady { .. } => self.delay.delay_ms(POLL_DELAY_MS),
                CaptureState::Complete => break,
                _ => (),
            }
        }
        trace!("Captured {:?} frame", mode);
        // The loop only exits on completion.
        Ok(capture.into_frame().unwrap_or_default())
    }

    /// Capture a new baseline, updating the electrical offsets and supply voltage.
    ///
    /// Only the baseline is changed; the calibration data is left alone.
    pub fn update_compensation_parameters(&mut self) -> Result<(), Error<I2C>> {
        let frame = self.capture_raw(CaptureMode::BASELINE)?;
        self.baseline = Baseline::from_frame(&frame);
        self.captures_since_refresh = 0;
        debug!(
            "Updated baseline (V_DD average {})",
            self.baseline.vdd_average()
        );
        Ok(())
    }

    fn refresh_if_due(&mut self) -> Result<(), Error<I2C>> {
        if let Some(interval) = self.refresh_interval {
            if self.captures_since_refresh >= interval.get() {
                self.update_compensation_parameters()?;
            }
        }
        Ok(())
    }

    /// Capture a frame and compensate it, without converting to temperatures.
    ///
    /// The ambient temperature (in decikelvin) is returned.
    ///
    /// # Panics
    /// If `destination` doesn't have exactly one value per pixel.
    pub fn capture_compensated_to(&mut self, destination: &mut [f32]) -> Result<f32, Error<I2C>> {
        // Fail before touching the bus
        assert_eq!(
            destination.len(),
            NUM_PIXELS,
            "The destination buffer must have a value for every pixel"
        );
        self.refresh_if_due()?;
        let frame = self.capture_raw(CaptureMode::NORMAL)?;
        self.captures_since_refresh = self.captures_since_refresh.saturating_add(1);
        let t_a = raw_to_compensated(&self.calibration, &self.baseline, &frame, destination);
        self.ambient_temperature = Some(t_a);
        Ok(t_a)
    }

    /// Capture a frame, writing temperatures (in degrees Celsius) to `destination`.
    ///
    /// The ambient temperature (in decikelvin) is returned along with a report of what had to be
    /// clamped to fit in the lookup table.
    ///
    /// # Panics
    /// If `destination` doesn't have exactly one value per pixel.
    pub fn capture_temperatures_to(
        &mut self,
        destination: &mut [f32],
    ) -> Result<(f32, RangeReport), Error<I2C>> {
        let t_a = self.capture_compensated_to(destination)?;
        let report =
            compensated_to_temperatures(&self.lookup_table, t_a, self.range_policy, destination)?;
        Ok((t_a, report))
    }

    /// Capture a frame, returning the temperatures.
    pub fn capture_temperatures(&mut self) -> Result<TemperatureMap, Error<I2C>> {
        let mut temperatures = [0f32; NUM_PIXELS];
        let (ambient_temperature, range_report) =
            self.capture_temperatures_to(&mut temperatures)?;
        Ok(TemperatureMap {
            temperatures,
            ambient_temperature,
            range_report,
        })
    }

    /// Put the sensor to sleep, and give back the bus and delay.
    ///
    /// Failing to put the sensor to sleep is logged, but otherwise ignored.
    pub fn close(self) -> (I2C, D)
    where
        <I2C as i2c::Write>::Error: Debug,
    {
        let mut bus = self.bus;
        let sleep = u8::from(ConfigurationRegister::sleep());
        let result = write_register(&mut bus, self.address, Register::Configuration, sleep);
        if let Err(Error::I2cWriteError(i2c_error)) = result {
            warn!("Unable to put the sensor to sleep: {:?}", i2c_error);
        }
        (bus, self.delay)
    }

    /// Get the most recent ambient temperature calculation, in decikelvin.
    ///
    /// This is `None` until a frame has been captured.
    pub fn ambient_temperature(&self) -> Option<f32> {
        self.ambient_temperature
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn lookup_table(&self) -> &T {
        &self.lookup_table
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// The maximum number of times the status register is checked for each block.
    pub fn max_poll_attempts(&self) -> u16 {
        self.max_poll_attempts
    }

    pub fn set_max_poll_attempts(&mut self, attempts: u16) {
        self.max_poll_attempts = attempts;
    }

    pub fn range_policy(&self) -> RangePolicy {
        self.range_policy
    }

    /// Choose what happens when values are outside of the lookup table.
    ///
    /// The default is to [clamp][RangePolicy::Clamp].
    pub fn set_range_policy(&mut self, policy: RangePolicy) {
        self.range_policy = policy;
    }

    pub fn refresh_interval(&self) -> Option<NonZeroU32> {
        self.refresh_interval
    }

    /// Automatically refresh the baseline every `interval` captures (or never, with `None`).
    pub fn set_refresh_interval(&mut self, interval: Option<NonZeroU32>) {
        self.refresh_interval = interval;
    }

    /// The height of the thermal image, in pixels.
    pub fn height(&self) -> usize {
        HEIGHT
    }

    /// The width of the thermal image, in pixels.
    pub fn width(&self) -> usize {
        WIDTH
    }
}
