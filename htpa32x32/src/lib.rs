// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! A pure-Rust library for reading temperatures from Heimann HTPA32x32 thermopile arrays over
//! I²C.
//!
//! The HTPA32x32 does almost no processing itself. Each sensor comes with an EEPROM of
//! calibration data, and turning the raw values into temperatures takes several compensation
//! steps followed by a bilinear lookup in a table supplied by Heimann. This crate has two levels of
//! API: a high-level driver that handles all of that for you, and a low-level API exposing each of
//! the individual steps.
//!
//! This library uses the [`embedded-hal`][embedded-hal] I²C and delay traits, so it should work on
//! any platform with an `embedded-hal` implementation. It is also `no_std` compatible, as long as
//! the lookup table fits in memory.
//!
//! [embedded-hal]: https://docs.rs/embedded-hal/*/embedded_hal/blocking/i2c/index.html
//!
//! # High-Level API
//! ```no_run
//! use htpa32x32::{HeapTable, Htpa32x32Driver};
//! use linux_embedded_hal::{Delay, I2cdev};
//!
//! // The lookup table comes from Heimann, and is specific to the sensor model.
//! let table = HeapTable::from_files("table.csv", "idx_tas.csv", "idx_ads.csv")?;
//! let i2c_bus = I2cdev::new("/dev/i2c-1")?;
//! // Default address for the sensor is 0x1A, with the EEPROM at 0x50
//! let mut sensor = Htpa32x32Driver::new(i2c_bus, Delay, 0x1A, table)?;
//! let frame = sensor.capture_temperatures()?;
//! println!("Ambient temperature: {}°C", frame.ambient_celsius());
//! println!("Top left pixel: {}°C", frame.temperature(0, 0));
//! // The electrical offsets drift, refresh them every once in a while.
//! sensor.update_compensation_parameters()?;
//! let (_i2c_bus, _delay) = sensor.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//! Creating the driver reads the calibration data from the EEPROM, wakes the sensor up, writes
//! the default analog settings to it, and captures an initial baseline (electrical offsets and
//! supply voltage). Each capture after that exposes the four blocks of the array in turn, then
//! runs the result through the compensation pipeline and the lookup table.
//!
//! # Low-Level API
//! Everything the driver does is available separately:
//! * [`Calibration`] parses the EEPROM.
//! * [`FrameCapture`] is the block-by-block capture state machine, performing one bus operation
//!   per step. This is useful when blocking until a frame is ready isn't an option.
//! * The [`calculations`] module has each compensation stage.
//! * The [`interpolation`] module does the table lookup. Custom table storage (in flash, for
//!   example) can be used by implementing [`LookupTable`].

#![no_std]
#![allow(clippy::float_cmp)]

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("Either the 'std' or 'libm' feature must be enabled.");

pub mod calculations;
pub mod capture;
pub mod common;
#[doc(hidden)]
pub mod driver;
pub mod eeprom;
#[doc(hidden)]
pub mod error;
pub mod interpolation;
pub mod register;
mod util;

/// The number of rows of pixels.
pub const HEIGHT: usize = 32;

/// The number of columns of pixels.
pub const WIDTH: usize = 32;

pub const NUM_PIXELS: usize = HEIGHT * WIDTH;

/// The number of reference (PTAT or V<sub>DD</sub>) readings in each frame.
pub const NUM_REFERENCES: usize = 8;

pub use calculations::Baseline;
pub use capture::{CaptureState, FrameCapture, RawFrame};
pub use common::{Address, FromI2C};
#[doc(inline)]
pub use driver::{Htpa32x32Driver, TemperatureMap, DEFAULT_SENSOR_ADDRESS};
pub use eeprom::{Calibration, DEFAULT_EEPROM_ADDRESS};
#[doc(inline)]
pub use error::{Error, LibraryError};
#[cfg(feature = "std")]
pub use interpolation::HeapTable;
pub use interpolation::{InterpolationTable, LookupTable, RangePolicy, RangeReport};
pub use register::*;
