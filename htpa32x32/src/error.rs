// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
#[cfg(feature = "std")]
extern crate std;

use core::fmt;

use embedded_hal::blocking::i2c;

use crate::register::Block;

/// Errors that don't involve I²C.
#[derive(Clone, Debug, PartialEq)]
pub enum LibraryError {
    /// The calibration data from the EEPROM is malformed in some way.
    InvalidCalibration(&'static str),

    /// Some other data (like an interpolation table) is malformed.
    InvalidData(&'static str),

    /// The sensor never reported that a block had finished converting.
    CaptureTimeout {
        /// The block that was being exposed.
        block: Block,

        /// How many times the status register was checked.
        attempts: u16,
    },

    /// The ambient temperature is outside of the interpolation table's range.
    ///
    /// Only returned when using [`RangePolicy::Strict`][crate::RangePolicy::Strict].
    AmbientOutOfRange(f32),

    /// A compensated pixel value is outside of the interpolation table's range.
    ///
    /// Only returned when using [`RangePolicy::Strict`][crate::RangePolicy::Strict].
    PixelOutOfRange {
        /// The row-major index of the pixel.
        index: usize,

        /// The compensated value that couldn't be looked up.
        value: f32,
    },
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::InvalidCalibration(msg) => write!(f, "Invalid calibration data: {}", msg),
            LibraryError::InvalidData(msg) => write!(f, "{}", msg),
            LibraryError::CaptureTimeout { block, attempts } => write!(
                f,
                "Timed out waiting for block {:?} after {} attempts",
                block, attempts
            ),
            LibraryError::AmbientOutOfRange(t_a) => write!(
                f,
                "Ambient temperature {} is outside of the interpolation table",
                t_a
            ),
            LibraryError::PixelOutOfRange { index, value } => write!(
                f,
                "Pixel {} (value {}) is outside of the interpolation table",
                index, value
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LibraryError {}

pub enum Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// Errors from writing to the sensor (or EEPROM).
    I2cWriteError(<I2C as i2c::Write>::Error),

    /// Errors from reading from the sensor (or EEPROM).
    I2cWriteReadError(<I2C as i2c::WriteRead>::Error),

    /// Errors originating from within this library.
    LibraryError(LibraryError),
}

impl<I2C> Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// Whether this error came from the I²C bus instead of this library.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::I2cWriteError(_) | Error::I2cWriteReadError(_))
    }
}

// Custom Debug implementation so that I2C doesn't need to implement Debug (like the one from
// linux-embedded-hal).
impl<I2C> fmt::Debug for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2cWriteError(i2c_error) => f
                .debug_tuple("Error::I2cWriteError")
                .field(i2c_error)
                .finish(),
            Error::I2cWriteReadError(i2c_error) => f
                .debug_tuple("Error::I2cWriteReadError")
                .field(i2c_error)
                .finish(),
            Error::LibraryError(err) => f.debug_tuple("Error::LibraryError").field(err).finish(),
        }
    }
}

impl<I2C> fmt::Display for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2cWriteError(i2c_error) => write!(f, "I2C write error: {:?}", i2c_error),
            Error::I2cWriteReadError(i2c_error) => {
                write!(f, "I2C write-read error: {:?}", i2c_error)
            }
            Error::LibraryError(err) => write!(f, "Library Error: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl<I2C> std::error::Error for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: std::error::Error + 'static,
    <I2C as i2c::Write>::Error: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::I2cWriteError(i2c_error) => Some(i2c_error),
            Error::I2cWriteReadError(i2c_error) => Some(i2c_error),
            Error::LibraryError(lib_err) => Some(lib_err),
        }
    }
}

impl<I2C> From<LibraryError> for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    fn from(lib_err: LibraryError) -> Self {
        Self::LibraryError(lib_err)
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use std::string::ToString;

    use htpa32x32_test_data::{MockError, MockSensorBus};

    use super::*;

    #[test]
    fn transport_errors() {
        let err: Error<MockSensorBus> = Error::I2cWriteReadError(MockError::Injected);
        assert!(err.is_transport_error());
        assert_eq!(err.to_string(), "I2C write-read error: Injected");
        let err: Error<MockSensorBus> = LibraryError::InvalidData("Bad table").into();
        assert!(!err.is_transport_error());
        assert_eq!(err.to_string(), "Library Error: Bad table");
    }

    #[test]
    fn timeout_message() {
        let err = LibraryError::CaptureTimeout {
            block: Block::Two,
            attempts: 100,
        };
        assert_eq!(
            err.to_string(),
            "Timed out waiting for block Two after 100 attempts"
        );
    }
}
