// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Functionality shared across the different stages of processing.
//!
//! # Glossary
//! <dl>
//! <dt>
//! AD
//! </dt><dd>
//! A digitized value, either straight off of the ADC or after compensation.
//! </dd>
//! <dt>
//! Blind
//! </dt><dd>
//! A capture taken with the sensing elements shuttered, measuring the electrical offset of each
//! pixel.
//! </dd>
//! <dt>
//! dK
//! </dt><dd>
//! Decikelvin, a tenth of a kelvin. The interpolation table and the ambient temperature use it.
//! </dd>
//! <dt>
//! PTAT
//! </dt><dd>
//! Proportional to ambient temperature. The sensor reports eight of these reference readings per
//! frame (one from each half of each block).
//! </dd>
//! <dt>
//! T<sub>a</sub>
//! </dt><dd>
//! Ambient temperature
//! </dd>
//! <dt>
//! V<sub>DD</sub>
//! </dt><dd>
//! Supply voltage. When capturing in V<sub>DD</sub> mode, the PTAT readings are replaced with
//! supply voltage readings.
//! </dd>
//! </dl>
use core::fmt;

pub trait FromI2C<I2C> {
    type Error;
    type Ok;

    /// Create an instance of a type using data retrieved over I²C.
    fn from_i2c(bus: &mut I2C, i2c_address: u8) -> Result<Self::Ok, Self::Error>;
}

/// Marker newtype for memory addresses within the EEPROM.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
pub struct Address(u16);

impl Address {
    /// Wrap the given address in an `Address`.
    ///
    /// This function is intended to be used in const contexts, in other cases the
    /// [`From`][core::convert::From] implementations are probably easier to use.
    pub const fn new(address: u16) -> Self {
        Self(address)
    }

    /// The address as it is sent over the bus (big-endian).
    pub(crate) fn as_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#X})", self.0)
    }
}

impl From<u16> for Address {
    fn from(raw_address: u16) -> Self {
        Self::new(raw_address)
    }
}

impl From<Address> for u16 {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl From<Address> for usize {
    fn from(address: Address) -> Self {
        address.0 as usize
    }
}
