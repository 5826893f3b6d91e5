// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Fixtures and mocks for testing the `htpa32x32` crate.
mod eeprom_data;
mod i2c_mock;
pub mod table;

pub use eeprom_data::{
    fixture, fixture_eeprom, unity_eeprom, unity_eeprom_with_ambient, EepromImage, EEPROM_LENGTH,
    UNITY_AMBIENT,
};
pub use i2c_mock::{
    encode_payload, frame_to_payloads, BlockPayloads, I2cOperation, MockDelay, MockError,
    MockSensorBus, DEFAULT_EEPROM_ADDRESS, PAYLOAD_LENGTH,
};
