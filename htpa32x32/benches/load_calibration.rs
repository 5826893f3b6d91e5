// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use htpa32x32::{Calibration, FromI2C, DEFAULT_EEPROM_ADDRESS, DEFAULT_SENSOR_ADDRESS};
use htpa32x32_test_data::{fixture_eeprom, MockSensorBus};

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Calibration Loading");

    group.bench_with_input("parse", &fixture_eeprom(), |b, eeprom| {
        b.iter(|| Calibration::from_data(eeprom))
    });
    group.bench_function("read and parse", |b| {
        b.iter_batched(
            || MockSensorBus::new(DEFAULT_SENSOR_ADDRESS, fixture_eeprom()),
            |mut bus| Calibration::from_i2c(&mut bus, DEFAULT_EEPROM_ADDRESS),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
