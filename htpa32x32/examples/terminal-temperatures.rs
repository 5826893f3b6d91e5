// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use linux_embedded_hal::{Delay, I2cdev};

use htpa32x32::{HeapTable, Htpa32x32Driver, DEFAULT_SENSOR_ADDRESS};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        bail!("Usage: terminal-temperatures <I2C bus> <lookup table directory> [sensor address]");
    }
    let bus_path = Path::new(&args[1]);
    let table_dir = PathBuf::from(&args[2]);
    let address = match args.get(3) {
        Some(arg) => parse_address(arg)?,
        None => DEFAULT_SENSOR_ADDRESS,
    };

    let table = HeapTable::from_files(
        table_dir.join("table.csv"),
        table_dir.join("ta.csv"),
        table_dir.join("ad.csv"),
    )
    .with_context(|| format!("Unable to load lookup table from {}", table_dir.display()))?;
    log::info!(
        "Loaded a {}x{} lookup table",
        table.rows(),
        table.columns()
    );

    let bus = I2cdev::new(bus_path)
        .with_context(|| format!("Unable to open I2C bus {}", bus_path.display()))?;
    let mut camera = Htpa32x32Driver::new(bus, Delay, address, table)?;
    let width = camera.width();
    let frame = camera.capture_temperatures()?;
    print_temperatures(frame.temperatures(), width);
    println!();
    println!("Ambient: {:.2}°C", frame.ambient_celsius());
    let report = frame.range_report();
    if !report.in_range() {
        println!(
            "{} pixels were outside of the lookup table{}",
            report.clamped_pixels,
            if report.ambient_clamped {
                ", as was the ambient temperature"
            } else {
                ""
            }
        );
    }
    camera.close();
    Ok(())
}

fn parse_address(arg: &str) -> anyhow::Result<u8> {
    let address = match arg.strip_prefix("0x") {
        Some(hex_digits) => u8::from_str_radix(hex_digits, 16)?,
        None => arg.parse()?,
    };
    Ok(address)
}

fn print_temperatures(temperatures: &[f32], width: usize) {
    for (count, temperature) in temperatures.iter().enumerate() {
        if count % width == 0 {
            println!();
        }
        print!("{:6.2} ", temperature);
    }
}
