// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! A small lookup table, in the same CSV layout as the tables Heimann distributes.
//!
//! The table values are linear in both directions, so interpolated results are easy to check.
use std::fmt::Write;

pub const TABLE_ROWS: usize = 40;

pub const TABLE_COLUMNS: usize = 6;

/// Row breakpoints, evenly spaced 64 apart from 0.
pub fn ad_breakpoint(row: usize) -> i32 {
    64 * row as i32
}

/// Column breakpoints, from 0°C to 50°C (in decikelvin).
pub fn ta_breakpoint(column: usize) -> i32 {
    2732 + 100 * column as i32
}

pub fn table_value(row: usize, column: usize) -> i32 {
    2232 + 25 * row as i32 + 100 * column as i32
}

/// One line per row, with comma separated values.
pub fn table_csv() -> String {
    let mut csv = String::new();
    for row in 0..TABLE_ROWS {
        let values: Vec<String> = (0..TABLE_COLUMNS)
            .map(|column| table_value(row, column).to_string())
            .collect();
        // Infallible for Strings
        let _ = writeln!(csv, "{}", values.join(", "));
    }
    csv
}

/// All of the column breakpoints on one line.
pub fn ta_csv() -> String {
    let values: Vec<String> = (0..TABLE_COLUMNS)
        .map(|column| ta_breakpoint(column).to_string())
        .collect();
    values.join(",") + "\n"
}

/// One row breakpoint per line.
pub fn ad_csv() -> String {
    (0..TABLE_ROWS)
        .map(|row| format!("{}\n", ad_breakpoint(row)))
        .collect()
}
