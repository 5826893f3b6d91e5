// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Converting compensated values to temperatures with a lookup table.
//!
//! The table is indexed by ambient temperature along its columns, and compensated value (offset by
//! [`TABLE_OFFSET`]) along its rows. Both the ambient temperature and the table values are in
//! decikelvin. Temperatures are found by bilinear interpolation between the four surrounding table
//! entries.
#[cfg(feature = "std")]
extern crate std;

use arrayvec::ArrayVec;
use log::warn;
// Only needed for the float functions when building without std.
#[allow(unused_imports)]
use num_traits::Float;

use crate::error::LibraryError;

/// Added to compensated values before looking them up in the table.
pub const TABLE_OFFSET: f32 = 1024.0;

/// The table rows are spaced 2<sup>`AD_EXP_BITS`</sup> apart.
pub const AD_EXP_BITS: u32 = 6;

/// The spacing between table columns, in decikelvin.
pub const TA_EQUIDISTANCE: f32 = 100.0;

/// The spacing between table rows.
pub const AD_EQUIDISTANCE: f32 = 64.0;

/// A temperature lookup table.
///
/// Implementations must have at least two breakpoints along each axis, in ascending order.
pub trait LookupTable {
    /// The ambient temperatures (in decikelvin) for each column.
    fn ta_breakpoints(&self) -> &[f32];

    /// The offset compensated values for each row.
    fn ad_breakpoints(&self) -> &[f32];

    /// The temperature (in decikelvin) at the given position.
    fn value(&self, row: usize, column: usize) -> f32;
}

impl<T> LookupTable for &T
where
    T: LookupTable + ?Sized,
{
    fn ta_breakpoints(&self) -> &[f32] {
        (*self).ta_breakpoints()
    }

    fn ad_breakpoints(&self) -> &[f32] {
        (*self).ad_breakpoints()
    }

    fn value(&self, row: usize, column: usize) -> f32 {
        (*self).value(row, column)
    }
}

/// What to do when a value falls outside of the lookup table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RangePolicy {
    /// Clamp to the nearest edge of the table, and keep going.
    #[default]
    Clamp,

    /// Stop with an error.
    Strict,
}

/// What had to be clamped while converting a frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RangeReport {
    /// The ambient temperature was outside of the table columns.
    pub ambient_clamped: bool,

    /// The number of pixels outside of the table rows.
    pub clamped_pixels: usize,
}

impl RangeReport {
    /// Whether every value was within the table.
    pub fn in_range(&self) -> bool {
        !self.ambient_clamped && self.clamped_pixels == 0
    }
}

/// The column pair an ambient temperature falls between.
///
/// This is the same for every pixel in a frame, so it's only found once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientColumn {
    /// The left column of the pair.
    pub column: usize,

    /// How far past the left column's breakpoint the ambient temperature is.
    pub delta: f32,

    /// The ambient temperature had to be clamped to the table.
    pub clamped: bool,
}

/// The row pair a compensated value falls between.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdRow {
    /// The top row of the pair.
    pub row: usize,

    /// The compensated value plus [`TABLE_OFFSET`], clamped to the table.
    pub value: f32,

    /// The value had to be clamped to the table.
    pub clamped: bool,
}

/// Clamp `value` to be within `[first, last]`, also reporting if it was outside.
fn clamp_to(value: f32, breakpoints: &[f32]) -> (f32, bool) {
    let first = breakpoints[0];
    let last = breakpoints[breakpoints.len() - 1];
    let clamped = !(first..=last).contains(&value);
    (value.max(first).min(last), clamped)
}

/// Find the columns surrounding the given ambient temperature.
pub fn ambient_column<T>(table: &T, t_a: f32) -> AmbientColumn
where
    T: LookupTable + ?Sized,
{
    let breakpoints = table.ta_breakpoints();
    let (t_a, clamped) = clamp_to(t_a, breakpoints);
    // Temperatures on (or past) the last breakpoint use the last column pair
    let column = breakpoints
        .windows(2)
        .position(|pair| pair[0] <= t_a && t_a < pair[1])
        .unwrap_or(breakpoints.len() - 2);
    AmbientColumn {
        column,
        delta: t_a - breakpoints[column],
        clamped,
    }
}

/// Find the rows surrounding the given compensated value.
///
/// The row is found by shifting the offset value instead of searching, as the table rows are
/// evenly spaced [`AD_EQUIDISTANCE`] apart.
pub fn ad_row<T>(table: &T, compensated: f32) -> AdRow
where
    T: LookupTable + ?Sized,
{
    let breakpoints = table.ad_breakpoints();
    let (value, clamped) = clamp_to(compensated + TABLE_OFFSET, breakpoints);
    let row = ((value.round() as i64) >> AD_EXP_BITS).max(0) as usize;
    AdRow {
        row: row.min(breakpoints.len() - 2),
        value,
        clamped,
    }
}

/// Bilinear interpolation between the four table entries surrounding a point.
///
/// The result is in decikelvin.
pub fn interpolate<T>(table: &T, column: &AmbientColumn, row: &AdRow) -> f32
where
    T: LookupTable + ?Sized,
{
    let (c, r) = (column.column, row.row);
    let ta_fraction = column.delta / TA_EQUIDISTANCE;
    let upper = (table.value(r, c + 1) - table.value(r, c)) * ta_fraction + table.value(r, c);
    let lower =
        (table.value(r + 1, c + 1) - table.value(r + 1, c)) * ta_fraction + table.value(r + 1, c);
    (lower - upper) * (row.value - table.ad_breakpoints()[r]) / AD_EQUIDISTANCE + upper
}

pub fn decikelvin_to_celsius(temperature: f32) -> f32 {
    temperature / 10f32 - 273f32
}

/// Look up a single compensated value, returning a temperature in degrees Celsius.
///
/// Values outside of the table are clamped.
pub fn temperature<T>(table: &T, t_a: f32, compensated: f32) -> f32
where
    T: LookupTable + ?Sized,
{
    let column = ambient_column(table, t_a);
    let row = ad_row(table, compensated);
    decikelvin_to_celsius(interpolate(table, &column, &row))
}

/// Convert a buffer of compensated values to temperatures (in degrees Celsius) in place.
///
/// With [`RangePolicy::Strict`] the conversion stops at the first value outside of the table,
/// leaving the buffer partially converted.
pub fn compensated_to_temperatures<T>(
    table: &T,
    t_a: f32,
    policy: RangePolicy,
    image: &mut [f32],
) -> Result<RangeReport, LibraryError>
where
    T: LookupTable + ?Sized,
{
    let column = ambient_column(table, t_a);
    if column.clamped {
        match policy {
            RangePolicy::Strict => return Err(LibraryError::AmbientOutOfRange(t_a)),
            RangePolicy::Clamp => warn!(
                "Ambient temperature {} dK is outside of the lookup table, clamping",
                t_a
            ),
        }
    }
    let mut report = RangeReport {
        ambient_clamped: column.clamped,
        clamped_pixels: 0,
    };
    for (index, pixel) in image.iter_mut().enumerate() {
        let row = ad_row(table, *pixel);
        if row.clamped {
            if policy == RangePolicy::Strict {
                return Err(LibraryError::PixelOutOfRange {
                    index,
                    value: *pixel,
                });
            }
            report.clamped_pixels += 1;
        }
        *pixel = decikelvin_to_celsius(interpolate(table, &column, &row));
    }
    if report.clamped_pixels > 0 {
        warn!(
            "{} pixels were outside of the lookup table and clamped",
            report.clamped_pixels
        );
    }
    Ok(report)
}

fn check_breakpoints(breakpoints: &[f32]) -> Result<(), LibraryError> {
    if breakpoints.len() < 2 {
        Err(LibraryError::InvalidData(
            "Lookup tables need at least two breakpoints along each axis",
        ))
    } else if !breakpoints.windows(2).all(|pair| pair[0] < pair[1]) {
        Err(LibraryError::InvalidData(
            "Lookup table breakpoints must be in ascending order",
        ))
    } else {
        Ok(())
    }
}

/// Rows are found by shifting instead of searching, so the row breakpoints have to be exactly
/// [`AD_EQUIDISTANCE`] apart, starting from 0.
fn check_ad_breakpoints(breakpoints: &[f32]) -> Result<(), LibraryError> {
    check_breakpoints(breakpoints)?;
    let equidistant = breakpoints
        .iter()
        .enumerate()
        .all(|(index, breakpoint)| *breakpoint == index as f32 * AD_EQUIDISTANCE);
    if equidistant {
        Ok(())
    } else {
        Err(LibraryError::InvalidData(
            "Lookup table row breakpoints must be evenly spaced from 0",
        ))
    }
}

/// Split a line of comma (or whitespace) separated numbers.
fn fields(text: &str) -> impl Iterator<Item = Result<f32, LibraryError>> + '_ {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .map(|field| {
            field.parse::<f32>().map_err(|_| {
                LibraryError::InvalidData("Unable to parse a number in the lookup table")
            })
        })
}

fn table_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn parse_array<const N: usize>(text: &str) -> Result<[f32; N], LibraryError> {
    let mut values = ArrayVec::<f32, N>::new();
    for value in fields(text) {
        values
            .try_push(value?)
            .map_err(|_| LibraryError::InvalidData("Too many values in the lookup table"))?;
    }
    values
        .into_inner()
        .map_err(|_| LibraryError::InvalidData("Not enough values in the lookup table"))
}

/// A lookup table with its size fixed at compile time.
///
/// This does not need an allocator, but large tables can take up a lot of stack space while being
/// parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct InterpolationTable<const ROWS: usize, const COLUMNS: usize> {
    values: [[f32; COLUMNS]; ROWS],
    ta_breakpoints: [f32; COLUMNS],
    ad_breakpoints: [f32; ROWS],
}

impl<const ROWS: usize, const COLUMNS: usize> InterpolationTable<ROWS, COLUMNS> {
    pub fn new(
        values: [[f32; COLUMNS]; ROWS],
        ta_breakpoints: [f32; COLUMNS],
        ad_breakpoints: [f32; ROWS],
    ) -> Result<Self, LibraryError> {
        check_breakpoints(&ta_breakpoints)?;
        check_ad_breakpoints(&ad_breakpoints)?;
        Ok(Self {
            values,
            ta_breakpoints,
            ad_breakpoints,
        })
    }

    /// Parse a table from CSV text.
    ///
    /// `table` has one line per row. The breakpoints can be given either all on one line, or one
    /// per line.
    pub fn from_csv(
        table: &str,
        ta_breakpoints: &str,
        ad_breakpoints: &str,
    ) -> Result<Self, LibraryError> {
        let ta_breakpoints = parse_array::<COLUMNS>(ta_breakpoints)?;
        let ad_breakpoints = parse_array::<ROWS>(ad_breakpoints)?;
        let mut rows = ArrayVec::<[f32; COLUMNS], ROWS>::new();
        for line in table_lines(table) {
            rows.try_push(parse_array::<COLUMNS>(line)?)
                .map_err(|_| LibraryError::InvalidData("Too many rows in the lookup table"))?;
        }
        let values = rows
            .into_inner()
            .map_err(|_| LibraryError::InvalidData("Not enough rows in the lookup table"))?;
        Self::new(values, ta_breakpoints, ad_breakpoints)
    }
}

impl<const ROWS: usize, const COLUMNS: usize> LookupTable for InterpolationTable<ROWS, COLUMNS> {
    fn ta_breakpoints(&self) -> &[f32] {
        &self.ta_breakpoints
    }

    fn ad_breakpoints(&self) -> &[f32] {
        &self.ad_breakpoints
    }

    fn value(&self, row: usize, column: usize) -> f32 {
        self.values[row][column]
    }
}

/// A lookup table sized at runtime, for when the table is loaded from files.
#[cfg(feature = "std")]
#[derive(Clone, Debug, PartialEq)]
pub struct HeapTable {
    values: std::vec::Vec<f32>,
    ta_breakpoints: std::vec::Vec<f32>,
    ad_breakpoints: std::vec::Vec<f32>,
}

#[cfg(feature = "std")]
impl HeapTable {
    /// Parse a table from CSV text, sizing it from the breakpoints.
    ///
    /// Each line of `table` must have one value for each ambient temperature breakpoint, and there
    /// must be one line for each compensated value breakpoint.
    pub fn from_csv(
        table: &str,
        ta_breakpoints: &str,
        ad_breakpoints: &str,
    ) -> Result<Self, LibraryError> {
        use std::vec::Vec;

        let ta_breakpoints = fields(ta_breakpoints).collect::<Result<Vec<_>, _>>()?;
        let ad_breakpoints = fields(ad_breakpoints).collect::<Result<Vec<_>, _>>()?;
        check_breakpoints(&ta_breakpoints)?;
        check_ad_breakpoints(&ad_breakpoints)?;
        let mut values = Vec::with_capacity(ta_breakpoints.len() * ad_breakpoints.len());
        let mut row_count = 0;
        for line in table_lines(table) {
            let row_start = values.len();
            for value in fields(line) {
                values.push(value?);
            }
            if values.len() - row_start != ta_breakpoints.len() {
                return Err(LibraryError::InvalidData(
                    "Lookup table rows must have a value for every ambient temperature",
                ));
            }
            row_count += 1;
        }
        if row_count != ad_breakpoints.len() {
            return Err(LibraryError::InvalidData(
                "The lookup table must have a row for every compensated value breakpoint",
            ));
        }
        Ok(Self {
            values,
            ta_breakpoints,
            ad_breakpoints,
        })
    }

    /// Load a table from three CSV files.
    ///
    /// Malformed tables are reported as [`InvalidData`][std::io::ErrorKind::InvalidData] I/O
    /// errors.
    pub fn from_files<P: AsRef<std::path::Path>>(
        table: P,
        ta_breakpoints: P,
        ad_breakpoints: P,
    ) -> std::io::Result<Self> {
        use std::fs::read_to_string;
        use std::io;

        let table = read_to_string(table)?;
        let ta_breakpoints = read_to_string(ta_breakpoints)?;
        let ad_breakpoints = read_to_string(ad_breakpoints)?;
        Self::from_csv(&table, &ta_breakpoints, &ad_breakpoints)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn rows(&self) -> usize {
        self.ad_breakpoints.len()
    }

    pub fn columns(&self) -> usize {
        self.ta_breakpoints.len()
    }
}

#[cfg(feature = "std")]
impl LookupTable for HeapTable {
    fn ta_breakpoints(&self) -> &[f32] {
        &self.ta_breakpoints
    }

    fn ad_breakpoints(&self) -> &[f32] {
        &self.ad_breakpoints
    }

    fn value(&self, row: usize, column: usize) -> f32 {
        self.values[row * self.columns() + column]
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use float_cmp::assert_approx_eq;
    use htpa32x32_test_data::table::{
        ad_breakpoint, ad_csv, ta_breakpoint, ta_csv, table_csv, table_value, TABLE_COLUMNS,
        TABLE_ROWS,
    };

    use super::*;

    type FixtureTable = InterpolationTable<TABLE_ROWS, TABLE_COLUMNS>;

    fn fixture_table() -> FixtureTable {
        FixtureTable::from_csv(&table_csv(), &ta_csv(), &ad_csv()).unwrap()
    }

    #[test]
    fn parse_fixture() {
        let table = fixture_table();
        assert_eq!(table.ta_breakpoints().len(), TABLE_COLUMNS);
        assert_eq!(table.ad_breakpoints().len(), TABLE_ROWS);
        for row in 0..TABLE_ROWS {
            assert_eq!(table.ad_breakpoints()[row], ad_breakpoint(row) as f32);
            for column in 0..TABLE_COLUMNS {
                assert_eq!(table.value(row, column), table_value(row, column) as f32);
            }
        }
        for column in 0..TABLE_COLUMNS {
            assert_eq!(table.ta_breakpoints()[column], ta_breakpoint(column) as f32);
        }
    }

    #[test]
    fn parse_errors() {
        // Wrong number of columns in a row
        let short_row = std::format!("{}\n1,2", table_csv());
        assert!(FixtureTable::from_csv(&short_row, &ta_csv(), &ad_csv()).is_err());
        // Too many rows
        let mut extra_row = table_csv();
        extra_row.push_str(table_csv().lines().next().unwrap());
        assert!(FixtureTable::from_csv(&extra_row, &ta_csv(), &ad_csv()).is_err());
        // Not a number
        let garbage = table_csv().replacen('5', "x", 1);
        assert!(FixtureTable::from_csv(&garbage, &ta_csv(), &ad_csv()).is_err());
        // Descending breakpoints
        let ta = ta_csv();
        let mut descending = ta.split(',').map(str::trim).collect::<std::vec::Vec<_>>();
        descending.reverse();
        let descending = descending.join(",");
        assert!(FixtureTable::from_csv(&table_csv(), &descending, &ad_csv()).is_err());
    }

    #[test]
    fn uneven_row_breakpoints() {
        // Ascending, but not spaced the way rows are looked up
        let shifted: std::string::String = (0..TABLE_ROWS)
            .map(|row| std::format!("{}\n", ad_breakpoint(row) + 10))
            .collect();
        assert!(FixtureTable::from_csv(&table_csv(), &ta_csv(), &shifted).is_err());
        assert!(HeapTable::from_csv(&table_csv(), &ta_csv(), &shifted).is_err());
        let stretched: std::string::String = (0..TABLE_ROWS)
            .map(|row| std::format!("{}\n", ad_breakpoint(row) * 2))
            .collect();
        assert!(FixtureTable::from_csv(&table_csv(), &ta_csv(), &stretched).is_err());
        let values = [[0f32; TABLE_COLUMNS]; TABLE_ROWS];
        let ta_breakpoints = [0f32, 100.0, 200.0, 300.0, 400.0, 500.0];
        let mut ad_breakpoints = [0f32; TABLE_ROWS];
        ad_breakpoints
            .iter_mut()
            .enumerate()
            .for_each(|(row, value)| *value = row as f32 * AD_EQUIDISTANCE);
        assert!(FixtureTable::new(values, ta_breakpoints, ad_breakpoints).is_ok());
        ad_breakpoints[TABLE_ROWS - 1] += 1.0;
        assert!(FixtureTable::new(values, ta_breakpoints, ad_breakpoints).is_err());
    }

    #[test]
    fn heap_table_matches() {
        let fixed = fixture_table();
        let heap = HeapTable::from_csv(&table_csv(), &ta_csv(), &ad_csv()).unwrap();
        assert_eq!(heap.rows(), TABLE_ROWS);
        assert_eq!(heap.columns(), TABLE_COLUMNS);
        assert_eq!(heap.ta_breakpoints(), fixed.ta_breakpoints());
        assert_eq!(heap.ad_breakpoints(), fixed.ad_breakpoints());
        for row in 0..TABLE_ROWS {
            for column in 0..TABLE_COLUMNS {
                assert_eq!(heap.value(row, column), fixed.value(row, column));
            }
        }
    }

    #[test]
    fn heap_table_errors() {
        let missing_row = table_csv().lines().skip(1).collect::<std::vec::Vec<_>>().join("\n");
        assert!(HeapTable::from_csv(&missing_row, &ta_csv(), &ad_csv()).is_err());
        let short_row = std::format!("{}\n1,2", table_csv());
        assert!(HeapTable::from_csv(&short_row, &ta_csv(), &ad_csv()).is_err());
    }

    #[test]
    fn heap_table_files() {
        let dir = std::env::temp_dir().join(std::format!("htpa32x32-table-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let paths = ["table.csv", "idx_tas.csv", "idx_ads.csv"].map(|name| dir.join(name));
        std::fs::write(&paths[0], table_csv()).unwrap();
        std::fs::write(&paths[1], ta_csv()).unwrap();
        std::fs::write(&paths[2], ad_csv()).unwrap();
        let table = HeapTable::from_files(&paths[0], &paths[1], &paths[2]).unwrap();
        assert_eq!(table.columns(), TABLE_COLUMNS);
        std::fs::write(&paths[1], "1,2").unwrap();
        let err = HeapTable::from_files(&paths[0], &paths[1], &paths[2]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn columns() {
        let table = fixture_table();
        let first = ta_breakpoint(0) as f32;
        let column = ambient_column(&table, first + 150.0);
        assert_eq!(column.column, 1);
        assert_eq!(column.delta, 50.0);
        assert!(!column.clamped);
        // Exactly on the last breakpoint is in range, using the last pair of columns
        let last = ta_breakpoint(TABLE_COLUMNS - 1) as f32;
        let column = ambient_column(&table, last);
        assert_eq!(column.column, TABLE_COLUMNS - 2);
        assert_eq!(column.delta, TA_EQUIDISTANCE);
        assert!(!column.clamped);
    }

    #[test]
    fn rows() {
        let table = fixture_table();
        let row = ad_row(&table, 0.0);
        assert_eq!(row.row, 16);
        assert_eq!(row.value, TABLE_OFFSET);
        assert!(!row.clamped);
        // 1024 + 100 = 1124, which rounds to row 17 (1088)
        let row = ad_row(&table, 100.0);
        assert_eq!(row.row, 17);
        assert_eq!(row.value, 1124.0);
    }

    #[test]
    fn clamp_ambient() {
        let table = fixture_table();
        let column = ambient_column(&table, 0.0);
        assert!(column.clamped);
        assert_eq!(column.column, 0);
        assert_eq!(column.delta, 0.0);
        let column = ambient_column(&table, 10_000.0);
        assert!(column.clamped);
        assert_eq!(column.column, TABLE_COLUMNS - 2);
        assert_eq!(column.delta, TA_EQUIDISTANCE);
    }

    #[test]
    fn clamp_rows() {
        let table = fixture_table();
        let row = ad_row(&table, -5000.0);
        assert!(row.clamped);
        assert_eq!(row.row, 0);
        assert_eq!(row.value, ad_breakpoint(0) as f32);
        let row = ad_row(&table, 1e9);
        assert!(row.clamped);
        assert_eq!(row.row, TABLE_ROWS - 2);
        assert_eq!(row.value, ad_breakpoint(TABLE_ROWS - 1) as f32);
    }

    #[test]
    fn exact_entry() {
        let table = fixture_table();
        // Ambient on a column breakpoint and a value on a row breakpoint is the table entry.
        let t_a = ta_breakpoint(2) as f32;
        let compensated = ad_breakpoint(20) as f32 - TABLE_OFFSET;
        assert_eq!(
            temperature(&table, t_a, compensated),
            decikelvin_to_celsius(table_value(20, 2) as f32)
        );
    }

    #[test]
    fn midpoint() {
        let table = fixture_table();
        let t_a = ta_breakpoint(1) as f32 + TA_EQUIDISTANCE / 2.0;
        let compensated = ad_breakpoint(10) as f32 + 16.0 - TABLE_OFFSET;
        let expected_dk = {
            let top = (table_value(10, 1) + table_value(10, 2)) as f32 / 2.0;
            let bottom = (table_value(11, 1) + table_value(11, 2)) as f32 / 2.0;
            top + (bottom - top) * 16.0 / AD_EQUIDISTANCE
        };
        assert_approx_eq!(
            f32,
            temperature(&table, t_a, compensated),
            decikelvin_to_celsius(expected_dk),
            epsilon = 0.0001
        );
    }

    #[test]
    fn interpolation_bounds() {
        let table = fixture_table();
        // Sweep through points inside each cell (staying below the rounding boundary halfway
        // between rows).
        for column in 0..(TABLE_COLUMNS - 1) {
            for row in 0..(TABLE_ROWS - 1) {
                for (ta_step, ad_step) in [(0.0, 0.0), (25.0, 10.0), (60.0, 31.0), (99.0, 5.5)] {
                    let t_a = ta_breakpoint(column) as f32 + ta_step;
                    let compensated = ad_breakpoint(row) as f32 + ad_step - TABLE_OFFSET;
                    let result = temperature(&table, t_a, compensated);
                    let corners = [
                        table_value(row, column),
                        table_value(row, column + 1),
                        table_value(row + 1, column),
                        table_value(row + 1, column + 1),
                    ]
                    .map(|value| decikelvin_to_celsius(value as f32));
                    let min = corners.iter().copied().fold(f32::INFINITY, f32::min);
                    let max = corners.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    assert!(
                        result >= min - 0.001 && result <= max + 0.001,
                        "{} is outside of [{}, {}] at row {} column {}",
                        result,
                        min,
                        max,
                        row,
                        column
                    );
                }
            }
        }
    }

    #[test]
    fn convert_in_range() {
        let table = fixture_table();
        let t_a = ta_breakpoint(2) as f32;
        let mut image = [0f32; 16];
        let report =
            compensated_to_temperatures(&table, t_a, RangePolicy::Strict, &mut image).unwrap();
        assert!(report.in_range());
        let expected = decikelvin_to_celsius(table_value(16, 2) as f32);
        assert!(image.iter().all(|pixel| *pixel == expected));
    }

    #[test]
    fn convert_clamped() {
        let table = fixture_table();
        let t_a = ta_breakpoint(TABLE_COLUMNS - 1) as f32 + 500.0;
        let mut image = [0f32, -5000.0, 1e9, 64.0];
        let report =
            compensated_to_temperatures(&table, t_a, RangePolicy::Clamp, &mut image).unwrap();
        assert!(report.ambient_clamped);
        assert_eq!(report.clamped_pixels, 2);
        assert!(!report.in_range());
        let last_column = TABLE_COLUMNS - 1;
        assert_eq!(
            image[1],
            decikelvin_to_celsius(table_value(0, last_column) as f32)
        );
        assert_eq!(
            image[2],
            decikelvin_to_celsius(table_value(TABLE_ROWS - 1, last_column) as f32)
        );
    }

    #[test]
    fn convert_strict() {
        let table = fixture_table();
        let mut image = [0f32; 4];
        let result = compensated_to_temperatures(&table, 0.0, RangePolicy::Strict, &mut image);
        assert_eq!(result, Err(LibraryError::AmbientOutOfRange(0.0)));
        let t_a = ta_breakpoint(1) as f32;
        let mut image = [0f32, 0.0, -5000.0, 0.0];
        let result = compensated_to_temperatures(&table, t_a, RangePolicy::Strict, &mut image);
        assert_eq!(
            result,
            Err(LibraryError::PixelOutOfRange {
                index: 2,
                value: -5000.0
            })
        );
    }

    #[test]
    fn by_reference() {
        // Tables can be borrowed, so the same table can be shared.
        let table = fixture_table();
        let borrowed = &table;
        assert_eq!(
            temperature(&borrowed, ta_breakpoint(0) as f32, 0.0),
            temperature(&table, ta_breakpoint(0) as f32, 0.0)
        );
    }
}
