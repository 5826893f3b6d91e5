// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use crate::{HEIGHT, WIDTH};

/// Define subtraction for address enumerations.
///
/// The result is the distance between the two addresses, in bytes.
#[doc(hidden)]
#[macro_export]
macro_rules! address_enum_ops {
    ($typ:ident) => {
        impl ::core::ops::Sub<$typ> for $typ {
            type Output = u16;
            fn sub(self, other: $typ) -> Self::Output {
                self as u16 - other as u16
            }
        }
        impl ::core::ops::Sub<&$typ> for &$typ {
            type Output = u16;
            fn sub(self, other: &$typ) -> Self::Output {
                *self as u16 - *other as u16
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! expose_member {
    ($name:ident, $typ:ty, $doc:literal) => {
        #[doc = $doc]
        pub fn $name(&self) -> $typ {
            self.$name
        }
    };
    (&$name:ident, $typ:ty, $doc:literal) => {
        #[doc = $doc]
        pub fn $name(&self) -> &$typ {
            &self.$name
        }
    };
}

/// This is a very small reimplementation of [bytes::Buf] with just the parts needed for this
/// crate.
///
/// Everything on the EEPROM is stored little-endian, so all of the multi-byte getters are
/// little-endian as well.
///
/// [bytes::Buf]: https://docs.rs/bytes/*/bytes/trait.Buf.html
pub(crate) trait Buffer {
    fn get_u8(&mut self) -> u8;
    fn get_u16(&mut self) -> u16;
    fn get_i16(&mut self) -> i16;
    fn get_f32(&mut self) -> f32;
}

impl Buffer for &[u8] {
    fn get_u8(&mut self) -> u8 {
        let (byte, rest) = self.split_at(1);
        *self = rest;
        byte[0]
    }

    fn get_u16(&mut self) -> u16 {
        let (bytes, rest) = self.split_at(2);
        *self = rest;
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn get_i16(&mut self) -> i16 {
        let (bytes, rest) = self.split_at(2);
        *self = rest;
        i16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn get_f32(&mut self) -> f32 {
        let (bytes, rest) = self.split_at(4);
        *self = rest;
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Check if the n-th bit is set.
///
/// Bits are 0-indexed, from the LSB.
pub(crate) fn is_bit_set<B>(value: B, index: usize) -> bool
where
    B: num_traits::PrimInt + num_traits::Unsigned,
{
    (value & (B::one() << index)) > B::zero()
}

/// Mirror the bottom half of a row-major image vertically, in place.
///
/// The sensor (and its EEPROM) store the bottom half of the array starting from the bottom edge,
/// so row 16 in memory is really row 31 on the array. Applying this twice is a no-op.
pub(crate) fn flip_lower_half<T>(grid: &mut [T]) {
    assert_eq!(grid.len(), WIDTH * HEIGHT, "grid must cover the whole array");
    const HALF: usize = HEIGHT / 2;
    let lower_half = &mut grid[(HALF * WIDTH)..];
    // Swap row 16 + n with row 31 - n, meeting in the middle.
    let (upper_rows, lower_rows) = lower_half.split_at_mut(HALF / 2 * WIDTH);
    for (n, row) in upper_rows.chunks_exact_mut(WIDTH).enumerate() {
        let mirrored = (HALF / 2 - 1 - n) * WIDTH;
        row.swap_with_slice(&mut lower_rows[mirrored..(mirrored + WIDTH)]);
    }
}
