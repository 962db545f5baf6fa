/* Copyright 2014 Google Inc. All Rights Reserved.

   Distributed under MIT license.
   See file LICENSE for detail or copy at https://opensource.org/licenses/MIT
*/

//! Definitions shared by the WOFF, WOFF2 and sfnt code

use font_types::Tag;

pub const WOFF1_SIGNATURE: Tag = Tag::new(b"wOFF");
pub const WOFF2_SIGNATURE: Tag = Tag::new(b"wOF2");

/// TrueType Collection flavor
pub const TTC_FONT_FLAVOR: Tag = Tag::new(b"ttcf");
/// Flavor of CFF-flavored OpenType fonts
pub const CFF_FONT_FLAVOR: Tag = Tag::new(b"OTTO");

pub const SFNT_HEADER_SIZE: usize = 12;
pub const SFNT_ENTRY_SIZE: usize = 16;

/// The whole font (with checkSumAdjustment zeroed) plus checkSumAdjustment sums to this
pub const CHECKSUM_ADJUSTMENT_MAGIC: u32 = 0xB1B0AFBA;
/// Offset of checkSumAdjustment within the 'head' table
pub const CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;

/// A decoded outline point in font units
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub on_curve: bool,
}

/// Sum of `buf` as big-endian u32 words.
///
/// A length that isn't a multiple of 4 is treated as if padded to 4 with 0's.
pub fn compute_checksum(buf: &[u8]) -> u32 {
    let mut checksum: u32 = 0;
    let mut iter = buf.chunks_exact(4);
    for chunk in &mut iter {
        checksum = checksum.wrapping_add(u32::from_be_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3],
        ]));
    }

    // The zeroes don't change the sum; they only place the trailing bytes in the high end of the word.
    let remainder = iter.remainder();
    let mut last = [0u8; 4];
    last[..remainder.len()].copy_from_slice(remainder);
    checksum.wrapping_add(u32::from_be_bytes(last))
}

// Round a value up to the nearest multiple of 4. Don't round the value in the
// case that rounding up overflows.
//
// Implemented as a macro to make it generic over the type without horrible type bounds
macro_rules! Round4 {
    ($value:expr) => {
        match $value.checked_add(3) {
            Some(value_plus_3) => value_plus_3 & !3,
            None => $value,
        }
    };
}
pub(crate) use Round4;
