//! Pure Rust WOFF2 (and WOFF 1.0) decoder
//!
//! Turns a web font back into the sfnt (TrueType / OpenType) binary it was made from:
//!
//! ```no_run
//! let woff2 = std::fs::read("font.woff2").unwrap();
//! let font = thaw::decode_woff2(&woff2).unwrap();
//! std::fs::write("font.ttf", &font.data).unwrap();
//! ```

mod decompress;
mod decompress_woff1;
mod error;
mod metadata;
mod sfnt;
pub mod table_tags;
mod variable_length;
pub mod woff;
pub mod woff2_common;

pub use decompress::{
    DEFAULT_MAX_COMPRESSION_RATIO, DEFAULT_MAX_OUTPUT_SIZE, DecodeOptions, DecodedFont,
    DecompressFn, decode_woff2_with_brotli, decompress_woff2_with_brotli,
};
#[cfg(feature = "brotli")]
pub use decompress::{decode_woff2, decode_woff2_with_options, decompress_woff2};
pub use decompress_woff1::{decode_woff1_with_custom_z, decompress_woff1_with_custom_z};
#[cfg(feature = "z")]
pub use decompress_woff1::{decode_woff1, decompress_woff1};
pub use error::DecodeError;
pub use metadata::{extended_metadata, extended_metadata_with_options, private_data};
pub use sfnt::TableRecord;
