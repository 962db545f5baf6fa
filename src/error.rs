use font_types::Tag;
use thiserror::Error;

/// Every way a decode can fail. No partial output is returned alongside any of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Signature mismatch or structurally impossible declared sizes
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),
    /// Invalid table directory entry
    #[error("malformed table directory at byte {offset}: {reason}")]
    MalformedDirectory { offset: usize, reason: &'static str },
    /// The compressed stream was corrupt or truncated
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
    /// The decompressed stream does not have the length the table directory implies
    #[error("decompressed {actual} bytes but the table directory implies {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    /// Inconsistent data while reversing the `glyf`/`loca` (or `hmtx`) transform
    #[error("invalid transformed '{table}' table: {reason}")]
    InvalidOutlineTransform { table: Tag, reason: &'static str },
    /// A table the output font needs is absent
    #[error("table '{missing}' is required but missing")]
    IncompleteTableSet { missing: Tag },
    /// The `head` table is absent (or too short to hold checkSumAdjustment)
    #[error("'head' table is missing or too short to hold checkSumAdjustment")]
    ChecksumTableMissing,
    /// Valid input that this decoder does not handle
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

pub(crate) fn usize_will_overflow(a: usize, b: usize) -> bool {
    a.checked_add(b).is_none()
}

pub(crate) fn u32_will_overflow(a: u32, b: u32) -> bool {
    a.checked_add(b).is_none()
}

#[cfg(not(feature = "debug"))]
mod regular {
    macro_rules! bail {
        ($err: expr) => {
            return Err($err)
        };
    }
    pub(crate) use bail;

    macro_rules! bail_if {
        ($cond: expr, $err: expr) => {
            if $cond {
                return Err($err);
            }
        };
    }
    pub(crate) use bail_if;
}
#[cfg(not(feature = "debug"))]
pub(crate) use regular::*;

#[cfg(feature = "debug")]
mod debug {
    macro_rules! bail {
        ($err: expr) => {
            panic!("{}", $err)
        };
    }
    pub(crate) use bail;

    macro_rules! bail_if {
        ($cond: expr, $err: expr) => {
            if $cond {
                panic!("{} ({})", $err, stringify!($cond))
            }
        };
    }
    pub(crate) use bail_if;
}
#[cfg(feature = "debug")]
pub(crate) use debug::*;
