use std::collections::HashSet;
use std::ops::Deref;

use bytes::Buf;
use font_types::Tag;

use crate::error::{DecodeError, bail, bail_if, usize_will_overflow};
use crate::table_tags::{CUSTOM_TAG_INDEX, GLYF, HMTX, LOCA, TableTag};
use crate::variable_length::BufVariableExt;
use crate::woff2_common::{WOFF1_SIGNATURE, WOFF2_SIGNATURE};

pub const WOFF1_HEADER_SIZE: usize = 44;
pub const WOFF2_HEADER_SIZE: usize = 48;
pub const WOFF1_ENTRY_SIZE: usize = 20;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WoffVersion {
    Woff1 = 1,
    Woff2 = 2,
}

impl WoffVersion {
    pub fn header_size(self) -> usize {
        match self {
            WoffVersion::Woff1 => WOFF1_HEADER_SIZE,
            WoffVersion::Woff2 => WOFF2_HEADER_SIZE,
        }
    }
}

fn truncated_header(_: bytes::TryGetError) -> DecodeError {
    DecodeError::MalformedHeader("truncated header")
}

/// WOFF header that can represent either a WOFF1 or WOFF2 header
///
/// <https://www.w3.org/TR/WOFF2/#woff20Header>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WoffHeader {
    // This isn't in the header, but we compute it from the signature and store it for convenience.
    pub woff_version: WoffVersion,
    /// b"wOFF" or b"wOF2"
    pub signature: Tag,
    /// The "sfnt version" of the input font.
    pub flavor: Tag,
    /// Total size of the WOFF file.
    pub length: u32,
    /// Number of entries in directory of font tables.
    pub num_tables: u16,
    /// Reserved; set to 0.
    pub reserved: u16,
    /// Total size needed for the uncompressed font data, including the sfnt header, directory, and font tables (including padding).
    pub total_sfnt_size: u32,
    /// (WOFF2 only) Total length of the compressed data block.
    pub total_compressed_size: u32,
    /// Major version of the WOFF file.
    pub major_version: u16,
    /// Minor version of the WOFF file.
    pub minor_version: u16,
    /// Offset to metadata block, from beginning of WOFF file.
    pub meta_offset: u32,
    /// Length of compressed metadata block.
    pub meta_length: u32,
    /// Uncompressed size of metadata block.
    pub meta_orig_length: u32,
    /// Offset to private data block, from beginning of WOFF file.
    pub priv_offset: u32,
    /// Length of private data block.
    pub priv_length: u32,
}

impl WoffHeader {
    /// Parse and validate the header at the start of `input`.
    ///
    /// `input` must span the whole file: its length is compared against the declared length.
    /// A file shorter than declared is accepted here; the missing bytes are reported by the
    /// stage that needs them.
    pub fn parse(input: &mut impl Buf) -> Result<Self, DecodeError> {
        let input_len = input.remaining();

        // Read signature, validate it, and determine WOFF version
        let signature = Tag::from_u32(input.try_get_u32().map_err(truncated_header)?);
        let woff_version = match signature {
            WOFF1_SIGNATURE => WoffVersion::Woff1,
            WOFF2_SIGNATURE => WoffVersion::Woff2,
            _ => bail!(DecodeError::MalformedHeader("bad signature")),
        };
        bail_if!(
            input_len < woff_version.header_size(),
            DecodeError::MalformedHeader("truncated header")
        );

        // Every read below is in bounds: we checked the length against the header size above
        let header = Self {
            woff_version,
            signature,
            flavor: Tag::from_u32(input.get_u32()),
            length: input.get_u32(),
            num_tables: input.get_u16(),
            reserved: input.get_u16(),
            total_sfnt_size: input.get_u32(),
            // totalCompressedSize field only exists in WOFF2 headers. We simply set it to zero for WOFF1.
            total_compressed_size: match woff_version {
                WoffVersion::Woff1 => 0,
                WoffVersion::Woff2 => input.get_u32(),
            },
            major_version: input.get_u16(),
            minor_version: input.get_u16(),
            meta_offset: input.get_u32(),
            meta_length: input.get_u32(),
            meta_orig_length: input.get_u32(),
            priv_offset: input.get_u32(),
            priv_length: input.get_u32(),
        };
        header.validate(input_len)?;

        log::debug!(
            "parsed {:?} header: flavor '{}', {} tables, length {}, sfnt size {}",
            header.woff_version,
            header.flavor,
            header.num_tables,
            header.length,
            header.total_sfnt_size,
        );

        Ok(header)
    }

    fn validate(&self, input_len: usize) -> Result<(), DecodeError> {
        let length = self.length as usize;
        bail_if!(self.num_tables == 0, DecodeError::MalformedHeader("no tables"));
        bail_if!(
            self.reserved != 0,
            DecodeError::MalformedHeader("reserved field is not zero")
        );
        bail_if!(
            length < self.woff_version.header_size(),
            DecodeError::MalformedHeader("declared length is smaller than the header")
        );
        bail_if!(
            input_len > length,
            DecodeError::MalformedHeader("data after the declared end of file")
        );
        bail_if!(
            self.total_compressed_size > self.length,
            DecodeError::MalformedHeader("compressed size exceeds declared length")
        );
        bail_if!(
            self.total_sfnt_size == 0,
            DecodeError::MalformedHeader("total sfnt size is zero")
        );
        if self.meta_offset != 0 {
            bail_if!(
                self.meta_offset >= self.length
                    || self.length - self.meta_offset < self.meta_length,
                DecodeError::MalformedHeader("metadata block outside of file")
            );
        }
        if self.priv_offset != 0 {
            bail_if!(
                self.priv_offset >= self.length
                    || self.length - self.priv_offset < self.priv_length,
                DecodeError::MalformedHeader("private data block outside of file")
            );
        }
        if self.meta_offset != 0 && self.priv_offset != 0 {
            bail_if!(
                self.meta_offset < self.priv_offset
                    && self.meta_offset + self.meta_length > self.priv_offset,
                DecodeError::MalformedHeader("metadata block overlaps private data block")
            );
        }
        Ok(())
    }
}

pub struct TableDirectory<T> {
    pub tables: Vec<T>,
    /// Size of the table directory (in the WOFF) in bytes
    pub size: usize,
}
pub type Woff2TableDirectory = TableDirectory<Woff2TableDirectoryEntry>;
pub type Woff1TableDirectory = TableDirectory<Woff1TableDirectoryEntry>;

impl<T> Deref for TableDirectory<T> {
    type Target = Vec<T>;
    fn deref(&self) -> &Self::Target {
        &self.tables
    }
}

impl<T> TableDirectory<T> {
    /// Size of the table directory (in the WOFF) in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Woff2TableDirectory {
    /// Parse `num_tables` entries. `start_offset` is the file offset of the first entry and is
    /// only used to report where a bad entry sits.
    pub fn parse(
        input: &mut impl Buf,
        num_tables: usize,
        start_offset: usize,
    ) -> Result<Self, DecodeError> {
        let initial_remaining = input.remaining();

        // Tables in the CompressedFontData field of the WOFF are stored directly after each other
        // in the order they specified in the header. So we can determine the offset for each table
        // by adding up the lengths of each table (which are stored in the directory entries).
        //
        // <https://www.w3.org/TR/WOFF2/#table_format>
        let mut offset_in_woff: usize = 0;
        let mut seen: HashSet<Tag> = HashSet::with_capacity(num_tables);

        let mut tables = Vec::with_capacity(num_tables);
        for _ in 0..num_tables {
            let entry_offset = start_offset + (initial_remaining - input.remaining());
            let mut table = Woff2TableDirectoryEntry::parse(input, entry_offset)?;
            table.woff_offset = offset_in_woff as u32;

            bail_if!(
                !seen.insert(table.tag()),
                DecodeError::MalformedDirectory {
                    offset: entry_offset,
                    reason: "duplicate table tag",
                }
            );

            let stored_length = table.stored_length() as usize;
            bail_if!(
                usize_will_overflow(offset_in_woff, stored_length)
                    || offset_in_woff + stored_length > u32::MAX as usize,
                DecodeError::MalformedDirectory {
                    offset: entry_offset,
                    reason: "table lengths overflow",
                }
            );

            // Add the length of the table to offset_in_woff to determine the offset of the next table
            offset_in_woff += stored_length;

            log::trace!(
                "directory entry '{}': version {}, orig length {}, stored length {}",
                table.tag(),
                table.transform_version,
                table.orig_length,
                stored_length,
            );
            tables.push(table);
        }

        // Because the table directory is variable length, we compute it's size (in bytes) by tracking how
        // much data we have processed during processing. This allows us to know the offset that the next
        // section of the file begins at.
        let size_of_directory = initial_remaining - input.remaining();

        let directory = Self {
            tables,
            size: size_of_directory,
        };
        directory.validate_glyf_and_loca(start_offset)?;

        log::debug!(
            "table directory: {} entries, {} bytes, payload {} bytes",
            directory.len(),
            directory.size,
            directory.total_stored_length()
        );

        Ok(directory)
    }

    /// 'glyf' and 'loca' are either both transformed or both untransformed
    fn validate_glyf_and_loca(&self, start_offset: usize) -> Result<(), DecodeError> {
        let glyf = self.find(GLYF);
        let loca = self.find(LOCA);
        if let (Some(glyf), Some(loca)) = (glyf, loca) {
            bail_if!(
                glyf.is_transformed() != loca.is_transformed(),
                DecodeError::MalformedDirectory {
                    offset: start_offset,
                    reason: "only one of glyf/loca is transformed",
                }
            );
        }
        Ok(())
    }

    pub fn find(&self, tag: Tag) -> Option<&Woff2TableDirectoryEntry> {
        self.tables.iter().find(|table| table.tag() == tag)
    }

    /// Size of the decompressed payload implied by the directory
    pub fn total_stored_length(&self) -> usize {
        self.tables
            .iter()
            .map(|table| table.stored_length() as usize)
            .sum()
    }
}

/// <https://www.w3.org/TR/WOFF2/#table_dir_format>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Woff2TableDirectoryEntry {
    pub tag: TableTag,
    /// 2 bits representing the preprocessing transformation applied to the table
    pub transform_version: u8,
    /// Length of original table. This may be innacurate in the case of transformed tables.
    pub orig_length: u32, // uBase128,
    /// Length of the transformed table. Only present for transformed tables
    pub transform_length: Option<u32>, // uBase128,
    /// Offset of the table within the (decompressed) CompressedFontData field of the WOFF
    pub woff_offset: u32, // Computed
}

impl Woff2TableDirectoryEntry {
    pub fn tag(&self) -> Tag {
        self.tag.tag()
    }

    /// Whether the table has been transformed
    ///
    /// For all tables in a font, except for 'glyf' and 'loca' tables, transformation version 0 indicates the null transform
    /// where the original table data is passed directly to the Brotli compressor for inclusion in the compressed data stream.
    /// For 'glyf' and 'loca' tables, transformation version 3 indicates the null transform where the original table data was
    /// passed directly to the Brotli compressor without applying any pre-processing defined in subclause 5.1 and subclause 5.3.
    pub fn is_transformed(&self) -> bool {
        self.transform_length.is_some()
    }

    /// Length of the table within the decompressed payload
    pub fn stored_length(&self) -> u32 {
        self.transform_length.unwrap_or(self.orig_length)
    }

    pub fn data_as_slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.woff_offset as usize;
        let end = start.checked_add(self.stored_length() as usize)?;
        data.get(start..end)
    }

    pub fn parse(input: &mut impl Buf, entry_offset: usize) -> Result<Self, DecodeError> {
        let malformed = |reason: &'static str| DecodeError::MalformedDirectory {
            offset: entry_offset,
            reason,
        };

        let flags = input
            .try_get_u8()
            .map_err(|_| malformed("truncated table directory"))?;
        let (tag, transform_version) = Self::parse_flags(flags);

        // Note: we only parse the tag field from the input if it is not contained within the flags
        let tag = match tag {
            Some(tag) => tag,
            None => TableTag::Custom(Tag::from_u32(
                input
                    .try_get_u32()
                    .map_err(|_| malformed("truncated table directory"))?,
            )),
        };

        let transformed = match (tag.tag(), transform_version) {
            (GLYF | LOCA, 0) => true,
            (GLYF | LOCA, 3) => false,
            (HMTX, 0) => false,
            (HMTX, 1) => true,
            (_, 0) => false,
            _ => bail!(malformed("reserved transform version")),
        };

        let orig_length = input
            .try_get_variable_128_u32()
            .map_err(|err| malformed(err.reason()))?;
        let transform_length = if transformed {
            Some(
                input
                    .try_get_variable_128_u32()
                    .map_err(|err| malformed(err.reason()))?,
            )
        } else {
            None
        };

        let entry = Self {
            tag,
            transform_version,
            orig_length,
            transform_length,
            woff_offset: 0, // Set in TableDirectory parse function
        };

        // The transformed 'loca' is rebuilt from 'glyf' and takes no space in the payload
        match (entry.tag(), entry.transform_length) {
            (LOCA, Some(length)) => bail_if!(length != 0, malformed("transformed loca has data")),
            (_, Some(0)) => bail!(malformed("zero transform length")),
            _ => {}
        }

        Ok(entry)
    }

    /// Parse flags field into "known tag" and "transform version"
    ///
    /// Bits [0..5] contain an index to the "known tag" table, which represents tags likely to appear in fonts.
    /// If the tag is not present in this table, then the value of this bit field is 63. Bits 6 and 7 indicate
    /// the preprocessing transformation version number (0-3) that was applied to each table.
    pub fn parse_flags(flags: u8) -> (Option<TableTag>, u8) {
        const TAG_MASK: u8 = 0b00111111;
        const FORMAT_MASK: u8 = 0b11000000;
        let tag_bits = flags & TAG_MASK;
        let transform_version = (flags & FORMAT_MASK) >> 6;
        let tag = match tag_bits {
            CUSTOM_TAG_INDEX => None,
            index => TableTag::from_index(index),
        };
        (tag, transform_version)
    }
}

/// <https://www.w3.org/TR/WOFF/#TableDirectory>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Woff1TableDirectoryEntry {
    pub tag: Tag,
    /// Offset to the data, from beginning of WOFF file
    pub woff_offset: u32,
    /// Length of the compressed data, excluding padding
    pub woff_length: u32,
    /// Length of the uncompressed table, excluding padding
    pub orig_length: u32,
    /// Checksum of the uncompressed table
    pub orig_checksum: u32,
}

impl Woff1TableDirectoryEntry {
    pub fn is_compressed(&self) -> bool {
        self.woff_length < self.orig_length
    }

    pub fn data_as_slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.woff_offset as usize;
        let end = start.checked_add(self.woff_length as usize)?;
        data.get(start..end)
    }
}

impl Woff1TableDirectory {
    pub fn parse(
        input: &mut impl Buf,
        num_tables: usize,
        declared_length: u32,
    ) -> Result<Self, DecodeError> {
        let data_start = WOFF1_HEADER_SIZE + num_tables * WOFF1_ENTRY_SIZE;
        let mut seen: HashSet<Tag> = HashSet::with_capacity(num_tables);
        let mut tables = Vec::with_capacity(num_tables);
        for i in 0..num_tables {
            let entry_offset = WOFF1_HEADER_SIZE + i * WOFF1_ENTRY_SIZE;
            let malformed = |reason: &'static str| DecodeError::MalformedDirectory {
                offset: entry_offset,
                reason,
            };
            bail_if!(
                input.remaining() < WOFF1_ENTRY_SIZE,
                malformed("truncated table directory")
            );
            let entry = Woff1TableDirectoryEntry {
                tag: Tag::from_u32(input.get_u32()),
                woff_offset: input.get_u32(),
                woff_length: input.get_u32(),
                orig_length: input.get_u32(),
                orig_checksum: input.get_u32(),
            };

            bail_if!(!seen.insert(entry.tag), malformed("duplicate table tag"));
            bail_if!(
                entry.woff_length > entry.orig_length,
                malformed("compressed length exceeds original length")
            );
            bail_if!(
                (entry.woff_offset as usize) < data_start
                    || entry.woff_offset as u64 + entry.woff_length as u64 > declared_length as u64,
                malformed("table data outside of file")
            );
            tables.push(entry);
        }

        Ok(Self {
            tables,
            size: num_tables * WOFF1_ENTRY_SIZE,
        })
    }
}
