//! Assembly of the output sfnt (TrueType / OpenType) font

use std::borrow::Cow;

use bytes::BufMut;
use font_types::Tag;

use crate::error::{DecodeError, bail, bail_if};
use crate::table_tags::{CFF, CFF2, GLYF, HEAD, LOCA};
use crate::woff2_common::{
    CFF_FONT_FLAVOR, CHECKSUM_ADJUSTMENT_MAGIC, CHECKSUM_ADJUSTMENT_OFFSET, Round4,
    SFNT_ENTRY_SIZE, SFNT_HEADER_SIZE, compute_checksum,
};

/// An entry of the output font's table directory
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableRecord {
    pub tag: Tag,
    /// Checksum of the padded table data ('head' is summed with checkSumAdjustment zeroed)
    pub checksum: u32,
    /// Offset of the table from the start of the font
    pub offset: u32,
    /// Unpadded length of the table
    pub length: u32,
}

pub(crate) struct AssembledFont {
    pub data: Vec<u8>,
    pub tables: Vec<TableRecord>,
}

/// Collects the final bytes of every table, then lays them out as an sfnt.
///
/// Pass-through tables are borrowed straight from the decompressed payload.
pub(crate) struct SfntBuilder<'a> {
    flavor: Tag,
    tables: Vec<(Tag, Cow<'a, [u8]>)>,
}

impl<'a> SfntBuilder<'a> {
    pub fn new(flavor: Tag, num_tables: usize) -> Self {
        Self {
            flavor,
            tables: Vec::with_capacity(num_tables),
        }
    }

    pub fn add_table(&mut self, tag: Tag, data: impl Into<Cow<'a, [u8]>>) {
        self.tables.push((tag, data.into()));
    }

    fn has_table(&self, tag: Tag) -> bool {
        self.tables.iter().any(|(t, _)| *t == tag)
    }

    fn check_table_set(&self) -> Result<(), DecodeError> {
        let head_ok = self
            .tables
            .iter()
            .any(|(tag, data)| *tag == HEAD && data.len() >= CHECKSUM_ADJUSTMENT_OFFSET + 4);
        bail_if!(!head_ok, DecodeError::ChecksumTableMissing);

        // 'glyf' without 'loca' doesn't make sense
        match (self.has_table(GLYF), self.has_table(LOCA)) {
            (true, false) => bail!(DecodeError::IncompleteTableSet { missing: LOCA }),
            (false, true) => bail!(DecodeError::IncompleteTableSet { missing: GLYF }),
            _ => {}
        }

        if self.flavor == CFF_FONT_FLAVOR {
            bail_if!(
                !self.has_table(CFF) && !self.has_table(CFF2),
                DecodeError::IncompleteTableSet { missing: CFF }
            );
        }
        Ok(())
    }

    pub fn build(mut self) -> Result<AssembledFont, DecodeError> {
        self.check_table_set()?;

        // The directory is sorted by tag regardless of the order tables were added in
        self.tables.sort_by_key(|(tag, _)| *tag);

        let num_tables = self.tables.len();
        let directory_size = SFNT_HEADER_SIZE + SFNT_ENTRY_SIZE * num_tables;
        let total_size = self.tables.iter().try_fold(directory_size, |size, (_, data)| {
            size.checked_add(Round4!(data.len()))
        });
        let total_size = match total_size {
            Some(size) if size <= u32::MAX as usize => size,
            _ => return Err(DecodeError::Unsupported("output font larger than 4GiB")),
        };

        let mut out: Vec<u8> = Vec::with_capacity(total_size);
        write_table_directory_header(&mut out, self.flavor, num_tables as u16);
        out.resize(directory_size, 0);

        let mut records: Vec<TableRecord> = Vec::with_capacity(num_tables);
        let mut head_offset: usize = 0;
        for (tag, data) in &self.tables {
            let offset = out.len();
            out.extend_from_slice(data);
            if *tag == HEAD {
                // Checksummed with checkSumAdjustment zeroed; it is filled in once the whole font is known
                head_offset = offset;
                let field = offset + CHECKSUM_ADJUSTMENT_OFFSET;
                out[field..field + 4].fill(0);
            }
            out.resize(Round4!(out.len()), 0);

            let record = TableRecord {
                tag: *tag,
                checksum: compute_checksum(&out[offset..]),
                offset: offset as u32,
                length: data.len() as u32,
            };
            log::trace!(
                "table '{}': offset {}, length {}, checksum {:#010x}",
                record.tag,
                record.offset,
                record.length,
                record.checksum
            );
            records.push(record);
        }

        let mut writer = &mut out[SFNT_HEADER_SIZE..directory_size];
        for record in &records {
            write_table_record(&mut writer, record);
        }

        // <https://learn.microsoft.com/en-us/typography/opentype/spec/otff#calculating-checksums>
        let font_checksum = compute_checksum(&out);
        let checksum_adjustment = CHECKSUM_ADJUSTMENT_MAGIC.wrapping_sub(font_checksum);
        let field = head_offset + CHECKSUM_ADJUSTMENT_OFFSET;
        out[field..field + 4].copy_from_slice(&checksum_adjustment.to_be_bytes());

        log::debug!(
            "assembled sfnt: {} tables, {} bytes, checkSumAdjustment {:#010x}",
            num_tables,
            out.len(),
            checksum_adjustment
        );

        Ok(AssembledFont {
            data: out,
            tables: records,
        })
    }
}

/// Writes an OpenType table directory header
///
/// <https://learn.microsoft.com/en-us/typography/opentype/spec/otff#table-directory>
pub(crate) fn write_table_directory_header(output: &mut impl BufMut, flavor: Tag, num_tables: u16) {
    let mut max_pow2: u16 = 0;
    while 1u32 << (max_pow2 + 1) <= (num_tables as u32) {
        max_pow2 += 1;
    }
    let entry_selector = max_pow2;
    let search_range: u16 = (1u16 << max_pow2) << 4;
    let range_shift = (((num_tables as u32) << 4) - search_range as u32) as u16;

    output.put_u32(u32::from_be_bytes(flavor.to_be_bytes())); // sfnt version
    output.put_u16(num_tables); // num_tables
    output.put_u16(search_range); // searchRange
    output.put_u16(entry_selector); // entrySelector
    output.put_u16(range_shift); // rangeShift
}

fn write_table_record(output: &mut impl BufMut, record: &TableRecord) {
    output.put_u32(u32::from_be_bytes(record.tag.to_be_bytes()));
    output.put_u32(record.checksum);
    output.put_u32(record.offset);
    output.put_u32(record.length);
}
