use std::error::Error;
#[cfg(feature = "brotli")]
use std::io::{self, Write};

use font_types::Tag;

use crate::{
    error::{DecodeError, bail, bail_if},
    sfnt::{AssembledFont, SfntBuilder, TableRecord},
    table_tags::{GLYF, HEAD, HHEA, HMTX, LOCA},
    woff::{
        glyf_decoder::{GlyfAndLocaData, reconstruct_glyf_and_loca},
        headers::{
            WOFF2_HEADER_SIZE, Woff2TableDirectory, Woff2TableDirectoryEntry, WoffHeader,
            WoffVersion,
        },
        hmtx_decoder::{decode_hmtx_table, generate_hmtx_table, read_num_hmetrics},
    },
    woff2_common::TTC_FONT_FLAVOR,
};

/// Default cap on the size of any buffer whose size comes from the input (30 MiB)
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 30 * 1024 * 1024;

// Over 14k test fonts the max compression ratio seen to date was ~20.
// >100 suggests you wrote a bad uncompressed size.
pub const DEFAULT_MAX_COMPRESSION_RATIO: f32 = 100.0;

/// Offset of indexToLocFormat within the 'head' table
const HEAD_INDEX_TO_LOC_FORMAT_OFFSET: usize = 50;

/// A decompression primitive: compressed bytes and a capacity hint in, decompressed bytes out
pub type DecompressFn<'a> = dyn FnMut(&[u8], usize) -> Result<Vec<u8>, Box<dyn Error>> + 'a;

/// Limits applied while decoding untrusted input
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DecodeOptions {
    /// Upper bound on any decompressed buffer (and on the capacity reserved up front for it)
    pub max_output_size: usize,
    /// totalSfntSize divided by the input length may not exceed this
    pub max_compression_ratio: f32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            max_compression_ratio: DEFAULT_MAX_COMPRESSION_RATIO,
        }
    }
}

/// A reconstructed sfnt font
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFont {
    /// Header of the WOFF or WOFF2 file the font was decoded from
    pub header: WoffHeader,
    /// The complete sfnt binary
    pub data: Vec<u8>,
    /// The output table directory, sorted by tag
    pub tables: Vec<TableRecord>,
}

impl DecodedFont {
    pub fn table(&self, tag: Tag) -> Option<&TableRecord> {
        self.tables.iter().find(|record| record.tag == tag)
    }

    /// Unpadded data of the table with the given tag
    pub fn table_data(&self, tag: Tag) -> Option<&[u8]> {
        let record = self.table(tag)?;
        let start = record.offset as usize;
        self.data.get(start..start + record.length as usize)
    }
}

/// `io::Write` sink that refuses to grow past `limit` bytes
#[cfg(feature = "brotli")]
struct BoundedWriter<'a> {
    output: &'a mut Vec<u8>,
    limit: usize,
}

#[cfg(feature = "brotli")]
impl Write for BoundedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.output.len() + buf.len() > self.limit {
            return Err(io::Error::other(format!(
                "decompressed data exceeds the {} byte limit",
                self.limit
            )));
        }
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Decompress a complete brotli stream, failing once the output would exceed `limit`
#[cfg(feature = "brotli")]
pub(crate) fn decompress_brotli(
    compressed_data: &[u8],
    size_hint: usize,
    limit: usize,
) -> Result<Vec<u8>, Box<dyn Error>> {
    use brotli_decompressor::DecompressorWriter;

    let mut output: Vec<u8> = Vec::with_capacity(size_hint.min(limit));
    let mut writer = BoundedWriter {
        output: &mut output,
        limit,
    };
    let mut decompressor = DecompressorWriter::new(&mut writer, 4096);
    decompressor.write_all(compressed_data)?;
    decompressor.close()?;
    drop(decompressor);
    Ok(output)
}

/// Decode a WOFF2 file into an sfnt font using the built-in brotli decompressor
#[cfg(feature = "brotli")]
pub fn decode_woff2(raw_woff_data: &[u8]) -> Result<DecodedFont, DecodeError> {
    decode_woff2_with_options(raw_woff_data, &DecodeOptions::default())
}

#[cfg(feature = "brotli")]
pub fn decode_woff2_with_options(
    raw_woff_data: &[u8],
    options: &DecodeOptions,
) -> Result<DecodedFont, DecodeError> {
    let limit = options.max_output_size;
    decode_woff2_with_brotli(raw_woff_data, options, &mut |data: &[u8], hint: usize| {
        decompress_brotli(data, hint, limit)
    })
}

/// Decompress a WOFF2 file, returning only the bytes of the sfnt font
#[cfg(feature = "brotli")]
pub fn decompress_woff2(raw_woff_data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    decode_woff2(raw_woff_data).map(|font| font.data)
}

/// Decompress a WOFF2 file using a custom brotli decompressor passed as a closure
pub fn decompress_woff2_with_brotli(
    raw_woff_data: &[u8],
    options: &DecodeOptions,
    decompress_brotli: &mut DecompressFn,
) -> Result<Vec<u8>, DecodeError> {
    decode_woff2_with_brotli(raw_woff_data, options, decompress_brotli).map(|font| font.data)
}

pub fn decode_woff2_with_brotli(
    raw_woff_data: &[u8],
    options: &DecodeOptions,
    decompress_brotli: &mut DecompressFn,
) -> Result<DecodedFont, DecodeError> {
    // Here we create a new view over the `raw_woff_data`. Because we pass `&mut input` to parsing functons,
    // they will actually mutate the slice (not the data it points to) such that it only includes unparsed data.
    //
    // However `raw_woff_data` will still contain the full data for the WOFF.
    let mut input = raw_woff_data;

    // Parse header and table directory
    let header = WoffHeader::parse(&mut input)?;
    bail_if!(
        header.woff_version != WoffVersion::Woff2,
        DecodeError::MalformedHeader("not a WOFF2 file")
    );
    bail_if!(
        header.flavor == TTC_FONT_FLAVOR,
        DecodeError::Unsupported("font collections")
    );
    check_compression_ratio(&header, raw_woff_data.len(), options)?;

    let table_directory =
        Woff2TableDirectory::parse(&mut input, header.num_tables as usize, WOFF2_HEADER_SIZE)?;

    // Decompress data with brotli decoder
    let compressed_size = header.total_compressed_size as usize;
    let Some(compressed_data) = input.get(..compressed_size) else {
        bail!(DecodeError::DecompressionFailed(format!(
            "compressed data truncated: {} of {} bytes present",
            input.len(),
            compressed_size
        )))
    };
    let expected_size = table_directory.total_stored_length();
    let size_hint = expected_size.min(options.max_output_size);
    let decompressed_data = decompress_brotli(compressed_data, size_hint)
        .map_err(|err| DecodeError::DecompressionFailed(err.to_string()))?;
    bail_if!(
        decompressed_data.len() > options.max_output_size,
        DecodeError::DecompressionFailed(format!(
            "decompressed data exceeds the {} byte limit",
            options.max_output_size
        ))
    );
    bail_if!(
        decompressed_data.len() != expected_size,
        DecodeError::SizeMismatch {
            expected: expected_size,
            actual: decompressed_data.len(),
        }
    );
    log::debug!(
        "decompressed {} bytes into {} bytes",
        compressed_size,
        decompressed_data.len()
    );

    let font = reconstruct_font(&header, &table_directory, &decompressed_data)?;

    Ok(DecodedFont {
        header,
        data: font.data,
        tables: font.tables,
    })
}

fn check_compression_ratio(
    header: &WoffHeader,
    input_len: usize,
    options: &DecodeOptions,
) -> Result<(), DecodeError> {
    let compression_ratio: f32 = (header.total_sfnt_size as f32) / (input_len.max(1) as f32);
    log::debug!("compression ratio {:.1}", compression_ratio);
    bail_if!(
        compression_ratio > options.max_compression_ratio,
        DecodeError::MalformedHeader("implausible compression ratio")
    );
    Ok(())
}

fn table_slice<'a>(
    table: &Woff2TableDirectoryEntry,
    woff_data: &'a [u8],
) -> Result<&'a [u8], DecodeError> {
    table
        .data_as_slice(woff_data)
        .ok_or(DecodeError::SizeMismatch {
            expected: table.woff_offset as usize + table.stored_length() as usize,
            actual: woff_data.len(),
        })
}

fn reconstruct_font(
    header: &WoffHeader,
    tables: &Woff2TableDirectory,
    woff_data: &[u8],
) -> Result<AssembledFont, DecodeError> {
    let mut builder = SfntBuilder::new(header.flavor, tables.len());

    // Any table which does not need to be transformed is copied through as-is
    for table in tables.iter().filter(|table| !table.is_transformed()) {
        builder.add_table(table.tag(), table_slice(table, woff_data)?);
    }

    // A transformed 'loca' is only ever rebuilt from 'glyf'
    if tables.find(LOCA).is_some_and(|table| table.is_transformed()) {
        bail_if!(
            tables.find(GLYF).is_none(),
            DecodeError::IncompleteTableSet { missing: GLYF }
        );
    }

    // glyf table (also process loca table)
    let mut glyf_and_loca: Option<GlyfAndLocaData> = None;
    if let Some(glyf) = tables.find(GLYF).filter(|table| table.is_transformed()) {
        let Some(loca) = tables.find(LOCA) else {
            bail!(DecodeError::IncompleteTableSet { missing: LOCA })
        };
        let data = reconstruct_glyf_and_loca(table_slice(glyf, woff_data)?)?;
        check_index_format(&data, loca, tables.find(HEAD), woff_data)?;
        glyf_and_loca = Some(data);
    }

    // hmtx table
    if let Some(hmtx) = tables.find(HMTX).filter(|table| table.is_transformed()) {
        let Some(glyf_and_loca) = glyf_and_loca.as_ref() else {
            bail!(DecodeError::IncompleteTableSet { missing: GLYF })
        };
        let Some(hhea) = tables.find(HHEA) else {
            bail!(DecodeError::IncompleteTableSet { missing: HHEA })
        };
        let num_hmetrics = read_num_hmetrics(table_slice(hhea, woff_data)?).ok_or(
            DecodeError::InvalidOutlineTransform {
                table: HMTX,
                reason: "'hhea' too short to hold numberOfHMetrics",
            },
        )?;

        let mut raw_hmtx_table_data = table_slice(hmtx, woff_data)?;
        let hmtx_data = decode_hmtx_table(
            &mut raw_hmtx_table_data,
            glyf_and_loca.num_glyphs,
            num_hmetrics,
            &glyf_and_loca.x_mins,
        )?;
        if !raw_hmtx_table_data.is_empty() {
            log::warn!(
                "ignoring {} trailing bytes after transformed hmtx",
                raw_hmtx_table_data.len()
            );
        }
        let hmtx_table = generate_hmtx_table(&hmtx_data);
        log::debug!("reconstructed hmtx ({} bytes)", hmtx_table.len());
        builder.add_table(HMTX, hmtx_table);
    }

    if let Some(data) = glyf_and_loca {
        builder.add_table(GLYF, data.glyf_table);
        builder.add_table(LOCA, data.loca_table);
    }

    builder.build()
}

/// The rebuilt 'loca' must have the size the directory declared and the format 'head' declares
fn check_index_format(
    data: &GlyfAndLocaData,
    loca: &Woff2TableDirectoryEntry,
    head: Option<&Woff2TableDirectoryEntry>,
    woff_data: &[u8],
) -> Result<(), DecodeError> {
    let offset_size: usize = if data.index_format == 0 { 2 } else { 4 };
    bail_if!(
        loca.orig_length as usize != (data.num_glyphs as usize + 1) * offset_size,
        DecodeError::InvalidOutlineTransform {
            table: LOCA,
            reason: "origLength disagrees with numGlyphs and indexFormat",
        }
    );

    let index_to_loc_format = head
        .and_then(|head| head.data_as_slice(woff_data))
        .and_then(|head| {
            head.get(HEAD_INDEX_TO_LOC_FORMAT_OFFSET..HEAD_INDEX_TO_LOC_FORMAT_OFFSET + 2)
        })
        .map(|bytes| i16::from_be_bytes([bytes[0], bytes[1]]));
    if let Some(index_to_loc_format) = index_to_loc_format {
        bail_if!(
            index_to_loc_format as i32 != data.index_format as i32,
            DecodeError::InvalidOutlineTransform {
                table: GLYF,
                reason: "indexFormat disagrees with head.indexToLocFormat",
            }
        );
    }
    Ok(())
}
