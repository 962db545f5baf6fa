use std::borrow::Cow;
#[cfg(feature = "z")]
use std::error::Error;

use crate::{
    decompress::{DecodeOptions, DecodedFont, DecompressFn},
    error::{DecodeError, bail_if},
    sfnt::SfntBuilder,
    table_tags::HEAD,
    woff::headers::{Woff1TableDirectory, WoffHeader, WoffVersion},
    woff2_common::{TTC_FONT_FLAVOR, compute_checksum},
};

/// Inflate a zlib stream, failing once the output would exceed `limit`
#[cfg(feature = "z")]
pub(crate) fn decompress_z(
    compressed_data: &[u8],
    size_hint: usize,
    limit: usize,
) -> Result<Vec<u8>, Box<dyn Error>> {
    use std::io::Read as _;

    use flate2::read::ZlibDecoder;

    let mut output: Vec<u8> = Vec::with_capacity(size_hint.min(limit));
    ZlibDecoder::new(compressed_data)
        .take(limit as u64 + 1)
        .read_to_end(&mut output)?;
    if output.len() > limit {
        return Err(format!("decompressed data exceeds the {limit} byte limit").into());
    }
    Ok(output)
}

#[cfg(feature = "z")]
/// Decode a WOFF1 file using the built-in zlib decompressor
pub fn decode_woff1(raw_woff_data: &[u8]) -> Result<DecodedFont, DecodeError> {
    let options = DecodeOptions::default();
    let limit = options.max_output_size;
    decode_woff1_with_custom_z(raw_woff_data, &options, &mut |data: &[u8], hint: usize| {
        decompress_z(data, hint, limit)
    })
}

#[cfg(feature = "z")]
/// Decompress a WOFF1 file using the built-in zlib decompressor
pub fn decompress_woff1(raw_woff_data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    decode_woff1(raw_woff_data).map(|font| font.data)
}

/// Decompress a WOFF1 file using a custom zlib decompressor passed as a closure
pub fn decompress_woff1_with_custom_z(
    raw_woff_data: &[u8],
    options: &DecodeOptions,
    decompress_z: &mut DecompressFn,
) -> Result<Vec<u8>, DecodeError> {
    decode_woff1_with_custom_z(raw_woff_data, options, decompress_z).map(|font| font.data)
}

pub fn decode_woff1_with_custom_z(
    raw_woff_data: &[u8],
    options: &DecodeOptions,
    decompress_z: &mut DecompressFn,
) -> Result<DecodedFont, DecodeError> {
    let mut input = raw_woff_data;

    // Parse header and table directory
    let header = WoffHeader::parse(&mut input)?;
    bail_if!(
        header.woff_version != WoffVersion::Woff1,
        DecodeError::MalformedHeader("not a WOFF file")
    );
    bail_if!(
        header.flavor == TTC_FONT_FLAVOR,
        DecodeError::Unsupported("font collections")
    );
    let table_directory =
        Woff1TableDirectory::parse(&mut input, header.num_tables as usize, header.length)?;

    // Each table is its own zlib stream (or stored as-is when compression didn't help)
    let mut builder = SfntBuilder::new(header.flavor, table_directory.len());
    let mut total_size: usize = 0;
    for table in table_directory.iter() {
        let Some(stored_data) = table.data_as_slice(raw_woff_data) else {
            return Err(DecodeError::DecompressionFailed(format!(
                "data of table '{}' is truncated",
                table.tag
            )));
        };

        let orig_length = table.orig_length as usize;
        total_size = total_size.saturating_add(orig_length);
        bail_if!(
            total_size > options.max_output_size,
            DecodeError::DecompressionFailed(format!(
                "decompressed data exceeds the {} byte limit",
                options.max_output_size
            ))
        );

        let table_data: Cow<[u8]> = if table.is_compressed() {
            let decompressed = decompress_z(stored_data, orig_length)
                .map_err(|err| DecodeError::DecompressionFailed(err.to_string()))?;
            bail_if!(
                decompressed.len() != orig_length,
                DecodeError::SizeMismatch {
                    expected: orig_length,
                    actual: decompressed.len(),
                }
            );
            Cow::Owned(decompressed)
        } else {
            Cow::Borrowed(stored_data)
        };

        // The reassembled font carries freshly computed checksums, so a stale one is only worth a warning
        if table.tag != HEAD && compute_checksum(&table_data) != table.orig_checksum {
            log::warn!("checksum mismatch for table '{}'", table.tag);
        }
        log::trace!(
            "table '{}': stored {} bytes, original {} bytes",
            table.tag,
            table.woff_length,
            table.orig_length
        );

        builder.add_table(table.tag, table_data);
    }

    let font = builder.build()?;
    Ok(DecodedFont {
        header,
        data: font.data,
        tables: font.tables,
    })
}
