//! Extended metadata and private data blocks
//!
//! Neither block is needed to rebuild the font, so they are only read on request.
//!
//! <https://www.w3.org/TR/WOFF2/#Metadata>

use crate::{
    decompress::DecodeOptions,
    error::{DecodeError, bail_if},
    woff::headers::{WoffHeader, WoffVersion},
};

fn block<'a>(raw_woff_data: &'a [u8], offset: u32, length: u32) -> Result<&'a [u8], DecodeError> {
    let start = offset as usize;
    raw_woff_data
        .get(start..start + length as usize)
        .ok_or(DecodeError::DecompressionFailed(format!(
            "block at {start} of length {length} extends past the end of the input"
        )))
}

/// Decompress the extended metadata block (an XML document) of a WOFF or WOFF2 file.
///
/// WOFF2 stores it as brotli, WOFF 1.0 as zlib. Returns `Ok(None)` when the file has no metadata.
pub fn extended_metadata(raw_woff_data: &[u8]) -> Result<Option<Vec<u8>>, DecodeError> {
    extended_metadata_with_options(raw_woff_data, &DecodeOptions::default())
}

/// [`extended_metadata`] with the decompressed size capped at `options.max_output_size`
pub fn extended_metadata_with_options(
    raw_woff_data: &[u8],
    options: &DecodeOptions,
) -> Result<Option<Vec<u8>>, DecodeError> {
    let limit = options.max_output_size;
    let header = WoffHeader::parse(&mut &raw_woff_data[..])?;
    if header.meta_offset == 0 || header.meta_length == 0 {
        return Ok(None);
    }

    let compressed = block(raw_woff_data, header.meta_offset, header.meta_length)?;
    let orig_length = header.meta_orig_length as usize;
    bail_if!(
        orig_length > limit,
        DecodeError::DecompressionFailed(format!("metadata larger than the {limit} byte limit"))
    );

    let metadata = match header.woff_version {
        // WOFF 1.0 may store the block uncompressed when that is no larger
        WoffVersion::Woff1 if compressed.len() == orig_length => {
            Ok::<_, Box<dyn std::error::Error>>(compressed.to_vec())
        }
        #[cfg(feature = "brotli")]
        WoffVersion::Woff2 => {
            crate::decompress::decompress_brotli(compressed, orig_length, orig_length)
        }
        #[cfg(feature = "z")]
        WoffVersion::Woff1 => {
            crate::decompress_woff1::decompress_z(compressed, orig_length, orig_length)
        }
        #[allow(unreachable_patterns)]
        _ => {
            return Err(DecodeError::Unsupported(
                "built without the metadata decompressor",
            ));
        }
    }
    .map_err(|err| DecodeError::DecompressionFailed(err.to_string()))?;

    bail_if!(
        metadata.len() != orig_length,
        DecodeError::SizeMismatch {
            expected: orig_length,
            actual: metadata.len(),
        }
    );
    log::debug!("extended metadata: {} bytes", metadata.len());
    Ok(Some(metadata))
}

/// The private data block of a WOFF or WOFF2 file, if any. It is never compressed.
pub fn private_data(raw_woff_data: &[u8]) -> Result<Option<&[u8]>, DecodeError> {
    let header = WoffHeader::parse(&mut &raw_woff_data[..])?;
    if header.priv_offset == 0 || header.priv_length == 0 {
        return Ok(None);
    }
    block(raw_woff_data, header.priv_offset, header.priv_length).map(Some)
}
