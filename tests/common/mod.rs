//! A minimal WOFF2 / WOFF encoder and sfnt reader for the integration tests

#![allow(dead_code)]

use std::io::Write;

use bytes::BufMut;
use font_types::Tag;
use thaw::table_tags::{CUSTOM_TAG_INDEX, KnownTable};

pub const CHECKSUM_MAGIC: u32 = 0xB1B0AFBA;

pub fn brotli_compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 9, 22);
        writer.write_all(data).unwrap();
    }
    out
}

pub fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn round4(n: usize) -> usize {
    (n + 3) & !3
}

pub fn checksum(data: &[u8]) -> u32 {
    let mut padded = data.to_vec();
    padded.resize(round4(data.len()), 0);
    padded
        .chunks(4)
        .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
        .fold(0u32, u32::wrapping_add)
}

pub fn write_255_u16(out: &mut Vec<u8>, value: u16) {
    match value {
        0..253 => out.push(value as u8),
        253..506 => {
            out.push(255);
            out.push((value - 253) as u8);
        }
        506..762 => {
            out.push(254);
            out.push((value - 506) as u8);
        }
        _ => {
            out.push(253);
            out.put_u16(value);
        }
    }
}

pub fn write_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut groups = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value != 0 {
        groups.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    groups.reverse();
    out.extend_from_slice(&groups);
}

/// A 'head' table with a stale checkSumAdjustment
pub fn head_table(index_to_loc_format: i16) -> Vec<u8> {
    let mut head = Vec::with_capacity(54);
    head.put_u32(0x00010000); // version
    head.put_u32(0x00010000); // fontRevision
    head.put_u32(0x12345678); // checkSumAdjustment
    head.put_u32(0x5F0F3CF5); // magicNumber
    head.put_u16(0x000B); // flags
    head.put_u16(1000); // unitsPerEm
    head.put_slice(&[0; 16]); // created, modified
    head.put_i16(0); // xMin
    head.put_i16(0); // yMin
    head.put_i16(1000); // xMax
    head.put_i16(1000); // yMax
    head.put_u16(0); // macStyle
    head.put_u16(8); // lowestRecPPEM
    head.put_i16(2); // fontDirectionHint
    head.put_i16(index_to_loc_format);
    head.put_i16(0); // glyphDataFormat
    assert_eq!(head.len(), 54);
    head
}

pub fn hhea_table(num_hmetrics: u16) -> Vec<u8> {
    let mut hhea = Vec::with_capacity(36);
    hhea.put_u32(0x00010000);
    hhea.put_i16(800); // ascender
    hhea.put_i16(-200); // descender
    hhea.put_slice(&[0; 26]);
    hhea.put_u16(num_hmetrics);
    assert_eq!(hhea.len(), 36);
    hhea
}

// ---- glyf transform ----

pub enum TestGlyph {
    Empty,
    Simple {
        /// Absolute (x, y, on_curve) points per contour
        contours: Vec<Vec<(i32, i32, bool)>>,
        instructions: Vec<u8>,
        /// Stored in the bbox stream instead of being computed by the decoder
        explicit_bbox: Option<[i16; 4]>,
        overlap: bool,
    },
    Composite {
        components: Vec<u8>,
        instructions: Option<Vec<u8>>,
        bbox: [i16; 4],
    },
}

impl TestGlyph {
    pub fn simple(contours: Vec<Vec<(i32, i32, bool)>>) -> Self {
        TestGlyph::Simple {
            contours,
            instructions: Vec::new(),
            explicit_bbox: None,
            overlap: false,
        }
    }

    pub fn triangle() -> Self {
        Self::simple(vec![vec![(0, 0, true), (100, 0, true), (50, 100, true)]])
    }
}

fn write_triplet(flags: &mut Vec<u8>, glyph: &mut Vec<u8>, on_curve: bool, dx: i32, dy: i32) {
    let abs_x = dx.unsigned_abs();
    let abs_y = dy.unsigned_abs();
    let on_curve_bit: u32 = if on_curve { 0 } else { 128 };
    let x_sign_bit: u32 = if dx < 0 { 0 } else { 1 };
    let y_sign_bit: u32 = if dy < 0 { 0 } else { 1 };
    let xy_sign_bits = x_sign_bit + 2 * y_sign_bit;

    let flag = if dx == 0 && abs_y < 1280 {
        glyph.push((abs_y & 0xff) as u8);
        on_curve_bit + ((abs_y & 0xf00) >> 7) + y_sign_bit
    } else if dy == 0 && abs_x < 1280 {
        glyph.push((abs_x & 0xff) as u8);
        on_curve_bit + 10 + ((abs_x & 0xf00) >> 7) + x_sign_bit
    } else if abs_x < 65 && abs_y < 65 {
        glyph.push(((((abs_x - 1) & 0xf) << 4) | ((abs_y - 1) & 0xf)) as u8);
        on_curve_bit + 20 + ((abs_x - 1) & 0x30) + (((abs_y - 1) & 0x30) >> 2) + xy_sign_bits
    } else if abs_x < 769 && abs_y < 769 {
        glyph.push(((abs_x - 1) & 0xff) as u8);
        glyph.push(((abs_y - 1) & 0xff) as u8);
        on_curve_bit
            + 84
            + 12 * (((abs_x - 1) & 0x300) >> 8)
            + (((abs_y - 1) & 0x300) >> 6)
            + xy_sign_bits
    } else if abs_x < 4096 && abs_y < 4096 {
        glyph.push((abs_x >> 4) as u8);
        glyph.push((((abs_x & 0xf) << 4) | (abs_y >> 8)) as u8);
        glyph.push((abs_y & 0xff) as u8);
        on_curve_bit + 120 + xy_sign_bits
    } else {
        glyph.put_u16(abs_x as u16);
        glyph.put_u16(abs_y as u16);
        on_curve_bit + 124 + xy_sign_bits
    };
    flags.push(flag as u8);
}

/// Encode glyphs as a transformed 'glyf' table
pub fn transform_glyf(glyphs: &[TestGlyph], index_format: u16) -> Vec<u8> {
    let num_glyphs = glyphs.len();
    let mut n_contour = Vec::new();
    let mut n_points = Vec::new();
    let mut flags = Vec::new();
    let mut glyph_stream = Vec::new();
    let mut composite = Vec::new();
    let mut bbox_bitmap = vec![0u8; ((num_glyphs + 31) >> 5) << 2];
    let mut bboxes = Vec::new();
    let mut instruction_stream = Vec::new();
    let mut overlap_bitmap = vec![0u8; (num_glyphs + 7) >> 3];
    let mut has_overlap = false;

    for (i, glyph) in glyphs.iter().enumerate() {
        match glyph {
            TestGlyph::Empty => n_contour.put_i16(0),
            TestGlyph::Simple {
                contours,
                instructions,
                explicit_bbox,
                overlap,
            } => {
                n_contour.put_i16(contours.len() as i16);
                let (mut last_x, mut last_y) = (0, 0);
                for contour in contours {
                    write_255_u16(&mut n_points, contour.len() as u16);
                    for &(x, y, on_curve) in contour {
                        write_triplet(&mut flags, &mut glyph_stream, on_curve, x - last_x, y - last_y);
                        (last_x, last_y) = (x, y);
                    }
                }
                write_255_u16(&mut glyph_stream, instructions.len() as u16);
                instruction_stream.extend_from_slice(instructions);
                if let Some(bbox) = explicit_bbox {
                    bbox_bitmap[i >> 3] |= 0x80 >> (i & 7);
                    bbox.iter().for_each(|v| bboxes.put_i16(*v));
                }
                if *overlap {
                    has_overlap = true;
                    overlap_bitmap[i >> 3] |= 0x80 >> (i & 7);
                }
            }
            TestGlyph::Composite {
                components,
                instructions,
                bbox,
            } => {
                n_contour.put_i16(-1);
                composite.extend_from_slice(components);
                if let Some(instructions) = instructions {
                    write_255_u16(&mut glyph_stream, instructions.len() as u16);
                    instruction_stream.extend_from_slice(instructions);
                }
                bbox_bitmap[i >> 3] |= 0x80 >> (i & 7);
                bbox.iter().for_each(|v| bboxes.put_i16(*v));
            }
        }
    }

    let mut bbox_stream = bbox_bitmap;
    bbox_stream.extend_from_slice(&bboxes);

    let mut out = Vec::new();
    out.put_u16(0); // reserved
    out.put_u16(if has_overlap { 1 } else { 0 }); // optionFlags
    out.put_u16(num_glyphs as u16);
    out.put_u16(index_format);
    let streams = [
        &n_contour,
        &n_points,
        &flags,
        &glyph_stream,
        &composite,
        &bbox_stream,
        &instruction_stream,
    ];
    for stream in streams {
        out.put_u32(stream.len() as u32);
    }
    for stream in streams {
        out.extend_from_slice(stream);
    }
    if has_overlap {
        out.extend_from_slice(&overlap_bitmap);
    }
    out
}

// ---- WOFF2 container ----

struct Woff2Entry {
    tag: Tag,
    version: u8,
    orig_length: u32,
    transform_length: Option<u32>,
    data: Vec<u8>,
}

pub struct Woff2Builder {
    flavor: Tag,
    entries: Vec<Woff2Entry>,
    metadata: Option<Vec<u8>>,
    private: Option<Vec<u8>>,
}

fn known_index(tag: Tag) -> Option<u8> {
    KnownTable::ALL
        .iter()
        .position(|known| known.tag() == tag)
        .map(|index| index as u8)
}

impl Woff2Builder {
    pub fn new(flavor: &[u8; 4]) -> Self {
        Self {
            flavor: Tag::new(flavor),
            entries: Vec::new(),
            metadata: None,
            private: None,
        }
    }

    /// A table stored as-is (null transform)
    pub fn table(self, tag: &[u8; 4], data: &[u8]) -> Self {
        let tag = Tag::new(tag);
        let version = if tag == Tag::new(b"glyf") || tag == Tag::new(b"loca") {
            3
        } else {
            0
        };
        self.raw_entry(tag, version, data.len() as u32, None, data.to_vec())
    }

    pub fn raw_entry(
        mut self,
        tag: Tag,
        version: u8,
        orig_length: u32,
        transform_length: Option<u32>,
        data: Vec<u8>,
    ) -> Self {
        self.entries.push(Woff2Entry {
            tag,
            version,
            orig_length,
            transform_length,
            data,
        });
        self
    }

    /// Transformed 'glyf' plus the matching data-less 'loca' entry
    pub fn transformed_glyf(self, glyphs: &[TestGlyph], index_format: u16) -> Self {
        let loca_length = (glyphs.len() as u32 + 1) * if index_format == 0 { 2 } else { 4 };
        self.transformed_glyf_with_loca_length(glyphs, index_format, loca_length)
    }

    pub fn transformed_glyf_with_loca_length(
        self,
        glyphs: &[TestGlyph],
        index_format: u16,
        loca_length: u32,
    ) -> Self {
        let data = transform_glyf(glyphs, index_format);
        let length = data.len() as u32;
        self.raw_entry(Tag::new(b"glyf"), 0, length * 2, Some(length), data)
            .raw_entry(Tag::new(b"loca"), 0, loca_length, Some(0), Vec::new())
    }

    pub fn transformed_hmtx(self, data: Vec<u8>, orig_length: u32) -> Self {
        let length = data.len() as u32;
        self.raw_entry(Tag::new(b"hmtx"), 1, orig_length, Some(length), data)
    }

    pub fn metadata(mut self, xml: &[u8]) -> Self {
        self.metadata = Some(xml.to_vec());
        self
    }

    pub fn private_data(mut self, data: &[u8]) -> Self {
        self.private = Some(data.to_vec());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut directory = Vec::new();
        let mut payload = Vec::new();
        let mut total_sfnt_size = 12 + 16 * self.entries.len();
        for entry in &self.entries {
            match known_index(entry.tag) {
                Some(index) => directory.push(index | (entry.version << 6)),
                None => {
                    directory.push(CUSTOM_TAG_INDEX | (entry.version << 6));
                    directory.extend_from_slice(&entry.tag.to_be_bytes());
                }
            }
            write_base128(&mut directory, entry.orig_length);
            if let Some(length) = entry.transform_length {
                write_base128(&mut directory, length);
            }
            payload.extend_from_slice(&entry.data);
            total_sfnt_size += round4(entry.orig_length as usize);
        }
        let compressed = brotli_compress(&payload);

        let mut body = directory;
        body.extend_from_slice(&compressed);

        let mut end = 48 + body.len();
        let mut meta = (0u32, 0u32, 0u32);
        if let Some(xml) = &self.metadata {
            let compressed_meta = brotli_compress(xml);
            body.resize(round4(end) - 48, 0);
            end = round4(end);
            meta = (end as u32, compressed_meta.len() as u32, xml.len() as u32);
            body.extend_from_slice(&compressed_meta);
            end += compressed_meta.len();
        }
        let mut private = (0u32, 0u32);
        if let Some(data) = &self.private {
            body.resize(round4(end) - 48, 0);
            end = round4(end);
            private = (end as u32, data.len() as u32);
            body.extend_from_slice(data);
            end += data.len();
        }

        let mut out = Vec::with_capacity(end);
        out.put_slice(b"wOF2");
        out.put_slice(&self.flavor.to_be_bytes());
        out.put_u32(end as u32);
        out.put_u16(self.entries.len() as u16);
        out.put_u16(0);
        out.put_u32(total_sfnt_size as u32);
        out.put_u32(compressed.len() as u32);
        out.put_u16(1);
        out.put_u16(0);
        out.put_u32(meta.0);
        out.put_u32(meta.1);
        out.put_u32(meta.2);
        out.put_u32(private.0);
        out.put_u32(private.1);
        out.extend_from_slice(&body);
        assert_eq!(out.len(), end);
        out
    }
}

// ---- WOFF 1.0 container ----

pub struct Woff1Builder {
    flavor: Tag,
    tables: Vec<(Tag, Vec<u8>, bool)>,
    metadata: Option<Vec<u8>>,
}

impl Woff1Builder {
    pub fn new(flavor: &[u8; 4]) -> Self {
        Self {
            flavor: Tag::new(flavor),
            tables: Vec::new(),
            metadata: None,
        }
    }

    pub fn table(mut self, tag: &[u8; 4], data: &[u8], compress: bool) -> Self {
        self.tables.push((Tag::new(tag), data.to_vec(), compress));
        self
    }

    pub fn metadata(mut self, xml: &[u8]) -> Self {
        self.metadata = Some(xml.to_vec());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let num_tables = self.tables.len();
        let mut directory = Vec::new();
        let mut data = Vec::new();
        let mut offset = 44 + 20 * num_tables;
        let mut total_sfnt_size = 12 + 16 * num_tables;
        for (tag, table, compress) in &self.tables {
            let compressed = zlib_compress(table);
            let stored = if *compress && compressed.len() < table.len() {
                compressed
            } else {
                table.clone()
            };
            directory.put_slice(&tag.to_be_bytes());
            directory.put_u32(offset as u32);
            directory.put_u32(stored.len() as u32);
            directory.put_u32(table.len() as u32);
            directory.put_u32(checksum(table));
            data.extend_from_slice(&stored);
            data.resize(round4(data.len()), 0);
            offset = 44 + 20 * num_tables + data.len();
            total_sfnt_size += round4(table.len());
        }

        let mut meta = (0u32, 0u32, 0u32);
        if let Some(xml) = &self.metadata {
            let compressed = zlib_compress(xml);
            meta = (offset as u32, compressed.len() as u32, xml.len() as u32);
            data.extend_from_slice(&compressed);
            offset += compressed.len();
        }

        let mut out = Vec::with_capacity(offset);
        out.put_slice(b"wOFF");
        out.put_slice(&self.flavor.to_be_bytes());
        out.put_u32(offset as u32);
        out.put_u16(num_tables as u16);
        out.put_u16(0);
        out.put_u32(total_sfnt_size as u32);
        out.put_u16(1);
        out.put_u16(0);
        out.put_u32(meta.0);
        out.put_u32(meta.1);
        out.put_u32(meta.2);
        out.put_u32(0);
        out.put_u32(0);
        out.extend_from_slice(&directory);
        out.extend_from_slice(&data);
        assert_eq!(out.len(), offset);
        out
    }
}

// ---- sfnt reader ----

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    pub tag: Tag,
    pub checksum: u32,
    pub offset: u32,
    pub length: u32,
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
}

/// The table records of an sfnt font, read straight from its bytes
pub fn read_sfnt_directory(font: &[u8]) -> Vec<Record> {
    let num_tables = read_u16(font, 4) as usize;
    (0..num_tables)
        .map(|i| {
            let at = 12 + 16 * i;
            Record {
                tag: Tag::new(font[at..at + 4].try_into().unwrap()),
                checksum: read_u32(font, at + 4),
                offset: read_u32(font, at + 8),
                length: read_u32(font, at + 12),
            }
        })
        .collect()
}

pub fn sfnt_table<'a>(font: &'a [u8], tag: &[u8; 4]) -> &'a [u8] {
    let record = read_sfnt_directory(font)
        .into_iter()
        .find(|record| record.tag == Tag::new(tag))
        .unwrap_or_else(|| panic!("no '{}' table", Tag::new(tag)));
    &font[record.offset as usize..(record.offset + record.length) as usize]
}

/// Check the structural invariants every reconstructed font must satisfy
pub fn assert_well_formed(font: &[u8]) {
    let records = read_sfnt_directory(font);
    let tags: Vec<Tag> = records.iter().map(|r| r.tag).collect();
    let mut sorted = tags.clone();
    sorted.sort();
    assert_eq!(tags, sorted, "directory is sorted by tag");

    for record in &records {
        assert_eq!(record.offset % 4, 0, "'{}' is 4-byte aligned", record.tag);
        let start = record.offset as usize;
        let mut data = font[start..start + round4(record.length as usize)].to_vec();
        if record.tag == Tag::new(b"head") {
            data[8..12].fill(0);
        }
        assert_eq!(record.checksum, checksum(&data), "checksum of '{}'", record.tag);
    }
    assert_eq!(checksum(font), CHECKSUM_MAGIC, "whole-font checksum");
}

/// A plain 'glyf' simple glyph, parsed back into its points
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedGlyph {
    pub bbox: [i16; 4],
    pub end_points: Vec<u16>,
    pub instructions: Vec<u8>,
    pub points: Vec<(i32, i32, bool)>,
    pub overlap: bool,
}

pub fn parse_simple_glyph(glyph: &[u8]) -> ParsedGlyph {
    let n_contours = read_u16(glyph, 0) as usize;
    let bbox = [0, 1, 2, 3].map(|i| read_u16(glyph, 2 + 2 * i) as i16);
    let end_points: Vec<u16> = (0..n_contours).map(|i| read_u16(glyph, 10 + 2 * i)).collect();
    let num_points = *end_points.last().unwrap() as usize + 1;
    let mut at = 10 + 2 * n_contours;
    let instruction_length = read_u16(glyph, at) as usize;
    at += 2;
    let instructions = glyph[at..at + instruction_length].to_vec();
    at += instruction_length;

    let mut flags = Vec::with_capacity(num_points);
    while flags.len() < num_points {
        let flag = glyph[at];
        at += 1;
        flags.push(flag);
        if flag & 0x08 != 0 {
            let repeat = glyph[at];
            at += 1;
            flags.extend(std::iter::repeat_n(flag, repeat as usize));
        }
    }

    let mut read_coords = |short: u8, same: u8| {
        let mut value = 0i32;
        let mut coords = Vec::with_capacity(num_points);
        for &flag in &flags {
            if flag & short != 0 {
                let delta = glyph[at] as i32;
                at += 1;
                value += if flag & same != 0 { delta } else { -delta };
            } else if flag & same == 0 {
                value += read_u16(glyph, at) as i16 as i32;
                at += 2;
            }
            coords.push(value);
        }
        coords
    };
    let xs = read_coords(0x02, 0x10);
    let ys = read_coords(0x04, 0x20);

    ParsedGlyph {
        bbox,
        end_points,
        instructions,
        points: (0..num_points)
            .map(|i| (xs[i], ys[i], flags[i] & 0x01 != 0))
            .collect(),
        overlap: flags[0] & 0x40 != 0,
    }
}

/// Offsets stored in a 'loca' table
pub fn read_loca(loca: &[u8], index_format: u16) -> Vec<u32> {
    if index_format == 0 {
        loca.chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]) as u32 * 2)
            .collect()
    } else {
        loca.chunks(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}
