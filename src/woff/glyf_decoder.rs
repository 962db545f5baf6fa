use arrayvec::ArrayVec;
use bytes::{Buf, BufMut};

use crate::{
    error::{DecodeError, bail, bail_if, u32_will_overflow, usize_will_overflow},
    table_tags::GLYF,
    variable_length::BufVariableExt as _,
    woff2_common::{Point, Round4},
};

// simple glyph flags
const GLYF_ON_CURVE: u8 = 1 << 0;
const GLYF_X_SHORT: u8 = 1 << 1;
const GLYF_Y_SHORT: u8 = 1 << 2;
const GLYF_REPEAT: u8 = 1 << 3;
const GLYF_THIS_X_IS_SAME: u8 = 1 << 4;
const GLYF_THIS_Y_IS_SAME: u8 = 1 << 5;
const OVERLAP_SIMPLE: u8 = 1 << 6;

const NUM_SUB_STREAMS: usize = 7;
const HEADER_SIZE: usize = 8 + NUM_SUB_STREAMS * 4;
const FLAG_OVERLAP_SIMPLE_BITMAP: u16 = 1 << 0;

// composite glyph flags
const FLAG_ARG_1_AND_2_ARE_WORDS: u16 = 1 << 0;
const FLAG_WE_HAVE_A_SCALE: u16 = 1 << 3;
const FLAG_MORE_COMPONENTS: u16 = 1 << 5;
const FLAG_WE_HAVE_AN_X_AND_Y_SCALE: u16 = 1 << 6;
const FLAG_WE_HAVE_A_TWO_BY_TWO: u16 = 1 << 7;
const FLAG_WE_HAVE_INSTRUCTIONS: u16 = 1 << 8;

fn invalid(reason: &'static str) -> DecodeError {
    DecodeError::InvalidOutlineTransform { table: GLYF, reason }
}

fn exhausted<E>(reason: &'static str) -> impl FnOnce(E) -> DecodeError {
    move |_| invalid(reason)
}

/// Split `n` bytes off the front of a sub-stream
fn take<'a>(
    stream: &mut &'a [u8],
    n: usize,
    reason: &'static str,
) -> Result<&'a [u8], DecodeError> {
    bail_if!(n > stream.len(), invalid(reason));
    let (head, tail) = (*stream).split_at(n);
    *stream = tail;
    Ok(head)
}

pub struct GlyfAndLocaData {
    /// The number of glyphs in the glyf table
    pub num_glyphs: u16,
    /// loca index format
    pub index_format: u16,
    /// The x_min of the bounding box of each glyph (0 for empty glyphs). Used to reconstruct hmtx table
    pub x_mins: Vec<i16>,
    /// Encoded Open Type "glyf" table
    pub glyf_table: Vec<u8>,
    /// Encoded Open Type "loca" table
    pub loca_table: Vec<u8>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
}

impl BoundingBox {
    fn read(stream: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut bytes = take(stream, 8, "bbox stream exhausted")?;
        Ok(BoundingBox {
            x_min: bytes.get_i16(),
            y_min: bytes.get_i16(),
            x_max: bytes.get_i16(),
            y_max: bytes.get_i16(),
        })
    }

    /// Bounding box of the points. Zero if there are none.
    fn from_points(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return BoundingBox::default();
        };
        let (mut x_min, mut y_min, mut x_max, mut y_max) = (first.x, first.y, first.x, first.y);
        for &Point { x, y, .. } in points.iter().skip(1) {
            x_min = x.min(x_min);
            x_max = x.max(x_max);
            y_min = y.min(y_min);
            y_max = y.max(y_max);
        }
        BoundingBox {
            x_min: x_min as i16,
            y_min: y_min as i16,
            x_max: x_max as i16,
            y_max: y_max as i16,
        }
    }

    fn write(&self, dst: &mut impl BufMut) {
        dst.put_i16(self.x_min);
        dst.put_i16(self.y_min);
        dst.put_i16(self.x_max);
        dst.put_i16(self.y_max);
    }
}

/// A simple glyph decoded from the transformed streams
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleGlyph<'a> {
    pub bbox: BoundingBox,
    pub end_points: Vec<u16>,
    pub instructions: &'a [u8],
    pub points: Vec<Point>,
    pub overlap: bool,
}

/// A composite glyph. The component records are copied through untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeGlyph<'a> {
    pub bbox: BoundingBox,
    pub components: &'a [u8],
    pub instructions: Option<&'a [u8]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedGlyph<'a> {
    Empty,
    Simple(SimpleGlyph<'a>),
    Composite(CompositeGlyph<'a>),
}

impl DecodedGlyph<'_> {
    fn x_min(&self) -> i16 {
        match self {
            DecodedGlyph::Empty => 0,
            DecodedGlyph::Simple(glyph) => glyph.bbox.x_min,
            DecodedGlyph::Composite(glyph) => glyph.bbox.x_min,
        }
    }

    /// Append the glyph in plain 'glyf' encoding
    fn write(&self, dst: &mut Vec<u8>) {
        match self {
            DecodedGlyph::Empty => {}
            DecodedGlyph::Simple(glyph) => {
                dst.put_i16(glyph.end_points.len() as i16);
                glyph.bbox.write(dst);
                for &end_point in &glyph.end_points {
                    dst.put_u16(end_point);
                }
                dst.put_u16(glyph.instructions.len() as u16);
                dst.put_slice(glyph.instructions);
                write_glyph_points(&glyph.points, glyph.overlap, dst);
            }
            DecodedGlyph::Composite(glyph) => {
                dst.put_i16(-1); // All composite glyphs have n_contours = -1
                glyph.bbox.write(dst);
                dst.put_slice(glyph.components);
                if let Some(instructions) = glyph.instructions {
                    dst.put_u16(instructions.len() as u16);
                    dst.put_slice(instructions);
                }
            }
        }
    }
}

/// Decode a WOFF2 transformed glyf table into plain 'glyf' and 'loca' tables
///
/// <https://www.w3.org/TR/WOFF2/#glyf_table_format>
pub(crate) fn reconstruct_glyf_and_loca(data: &[u8]) -> Result<GlyfAndLocaData, DecodeError> {
    GlyfDecoder::new(data)?.reconstruct()
}

/// Cursors over the sub-streams of a transformed glyf table.
///
/// Each stream is consumed front to back as glyphs are decoded.
pub struct GlyfDecoder<'a> {
    n_contour_stream: &'a [u8],
    n_points_stream: &'a [u8],
    flag_stream: &'a [u8],
    glyph_stream: &'a [u8],
    composite_stream: &'a [u8],
    bbox_bitmap: &'a [u8],
    bbox_stream: &'a [u8],
    instruction_stream: &'a [u8],
    overlap_bitmap: Option<&'a [u8]>,

    num_glyphs: u16,
    index_format: u16,
}

impl<'a> GlyfDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<GlyfDecoder<'a>, DecodeError> {
        bail_if!(data.len() < HEADER_SIZE, invalid("truncated header"));

        // In bounds: checked against HEADER_SIZE above
        let mut input = data;
        let _reserved: u16 = input.get_u16();
        let flags: u16 = input.get_u16();
        let has_overlap_bitmap: bool = (flags & FLAG_OVERLAP_SIMPLE_BITMAP) != 0;
        let num_glyphs = input.get_u16();
        let index_format = input.get_u16();
        bail_if!(index_format > 1, invalid("unknown index format"));

        let mut offset: usize = HEADER_SIZE;

        // Invariant from here on: data.len() >= offset
        let mut substreams: ArrayVec<&[u8], NUM_SUB_STREAMS> = ArrayVec::new();
        for _ in 0..NUM_SUB_STREAMS {
            let substream_size: usize = input.get_u32() as usize;
            bail_if!(
                substream_size > data.len() - offset,
                invalid("sub-stream extends past the end of the table")
            );
            substreams.push(&data[offset..(offset + substream_size)]);
            offset += substream_size;
        }

        // Safe because num_glyphs is bounded
        let bitmap_length: usize = ((num_glyphs as usize + 31) >> 5) << 2;
        bail_if!(
            bitmap_length > substreams[5].len(),
            invalid("bbox bitmap truncated")
        );

        let (bbox_bitmap, bbox_stream) = substreams[5].split_at(bitmap_length);

        let mut overlap_bitmap: Option<&[u8]> = None;
        if has_overlap_bitmap {
            let overlap_bitmap_length = (num_glyphs as usize + 7) >> 3;
            bail_if!(
                overlap_bitmap_length > data.len() - offset,
                invalid("overlap bitmap truncated")
            );
            overlap_bitmap = Some(&data[offset..(offset + overlap_bitmap_length)]);
            offset += overlap_bitmap_length;
        }

        bail_if!(
            offset != data.len(),
            invalid("sub-stream sizes disagree with the transformed length")
        );

        log::trace!(
            "transformed glyf: {} glyphs, index format {}, overlap bitmap: {}",
            num_glyphs,
            index_format,
            has_overlap_bitmap
        );

        Ok(GlyfDecoder {
            n_contour_stream: substreams[0],
            n_points_stream: substreams[1],
            flag_stream: substreams[2],
            glyph_stream: substreams[3],
            composite_stream: substreams[4],
            bbox_bitmap,
            bbox_stream,
            instruction_stream: substreams[6],
            overlap_bitmap,
            num_glyphs,
            index_format,
        })
    }

    pub fn reconstruct(mut self) -> Result<GlyfAndLocaData, DecodeError> {
        let num_glyphs = self.num_glyphs as usize;
        let mut glyf_table: Vec<u8> = Vec::with_capacity(num_glyphs * 12);
        let mut loca_values: Vec<u32> = Vec::with_capacity(num_glyphs + 1);
        let mut x_mins: Vec<i16> = Vec::with_capacity(num_glyphs);

        for i in 0..num_glyphs {
            loca_values.push(glyf_table.len() as u32);

            let glyph = self.decode_glyph(i)?;
            x_mins.push(glyph.x_min());

            // Write glyph to output table and pad output
            glyph.write(&mut glyf_table);
            glyf_table.resize(Round4!(glyf_table.len()), 0);
            bail_if!(
                glyf_table.len() > u32::MAX as usize,
                invalid("glyf table too large")
            );
        }

        bail_if!(
            !self.streams_consumed(),
            invalid("sub-stream has unconsumed bytes")
        );

        // loca[n] will be equal the length of the glyph data ('glyf') table
        loca_values.push(glyf_table.len() as u32);

        let loca_table = generate_loca_table(&loca_values, self.index_format)?;

        log::debug!(
            "reconstructed glyf ({} bytes) and loca ({} bytes) for {} glyphs",
            glyf_table.len(),
            loca_table.len(),
            num_glyphs
        );

        Ok(GlyfAndLocaData {
            num_glyphs: self.num_glyphs,
            index_format: self.index_format,
            x_mins,
            glyf_table,
            loca_table,
        })
    }

    fn streams_consumed(&self) -> bool {
        [
            self.n_contour_stream,
            self.n_points_stream,
            self.flag_stream,
            self.glyph_stream,
            self.composite_stream,
            self.bbox_stream,
            self.instruction_stream,
        ]
        .iter()
        .all(|stream| stream.is_empty())
    }

    /// Decode glyph `i`. Glyphs must be decoded in order as every call advances the sub-streams.
    pub fn decode_glyph(&mut self, i: usize) -> Result<DecodedGlyph<'a>, DecodeError> {
        let n_contours: i16 = self
            .n_contour_stream
            .try_get_i16()
            .map_err(exhausted("nContour stream exhausted"))?;
        let glyph_has_bbox = (self.bbox_bitmap[i >> 3] & (0x80 >> (i & 7))) != 0;

        match n_contours {
            -1 => {
                // composite glyphs must have an explicit bbox
                bail_if!(!glyph_has_bbox, invalid("composite glyph without bbox"));
                Ok(DecodedGlyph::Composite(self.decode_composite_glyph()?))
            }
            0 => {
                // empty glyph. Must NOT have a bbox.
                bail_if!(glyph_has_bbox, invalid("empty glyph has a bbox"));
                Ok(DecodedGlyph::Empty)
            }
            n if n > 0 => {
                // Note: this indexes into a different bitmap from glyph_has_bbox
                let has_overlap_bit = self
                    .overlap_bitmap
                    .is_some_and(|bitmap| (bitmap[i >> 3] & (0x80 >> (i & 7))) != 0);
                Ok(DecodedGlyph::Simple(self.decode_simple_glyph(
                    n as usize,
                    glyph_has_bbox,
                    has_overlap_bit,
                )?))
            }
            _ => bail!(invalid("negative contour count")),
        }
    }

    fn decode_composite_glyph(&mut self) -> Result<CompositeGlyph<'a>, DecodeError> {
        // Size the records on a copy of the stream so they can be sliced out as-is below
        let (composite_size, have_instructions) =
            compute_size_of_composite(self.composite_stream, self.num_glyphs)?;

        let bbox = BoundingBox::read(&mut self.bbox_stream)?;
        let components = take(
            &mut self.composite_stream,
            composite_size,
            "composite stream exhausted",
        )?;

        let instructions = if have_instructions {
            let instruction_size = self
                .glyph_stream
                .try_get_variable_255_u16()
                .map_err(exhausted("glyph stream exhausted"))?;
            Some(take(
                &mut self.instruction_stream,
                instruction_size as usize,
                "instruction stream exhausted",
            )?)
        } else {
            None
        };

        Ok(CompositeGlyph {
            bbox,
            components,
            instructions,
        })
    }

    fn decode_simple_glyph(
        &mut self,
        n_contours: usize,
        glyph_has_bbox: bool,
        has_overlap_bit: bool,
    ) -> Result<SimpleGlyph<'a>, DecodeError> {
        let mut end_points: Vec<u16> = Vec::with_capacity(n_contours);
        let mut total_n_points: u32 = 0;
        for _ in 0..n_contours {
            let n_points_contour: u16 = self
                .n_points_stream
                .try_get_variable_255_u16()
                .map_err(exhausted("nPoints stream exhausted"))?;
            bail_if!(n_points_contour == 0, invalid("contour without points"));
            bail_if!(
                u32_will_overflow(total_n_points, n_points_contour as u32),
                invalid("too many points")
            );
            total_n_points += n_points_contour as u32;
            bail_if!(total_n_points > 0x10000, invalid("too many points"));
            end_points.push((total_n_points - 1) as u16);
        }

        let flags = take(
            &mut self.flag_stream,
            total_n_points as usize,
            "flag stream exhausted",
        )?;
        let mut points = Vec::with_capacity(total_n_points as usize);
        decode_triplets(flags, &mut self.glyph_stream, &mut points)?;

        let instruction_size = self
            .glyph_stream
            .try_get_variable_255_u16()
            .map_err(exhausted("glyph stream exhausted"))?;
        let instructions = take(
            &mut self.instruction_stream,
            instruction_size as usize,
            "instruction stream exhausted",
        )?;

        let bbox = if glyph_has_bbox {
            BoundingBox::read(&mut self.bbox_stream)?
        } else {
            BoundingBox::from_points(&points)
        };

        Ok(SimpleGlyph {
            bbox,
            end_points,
            instructions,
            points,
            overlap: has_overlap_bit,
        })
    }
}

/// Walk the component records of one composite glyph.
///
/// Returns the size of the records in bytes and whether any component requests instructions.
fn compute_size_of_composite(
    mut composite_stream: &[u8],
    num_glyphs: u16,
) -> Result<(usize, bool), DecodeError> {
    let mut bytes_read: usize = 0;
    let mut we_have_instructions: bool = false;
    let mut flags: u16 = FLAG_MORE_COMPONENTS;
    while flags & FLAG_MORE_COMPONENTS != 0 {
        flags = composite_stream
            .try_get_u16()
            .map_err(exhausted("composite stream exhausted"))?;
        let glyph_index = composite_stream
            .try_get_u16()
            .map_err(exhausted("composite stream exhausted"))?;
        bail_if!(
            glyph_index >= num_glyphs,
            invalid("component glyph index out of range")
        );
        we_have_instructions |= (flags & FLAG_WE_HAVE_INSTRUCTIONS) != 0;

        let mut arg_size: usize = if flags & FLAG_ARG_1_AND_2_ARE_WORDS != 0 {
            4
        } else {
            2
        };
        if flags & FLAG_WE_HAVE_A_SCALE != 0 {
            arg_size += 2;
        } else if flags & FLAG_WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            arg_size += 4;
        } else if flags & FLAG_WE_HAVE_A_TWO_BY_TWO != 0 {
            arg_size += 8;
        }
        bail_if!(
            arg_size > composite_stream.remaining(),
            invalid("composite stream exhausted")
        );
        composite_stream.advance(arg_size);

        // flags + glyph index + arguments
        bytes_read += 4 + arg_size;
    }

    Ok((bytes_read, we_have_instructions))
}

/// Decode one point per flag byte from the triplet data in `glyph_stream`, advancing it.
///
/// <https://www.w3.org/TR/WOFF2/#triplet_decoding>
fn decode_triplets(
    flags: &[u8],
    glyph_stream: &mut &[u8],
    result: &mut Vec<Point>,
) -> Result<(), DecodeError> {
    #[inline(always)]
    fn with_sign(flag: i32, baseval: i32) -> i32 {
        // Precondition: 0 <= baseval < 65536 (to avoid integer overflow)
        if (flag & 1) != 0 { baseval } else { -baseval }
    }

    let mut x: i32 = 0;
    let mut y: i32 = 0;

    let input: &[u8] = *glyph_stream;
    // Every point takes at least one byte
    bail_if!(flags.len() > input.len(), invalid("glyph stream exhausted"));

    let mut triplet_index: usize = 0;

    for &flag in flags {
        let on_curve: bool = (flag >> 7) == 0;
        let flag = (flag & 0x7f) as i32;

        let n_data_bytes: usize = if flag < 84 {
            1
        } else if flag < 120 {
            2
        } else if flag < 124 {
            3
        } else {
            4
        };

        bail_if!(
            usize_will_overflow(triplet_index, n_data_bytes)
                || (triplet_index + n_data_bytes) > input.len(),
            invalid("glyph stream exhausted")
        );
        let data = &input[triplet_index..triplet_index + n_data_bytes];

        let dx: i32;
        let dy: i32;
        if flag < 10 {
            dx = 0;
            dy = with_sign(flag, ((flag & 14) << 7) + data[0] as i32);
        } else if flag < 20 {
            dx = with_sign(flag, (((flag - 10) & 14) << 7) + data[0] as i32);
            dy = 0;
        } else if flag < 84 {
            let b0: i32 = flag - 20;
            let b1: i32 = data[0] as i32;
            dx = with_sign(flag, 1 + (b0 & 0x30) + (b1 >> 4));
            dy = with_sign(flag >> 1, 1 + ((b0 & 0x0c) << 2) + (b1 & 0x0f));
        } else if flag < 120 {
            let b0: i32 = flag - 84;
            dx = with_sign(flag, 1 + ((b0 / 12) << 8) + data[0] as i32);
            dy = with_sign(flag >> 1, 1 + (((b0 % 12) >> 2) << 8) + data[1] as i32);
        } else if flag < 124 {
            let b2: i32 = data[1] as i32;
            dx = with_sign(flag, ((data[0] as i32) << 4) + (b2 >> 4));
            dy = with_sign(flag >> 1, ((b2 & 0x0f) << 8) + data[2] as i32);
        } else {
            dx = with_sign(flag, ((data[0] as i32) << 8) + data[1] as i32);
            dy = with_sign(flag >> 1, ((data[2] as i32) << 8) + data[3] as i32);
        }
        triplet_index += n_data_bytes;
        x = x.checked_add(dx).ok_or_else(|| invalid("coordinate overflow"))?;
        y = y.checked_add(dy).ok_or_else(|| invalid("coordinate overflow"))?;

        result.push(Point { x, y, on_curve });
    }

    glyph_stream.advance(triplet_index);
    Ok(())
}

/// Append the flags and coordinates of a simple glyph.
///
/// Runs of identical flags are collapsed with GLYF_REPEAT (at most 255 repeats per run).
/// Deltas below 256 in magnitude use the short form, zero deltas use the "same" bit.
fn write_glyph_points(points: &[Point], has_overlap_bit: bool, dst: &mut Vec<u8>) {
    let mut last_flag: Option<u8> = None;
    let mut last_flag_pos: usize = 0;
    let mut repeat_count: u8 = 0;
    let mut last_x: i32 = 0;
    let mut last_y: i32 = 0;
    for (i, point) in points.iter().enumerate() {
        let mut flag: u8 = 0;
        if point.on_curve {
            flag |= GLYF_ON_CURVE;
        }
        if has_overlap_bit && i == 0 {
            flag |= OVERLAP_SIMPLE;
        }

        let dx: i32 = point.x - last_x;
        if dx == 0 {
            flag |= GLYF_THIS_X_IS_SAME;
        } else if dx > -256 && dx < 256 {
            flag |= GLYF_X_SHORT | (if dx > 0 { GLYF_THIS_X_IS_SAME } else { 0 });
        }

        let dy: i32 = point.y - last_y;
        if dy == 0 {
            flag |= GLYF_THIS_Y_IS_SAME;
        } else if dy > -256 && dy < 256 {
            flag |= GLYF_Y_SHORT | (if dy > 0 { GLYF_THIS_Y_IS_SAME } else { 0 });
        }

        if last_flag == Some(flag) && repeat_count != 255 {
            dst[last_flag_pos] |= GLYF_REPEAT;
            repeat_count += 1;
        } else {
            if repeat_count != 0 {
                dst.put_u8(repeat_count);
            }
            last_flag_pos = dst.len();
            dst.put_u8(flag);
            repeat_count = 0;
        }

        last_x = point.x;
        last_y = point.y;
        last_flag = Some(flag);
    }
    if repeat_count != 0 {
        dst.put_u8(repeat_count);
    }

    // x coordinates
    last_x = 0;
    for point in points {
        let dx: i32 = point.x - last_x;
        if dx == 0 {
            // same as previous
        } else if dx > -256 && dx < 256 {
            dst.put_u8(dx.unsigned_abs() as u8);
        } else {
            // will always fit for valid input, but overflow is harmless
            dst.put_i16(dx as i16)
        }
        last_x = point.x;
    }

    // y coordinates
    last_y = 0;
    for point in points {
        let dy: i32 = point.y - last_y;
        if dy == 0 {
            // same as previous
        } else if dy > -256 && dy < 256 {
            dst.put_u8(dy.unsigned_abs() as u8);
        } else {
            dst.put_i16(dy as i16)
        }
        last_y = point.y;
    }
}

/// Generate a loca table given a slice of loca offsets and an index format
///
/// See <https://developer.apple.com/fonts/TrueType-Reference-Manual/RM06/Chap6loca.html>
pub(crate) fn generate_loca_table(
    loca_values: &[u32],
    index_format: u16,
) -> Result<Vec<u8>, DecodeError> {
    let offset_size: usize = if index_format != 0 { 4 } else { 2 };
    let mut loca_content: Vec<u8> = Vec::with_capacity(loca_values.len() * offset_size);
    if index_format != 0 {
        for &value in loca_values {
            // loca long version. The actual local offset is stored.
            loca_content.put_u32(value);
        }
    } else {
        for &value in loca_values {
            // loca short version. The actual local offset divided by 2 is stored.
            bail_if!(
                value > 0x1FFFE,
                invalid("glyf table too large for short loca offsets")
            );
            loca_content.put_u16((value >> 1) as u16);
        }
    }

    Ok(loca_content)
}
