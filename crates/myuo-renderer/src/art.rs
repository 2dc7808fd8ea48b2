// art.rs — run-length static sprite and diamond land tile decoders

use myuo_common::reader::DataReader;
use myuo_common::uofiles::{LAND_PIXEL_COUNT, LAND_TILE_SIZE};

use crate::texture::Rectangle;

// ============================================================
// Pixel format
// ============================================================

/// Alpha byte of an opaque RGBA pixel.
pub const OPAQUE: u32 = 0xFF00_0000;

/// Stored for a zero sample whose whole run is exactly one pixel long.
/// Non-transparent for hit-testing, visually indistinguishable from the
/// background; downstream consumers depend on this exact value.
pub const MARKER_PIXEL: u32 = 0x0000_0001;

/// A run with `x_offset + length` at or past this marks a corrupt
/// record. Legacy data files are known to contain a few of these.
const MAX_RUN_EXTENT: u32 = 2048;

#[inline]
fn scale5(v: u16) -> u32 {
    let v = v as u32;
    (v << 3) | (v >> 2)
}

/// Expand a packed 5-5-5 sample to 8-8-8 RGB (no alpha).
#[inline]
pub fn color16_to_32(c: u16) -> u32 {
    scale5((c >> 10) & 0x1F) | scale5((c >> 5) & 0x1F) << 8 | scale5(c & 0x1F) << 16
}

// ============================================================
// Static sprite decoding
// ============================================================

/// A decoded static sprite: RGBA pixels plus the tight bounds of its
/// non-transparent content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticArt {
    pub pixels: Vec<u32>,
    pub width: u16,
    pub height: u16,
    pub bounds: Rectangle,
}

/// Decode a static sprite record.
///
/// Record layout: 4 reserved bytes, i16 width, i16 height, a table of
/// `height` u16 scanline start offsets (in 16-bit words, relative to the
/// end of the table), then the run stream. Scanlines are re-seeked
/// through the table; they are not guaranteed adjacent in the stream.
///
/// Returns `None` for blank records (zero dimension), corrupt run
/// encodings, and truncated data alike — absent or broken art decodes
/// to "no image", never an error.
pub fn decode_static(reader: &mut DataReader, id: u16, cave_border: bool) -> Option<StaticArt> {
    reader.skip(4)?;
    let width = reader.read_i16()?;
    let height = reader.read_i16()?;

    if width <= 0 || height <= 0 {
        return None;
    }

    // No legal run fits a row this wide; reject before allocating.
    if width as u32 >= MAX_RUN_EXTENT {
        return None;
    }

    let width = width as usize;
    let height = height as usize;

    let mut line_offsets = Vec::with_capacity(height);
    for _ in 0..height {
        line_offsets.push(reader.read_u16()?);
    }
    let data_start = reader.position();

    let mut pixels = vec![0u32; width * height];
    let mut x = 0usize;
    let mut y = 0usize;
    reader.seek(data_start + line_offsets[0] as usize * 2)?;

    while y < height {
        let xoffs = reader.read_u16()? as u32;
        let run = reader.read_u16()? as u32;

        if xoffs + run >= MAX_RUN_EXTENT {
            return None;
        }

        if xoffs + run != 0 {
            x += xoffs as usize;
            if x + run as usize > width {
                return None;
            }

            let mut pos = y * width + x;
            for _ in 0..run {
                let val = reader.read_u16()?;
                pixels[pos] = if val == 0 && run == 1 {
                    MARKER_PIXEL
                } else if val != 0 {
                    color16_to_32(val) | OPAQUE
                } else {
                    0
                };
                pos += 1;
            }
            x += run as usize;
        } else {
            x = 0;
            y += 1;
            if y < height {
                reader.seek(data_start + line_offsets[y] as usize * 2)?;
            }
        }
    }

    if is_border_erase_id(id) {
        erase_border(&mut pixels, width, height);
    } else if cave_border {
        outline_cave_edges(&mut pixels, width, height);
    }

    let bounds = compute_bounds(&pixels, width, height);

    Some(StaticArt {
        pixels,
        width: width as u16,
        height: height as u16,
        bounds,
    })
}

// ============================================================
// Post-decode filters
// ============================================================

/// Ids known to carry a one-pixel garbage border baked into the source
/// data.
#[inline]
pub fn is_border_erase_id(id: u16) -> bool {
    matches!(id, 0x2053..=0x2062 | 0x206A..=0x2079)
}

/// Force the outermost row and column transparent.
fn erase_border(pixels: &mut [u32], width: usize, height: usize) {
    for i in 0..width {
        pixels[i] = 0;
        pixels[(height - 1) * width + i] = 0;
    }
    for i in 0..height {
        pixels[i * width] = 0;
        pixels[i * width + width - 1] = 0;
    }
}

/// Recolor every non-transparent pixel that touches a transparent one
/// (8-connected, clamped at the image edges) to opaque black.
///
/// Classification reads a snapshot of the pre-pass buffer, so one
/// pixel's edit never feeds another's decision; the pass is idempotent.
pub fn outline_cave_edges(pixels: &mut [u32], width: usize, height: usize) {
    let snapshot = pixels.to_vec();

    for y in 0..height {
        for x in 0..width {
            let pos = y * width + x;
            if snapshot[pos] == 0 {
                continue;
            }

            let x0 = x.saturating_sub(1);
            let x1 = (x + 1).min(width - 1);
            let y0 = y.saturating_sub(1);
            let y1 = (y + 1).min(height - 1);

            'neighbors: for ny in y0..=y1 {
                for nx in x0..=x1 {
                    if snapshot[ny * width + nx] == 0 {
                        pixels[pos] = OPAQUE;
                        break 'neighbors;
                    }
                }
            }
        }
    }
}

/// Inclusive min/max scan over the non-transparent pixels. The result
/// stores extents (`max - min`), not counts; an all-transparent buffer
/// yields a zero rectangle at the origin.
pub fn compute_bounds(pixels: &[u32], width: usize, height: usize) -> Rectangle {
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0usize;
    let mut max_y = 0usize;
    let mut found = false;

    let mut pos = 0;
    for y in 0..height {
        for x in 0..width {
            if pixels[pos] != 0 {
                found = true;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
            pos += 1;
        }
    }

    if !found {
        return Rectangle::default();
    }

    Rectangle::new(
        min_x as i32,
        min_y as i32,
        (max_x - min_x) as i32,
        (max_y - min_y) as i32,
    )
}

// ============================================================
// Land tile decoding
// ============================================================

/// Decode a 44x44 diamond land tile record: 22 top rows of growing run
/// length, 22 bottom rows shrinking back, raw 5-5-5 samples, no header
/// and no transparency. Pixels outside the diamond stay zero.
///
/// Returns `None` when the record is truncated.
pub fn decode_land(reader: &mut DataReader) -> Option<Vec<u32>> {
    let mut pixels = vec![0u32; LAND_PIXEL_COUNT];

    for i in 0..22 {
        let start = 22 - (i + 1);
        let run = (i + 1) * 2;
        let mut pos = i * LAND_TILE_SIZE + start;
        for _ in 0..run {
            let val = reader.read_u16()?;
            pixels[pos] = color16_to_32(val) | OPAQUE;
            pos += 1;
        }
    }

    for i in 0..22 {
        let run = (22 - i) * 2;
        let mut pos = (i + 22) * LAND_TILE_SIZE + i;
        for _ in 0..run {
            let val = reader.read_u16()?;
            pixels[pos] = color16_to_32(val) | OPAQUE;
            pos += 1;
        }
    }

    Some(pixels)
}

// ============================================================
// Unit tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Build a static record from per-scanline run lists. Each scanline
    /// is a sequence of `(x_offset, samples)` runs; the terminator pair
    /// and the offset table are filled in here.
    fn make_static_record(width: i16, height: i16, lines: &[&[(u16, &[u16])]]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::new();

        for line in lines {
            offsets.push((data.len() / 2) as u16);
            for (xoffs, samples) in line.iter() {
                push_u16(&mut data, *xoffs);
                push_u16(&mut data, samples.len() as u16);
                for s in samples.iter() {
                    push_u16(&mut data, *s);
                }
            }
            push_u16(&mut data, 0);
            push_u16(&mut data, 0);
        }

        let mut buf = vec![0u8; 4]; // reserved/format marker
        push_u16(&mut buf, width as u16);
        push_u16(&mut buf, height as u16);
        for o in &offsets {
            push_u16(&mut buf, *o);
        }
        buf.extend_from_slice(&data);
        buf
    }

    fn decode(record: &[u8], id: u16, cave: bool) -> Option<StaticArt> {
        decode_static(&mut DataReader::new(record.to_vec()), id, cave)
    }

    fn make_land_record(sample: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        for _ in 0..1012 {
            push_u16(&mut buf, sample);
        }
        buf
    }

    // ----- color expansion -----

    #[test]
    fn color_expansion_extremes() {
        assert_eq!(color16_to_32(0x7FFF) | OPAQUE, 0xFFFF_FFFF);
        assert_eq!(color16_to_32(0x0000), 0);
        // pure red in 5-5-5 lands in the low byte (RGBA little-endian)
        assert_eq!(color16_to_32(0x7C00), 0x0000_00FF);
        // pure blue in the third byte
        assert_eq!(color16_to_32(0x001F), 0x00FF_0000);
    }

    // ----- static decoding -----

    #[test]
    fn zero_sample_in_longer_run_stays_transparent() {
        // width=2, height=1, one run of two samples [0x0000, 0x7FFF]:
        // the zero stays transparent because the run is longer than one.
        let record = make_static_record(2, 1, &[&[(0, &[0x0000, 0x7FFF])]]);
        let art = decode(&record, 1, false).unwrap();
        assert_eq!(art.pixels, vec![0x0000_0000, 0xFFFF_FFFF]);
        assert_eq!((art.width, art.height), (2, 1));
        assert_eq!(art.bounds, Rectangle::new(1, 0, 0, 0));
    }

    #[test]
    fn zero_sample_in_single_run_becomes_marker() {
        let record = make_static_record(1, 1, &[&[(0, &[0x0000])]]);
        let art = decode(&record, 1, false).unwrap();
        assert_eq!(art.pixels, vec![MARKER_PIXEL]);
        // The marker is non-transparent, so it anchors the bounds.
        assert_eq!(art.bounds, Rectangle::new(0, 0, 0, 0));
    }

    #[test]
    fn decode_is_deterministic() {
        let record = make_static_record(
            4,
            2,
            &[&[(1, &[0x1234, 0x0FF0])], &[(0, &[0x7C1F])]],
        );
        let a = decode(&record, 7, false).unwrap();
        let b = decode(&record, 7, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn x_offset_positions_run() {
        let record = make_static_record(4, 1, &[&[(2, &[0x7FFF, 0x7FFF])]]);
        let art = decode(&record, 1, false).unwrap();
        assert_eq!(art.pixels, vec![0, 0, 0xFFFF_FFFF, 0xFFFF_FFFF]);
        assert_eq!(art.bounds, Rectangle::new(2, 0, 1, 0));
    }

    #[test]
    fn scanlines_need_not_be_contiguous() {
        // Two 1-pixel scanlines stored back to front: the offset table
        // points row 0 past row 1's data.
        let mut data = Vec::new();
        // row 1 stream first (word offset 0)
        push_u16(&mut data, 0);
        push_u16(&mut data, 1);
        push_u16(&mut data, 0x001F);
        push_u16(&mut data, 0);
        push_u16(&mut data, 0);
        let row0_offset = (data.len() / 2) as u16;
        // row 0 stream second
        push_u16(&mut data, 0);
        push_u16(&mut data, 1);
        push_u16(&mut data, 0x7C00);
        push_u16(&mut data, 0);
        push_u16(&mut data, 0);

        let mut record = vec![0u8; 4];
        push_u16(&mut record, 1); // width
        push_u16(&mut record, 2); // height
        push_u16(&mut record, row0_offset);
        push_u16(&mut record, 0);
        record.extend_from_slice(&data);

        let art = decode(&record, 1, false).unwrap();
        assert_eq!(art.pixels[0], 0x0000_00FF | OPAQUE); // red on row 0
        assert_eq!(art.pixels[1], 0x00FF_0000 | OPAQUE); // blue on row 1
    }

    #[test]
    fn blank_dimensions_decode_to_no_image() {
        let record = make_static_record(0, 0, &[]);
        assert!(decode(&record, 1, false).is_none());
        let record = make_static_record(0, 4, &[&[], &[], &[], &[]]);
        assert!(decode(&record, 1, false).is_none());
    }

    #[test]
    fn corrupt_run_extent_decodes_to_no_image() {
        let record = make_static_record(4, 1, &[&[(2000, &[0x7FFF; 48])]]);
        assert!(decode(&record, 1, false).is_none());
    }

    #[test]
    fn run_past_row_end_decodes_to_no_image() {
        // In-extent run that would still write past the row.
        let record = make_static_record(2, 1, &[&[(1, &[0x7FFF, 0x7FFF])]]);
        assert!(decode(&record, 1, false).is_none());
    }

    #[test]
    fn truncated_record_decodes_to_no_image() {
        let record = make_static_record(2, 1, &[&[(0, &[0x7FFF, 0x7FFF])]]);
        for len in 0..record.len() {
            assert!(decode(&record[..len], 1, false).is_none(), "len {}", len);
        }
    }

    #[test]
    fn bounds_edges_carry_content() {
        // 3x3 with opaque pixels at (0,1) and (2,1): bounds span the full
        // width of the content, zero height extent.
        let record = make_static_record(
            3,
            3,
            &[&[], &[(0, &[0x7FFF]), (1, &[0x7FFF])], &[]],
        );
        let art = decode(&record, 1, false).unwrap();
        assert_eq!(art.bounds, Rectangle::new(0, 1, 2, 0));
    }

    #[test]
    fn all_transparent_buffer_yields_zero_bounds() {
        let record = make_static_record(3, 2, &[&[], &[]]);
        let art = decode(&record, 1, false).unwrap();
        assert!(art.pixels.iter().all(|&p| p == 0));
        assert_eq!(art.bounds, Rectangle::default());
    }

    // ----- border erase -----

    const WHITE_ROW: [u16; 3] = [0x7FFF; 3];

    #[test]
    fn border_erase_applies_to_known_id_ranges() {
        let full: &[(u16, &[u16])] = &[(0, &WHITE_ROW)];
        let record = make_static_record(3, 3, &[full, full, full]);

        let art = decode(&record, 0x2053, false).unwrap();
        for y in 0..3usize {
            for x in 0..3usize {
                let expect_opaque = x == 1 && y == 1;
                assert_eq!(art.pixels[y * 3 + x] != 0, expect_opaque, "({}, {})", x, y);
            }
        }
        assert_eq!(art.bounds, Rectangle::new(1, 1, 0, 0));

        // Same record outside the ranges keeps its border.
        let art = decode(&record, 0x2052, false).unwrap();
        assert!(art.pixels.iter().all(|&p| p != 0));
    }

    #[test]
    fn border_erase_id_ranges() {
        assert!(is_border_erase_id(0x2053));
        assert!(is_border_erase_id(0x2062));
        assert!(is_border_erase_id(0x206A));
        assert!(is_border_erase_id(0x2079));
        assert!(!is_border_erase_id(0x2052));
        assert!(!is_border_erase_id(0x2063));
        assert!(!is_border_erase_id(0x2069));
        assert!(!is_border_erase_id(0x207A));
    }

    // ----- cave outline -----

    #[test]
    fn cave_outline_darkens_pixels_touching_transparency() {
        // 3x3 ring of white around a transparent center: every ring
        // pixel touches the hole, so the whole ring goes black.
        let mut pixels = vec![0xFFFF_FFFF_u32; 9];
        pixels[4] = 0;
        outline_cave_edges(&mut pixels, 3, 3);
        for (i, &p) in pixels.iter().enumerate() {
            if i == 4 {
                assert_eq!(p, 0);
            } else {
                assert_eq!(p, OPAQUE);
            }
        }
    }

    #[test]
    fn cave_outline_ignores_interior_pixels() {
        // Fully opaque buffer: edge clamping means no pixel sees a
        // transparent neighbor, so nothing changes.
        let mut pixels = vec![0xFFFF_FFFF_u32; 9];
        outline_cave_edges(&mut pixels, 3, 3);
        assert!(pixels.iter().all(|&p| p == 0xFFFF_FFFF));
    }

    #[test]
    fn cave_outline_is_idempotent() {
        let record = make_static_record(
            4,
            3,
            &[&[(0, &[0x7FFF, 0x7FFF])], &[(1, &[0x7FFF, 0x7FFF, 0x7FFF])], &[]],
        );
        let art = decode(&record, 1, true).unwrap();
        let mut again = art.pixels.clone();
        outline_cave_edges(&mut again, 4, 3);
        assert_eq!(again, art.pixels);
    }

    #[test]
    fn cave_outline_uses_pre_pass_snapshot() {
        // Row of three opaque pixels next to a transparent cell: only
        // the pixels that touched transparency before the pass turn
        // black; their recoloring must not cascade.
        let mut pixels = vec![
            0, 0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF, //
        ];
        outline_cave_edges(&mut pixels, 4, 1);
        assert_eq!(pixels, vec![0, OPAQUE, 0xFFFF_FFFF, 0xFFFF_FFFF]);
    }

    #[test]
    fn border_erase_takes_precedence_over_cave_outline() {
        let full: &[(u16, &[u16])] = &[(0, &WHITE_ROW)];
        let record = make_static_record(3, 3, &[full, full, full]);
        // Id is in the erase range; the cave flag must not re-outline
        // what the erase pass exposed.
        let art = decode(&record, 0x2060, true).unwrap();
        assert_eq!(art.pixels[4], 0xFFFF_FFFF);
    }

    // ----- land decoding -----

    #[test]
    fn land_record_fills_diamond() {
        let record = make_land_record(0x7FFF);
        let pixels = decode_land(&mut DataReader::new(record)).unwrap();
        assert_eq!(pixels.len(), LAND_PIXEL_COUNT);

        let opaque = pixels.iter().filter(|&&p| p != 0).count();
        assert_eq!(opaque, 1012);
        assert!(pixels.iter().all(|&p| p == 0 || p == 0xFFFF_FFFF));

        // Row 0: two pixels centered on the diamond tip.
        assert_eq!(pixels[21], 0xFFFF_FFFF);
        assert_eq!(pixels[22], 0xFFFF_FFFF);
        assert_eq!(pixels[20], 0);
        assert_eq!(pixels[23], 0);

        // Rows 21 and 22 are full-width.
        for x in 0..LAND_TILE_SIZE {
            assert_eq!(pixels[21 * LAND_TILE_SIZE + x], 0xFFFF_FFFF);
            assert_eq!(pixels[22 * LAND_TILE_SIZE + x], 0xFFFF_FFFF);
        }

        // Bottom row narrows back to two pixels.
        assert_eq!(pixels[43 * LAND_TILE_SIZE + 20], 0);
        assert_eq!(pixels[43 * LAND_TILE_SIZE + 21], 0xFFFF_FFFF);
        assert_eq!(pixels[43 * LAND_TILE_SIZE + 22], 0xFFFF_FFFF);
        assert_eq!(pixels[43 * LAND_TILE_SIZE + 23], 0);
    }

    #[test]
    fn land_diamond_is_opaque_everywhere_it_is_filled() {
        let record = make_land_record(0x0000);
        let pixels = decode_land(&mut DataReader::new(record)).unwrap();
        // Zero samples still decode opaque: land has no transparency
        // convention inside the diamond.
        let black = pixels.iter().filter(|&&p| p == OPAQUE).count();
        assert_eq!(black, 1012);
    }

    #[test]
    fn truncated_land_record_fails() {
        let record = make_land_record(0x7FFF);
        assert!(decode_land(&mut DataReader::new(record[..record.len() - 1].to_vec())).is_none());
        assert!(decode_land(&mut DataReader::new(Vec::new())).is_none());
    }
}
