//! `GZIP_2` tile-compressed amplifier data.
//!
//! A compressed amplifier is stored as a binary table with one row per tile.
//! The first eight bytes of each row are a P-descriptor pointing into the
//! heap that follows the table. Each tile is an independent gzip member
//! whose inflated payload holds the tile's 32-bit pixels split into four
//! byte planes (all most-significant bytes first, then the next byte, ...).

use crate::endian::read_u32_be;
use crate::error::{Error, Result};

/// Size of a gzip member header without optional fields.
const GZIP_HEADER_LEN: usize = 10;

/// Table and tile geometry of a compressed amplifier, from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    /// Table row width in bytes (`NAXIS1`).
    pub row_width: usize,
    /// Number of table rows, one per tile (`NAXIS2`).
    pub rows: usize,
    /// Heap length in bytes (`PCOUNT`).
    pub heap_len: usize,
    /// Tile width in pixels (`ZTILE1`).
    pub tile_width: usize,
    /// Tile height in pixels (`ZTILE2`).
    pub tile_height: usize,
}

impl TileLayout {
    /// Bytes occupied on disk by the table plus its heap.
    pub fn data_len(&self) -> usize {
        self.row_width * self.rows + self.heap_len
    }

    fn table_len(&self) -> usize {
        self.row_width * self.rows
    }
}

/// Strip the gzip member header and trailer, returning the raw deflate payload.
fn strip_gzip_header(data: &[u8]) -> Result<&[u8]> {
    if data.len() < GZIP_HEADER_LEN + 8 || data[0] != 0x1f || data[1] != 0x8b || data[2] != 0x08 {
        return Err(Error::Decompression("tile is not a gzip member".into()));
    }
    let flg = data[3];
    let mut pos = GZIP_HEADER_LEN;
    if flg & 0x04 != 0 {
        // FEXTRA
        let xlen = data
            .get(pos..pos + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
            .ok_or_else(|| Error::Decompression("truncated gzip extra field".into()))?;
        pos += 2 + xlen;
    }
    for flag in [0x08, 0x10] {
        // FNAME, FCOMMENT: null-terminated
        if flg & flag != 0 {
            while pos < data.len() && data[pos] != 0 {
                pos += 1;
            }
            pos += 1;
        }
    }
    if flg & 0x02 != 0 {
        pos += 2;
    }
    if data.len() < pos + 8 {
        return Err(Error::Decompression("truncated gzip member".into()));
    }
    Ok(&data[pos..data.len() - 8])
}

/// Reassemble 32-bit pixels from four consecutive byte planes.
///
/// `planes.len()` must be `4 * out.len()`.
pub fn unshuffle(planes: &[u8], out: &mut [i32]) {
    let n = out.len();
    debug_assert_eq!(planes.len(), 4 * n);
    for (i, px) in out.iter_mut().enumerate() {
        *px = i32::from_be_bytes([planes[i], planes[i + n], planes[i + 2 * n], planes[i + 3 * n]]);
    }
}

/// Split 32-bit pixels into four byte planes, the inverse of [`unshuffle`].
pub fn shuffle(pixels: &[i32]) -> Vec<u8> {
    let n = pixels.len();
    let mut planes = vec![0u8; 4 * n];
    for (i, px) in pixels.iter().enumerate() {
        for (plane, byte) in px.to_be_bytes().into_iter().enumerate() {
            planes[plane * n + i] = byte;
        }
    }
    planes
}

/// Shuffle and gzip one tile of pixels into a `GZIP_2` heap entry.
///
/// The member trailer carries a zero CRC; readers of camera data do not
/// verify it.
pub fn compress_tile(pixels: &[i32]) -> Vec<u8> {
    let deflated = miniz_oxide::deflate::compress_to_vec(&shuffle(pixels), 6);
    let mut member = Vec::with_capacity(GZIP_HEADER_LEN + deflated.len() + 8);
    member.extend_from_slice(&[0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff]);
    member.extend_from_slice(&deflated);
    member.extend_from_slice(&0u32.to_le_bytes());
    member.extend_from_slice(&(4 * pixels.len() as u32).to_le_bytes());
    member
}

/// Decode a `GZIP_2` compressed amplifier of `naxis1 x naxis2` pixels.
///
/// `data` is the table followed by its heap, exactly as stored in the file.
/// Tiles are laid out row-major over the tile grid; edge tiles are clipped
/// to the image.
pub fn decode_gzip2(data: &[u8], layout: &TileLayout, naxis1: usize, naxis2: usize) -> Result<Vec<i32>> {
    if layout.row_width < 8 {
        return Err(Error::Decompression(format!(
            "table row of {} bytes cannot hold a tile descriptor",
            layout.row_width
        )));
    }
    if layout.tile_width == 0 || layout.tile_height == 0 {
        return Err(Error::Decompression("zero tile size".into()));
    }
    if data.len() < layout.data_len() {
        return Err(Error::Decompression(format!(
            "expected {} bytes of table and heap, got {}",
            layout.data_len(),
            data.len()
        )));
    }

    let tiles_across = naxis1.div_ceil(layout.tile_width);
    let tiles_down = naxis2.div_ceil(layout.tile_height);
    if tiles_across * tiles_down != layout.rows {
        return Err(Error::Decompression(format!(
            "{} table rows for a {}x{} tile grid",
            layout.rows, tiles_across, tiles_down
        )));
    }

    let heap = &data[layout.table_len()..layout.data_len()];
    let mut pixels = vec![0i32; naxis1 * naxis2];
    let mut tile = Vec::new();

    for row in 0..layout.rows {
        let desc = &data[row * layout.row_width..];
        let count = read_u32_be(desc) as usize;
        let offset = read_u32_be(&desc[4..]) as usize;
        let member = heap
            .get(offset..offset + count)
            .ok_or_else(|| Error::Decompression(format!("tile {row} lies outside the heap")))?;

        let (tx, ty) = (row % tiles_across, row / tiles_across);
        let x0 = tx * layout.tile_width;
        let y0 = ty * layout.tile_height;
        let w = layout.tile_width.min(naxis1 - x0);
        let h = layout.tile_height.min(naxis2 - y0);

        let planes = miniz_oxide::inflate::decompress_to_vec_with_limit(strip_gzip_header(member)?, 4 * w * h)
            .map_err(|e| Error::Decompression(format!("tile {row}: {e:?}")))?;
        if planes.len() != 4 * w * h {
            return Err(Error::Decompression(format!(
                "tile {row} inflated to {} bytes, expected {}",
                planes.len(),
                4 * w * h
            )));
        }

        tile.resize(w * h, 0);
        unshuffle(&planes, &mut tile);
        for (r, src) in tile.chunks_exact(w).enumerate() {
            let start = (y0 + r) * naxis1 + x0;
            pixels[start..start + w].copy_from_slice(src);
        }
    }

    Ok(pixels)
}
