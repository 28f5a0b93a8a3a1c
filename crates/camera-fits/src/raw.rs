use std::fs::File;
use std::sync::Arc;

use crate::endian::decode_i32_be;
use crate::error::{Error, Result};
use crate::io::read_range;
use crate::segment::Segment;
use crate::tiled::decode_gzip2;

/// Decoded pixels of one amplifier, row-major over the whole readout.
#[derive(Debug)]
pub struct RawData {
    segment: Arc<Segment>,
    pixels: Vec<i32>,
}

impl RawData {
    /// Wrap already-decoded pixels.
    ///
    /// The buffer must cover the full `naxis1 x naxis2` readout.
    pub fn new(segment: Arc<Segment>, pixels: Vec<i32>) -> Result<Self> {
        let expected = segment.naxis1() * segment.naxis2();
        if pixels.len() != expected {
            return Err(Error::InvalidGeometry(format!(
                "{} pixels for a {}x{} readout",
                pixels.len(),
                segment.naxis1(),
                segment.naxis2()
            )));
        }
        Ok(RawData { segment, pixels })
    }

    /// Read and decode the segment's data block with one positioned read.
    pub fn load(segment: Arc<Segment>, file: &File) -> Result<Self> {
        let bytes = read_range(file, segment.id().offset, segment.data_len())?;
        let pixels = match segment.compression() {
            Some(layout) => decode_gzip2(&bytes, layout, segment.naxis1(), segment.naxis2())?,
            None => decode_i32_be(&bytes),
        };
        RawData::new(segment, pixels)
    }

    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    pub fn pixels(&self) -> &[i32] {
        &self.pixels
    }

    /// Pixel at readout column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> i32 {
        self.pixels[x + y * self.segment.naxis1()]
    }
}
