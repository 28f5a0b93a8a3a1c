use crate::bias::CorrectionFactors;
use crate::colormap::{ColorMap, Rgb};
use crate::histogram::{bin_of, Histogram};
use crate::raw::RawData;
use crate::segment::SegmentId;

/// An RGB raster covering one amplifier's whole readout.
///
/// Datasec pixels carry the scaled image. Border pixels mark the readout
/// regions: prescan columns green, serial overscan red, parallel overscan
/// blue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTile {
    id: SegmentId,
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl RenderedTile {
    /// Scale `raw` through `histogram` into `cmap`.
    ///
    /// `histogram` is either the amplifier's own or a merged one covering
    /// many amplifiers; every corrected datasec value falls inside its range.
    pub fn render(raw: &RawData, factors: &CorrectionFactors, histogram: &Histogram, cmap: &ColorMap) -> Self {
        let segment = raw.segment();
        let (width, height) = (segment.naxis1(), segment.naxis2());
        let d = *segment.datasec();
        let mut pixels = vec![Rgb::BLACK; width * height];

        for (y, row) in pixels.chunks_exact_mut(width).enumerate() {
            row[..d.x].fill(Rgb::GREEN);
            row[d.right()..].fill(Rgb::RED);
            if y >= d.bottom() {
                row[d.x..d.right()].fill(Rgb::BLUE);
            }
        }

        let size = cmap.size();
        for y in d.y..d.bottom() {
            for x in d.x..d.right() {
                let bin = bin_of(raw.get(x, y), factors.factor(x, y));
                pixels[x + y * width] = cmap.get(histogram.color_index(bin, size));
            }
        }

        RenderedTile {
            id: segment.id().clone(),
            width,
            height,
            pixels,
        }
    }

    pub fn id(&self) -> &SegmentId {
        &self.id
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Rgb {
        self.pixels[x + y * self.width]
    }
}
