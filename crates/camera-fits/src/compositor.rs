//! Drawing rendered tiles into a mosaic canvas.
//!
//! Each draw resamples its tile through the segment's placement into a
//! private patch; only copying the finished patch onto the canvas takes the
//! canvas lock.

use glam::DVec2;
use parking_lot::Mutex;

use crate::colormap::{ColorMap, Rgb};
use crate::geometry::{placement_bounds, PixelRect, Region};
use crate::segment::Segment;
use crate::tile::RenderedTile;

/// The output raster of a region render. Pixel `(i, j)` covers the mosaic
/// square whose corner is `(region.x + i, region.y + j)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    region: Region,
    pixels: Vec<Rgb>,
}

impl Canvas {
    /// A black canvas covering `region`.
    pub fn new(region: Region) -> Self {
        Canvas {
            region,
            pixels: vec![Rgb::BLACK; region.width as usize * region.height as usize],
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn width(&self) -> usize {
        self.region.width as usize
    }

    pub fn height(&self) -> usize {
        self.region.height as usize
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// Packed RGB bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn get(&self, x: usize, y: usize) -> Rgb {
        self.pixels[x + y * self.width()]
    }

    fn blit(&mut self, patch: &[(usize, Rgb)]) {
        for &(i, c) in patch {
            self.pixels[i] = c;
        }
    }
}

/// Resample `tile` into `canvas` through the placement of `segment`.
///
/// With `include_overscan` the whole readout is drawn, shifted so the
/// datasec stays where it would be without it; otherwise only the datasec.
/// When `display_map` is given each channel is remapped through it.
/// Returns the number of canvas pixels written.
pub fn draw(
    canvas: &Mutex<Canvas>,
    tile: &RenderedTile,
    segment: &Segment,
    include_overscan: bool,
    display_map: Option<&ColorMap>,
) -> usize {
    let source = if include_overscan {
        PixelRect {
            x: 0,
            y: 0,
            width: tile.width(),
            height: tile.height(),
        }
    } else {
        *segment.datasec()
    };
    let transform = segment.placement(include_overscan);
    let inverse = transform.inverse();

    // Sampling coordinates of the sub-image start at its own corner.
    let local = PixelRect { x: 0, y: 0, ..source };
    let region = *canvas.lock().region();
    let bounds = placement_bounds(&transform, &local);

    let x0 = (bounds.min.x.floor() as i64).max(region.x as i64);
    let y0 = (bounds.min.y.floor() as i64).max(region.y as i64);
    let x1 = (bounds.max.x.ceil() as i64).min(region.right());
    let y1 = (bounds.max.y.ceil() as i64).min(region.bottom());
    if x0 >= x1 || y0 >= y1 {
        return 0;
    }

    let width = region.width as usize;
    let (sw, sh) = (source.width as f64, source.height as f64);
    let mut patch = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
    for wy in y0..y1 {
        for wx in x0..x1 {
            let centre = DVec2::new(wx as f64 + 0.5, wy as f64 + 0.5);
            let s = inverse.transform_point2(centre).floor();
            if s.x < 0.0 || s.y < 0.0 || s.x >= sw || s.y >= sh {
                continue;
            }
            let mut c = tile.get(source.x + s.x as usize, source.y + s.y as usize);
            if let Some(map) = display_map {
                c = map.lookup_channels(c);
            }
            let i = (wx - region.x as i64) as usize + (wy - region.y as i64) as usize * width;
            patch.push((i, c));
        }
    }

    canvas.lock().blit(&patch);
    patch.len()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bias::BiasCorrection;
    use crate::histogram::Histogram;
    use crate::raw::RawData;
    use crate::segment::test_segment;

    /// 6x4 readout, datasec 3x2 at column 1, identity placement, so datasec
    /// pixel (i, j) lands on mosaic square (1 + i, j) shifted by half a pixel.
    fn fixture() -> (Arc<Segment>, RenderedTile) {
        let seg = Arc::new(test_segment(6, 4, "[2:4,1:2]"));
        let pixels = (0..24).collect();
        let raw = RawData::new(seg.clone(), pixels).unwrap();
        let factors = BiasCorrection::None.compute(raw.pixels(), &seg);
        let hist = Histogram::build(raw.pixels(), &seg, &factors);
        let tile = RenderedTile::render(&raw, &factors, &hist, &ColorMap::default());
        (seg, tile)
    }

    #[test]
    fn datasec_only() {
        let (seg, tile) = fixture();
        let canvas = Mutex::new(Canvas::new(Region::new(0, 0, 8, 4)));
        let n = draw(&canvas, &tile, &seg, false, None);
        assert_eq!(n, 6);
        let canvas = canvas.into_inner();
        // pixel centre (2.5, 1.5) maps to datasec (1, 1) = readout (2, 1)
        assert_eq!(canvas.get(2, 1), tile.get(2, 1));
        assert_eq!(canvas.get(0, 0), Rgb::BLACK);
        assert_eq!(canvas.get(4, 0), Rgb::BLACK);
    }

    #[test]
    fn with_overscan() {
        let (seg, tile) = fixture();
        let canvas = Mutex::new(Canvas::new(Region::new(-2, -1, 10, 6)));
        let n = draw(&canvas, &tile, &seg, true, None);
        assert_eq!(n, 24);
        let canvas = canvas.into_inner();
        // readout (0, 0) is prescan; centre (0.5, 0.5) is canvas (2, 1)
        assert_eq!(canvas.get(2, 1), Rgb::GREEN);
        assert_eq!(canvas.get(3, 1), tile.get(1, 0));
    }

    #[test]
    fn clipped_to_canvas() {
        let (seg, tile) = fixture();
        let canvas = Mutex::new(Canvas::new(Region::new(2, 0, 1, 1)));
        assert_eq!(draw(&canvas, &tile, &seg, false, None), 1);
        assert_eq!(canvas.lock().get(0, 0), tile.get(2, 0));
    }

    #[test]
    fn outside_canvas_draws_nothing() {
        let (seg, tile) = fixture();
        let canvas = Mutex::new(Canvas::new(Region::new(100, 100, 4, 4)));
        assert_eq!(draw(&canvas, &tile, &seg, false, None), 0);
    }

    #[test]
    fn display_map_remaps_channels() {
        let (seg, tile) = fixture();
        let red_only = ColorMap::from_table((0..=255u8).map(|v| Rgb::new(v, 0, 0)).collect());
        let canvas = Mutex::new(Canvas::new(Region::new(0, 0, 8, 4)));
        draw(&canvas, &tile, &seg, false, Some(&red_only));
        let c = canvas.lock().get(3, 1);
        assert_eq!(c, Rgb::new(tile.get(3, 1).r, 0, 0));
    }

    #[test]
    fn bytes_are_packed_rgb() {
        let mut canvas = Canvas::new(Region::new(0, 0, 2, 1));
        canvas.blit(&[(1, Rgb::new(1, 2, 3))]);
        assert_eq!(canvas.as_bytes(), &[0, 0, 0, 1, 2, 3]);
    }
}
