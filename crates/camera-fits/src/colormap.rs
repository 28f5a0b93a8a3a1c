use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

/// An 8-bit RGB triple, laid out as three consecutive bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub const fn grey(v: u8) -> Self {
        Rgb { r: v, g: v, b: v }
    }
}

/// Piecewise-linear curve through `(x, y)` control points, both in `[0, 1]`.
/// Outside the first and last points the curve is flat.
fn interpolate(points: &[(f32, f32)], x: f32) -> f32 {
    let Some(&(x0, y0)) = points.first() else {
        return 0.0;
    };
    if x <= x0 {
        return y0;
    }
    for pair in points.windows(2) {
        let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
        if x <= x2 {
            if x2 == x1 {
                return y2;
            }
            return y1 + (y2 - y1) * (x - x1) / (x2 - x1);
        }
    }
    points[points.len() - 1].1
}

fn channel(points: &[(f32, f32)], x: f32) -> u8 {
    (255.0 * interpolate(points, x).clamp(0.0, 1.0)).round() as u8
}

/// An immutable lookup table from a scalar index to a color.
///
/// Cheap to clone; clones share the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorMap {
    table: Arc<[Rgb]>,
}

impl ColorMap {
    /// Linear grey ramp from black to white.
    pub fn grey(size: usize) -> Self {
        let size = size.max(2);
        let table = (0..size)
            .map(|i| Rgb::grey((i * 255 / (size - 1)) as u8))
            .collect::<Vec<_>>();
        ColorMap { table: table.into() }
    }

    /// Build a map of `size` entries from per-channel control points, each a
    /// list of `(position, intensity)` pairs sorted by position.
    pub fn from_control_points(
        size: usize,
        red: &[(f32, f32)],
        green: &[(f32, f32)],
        blue: &[(f32, f32)],
    ) -> Self {
        let size = size.max(2);
        let table = (0..size)
            .map(|i| {
                let f = i as f32 / (size - 1) as f32;
                Rgb::new(channel(red, f), channel(green, f), channel(blue, f))
            })
            .collect::<Vec<_>>();
        ColorMap { table: table.into() }
    }

    /// Wrap a table produced by an external loader.
    ///
    /// # Panics
    ///
    /// Panics if `table` is empty.
    pub fn from_table(table: Vec<Rgb>) -> Self {
        assert!(!table.is_empty(), "color map table must not be empty");
        ColorMap { table: table.into() }
    }

    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// Color at `index`, clamped to the last entry.
    #[inline]
    pub fn get(&self, index: usize) -> Rgb {
        self.table[index.min(self.table.len() - 1)]
    }

    /// This map re-indexed by the 8-bit channel values of a grey ramp of
    /// `ramp` entries, so that [`ColorMap::lookup_channels`] on a color of
    /// that ramp picks the entry at the same relative position.
    pub fn indexed_by_grey(&self, ramp: usize) -> ColorMap {
        let ramp = ramp.clamp(2, 256);
        let last = self.size() - 1;
        let table = (0..256usize)
            .map(|v| {
                // inverse of the ramp's i * 255 / (ramp - 1)
                let i = (v * (ramp - 1)).div_ceil(255);
                self.get(i * last / (ramp - 1))
            })
            .collect::<Vec<_>>();
        ColorMap { table: table.into() }
    }

    /// Remap each channel of `c` through the matching channel of this map,
    /// using the channel value as the index.
    #[inline]
    pub fn lookup_channels(&self, c: Rgb) -> Rgb {
        Rgb::new(
            self.get(c.r as usize).r,
            self.get(c.g as usize).g,
            self.get(c.b as usize).b,
        )
    }
}

impl Default for ColorMap {
    fn default() -> Self {
        ColorMap::grey(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grey_ramp() {
        let map = ColorMap::grey(256);
        assert_eq!(map.size(), 256);
        assert_eq!(map.get(0), Rgb::BLACK);
        assert_eq!(map.get(128), Rgb::grey(128));
        assert_eq!(map.get(255), Rgb::grey(255));
        assert_eq!(map.get(1000), Rgb::grey(255));
    }

    #[test]
    fn small_grey_ramp() {
        let map = ColorMap::grey(3);
        assert_eq!(map.get(1), Rgb::grey(127));
    }

    #[test]
    fn control_points_interpolate() {
        let map = ColorMap::from_control_points(
            5,
            &[(0.0, 0.0), (1.0, 1.0)],
            &[(0.0, 0.0), (0.5, 1.0), (1.0, 0.0)],
            &[(0.0, 1.0)],
        );
        assert_eq!(map.get(0), Rgb::new(0, 0, 255));
        assert_eq!(map.get(1), Rgb::new(64, 128, 255));
        assert_eq!(map.get(2), Rgb::new(128, 255, 255));
        assert_eq!(map.get(4), Rgb::new(255, 0, 255));
    }

    #[test]
    fn interpolate_edges() {
        let pts = [(0.2, 0.4), (0.8, 0.6)];
        assert_eq!(interpolate(&pts, 0.0), 0.4);
        assert_eq!(interpolate(&pts, 1.0), 0.6);
        assert_eq!(interpolate(&[], 0.5), 0.0);
    }

    #[test]
    fn default_is_grey() {
        assert_eq!(ColorMap::default(), ColorMap::grey(256));
        assert_ne!(ColorMap::default(), ColorMap::grey(128));
    }

    #[test]
    fn per_channel_lookup() {
        let inverted = ColorMap::from_table((0..=255u8).map(|v| Rgb::new(255 - v, v, v / 2)).collect());
        assert_eq!(inverted.lookup_channels(Rgb::new(0, 10, 200)), Rgb::new(255, 10, 100));
    }

    #[test]
    fn full_ramp_indexing_is_unchanged() {
        let map = ColorMap::from_table((0..=255u8).map(|v| Rgb::new(255 - v, v, v / 2)).collect());
        assert_eq!(map.indexed_by_grey(256), map);
        assert_eq!(ColorMap::grey(256).indexed_by_grey(256), ColorMap::grey(256));
    }

    #[test]
    fn short_ramp_reaches_every_entry() {
        let palette = [Rgb::RED, Rgb::GREEN, Rgb::BLUE, Rgb::grey(9)];
        let display = ColorMap::from_table(palette.to_vec()).indexed_by_grey(4);
        let baked = ColorMap::grey(4);
        for (i, want) in palette.iter().enumerate() {
            let c = baked.get(i);
            assert_eq!(display.lookup_channels(c), *want, "entry {i}");
        }
        // a longer palette is sampled at the same relative positions
        let long = ColorMap::grey(256).indexed_by_grey(3);
        assert_eq!(long.lookup_channels(ColorMap::grey(3).get(1)), Rgb::grey(127));
    }

    #[test]
    fn rgb_is_three_bytes() {
        let px = [Rgb::RED, Rgb::BLUE];
        assert_eq!(bytemuck::cast_slice::<Rgb, u8>(&px), &[255, 0, 0, 0, 0, 255]);
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn empty_table_panics() {
        ColorMap::from_table(Vec::new());
    }
}
