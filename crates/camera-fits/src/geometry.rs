//! Pixel rectangles, mosaic regions, and amplifier placement transforms.

use glam::{DAffine2, DMat2, DVec2};

use crate::error::{Error, Result};

/// A rectangle of pixels inside one amplifier readout, zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

fn parse_range(s: &str) -> Option<(usize, usize)> {
    let (a, b) = s.split_once(':')?;
    let digits = |t: &str| !t.is_empty() && t.bytes().all(|c| c.is_ascii_digit());
    if !digits(a) || !digits(b) {
        return None;
    }
    Some((a.parse().ok()?, b.parse().ok()?))
}

/// Parse a `DATASEC` string of the exact form `[a:b,c:d]`.
///
/// FITS ranges are one-based and inclusive, so the result has origin
/// `(a-1, c-1)` and size `(b-a+1, d-c+1)`.
pub fn parse_datasec(s: &str) -> Result<PixelRect> {
    let invalid = || Error::InvalidDatasec(s.to_string());
    let inner = s
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(invalid)?;
    let (cols, rows) = inner.split_once(',').ok_or_else(invalid)?;
    let (a, b) = parse_range(cols).ok_or_else(invalid)?;
    let (c, d) = parse_range(rows).ok_or_else(invalid)?;
    if a == 0 || c == 0 || b < a || d < c {
        return Err(invalid());
    }
    Ok(PixelRect {
        x: a - 1,
        y: c - 1,
        width: b - a + 1,
        height: d - c + 1,
    })
}

/// An integer rectangle in mosaic (world) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Region { x, y, width, height }
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest region covering both. Empty regions are ignored.
    pub fn union(&self, other: &Region) -> Region {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Region {
            x,
            y,
            width: (self.right().max(other.right()) - x as i64) as u32,
            height: (self.bottom().max(other.bottom()) - y as i64) as u32,
        }
    }
}

/// A floating-point axis-aligned rectangle in mosaic coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl Bounds {
    /// Axis-aligned hull of `points`.
    pub fn from_points(points: &[DVec2]) -> Bounds {
        let min = points.iter().copied().fold(DVec2::splat(f64::INFINITY), DVec2::min);
        let max = points.iter().copied().fold(DVec2::splat(f64::NEG_INFINITY), DVec2::max);
        Bounds { min, max }
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    /// Overlap test with a non-empty interior; touching edges do not count.
    pub fn intersects(&self, region: &Region) -> bool {
        let size = self.size();
        if region.is_empty() || size.x <= 0.0 || size.y <= 0.0 {
            return false;
        }
        (region.right() as f64) > self.min.x
            && (region.bottom() as f64) > self.min.y
            && (region.x as f64) < self.max.x
            && (region.y as f64) < self.max.y
    }

    /// Half-open containment: the minimum edge is inside, the maximum is not.
    pub fn contains(&self, point: DVec2) -> bool {
        point.x >= self.min.x && point.x < self.max.x && point.y >= self.min.y && point.y < self.max.y
    }

    /// Smallest integer region enclosing these bounds.
    pub fn enclosing_region(&self) -> Region {
        let min = self.min.floor();
        let max = self.max.ceil();
        Region {
            x: min.x as i32,
            y: min.y as i32,
            width: (max.x - min.x).max(0.0) as u32,
            height: (max.y - min.y).max(0.0) as u32,
        }
    }
}

/// World-coordinate parameters for one amplifier and one WCS letter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateScale {
    pub pc1_1: f64,
    pub pc1_2: f64,
    pub pc2_1: f64,
    pub pc2_2: f64,
    pub crval1: f64,
    pub crval2: f64,
}

impl PlateScale {
    /// The pixel-to-mosaic transform of the datasec: the linear part and
    /// reference values from the header, applied after moving the datasec
    /// origin (plus half a pixel) to zero.
    pub fn placement(&self, datasec: &PixelRect) -> Result<DAffine2> {
        let matrix = DMat2::from_cols(
            DVec2::new(self.pc1_1, self.pc2_1),
            DVec2::new(self.pc1_2, self.pc2_2),
        );
        let det = matrix.determinant();
        if !det.is_finite() || det.abs() < f64::EPSILON {
            return Err(Error::InvalidGeometry(format!(
                "placement transform is not invertible (det = {det})"
            )));
        }
        let wcs = DAffine2::from_mat2_translation(matrix, DVec2::new(self.crval1, self.crval2));
        let origin = DVec2::new(datasec.x as f64 + 0.5, datasec.y as f64 + 0.5);
        Ok(wcs * DAffine2::from_translation(origin))
    }
}

/// Mosaic-space hull of the datasec under `placement`.
pub fn placement_bounds(placement: &DAffine2, datasec: &PixelRect) -> Bounds {
    let (w, h) = (datasec.width as f64, datasec.height as f64);
    let corners = [
        DVec2::ZERO,
        DVec2::new(w, 0.0),
        DVec2::new(0.0, h),
        DVec2::new(w, h),
    ]
    .map(|c| placement.transform_point2(c));
    Bounds::from_points(&corners)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- datasec ----

    #[test]
    fn datasec_origin_and_size() {
        let r = parse_datasec("[11:522,1:2002]").unwrap();
        assert_eq!(
            r,
            PixelRect {
                x: 10,
                y: 0,
                width: 512,
                height: 2002
            }
        );
        assert_eq!(r.right(), 522);
    }

    #[test]
    fn datasec_malformed() {
        for s in [
            "",
            "[1:2]",
            "11:522,1:2002",
            "[11:522,1:2002",
            "[a:2,1:2]",
            "[1:2,1:2] ",
            "[-1:2,1:2]",
            "[0:2,1:2]",
            "[5:2,1:2]",
        ] {
            assert!(
                matches!(parse_datasec(s), Err(Error::InvalidDatasec(_))),
                "accepted {s:?}"
            );
        }
    }

    // ---- regions ----

    #[test]
    fn region_union() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(-5, 5, 10, 20);
        assert_eq!(a.union(&b), Region::new(-5, 0, 15, 25));
        assert_eq!(a.union(&Region::default()), a);
    }

    #[test]
    fn bounds_intersection_excludes_touching() {
        let b = Bounds {
            min: DVec2::new(0.0, 0.0),
            max: DVec2::new(10.0, 10.0),
        };
        assert!(b.intersects(&Region::new(9, 9, 5, 5)));
        assert!(!b.intersects(&Region::new(10, 0, 5, 5)));
        assert!(!b.intersects(&Region::new(-5, -5, 5, 20)));
        assert!(!b.intersects(&Region::new(2, 2, 0, 3)));
    }

    #[test]
    fn bounds_contains_half_open() {
        let b = Bounds {
            min: DVec2::new(0.5, 0.5),
            max: DVec2::new(4.5, 2.5),
        };
        assert!(b.contains(DVec2::new(0.5, 0.5)));
        assert!(!b.contains(DVec2::new(4.5, 1.0)));
        assert_eq!(b.enclosing_region(), Region::new(0, 0, 5, 3));
    }

    // ---- placement ----

    fn identity() -> PlateScale {
        PlateScale {
            pc1_1: 1.0,
            pc1_2: 0.0,
            pc2_1: 0.0,
            pc2_2: 1.0,
            crval1: 0.0,
            crval2: 0.0,
        }
    }

    #[test]
    fn placement_shifts_by_datasec_origin() {
        let datasec = parse_datasec("[11:20,1:5]").unwrap();
        let plate = PlateScale {
            crval1: 100.0,
            crval2: 50.0,
            ..identity()
        };
        let t = plate.placement(&datasec).unwrap();
        assert_eq!(t.transform_point2(DVec2::ZERO), DVec2::new(110.5, 50.5));

        let bounds = placement_bounds(&t, &datasec);
        assert_eq!(bounds.min, DVec2::new(110.5, 50.5));
        assert_eq!(bounds.size(), DVec2::new(10.0, 5.0));
    }

    #[test]
    fn flipped_placement_bounds() {
        let datasec = parse_datasec("[1:4,1:2]").unwrap();
        let plate = PlateScale {
            pc1_1: -1.0,
            pc2_2: -1.0,
            crval1: 10.0,
            crval2: 10.0,
            ..identity()
        };
        let t = plate.placement(&datasec).unwrap();
        let bounds = placement_bounds(&t, &datasec);
        assert_eq!(bounds.min, DVec2::new(5.5, 7.5));
        assert_eq!(bounds.max, DVec2::new(9.5, 9.5));
    }

    #[test]
    fn rotated_placement_uses_all_corners() {
        let datasec = parse_datasec("[1:4,1:2]").unwrap();
        let plate = PlateScale {
            pc1_1: 0.0,
            pc1_2: -1.0,
            pc2_1: 1.0,
            pc2_2: 0.0,
            ..identity()
        };
        let t = plate.placement(&datasec).unwrap();
        let size = placement_bounds(&t, &datasec).size();
        assert_eq!(size, DVec2::new(2.0, 4.0));
    }

    #[test]
    fn singular_placement_rejected() {
        let datasec = parse_datasec("[1:4,1:2]").unwrap();
        let plate = PlateScale {
            pc2_2: 0.0,
            ..identity()
        };
        assert!(matches!(
            plate.placement(&datasec),
            Err(Error::InvalidGeometry(_))
        ));
    }
}
