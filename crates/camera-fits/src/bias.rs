//! Bias correction from amplifier overscan regions.
//!
//! The serial overscan is the block of columns to the right of the datasec;
//! the parallel overscan is the block of rows below it. The first four
//! columns (rows) after the datasec are skipped because they still carry
//! charge-transfer trails from the last exposed pixel.

use crate::geometry::PixelRect;
use crate::segment::Segment;

/// Columns (rows) skipped between the datasec and the overscan used.
pub const OVERSCAN_SKIP: usize = 4;

/// How a bias profile is normalized before it is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Baseline {
    /// Subtract the profile minimum, leaving a zero floor.
    Minimum,
    /// Subtract the profile mean.
    Mean,
    /// Subtract a fixed ADC level.
    Level(i32),
}

/// Replace parallel column means outside `[low, high]` with the last
/// accepted mean, starting from `seed`.
///
/// A run of consecutive outliers keeps repeating the last good value for as
/// long as the run lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutlierGuard {
    pub low: i32,
    pub high: i32,
    pub seed: i32,
}

/// Parameters of the overscan bias model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverscanModel {
    pub serial: Baseline,
    pub parallel: Baseline,
    pub guard: Option<OutlierGuard>,
    /// When set, the whole datasec is shifted so that the weighted mean of
    /// both raw profiles lands on this level.
    pub target: Option<i32>,
}

/// A bias correction strategy. Part of rendered-tile cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BiasCorrection {
    /// No correction.
    #[default]
    None,
    Overscan(OverscanModel),
}

impl BiasCorrection {
    /// Serial and parallel profiles both floored at zero.
    pub const fn serial_parallel() -> Self {
        BiasCorrection::Overscan(OverscanModel {
            serial: Baseline::Minimum,
            parallel: Baseline::Minimum,
            guard: None,
            target: None,
        })
    }

    /// Serial profile taken relative to a 20000 ADU bias level.
    pub const fn target_level() -> Self {
        BiasCorrection::Overscan(OverscanModel {
            serial: Baseline::Level(20000),
            parallel: Baseline::Minimum,
            guard: None,
            target: None,
        })
    }

    /// Mean-relative profiles with guarded parallel means, shifted to a
    /// 20000 ADU target level.
    pub const fn target_level_guarded() -> Self {
        BiasCorrection::Overscan(OverscanModel {
            serial: Baseline::Mean,
            parallel: Baseline::Mean,
            guard: Some(OutlierGuard {
                low: 10000,
                high: 100000,
                seed: 22000,
            }),
            target: Some(20000),
        })
    }

    /// Parse a preset name as used on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(BiasCorrection::None),
            "serial-parallel" => Some(Self::serial_parallel()),
            "target-level" => Some(Self::target_level()),
            "target-level-guarded" => Some(Self::target_level_guarded()),
            _ => None,
        }
    }

    /// Compute the correction for one amplifier.
    ///
    /// # Panics
    ///
    /// Panics if an overscan model is applied to a segment with no serial or
    /// parallel overscan beyond the skipped border.
    pub fn compute(&self, pixels: &[i32], segment: &Segment) -> CorrectionFactors {
        let datasec = *segment.datasec();
        match self {
            BiasCorrection::None => CorrectionFactors {
                datasec,
                profiles: None,
            },
            BiasCorrection::Overscan(model) => model.compute(pixels, segment),
        }
    }
}

/// Integer mean of `values`, truncating like the integer division used when
/// the profiles are built.
fn mean(values: &[i32]) -> i32 {
    if values.is_empty() {
        return 0;
    }
    (values.iter().map(|&v| v as i64).sum::<i64>() / values.len() as i64) as i32
}

fn normalize(profile: &mut [i32], baseline: Baseline) {
    let base = match baseline {
        Baseline::Minimum => profile.iter().copied().min().unwrap_or(0),
        Baseline::Mean => mean(profile),
        Baseline::Level(level) => level,
    };
    for v in profile.iter_mut() {
        *v -= base;
    }
}

impl OverscanModel {
    fn compute(&self, pixels: &[i32], segment: &Segment) -> CorrectionFactors {
        let (naxis1, naxis2) = (segment.naxis1(), segment.naxis2());
        let d = *segment.datasec();

        let serial_start = d.right() + OVERSCAN_SKIP;
        let parallel_start = d.bottom() + OVERSCAN_SKIP;
        assert!(
            serial_start < naxis1 && parallel_start < naxis2,
            "segment {} has no overscan beyond {:?}",
            segment,
            d
        );

        let serial_cols = (naxis1 - serial_start) as i64;
        let mut serial: Vec<i32> = (d.y..d.bottom())
            .map(|y| {
                let row = &pixels[y * naxis1 + serial_start..(y + 1) * naxis1];
                (row.iter().map(|&p| p as i64).sum::<i64>() / serial_cols) as i32
            })
            .collect();

        let parallel_rows = (naxis2 - parallel_start) as i64;
        let mut accepted = self.guard.map(|g| g.seed).unwrap_or(0);
        let mut parallel: Vec<i32> = (d.x..d.right())
            .map(|x| {
                let sum: i64 = (parallel_start..naxis2).map(|y| pixels[x + y * naxis1] as i64).sum();
                let mut m = (sum / parallel_rows) as i32;
                if let Some(g) = self.guard {
                    if m < g.low || m > g.high {
                        m = accepted;
                    }
                    accepted = m;
                }
                m
            })
            .collect();

        let offset = match self.target {
            Some(target) => {
                let (w, h) = (d.width as i64, d.height as i64);
                let weighted = (mean(&serial) as i64 * h + mean(&parallel) as i64 * w) / (h + w);
                -(target - weighted as i32)
            }
            None => 0,
        };

        normalize(&mut serial, self.serial);
        normalize(&mut parallel, self.parallel);

        CorrectionFactors {
            datasec: d,
            profiles: Some(Profiles {
                serial,
                parallel,
                offset,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Profiles {
    serial: Vec<i32>,
    parallel: Vec<i32>,
    offset: i32,
}

/// Per-pixel additive bias of one amplifier under one strategy.
///
/// The corrected value of readout pixel `(x, y)` is `p - factor(x, y)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionFactors {
    datasec: PixelRect,
    profiles: Option<Profiles>,
}

impl CorrectionFactors {
    /// Correction at readout column `x`, row `y`, which must lie inside the
    /// datasec.
    pub fn factor(&self, x: usize, y: usize) -> i32 {
        match &self.profiles {
            None => 0,
            Some(p) => p.serial[y - self.datasec.y] + p.parallel[x - self.datasec.x] + p.offset,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.profiles.is_none()
    }
}
