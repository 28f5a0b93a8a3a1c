//! Frequency histograms over the sensor's 18-bit range and CDF-based
//! contrast scaling.

use crate::bias::CorrectionFactors;
use crate::segment::Segment;

/// Number of histogram bins: camera ADCs produce 18-bit values.
pub const BINS: usize = 1 << 18;

/// Bin of a raw pixel after bias correction. Negative results go to bin 0,
/// values past the ADC range to the last bin.
#[inline]
pub fn bin_of(pixel: i32, factor: i32) -> usize {
    (pixel as i64 - factor as i64).clamp(0, BINS as i64 - 1) as usize
}

fn count_datasec(counts: &mut [u32], pixels: &[i32], segment: &Segment, factors: &CorrectionFactors) {
    let d = segment.datasec();
    let naxis1 = segment.naxis1();
    for y in d.y..d.bottom() {
        let row = &pixels[y * naxis1..(y + 1) * naxis1];
        for x in d.x..d.right() {
            counts[bin_of(row[x], factors.factor(x, y))] += 1;
        }
    }
}

/// Add one amplifier's bin counts to a running 64-bit sum, for merging many
/// amplifiers without overflow.
pub fn add_counts(sum: &mut [u64], counts: &[u32]) {
    for (s, &c) in sum.iter_mut().zip(counts) {
        *s += c as u64;
    }
}

/// Bin counts of one amplifier's corrected datasec, without the CDF.
pub fn bin_counts(pixels: &[i32], segment: &Segment, factors: &CorrectionFactors) -> Vec<u32> {
    let mut counts = vec![0u32; BINS];
    count_datasec(&mut counts, pixels, segment, factors);
    counts
}

/// A histogram with its occupied range and cumulative distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u32>,
    cdf: Vec<u64>,
    lowest: usize,
    highest: usize,
}

impl Histogram {
    /// Build from bin counts, which must have [`BINS`] entries.
    pub fn from_counts(counts: Vec<u32>) -> Self {
        assert_eq!(counts.len(), BINS, "histogram must have {BINS} bins");
        let lowest = counts.iter().position(|&c| c > 0).unwrap_or(0);
        let highest = counts.iter().rposition(|&c| c > 0).unwrap_or(0);

        let mut cdf = vec![0u64; BINS];
        let mut cum = 0u64;
        for i in lowest..=highest {
            cum += counts[i] as u64;
            cdf[i] = cum;
        }
        for c in &mut cdf[highest + 1..] {
            *c = cum;
        }

        Histogram {
            counts,
            cdf,
            lowest,
            highest,
        }
    }

    /// Histogram of one amplifier's bias-corrected datasec.
    pub fn build(pixels: &[i32], segment: &Segment, factors: &CorrectionFactors) -> Self {
        Histogram::from_counts(bin_counts(pixels, segment, factors))
    }

    /// Shrink a 64-bit sum of counts into a histogram.
    ///
    /// Every bin is divided by `shrink` so the cumulative totals of a whole
    /// focal plane fit comfortably; bins holding fewer than `shrink` counts
    /// vanish.
    pub fn from_sum(sum: &[u64], shrink: u64) -> Self {
        let shrink = shrink.max(1);
        let counts = sum
            .iter()
            .map(|&c| (c / shrink).min(u32::MAX as u64) as u32)
            .collect();
        Histogram::from_counts(counts)
    }

    /// Bin-wise sum of several histograms, shrunk as in [`Histogram::from_sum`].
    pub fn merge<'a>(histograms: impl IntoIterator<Item = &'a Histogram>, shrink: u64) -> Self {
        let mut sum = vec![0u64; BINS];
        for h in histograms {
            add_counts(&mut sum, &h.counts);
        }
        Histogram::from_sum(&sum, shrink)
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Cumulative counts: zero below the lowest occupied bin, the total from
    /// the highest occupied bin on.
    pub fn cdf(&self) -> &[u64] {
        &self.cdf
    }

    pub fn lowest(&self) -> usize {
        self.lowest
    }

    pub fn highest(&self) -> usize {
        self.highest
    }

    pub fn total(&self) -> u64 {
        self.cdf[self.highest]
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Color-map index of bin `bin` for a map of `size` entries: the bin's
    /// rank scaled to `[0, size - 1]`.
    pub fn color_index(&self, bin: usize, size: usize) -> usize {
        let total = self.total();
        if total == 0 || size == 0 {
            return 0;
        }
        (self.cdf[bin] * (size as u64 - 1) / total) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::BiasCorrection;
    use crate::segment::test_segment;

    fn with_bins(bins: &[(usize, u32)]) -> Histogram {
        let mut counts = vec![0u32; BINS];
        for &(b, c) in bins {
            counts[b] = c;
        }
        Histogram::from_counts(counts)
    }

    #[test]
    fn bins_clamp() {
        assert_eq!(bin_of(-5, 0), 0);
        assert_eq!(bin_of(100, 150), 0);
        assert_eq!(bin_of(100, -50), 150);
        assert_eq!(bin_of(i32::MAX, 0), BINS - 1);
    }

    #[test]
    fn single_valued_datasec() {
        let seg = test_segment(6, 4, "[2:5,1:3]");
        let pixels = vec![1234; 24];
        let factors = BiasCorrection::None.compute(&pixels, &seg);
        let h = Histogram::build(&pixels, &seg, &factors);
        assert_eq!(h.lowest(), 1234);
        assert_eq!(h.highest(), 1234);
        assert_eq!(h.cdf()[1234], 12);
        assert_eq!(h.cdf()[1233], 0);
        assert_eq!(h.cdf()[BINS - 1], 12);
        assert_eq!(h.color_index(1234, 256), 255);
    }

    #[test]
    fn only_datasec_is_counted() {
        let seg = test_segment(4, 2, "[2:3,1:1]");
        let pixels = vec![9, 1, 2, 9, 9, 9, 9, 9];
        let factors = BiasCorrection::None.compute(&pixels, &seg);
        let h = Histogram::build(&pixels, &seg, &factors);
        assert_eq!(h.total(), 2);
        assert_eq!((h.lowest(), h.highest()), (1, 2));
        assert_eq!(h.counts()[9], 0);
    }

    #[test]
    fn color_index_is_rank() {
        let h = with_bins(&[(10, 1), (20, 2), (30, 1)]);
        assert_eq!(h.color_index(10, 256), 255 / 4);
        assert_eq!(h.color_index(20, 256), 3 * 255 / 4);
        assert_eq!(h.color_index(30, 256), 255);
        assert_eq!(h.color_index(25, 256), 3 * 255 / 4);
    }

    #[test]
    fn empty_histogram() {
        let h = Histogram::from_counts(vec![0; BINS]);
        assert!(h.is_empty());
        assert_eq!(h.color_index(0, 256), 0);
        assert_eq!(h.color_index(500, 256), 0);
    }

    #[test]
    fn merge_sums_and_shrinks() {
        let a = with_bins(&[(100, 1024)]);
        let b = with_bins(&[(200, 512), (300, 100)]);
        let g = Histogram::merge([&a, &b], 512);
        assert_eq!(g.counts()[100], 2);
        assert_eq!(g.counts()[200], 1);
        // lost to the shrink factor
        assert_eq!(g.counts()[300], 0);
        assert_eq!(g.highest(), 200);

        let exact = Histogram::merge([&a, &b], 1);
        assert_eq!(exact.total(), 1636);
    }

    #[test]
    fn summed_counts_match_build() {
        let seg = test_segment(3, 3, "[1:3,1:3]");
        let pixels: Vec<i32> = (0..9).collect();
        let factors = BiasCorrection::None.compute(&pixels, &seg);
        let mut sum = vec![0u64; BINS];
        let counts = bin_counts(&pixels, &seg, &factors);
        add_counts(&mut sum, &counts);
        add_counts(&mut sum, &counts);
        let h = Histogram::from_sum(&sum, 2);
        assert_eq!(h, Histogram::build(&pixels, &seg, &factors));
    }
}
