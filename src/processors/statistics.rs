//! Descriptive statistics for thickness samples.
//!
//! Conventions follow NumPy so that reports stay comparable with the
//! measurement spreadsheets used before: the standard deviation is the
//! population form (divide by N) and histogram binning matches
//! `numpy.histogram` with a fixed bin count.

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by N, not N - 1). `None` for an empty slice.
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((sum_sq / values.len() as f64).sqrt())
}

/// Minimum and maximum. `None` for an empty slice.
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let min = values.iter().copied().reduce(f64::min)?;
    let max = values.iter().copied().reduce(f64::max)?;
    Some((min, max))
}

/// Summary of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Computes count, mean, population standard deviation, min and max.
pub fn summarize(values: &[f64]) -> Option<Summary> {
    let (min, max) = min_max(values)?;
    Some(Summary {
        count: values.len(),
        mean: mean(values)?,
        std_dev: population_std_dev(values)?,
        min,
        max,
    })
}

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Bin edges (length = bins + 1).
    pub edges: Vec<f64>,
    /// Bin counts. The last bin is closed on both sides.
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Number of bins.
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Width shared by all bins.
    pub fn bin_width(&self) -> f64 {
        (self.edges[self.edges.len() - 1] - self.edges[0]) / self.bins() as f64
    }

    /// Largest bin count.
    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Total number of samples counted.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Bins `values` into `bins` equal-width bins spanning the observed range.
///
/// When every value is identical the range is widened to `[v - 0.5, v + 0.5]`,
/// as NumPy does. Returns `None` for empty input, zero bins or non-finite values.
///
/// # Examples
///
/// ```
/// use thickness_report::processors::statistics::histogram;
///
/// let hist = histogram(&[1.0, 2.0, 2.0, 3.0], 2).unwrap();
/// assert_eq!(hist.edges, vec![1.0, 2.0, 3.0]);
/// assert_eq!(hist.counts, vec![1, 3]);
/// ```
pub fn histogram(values: &[f64], bins: usize) -> Option<Histogram> {
    if bins == 0 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let (mut lo, mut hi) = min_max(values)?;
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| lo + i as f64 * width).collect();
    edges.push(hi);

    let mut counts = vec![0_usize; bins];
    let norm = bins as f64 / (hi - lo);
    for &x in values {
        let mut bin = (((x - lo) * norm).floor() as usize).min(bins - 1);
        // Correct float rounding against the materialized edges.
        if bin > 0 && x < edges[bin] {
            bin -= 1;
        } else if bin < bins - 1 && x >= edges[bin + 1] {
            bin += 1;
        }
        counts[bin] += 1;
    }

    Some(Histogram { edges, counts })
}
