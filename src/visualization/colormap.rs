//! The "jet" colormap: dark blue through cyan, yellow and red to dark red.

use plotters::style::RGBColor;

type Anchors = &'static [(f64, f64)];

// Piecewise-linear (position, intensity) anchors per channel.
const RED: Anchors = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const GREEN: Anchors = &[
    (0.0, 0.0),
    (0.125, 0.0),
    (0.375, 1.0),
    (0.64, 1.0),
    (0.91, 0.0),
    (1.0, 0.0),
];
const BLUE: Anchors = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn channel(anchors: Anchors, t: f64) -> u8 {
    let mut value = anchors[anchors.len() - 1].1;
    for pair in anchors.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if t <= x1 {
            value = if x1 > x0 {
                y0 + (y1 - y0) * (t - x0) / (x1 - x0)
            } else {
                y1
            };
            break;
        }
    }
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Colour for `t` in `[0, 1]`; values outside are clamped, NaN maps to 0.
pub fn jet(t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    RGBColor(channel(RED, t), channel(GREEN, t), channel(BLUE, t))
}

/// Maps values in `[lo, hi]` onto `levels` discrete jet bands.
#[derive(Debug, Clone, Copy)]
pub struct BandScale {
    pub lo: f64,
    pub hi: f64,
    pub levels: usize,
}

impl BandScale {
    pub fn new(lo: f64, hi: f64, levels: usize) -> Self {
        Self {
            lo,
            hi,
            levels: levels.max(1),
        }
    }

    /// Band index of `value`; a flat range puts everything in the middle band.
    pub fn band(&self, value: f64) -> usize {
        if self.hi <= self.lo {
            return self.levels / 2;
        }
        let t = (value - self.lo) / (self.hi - self.lo);
        ((t * self.levels as f64).floor().max(0.0) as usize).min(self.levels - 1)
    }

    /// Colour of band `k`, sampled at the band centre.
    pub fn band_color(&self, k: usize) -> RGBColor {
        jet((k as f64 + 0.5) / self.levels as f64)
    }

    pub fn color(&self, value: f64) -> RGBColor {
        self.band_color(self.band(value))
    }

    /// Lower and upper value of band `k`.
    pub fn band_bounds(&self, k: usize) -> (f64, f64) {
        let step = (self.hi - self.lo) / self.levels as f64;
        (self.lo + k as f64 * step, self.lo + (k + 1) as f64 * step)
    }
}
