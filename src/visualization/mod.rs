//! Histogram and heatmap images of plate thickness.
//!
//! Every render call draws into its own freshly allocated RGB surface which is
//! dropped before the call returns, so no drawing state survives from one
//! plate to the next. Encoding to PNG happens afterwards on the finished pixels.

pub mod colormap;
pub mod fonts;
pub mod heatmap;
pub mod histogram;

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, ImageFormat, Rgb};
use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::plate::{Plate, ThicknessNotComputed};

pub use heatmap::{render_heatmap, reshape, HeatGrid};
pub use histogram::render_histogram;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("No thickness values to plot")]
    EmptySeries,

    #[error("cannot reshape {len} values into rows of {columns}: {reason}")]
    Reshape {
        len: usize,
        columns: usize,
        reason: String,
    },

    #[error(transparent)]
    ThicknessNotComputed(#[from] ThicknessNotComputed),
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Drawing surface handed to render closures.
pub(crate) type Surface<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

pub(crate) fn plotting<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// A finished RGB raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB8 pixels
    pub pixels: Vec<u8>,
}

impl RenderedImage {
    fn buffer(&self) -> Result<ImageBuffer<Rgb<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.pixels.as_slice())
            .ok_or_else(|| plotting("pixel buffer does not match image size"))
    }

    /// Colour of the pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        match self.pixels.get(i..i + 3)? {
            &[r, g, b] => Some([r, g, b]),
            _ => None,
        }
    }

    /// Iterates over every pixel colour in row-major order.
    pub fn colors(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).filter_map(move |x| self.pixel(x, y)))
    }

    /// Encode as PNG.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.buffer()?
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// Encode as PNG and write to `path`, creating parent directories.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        self.buffer()?.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// Acquire a clean white surface, run `draw` on it and release it.
pub(crate) fn with_surface<F>(width: u32, height: u32, draw: F) -> Result<RenderedImage>
where
    F: for<'a> FnOnce(&Surface<'a>) -> Result<()>,
{
    if width == 0 || height == 0 {
        return Err(plotting("image dimensions must be non-zero"));
    }

    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(plotting)?;
        draw(&root)?;
        root.present().map_err(plotting)?;
    }

    Ok(RenderedImage {
        width,
        height,
        pixels,
    })
}

/// Render `<name>_hist.png` into `dir` and record its path on the plate.
pub fn write_histogram(plate: &mut Plate, dir: &Path, config: &PipelineConfig) -> Result<PathBuf> {
    let image = {
        let thickness = plate.require_thickness()?;
        render_histogram(&thickness.values, config.histogram.bins, &config.render)?
    };

    let path = dir.join(format!("{}_hist.png", plate.name));
    image.save_png(&path)?;

    info!("histogram for '{}' saved to {}", plate.name, path.display());
    plate.artifacts.histogram = Some(path.clone());
    Ok(path)
}

/// Render `<name>_heat.png` into `dir` and record its path on the plate.
pub fn write_heatmap(plate: &mut Plate, dir: &Path, config: &PipelineConfig) -> Result<PathBuf> {
    let image = {
        let thickness = plate.require_thickness()?;
        render_heatmap(&thickness.values, &config.grid, &config.render)?
    };

    let path = dir.join(format!("{}_heat.png", plate.name));
    image.save_png(&path)?;

    info!("heatmap for '{}' saved to {}", plate.name, path.display());
    plate.artifacts.heatmap = Some(path.clone());
    Ok(path)
}
