//! Filled-contour heatmap of thickness over the measurement grid.
//!
//! Values are laid out row by row with the grid column width, sample `i`
//! sitting at grid point `(i % columns + 1, i / columns + 1)`. Between four
//! neighbouring samples the field is interpolated bilinearly and quantized
//! into colour bands spanning the observed min/max.

use plotters::prelude::*;

use super::colormap::BandScale;
use super::fonts::{text_available, FONT_FAMILY};
use super::{plotting, with_surface, RenderedImage, Result, VisualizationError};
use crate::config::{GridConfig, RenderConfig, ReshapePolicy};
use crate::processors::statistics;

/// Sub-cells per grid cell edge used to approximate the contour bands.
const SUBDIVISIONS: usize = 8;

const MARKER_RADIUS: i32 = 2;
const MARGIN: u32 = 10;

/// Thickness values laid out on the measurement grid.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatGrid {
    pub rows: usize,
    pub columns: usize,
    /// Row-major cells; `None` where a short final row has no sample
    cells: Vec<Option<f64>>,
}

impl HeatGrid {
    /// Sample at `(row, column)`, counted from zero.
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.cells[row * self.columns + column]
    }

    /// Number of cells without a sample.
    pub fn missing(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    /// Smallest and largest sample.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let present: Vec<f64> = self.cells.iter().flatten().copied().collect();
        statistics::min_max(&present)
    }
}

fn reshape_error(len: usize, columns: usize, reason: &str) -> VisualizationError {
    VisualizationError::Reshape {
        len,
        columns,
        reason: reason.to_string(),
    }
}

/// Lay `values` out in rows of `columns`.
///
/// A contour needs at least a 2x2 grid. With [`ReshapePolicy::Pad`] a short
/// final row is kept and its empty cells are masked; with
/// [`ReshapePolicy::Reject`] the length must be an exact multiple of `columns`.
///
/// # Examples
///
/// ```
/// use thickness_report::config::ReshapePolicy;
/// use thickness_report::visualization::reshape;
///
/// let grid = reshape(&[0.1; 23], 11, ReshapePolicy::Pad).unwrap();
/// assert_eq!((grid.rows, grid.columns), (3, 11));
/// assert_eq!(grid.missing(), 10);
///
/// assert!(reshape(&[0.1; 23], 11, ReshapePolicy::Reject).is_err());
/// ```
pub fn reshape(values: &[f64], columns: usize, policy: ReshapePolicy) -> Result<HeatGrid> {
    let len = values.len();
    if len == 0 {
        return Err(reshape_error(len, columns, "there are no values"));
    }
    if columns < 2 {
        return Err(reshape_error(len, columns, "a contour needs at least 2 columns"));
    }
    let remainder = len % columns;
    if remainder != 0 && policy == ReshapePolicy::Reject {
        return Err(reshape_error(
            len,
            columns,
            "length is not a multiple of the column width",
        ));
    }

    let rows = len.div_ceil(columns);
    if rows < 2 {
        return Err(reshape_error(len, columns, "a contour needs at least 2 rows"));
    }

    let mut cells: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    cells.resize(rows * columns, None);

    Ok(HeatGrid {
        rows,
        columns,
        cells,
    })
}

/// Left/right and top/bottom margins that keep grid cells square.
fn square_cell_margins(area: (u32, u32), grid: &HeatGrid, labels: (u32, u32)) -> (u32, u32, u32, u32) {
    let (width, height) = area;
    let (x_label, y_label) = labels;
    let avail_w = width.saturating_sub(2 * MARGIN + y_label);
    let avail_h = height.saturating_sub(2 * MARGIN + x_label);

    let cell = (avail_w / grid.columns as u32).min(avail_h / grid.rows as u32).max(1);
    let extra_w = avail_w.saturating_sub(cell * grid.columns as u32);
    let extra_h = avail_h.saturating_sub(cell * grid.rows as u32);

    (
        MARGIN + extra_w / 2,
        MARGIN + extra_w - extra_w / 2,
        MARGIN + extra_h / 2,
        MARGIN + extra_h - extra_h / 2,
    )
}

/// Bilinear contour bands of every fully sampled cell.
fn contour_cells(grid: &HeatGrid, scale: &BandScale) -> Vec<Rectangle<(f64, f64)>> {
    let step = 1.0 / SUBDIVISIONS as f64;
    let mut cells = Vec::new();

    for r in 0..grid.rows - 1 {
        for c in 0..grid.columns - 1 {
            let corners = (
                grid.get(r, c),
                grid.get(r, c + 1),
                grid.get(r + 1, c),
                grid.get(r + 1, c + 1),
            );
            let (Some(v00), Some(v01), Some(v10), Some(v11)) = corners else {
                continue;
            };

            let (x0, y0) = ((c + 1) as f64, (r + 1) as f64);
            for j in 0..SUBDIVISIONS {
                for i in 0..SUBDIVISIONS {
                    let u = (i as f64 + 0.5) * step;
                    let v = (j as f64 + 0.5) * step;
                    let value = v00 * (1.0 - u) * (1.0 - v)
                        + v01 * u * (1.0 - v)
                        + v10 * (1.0 - u) * v
                        + v11 * u * v;

                    let from = (x0 + i as f64 * step, y0 + j as f64 * step);
                    let to = (x0 + (i + 1) as f64 * step, y0 + (j + 1) as f64 * step);
                    cells.push(Rectangle::new([from, to], scale.color(value).filled()));
                }
            }
        }
    }

    cells
}

/// Tick label for a grid coordinate: whole numbers only.
fn grid_label(v: &f64) -> String {
    if (v - v.round()).abs() < 1e-6 {
        format!("{}", v.round() as i64)
    } else {
        String::new()
    }
}

/// Render the heatmap of `values` with a colour bar labelled "mm".
pub fn render_heatmap(values: &[f64], grid: &GridConfig, render: &RenderConfig) -> Result<RenderedImage> {
    let heat = reshape(values, grid.columns, grid.reshape)?;
    let (lo, hi) = heat.value_range().ok_or(VisualizationError::EmptySeries)?;
    let (bar_lo, bar_hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
    let scale = BandScale::new(bar_lo, bar_hi, render.contour_levels);
    let text = text_available(render.font_path.as_deref());

    let bar_width: u32 = if text { 100 } else { 50 };
    if render.width <= bar_width * 2 {
        return Err(plotting(format!(
            "image width {} leaves no room beside the colour bar",
            render.width
        )));
    }

    with_surface(render.width, render.height, |root| {
        let (plot_area, bar_area) = root.split_horizontally(render.width - bar_width);

        let labels = if text { (30, 40) } else { (0, 0) };
        let (left, right, top, bottom) =
            square_cell_margins(plot_area.dim_in_pixel(), &heat, labels);

        let mut builder = ChartBuilder::on(&plot_area);
        builder
            .margin_left(left)
            .margin_right(right)
            .margin_top(top)
            .margin_bottom(bottom);
        if text {
            builder
                .x_label_area_size(labels.0)
                .y_label_area_size(labels.1);
        }
        let mut chart = builder
            .build_cartesian_2d(
                0.5..(heat.columns as f64 + 0.5),
                0.5..(heat.rows as f64 + 0.5),
            )
            .map_err(plotting)?;

        if text {
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_labels(heat.columns.min(12))
                .y_labels(heat.rows.min(12))
                .x_label_formatter(&grid_label)
                .y_label_formatter(&grid_label)
                .label_style((FONT_FAMILY, 12))
                .draw()
                .map_err(plotting)?;
        }

        chart
            .draw_series(contour_cells(&heat, &scale))
            .map_err(plotting)?;

        let grid = &heat;
        let markers = (0..grid.rows).flat_map(|r| {
            (0..grid.columns)
                .filter(move |&c| grid.get(r, c).is_some())
                .map(move |c| ((c + 1) as f64, (r + 1) as f64))
        });
        chart
            .draw_series(markers.map(|p| Circle::new(p, MARKER_RADIUS, BLACK.filled())))
            .map_err(plotting)?;

        let mut bar_builder = ChartBuilder::on(&bar_area);
        bar_builder
            .margin_top(MARGIN * 3)
            .margin_bottom(MARGIN * 3)
            .margin_left(MARGIN)
            .margin_right(MARGIN);
        if text {
            bar_builder.right_y_label_area_size(60);
        }
        let mut bar = bar_builder
            .build_cartesian_2d(0.0..1.0, bar_lo..bar_hi)
            .map_err(plotting)?;

        if text {
            bar.configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .y_desc("mm")
                .label_style((FONT_FAMILY, 12))
                .draw()
                .map_err(plotting)?;
        }

        bar.draw_series((0..scale.levels).map(|k| {
            let (b0, b1) = scale.band_bounds(k);
            Rectangle::new([(0.0, b0), (1.0, b1)], scale.band_color(k).filled())
        }))
        .map_err(plotting)?;
        bar.draw_series(std::iter::once(Rectangle::new(
            [(0.0, bar_lo), (1.0, bar_hi)],
            BLACK.stroke_width(1),
        )))
        .map_err(plotting)?;

        Ok(())
    })
}
