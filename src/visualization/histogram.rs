//! Thickness distribution bar chart.

use plotters::prelude::*;

use super::fonts::{text_available, FONT_FAMILY};
use super::{plotting, with_surface, RenderedImage, Result, VisualizationError};
use crate::config::RenderConfig;
use crate::processors::statistics;

/// Fill colour of the bars.
pub const BAR_COLOR: RGBColor = RGBColor(31, 119, 180);

const TITLE: &str = "Distribution of Thickness";

/// Render a histogram of `values` with `bins` equal-width bins.
///
/// Bars are filled and outlined in black; when a font is available the chart
/// carries a title and the axis labels "mm" and "frequency".
pub fn render_histogram(values: &[f64], bins: usize, render: &RenderConfig) -> Result<RenderedImage> {
    let hist = statistics::histogram(values, bins).ok_or(VisualizationError::EmptySeries)?;
    let text = text_available(render.font_path.as_deref());

    let first = hist.edges[0];
    let last = hist.edges[hist.edges.len() - 1];
    let pad = (last - first) * 0.05;
    let y_max = (hist.max_count() as f64 * 1.1).max(1.0);

    with_surface(render.width, render.height, |root| {
        let mut builder = ChartBuilder::on(root);
        builder.margin(10);
        if text {
            builder
                .caption(TITLE, (FONT_FAMILY, 22))
                .x_label_area_size(40)
                .y_label_area_size(50);
        }
        let mut chart = builder
            .build_cartesian_2d((first - pad)..(last + pad), 0.0..y_max)
            .map_err(plotting)?;

        if text {
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc("mm")
                .y_desc("frequency")
                .label_style((FONT_FAMILY, 13))
                .draw()
                .map_err(plotting)?;
        }

        let bars = || {
            hist.counts
                .iter()
                .enumerate()
                .map(|(i, &count)| [(hist.edges[i], 0.0), (hist.edges[i + 1], count as f64)])
        };

        chart
            .draw_series(bars().map(|corners| Rectangle::new(corners, BAR_COLOR.filled())))
            .map_err(plotting)?;
        chart
            .draw_series(bars().map(|corners| Rectangle::new(corners, BLACK.stroke_width(1))))
            .map_err(plotting)?;

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualization::test_support::render_config;

    fn samples() -> Vec<f64> {
        (0..121).map(|i| 0.25 + ((i * 37) % 23) as f64 * 0.004).collect()
    }

    fn has_color(image: &RenderedImage, color: RGBColor) -> bool {
        image.colors().any(|p| p == [color.0, color.1, color.2])
    }

    #[test]
    fn test_dimensions_follow_config() {
        let image = render_histogram(&samples(), 10, &render_config()).unwrap();
        assert_eq!((image.width, image.height), (320, 240));
        assert_eq!(image.pixels.len(), 320 * 240 * 3);
    }

    #[test]
    fn test_bars_are_drawn() {
        let image = render_histogram(&samples(), 10, &render_config()).unwrap();
        assert!(has_color(&image, BAR_COLOR));
        assert!(has_color(&image, BLACK));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let config = render_config();
        let a = render_histogram(&samples(), 10, &config).unwrap();
        let b = render_histogram(&samples(), 10, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_png_bytes().unwrap(), b.to_png_bytes().unwrap());
    }

    #[test]
    fn test_constant_values_render() {
        let image = render_histogram(&[0.3; 20], 10, &render_config()).unwrap();
        assert!(has_color(&image, BAR_COLOR));
    }

    #[test]
    fn test_empty_series_is_rejected() {
        assert!(matches!(
            render_histogram(&[], 10, &render_config()),
            Err(VisualizationError::EmptySeries)
        ));
        assert!(matches!(
            render_histogram(&[1.0], 0, &render_config()),
            Err(VisualizationError::EmptySeries)
        ));
    }
}
