//! Configuration types for the thickness report pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a thickness sequence that does not fill the last grid row is reshaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReshapePolicy {
    /// Keep the short last row; missing cells are masked out of the heatmap.
    #[default]
    Pad,
    /// Refuse to draw a heatmap unless the length is a multiple of the column width.
    Reject,
}

/// Grid layout shared by the CSV grid and the heatmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Values per grid row
    #[serde(default = "default_columns")]
    pub columns: usize,

    /// Handling of a ragged final row in the heatmap
    #[serde(default)]
    pub reshape: ReshapePolicy,
}

fn default_columns() -> usize {
    11
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            reshape: ReshapePolicy::default(),
        }
    }
}

/// Histogram binning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Number of equal-width bins across the observed range
    #[serde(default = "default_bins")]
    pub bins: usize,
}

fn default_bins() -> usize {
    10
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
        }
    }
}

/// Raster image settings for histogram and heatmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Image width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Image height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Number of filled contour bands in the heatmap
    #[serde(default = "default_contour_levels")]
    pub contour_levels: usize,

    /// TrueType font used for titles, axis labels and tick labels.
    /// Images are drawn without any text when no font can be registered.
    #[serde(default = "default_font_path")]
    pub font_path: Option<PathBuf>,
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_contour_levels() -> usize {
    10
}

fn default_font_path() -> Option<PathBuf> {
    Some(PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"))
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            contour_levels: default_contour_levels(),
            font_path: default_font_path(),
        }
    }
}

/// An image stamped onto the first report page, in PDF points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoConfig {
    pub path: PathBuf,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// PDF report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Operator name used when none is given on the command line
    #[serde(default = "default_scanner_name")]
    pub scanner_name: String,

    /// Header logos for page one
    #[serde(default)]
    pub logos: Vec<LogoConfig>,

    /// Grid rows per measurement table page
    #[serde(default = "default_table_rows_per_page")]
    pub table_rows_per_page: usize,
}

fn default_scanner_name() -> String {
    "Unknown operator".to_string()
}

fn default_table_rows_per_page() -> usize {
    40
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            scanner_name: default_scanner_name(),
            logos: Vec::new(),
            table_rows_per_page: default_table_rows_per_page(),
        }
    }
}

/// Working directory and archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Per-run working directory; one subdirectory per plate is created inside
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// File name of the report archive
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    /// Leave the working directory in place after archiving
    #[serde(default)]
    pub keep_work_dir: bool,

    /// Move on to the next plate when one plate fails
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_archive_name() -> String {
    "reports.zip".to_string()
}

fn default_continue_on_error() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            archive_name: default_archive_name(),
            keep_work_dir: false,
            continue_on_error: default_continue_on_error(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub histogram: HistogramConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
