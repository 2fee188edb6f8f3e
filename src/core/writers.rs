//! Thickness grid CSV output.
//!
//! The grid file is the tabular artifact handed to report assembly and to
//! operators. Its layout is fixed:
//! - thickness values laid out left to right, top to bottom, `columns` per line
//!   (the last line may be shorter, nothing is padded)
//! - every value formatted with three decimals
//! - two trailing lines `Thickness_Mean, <v>` and `Thickness_StdDev, <v>`
//! - a final newline

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Terminator, Trim, WriterBuilder};
use log::info;
use thiserror::Error;

use super::plate::{Plate, ThicknessNotComputed};
use crate::processors::thickness::Thickness;

/// Label of the mean summary line.
pub const MEAN_LABEL: &str = "Thickness_Mean";

/// Label of the standard deviation summary line.
pub const STD_DEV_LABEL: &str = "Thickness_StdDev";

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a previously written file.
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    ThicknessNotComputed(#[from] ThicknessNotComputed),

    #[error("grid column width must be at least 1")]
    InvalidColumns,

    #[error("invalid thickness grid at line {line}: {reason}")]
    InvalidGrid { line: u64, reason: String },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
pub(crate) fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Render the thickness grid as CSV text.
///
/// # Examples
///
/// ```
/// use thickness_report::core::writers::render_thickness_csv;
/// use thickness_report::processors::thickness::Thickness;
///
/// let thickness = Thickness::from_values(vec![1.0, 2.0, 3.0]).unwrap();
/// let csv = render_thickness_csv(&thickness, 2).unwrap();
/// assert_eq!(
///     csv,
///     "1.000,2.000\n3.000\nThickness_Mean, 2.000\nThickness_StdDev, 0.816\n"
/// );
/// ```
pub fn render_thickness_csv(thickness: &Thickness, columns: usize) -> Result<String> {
    if columns == 0 {
        return Err(WriteError::InvalidColumns);
    }

    let mut writer = WriterBuilder::new()
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(thickness.len() * 7 + 64));

    for row in thickness.values.chunks(columns) {
        writer.write_record(row.iter().map(|v| format!("{:.3}", v)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| WriteError::Csv(csv::Error::from(e.into_error())))?;
    // Only ASCII digits, signs, dots and commas are written above.
    let mut content = String::from_utf8_lossy(&bytes).into_owned();

    content.push_str(&format!("{}, {:.3}\n", MEAN_LABEL, thickness.mean));
    content.push_str(&format!("{}, {:.3}\n", STD_DEV_LABEL, thickness.std_dev));

    Ok(content)
}

/// Write `<name>_csv.csv` into `dir` and record its path on the plate.
pub fn write_thickness_csv(plate: &mut Plate, dir: &Path, columns: usize) -> Result<PathBuf> {
    let content = render_thickness_csv(plate.require_thickness()?, columns)?;
    let path = dir.join(format!("{}_csv.csv", plate.name));

    ensure_parent_dirs(&path)?;
    let mut writer = create_buffered_writer(&path)?;
    let path_str = path.display().to_string();

    writer
        .write_all(content.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| WriteError::WriteFile {
            path: path_str,
            source: e,
        })?;

    info!("wrote thickness grid for '{}' to {}", plate.name, path.display());
    plate.artifacts.csv = Some(path.clone());
    Ok(path)
}

/// A thickness grid read back from its CSV form.
#[derive(Debug, Clone, PartialEq)]
pub struct ThicknessGrid {
    /// Data lines; every line but possibly the last has the full column width
    pub rows: Vec<Vec<f64>>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

impl ThicknessGrid {
    /// Values in grid order.
    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().flatten().copied().collect()
    }

    /// Width of the widest row.
    pub fn columns(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }
}

/// Parse grid CSV text, separating data rows from the summary lines.
pub fn parse_thickness_csv(content: &str) -> Result<ThicknessGrid> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let mut grid = ThicknessGrid {
        rows: Vec::new(),
        mean: None,
        std_dev: None,
    };

    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        let parse = |field: &str| -> Result<f64> {
            field.parse().map_err(|_| WriteError::InvalidGrid {
                line,
                reason: format!("'{}' is not a number", field),
            })
        };

        match record.get(0) {
            Some(MEAN_LABEL) => grid.mean = Some(parse(record.get(1).unwrap_or_default())?),
            Some(STD_DEV_LABEL) => grid.std_dev = Some(parse(record.get(1).unwrap_or_default())?),
            _ => {
                let row = record.iter().map(parse).collect::<Result<Vec<f64>>>()?;
                grid.rows.push(row);
            }
        }
    }

    Ok(grid)
}

/// Read a grid CSV file from disk.
pub fn read_thickness_csv(path: &Path) -> Result<ThicknessGrid> {
    let content = fs::read_to_string(path).map_err(|e| WriteError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_thickness_csv(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::PointCloud;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    fn sequence(n: usize) -> Thickness {
        Thickness::from_values((0..n).map(|i| 0.1 + i as f64 * 0.01).collect()).unwrap()
    }

    #[test]
    fn test_render_twenty_three_values() {
        let csv = render_thickness_csv(&sequence(23), 11).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].split(',').count(), 11);
        assert_eq!(lines[1].split(',').count(), 11);
        assert_eq!(lines[2], "0.320");
        assert!(lines[3].starts_with("Thickness_Mean, "));
        assert!(lines[4].starts_with("Thickness_StdDev, "));
        assert_eq!(csv.matches('\n').count(), 5);
        assert!(csv.ends_with('\n'));
    }

    #[test]
    fn test_render_exact_multiple_has_no_short_row() {
        let csv = render_thickness_csv(&sequence(22), 11).unwrap();
        assert_eq!(csv.lines().count(), 4);
        assert!(!csv.contains(",\n"));
    }

    #[test]
    fn test_render_reference_values() {
        let thickness = Thickness::from_values(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let csv = render_thickness_csv(&thickness, 11).unwrap();
        assert_eq!(
            csv,
            "1.000,2.000,3.000,4.000\nThickness_Mean, 2.500\nThickness_StdDev, 1.118\n"
        );
    }

    #[test]
    fn test_render_rejects_zero_columns() {
        assert!(matches!(
            render_thickness_csv(&sequence(3), 0),
            Err(WriteError::InvalidColumns)
        ));
    }

    #[test]
    fn test_write_requires_thickness() {
        let dir = tempdir().unwrap();
        let data = PointCloud::from_rows(vec![vec![0.0, 0.0, 0.0]]).unwrap();
        let mut plate = Plate::new("bare", data);

        let result = write_thickness_csv(&mut plate, dir.path(), 11);
        assert!(matches!(result, Err(WriteError::ThicknessNotComputed(_))));
        assert!(plate.artifacts.csv.is_none());
    }

    #[test]
    fn test_write_records_path() {
        let dir = tempdir().unwrap();
        let data = PointCloud::from_rows(vec![vec![0.0, 0.0, 0.0]]).unwrap();
        let mut plate = Plate::new("P1", data);
        plate.set_thickness(Thickness::from_values(vec![0.25]).unwrap());

        let path = write_thickness_csv(&mut plate, &dir.path().join("P1"), 11).unwrap();

        assert_eq!(path, dir.path().join("P1").join("P1_csv.csv"));
        assert_eq!(plate.artifacts.csv.as_deref(), Some(path.as_path()));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0.250\nThickness_Mean, 0.250\nThickness_StdDev, 0.000\n");
    }

    #[test]
    fn test_parse_grid() {
        let grid = parse_thickness_csv(
            "1.000,2.000\n3.000\nThickness_Mean, 2.000\nThickness_StdDev, 0.816\n",
        )
        .unwrap();
        assert_eq!(grid.rows, vec![vec![1.0, 2.0], vec![3.0]]);
        assert_eq!(grid.columns(), 2);
        assert_eq!(grid.mean, Some(2.0));
        assert_eq!(grid.std_dev, Some(0.816));
    }

    #[test]
    fn test_parse_grid_reports_bad_line() {
        let result = parse_thickness_csv("1.000,2.000\n3.000,x\n");
        assert!(matches!(result, Err(WriteError::InvalidGrid { line: 2, .. })));
    }

    proptest! {
        #[test]
        fn grid_round_trip_to_three_decimals(
            values in proptest::collection::vec(-50.0_f64..50.0, 1..=150)
        ) {
            let thickness = Thickness::from_values(values.clone()).unwrap();
            let csv = render_thickness_csv(&thickness, 11).unwrap();
            let grid = parse_thickness_csv(&csv).unwrap();

            let parsed = grid.values();
            prop_assert_eq!(parsed.len(), values.len());
            for (a, b) in parsed.iter().zip(values.iter()) {
                prop_assert!((a - b).abs() <= 0.0005 + 1e-9);
            }
            prop_assert!(grid.rows.iter().rev().skip(1).all(|r| r.len() == 11));
        }
    }
}
