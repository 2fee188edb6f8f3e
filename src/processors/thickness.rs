//! Per-point thickness of a plate measured against its fixture.

use thiserror::Error;

use super::statistics;
use crate::core::loaders::PointCloud;

/// Errors that can occur while computing thickness.
#[derive(Debug, Error)]
pub enum ThicknessError {
    #[error("row count mismatch: fixture has {fixture} rows, plate has {plate} rows")]
    RowCountMismatch { fixture: usize, plate: usize },

    #[error("thickness of an empty point cloud is undefined")]
    Empty,
}

/// Thickness values in fixture row order, with their summary statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Thickness {
    /// `plate[i].z - fixture[i].z` for every row `i`
    pub values: Vec<f64>,
    /// Arithmetic mean of `values`
    pub mean: f64,
    /// Population standard deviation of `values`
    pub std_dev: f64,
}

impl Thickness {
    /// Wraps precomputed values, deriving mean and standard deviation.
    pub fn from_values(values: Vec<f64>) -> Result<Self, ThicknessError> {
        let mean = statistics::mean(&values).ok_or(ThicknessError::Empty)?;
        let std_dev = statistics::population_std_dev(&values).ok_or(ThicknessError::Empty)?;
        Ok(Self {
            values,
            mean,
            std_dev,
        })
    }

    /// Number of thickness samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Compute the thickness of `plate` over `fixture`.
///
/// Rows are paired by position; no spatial matching is attempted, so both
/// clouds must have the same number of rows.
///
/// # Examples
///
/// ```
/// use thickness_report::core::loaders::PointCloud;
/// use thickness_report::processors::thickness::compute_thickness;
///
/// let fixture = PointCloud::from_rows(vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 1.0]]).unwrap();
/// let plate = PointCloud::from_rows(vec![vec![0.0, 0.0, 1.5], vec![1.0, 0.0, 2.0]]).unwrap();
/// let thickness = compute_thickness(&fixture, &plate).unwrap();
/// assert_eq!(thickness.values, vec![0.5, 1.0]);
/// assert!((thickness.mean - 0.75).abs() < 1e-12);
/// ```
pub fn compute_thickness(
    fixture: &PointCloud,
    plate: &PointCloud,
) -> Result<Thickness, ThicknessError> {
    if fixture.len() != plate.len() {
        return Err(ThicknessError::RowCountMismatch {
            fixture: fixture.len(),
            plate: plate.len(),
        });
    }

    let values: Vec<f64> = plate
        .z()
        .zip(fixture.z())
        .map(|(plate_z, fixture_z)| plate_z - fixture_z)
        .collect();

    Thickness::from_values(values)
}
