//! The plate entity: one uploaded point cloud plus the state derived from it.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::loaders::PointCloud;
use crate::processors::thickness::Thickness;

/// Returned when an artifact or statistic is requested before thickness exists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("thickness has not been computed for plate '{plate}'")]
pub struct ThicknessNotComputed {
    pub plate: String,
}

/// Locations of the files generated for a plate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub csv: Option<PathBuf>,
    pub histogram: Option<PathBuf>,
    pub heatmap: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// A measured plate.
#[derive(Debug, Clone)]
pub struct Plate {
    /// Display name, the source file name without extension
    pub name: String,
    /// Measured points, row-aligned with the fixture
    pub data: PointCloud,
    thickness: Option<Thickness>,
    /// Generated artifacts, filled in as processing proceeds
    pub artifacts: ArtifactPaths,
}

impl Plate {
    pub fn new(name: impl Into<String>, data: PointCloud) -> Self {
        Self {
            name: name.into(),
            data,
            thickness: None,
            artifacts: ArtifactPaths::default(),
        }
    }

    /// Stores computed thickness.
    pub fn set_thickness(&mut self, thickness: Thickness) {
        self.thickness = Some(thickness);
    }

    /// Computed thickness, if any.
    pub fn thickness(&self) -> Option<&Thickness> {
        self.thickness.as_ref()
    }

    /// Computed thickness, or an error naming this plate.
    pub fn require_thickness(&self) -> Result<&Thickness, ThicknessNotComputed> {
        self.thickness.as_ref().ok_or_else(|| ThicknessNotComputed {
            plate: self.name.clone(),
        })
    }

    pub fn mean(&self) -> Result<f64, ThicknessNotComputed> {
        self.require_thickness().map(|t| t.mean)
    }

    pub fn std_dev(&self) -> Result<f64, ThicknessNotComputed> {
        self.require_thickness().map(|t| t.std_dev)
    }
}

/// Derives a plate name from a file path by stripping directory and extension.
pub fn plate_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "plate".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plate() -> Plate {
        let data = PointCloud::from_rows(vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 2.0]]).unwrap();
        Plate::new("P-01", data)
    }

    #[test]
    fn test_statistics_require_thickness() {
        let plate = sample_plate();
        assert!(plate.thickness().is_none());
        assert_eq!(
            plate.mean(),
            Err(ThicknessNotComputed {
                plate: "P-01".to_string()
            })
        );
        assert!(plate.std_dev().is_err());
    }

    #[test]
    fn test_set_thickness() {
        let mut plate = sample_plate();
        plate.set_thickness(Thickness::from_values(vec![1.0, 3.0]).unwrap());
        assert_eq!(plate.mean().unwrap(), 2.0);
        assert_eq!(plate.std_dev().unwrap(), 1.0);
        assert_eq!(plate.artifacts, ArtifactPaths::default());
    }

    #[test]
    fn test_plate_name_from_path() {
        assert_eq!(plate_name_from_path(Path::new("/uploads/plate_7.xyz")), "plate_7");
        assert_eq!(plate_name_from_path(Path::new("scan.v2.xyz")), "scan.v2");
        assert_eq!(plate_name_from_path(Path::new("noext")), "noext");
        assert_eq!(plate_name_from_path(Path::new("/")), "plate");
    }
}
