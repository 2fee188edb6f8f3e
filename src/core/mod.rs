//! Core data types and I/O operations.

pub mod loaders;
pub mod plate;
pub mod writers;

pub use loaders::{Delimiter, LoaderError, PointCloud};
pub use plate::{ArtifactPaths, Plate, ThicknessNotComputed};
pub use writers::{read_thickness_csv, render_thickness_csv, write_thickness_csv, WriteError};
