//! Data processing modules.

pub mod statistics;
pub mod thickness;

// Re-export key types for convenience
pub use statistics::{histogram, summarize, Histogram, Summary};
pub use thickness::{compute_thickness, Thickness, ThicknessError};
