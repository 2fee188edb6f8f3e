//! Coating thickness reports from coordinate-measurement point clouds.
//!
//! This crate provides tools for:
//! - Parsing fixture and plate XYZ files with automatic delimiter detection
//! - Computing per-point thickness with its mean and standard deviation
//! - Writing the thickness grid CSV, histogram and heatmap images
//! - Assembling a PDF report per plate and archiving a batch of reports
//!
//! # Example
//!
//! ```no_run
//! use thickness_report::{core::loaders::load_point_cloud, processors::compute_thickness};
//!
//! let fixture = load_point_cloud("fixture.xyz").unwrap();
//! let plate = load_point_cloud("plate_01.xyz").unwrap();
//! let thickness = compute_thickness(&fixture, &plate).unwrap();
//! println!("mean {:.3} mm", thickness.mean);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod processors;
pub mod report;
pub mod visualization;

pub use config::{
    GridConfig, HistogramConfig, OutputConfig, PipelineConfig, RenderConfig, ReportConfig,
    ReshapePolicy,
};
pub use core::loaders::PointCloud;
pub use core::plate::Plate;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
