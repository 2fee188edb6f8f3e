//! Command-line interface for thickness reports.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use crate::core::loaders;
use crate::core::writers::render_thickness_csv;
use crate::pipeline::{run_batch, BatchOrchestrator, PlateSource};
use crate::processors::{compute_thickness, statistics};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "thickness-report")]
#[command(about = "Coating thickness reports from fixture and plate point clouds", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate PDF reports for plates and archive them
    Report {
        /// Fixture point cloud measured without coating
        #[arg(short, long)]
        fixture: PathBuf,
        /// Plate point clouds, one report each
        #[arg(required = true)]
        plates: Vec<PathBuf>,
        /// Operator name printed on the reports
        #[arg(short, long)]
        scanner: Option<String>,
        /// Archive path (defaults to the configured archive name)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Base directory for the per-run working directory
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Keep the working directory after archiving
        #[arg(long)]
        keep_work_dir: bool,
        /// Stop at the first plate that fails
        #[arg(long)]
        fail_fast: bool,
    },

    /// Compute thickness statistics for a single plate
    Thickness {
        /// Fixture point cloud
        #[arg(short, long)]
        fixture: PathBuf,
        /// Plate point cloud
        plate: PathBuf,
        /// Also write the thickness grid CSV to this path
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Show the detected layout of a point cloud file
    Inspect {
        /// Point cloud file
        file: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a bar for the per-plate loop
fn create_progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Report {
            fixture,
            plates,
            scanner,
            output,
            work_dir,
            keep_work_dir,
            fail_fast,
        } => {
            let mut config = config;
            if let Some(dir) = work_dir {
                config.output.work_dir = dir;
            }
            config.output.keep_work_dir |= keep_work_dir;
            if fail_fast {
                config.output.continue_on_error = false;
            }
            cmd_report(&fixture, &plates, scanner, output, &config)
        }
        Commands::Thickness { fixture, plate, csv } => cmd_thickness(&fixture, &plate, csv, &config),
        Commands::Inspect { file } => cmd_inspect(&file),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_report(
    fixture_path: &PathBuf,
    plate_paths: &[PathBuf],
    scanner: Option<String>,
    output: Option<PathBuf>,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    let archive = output.unwrap_or_else(|| PathBuf::from(&config.output.archive_name));

    let spinner = create_spinner("Loading point clouds...");
    let fixture = loaders::load_point_cloud(fixture_path)
        .with_context(|| format!("failed to load fixture {}", fixture_path.display()));
    let fixture = match fixture {
        Ok(cloud) => cloud,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    let mut sources = Vec::with_capacity(plate_paths.len());
    let mut load_failures = 0;
    for path in plate_paths {
        match PlateSource::from_path(path) {
            Ok(source) => sources.push(source),
            Err(e) if config.output.continue_on_error => {
                error!("{}", e);
                load_failures += 1;
            }
            Err(e) => {
                spinner.finish_and_clear();
                return Err(e.into());
            }
        }
    }
    spinner.finish_and_clear();

    let mut orchestrator = BatchOrchestrator::new(config, &fixture);
    if let Some(name) = scanner {
        orchestrator = orchestrator.with_scanner_name(name);
    }

    let progress = create_progress_bar(sources.len());
    let outcome = run_batch(&orchestrator, sources, &archive, |name| {
        progress.inc(1);
        progress.set_message(name.to_string());
    });
    progress.finish_and_clear();
    let outcome = outcome.context("report generation failed")?;

    let failed = outcome.summary.failures.len() + load_failures;
    print_summary(
        "Thickness Reports Complete",
        &[
            ("Fixture", fixture_path.display().to_string()),
            ("Fixture points", fixture.len().to_string()),
            ("Plates reported", outcome.summary.plates.len().to_string()),
            ("Plates failed", failed.to_string()),
            ("Archive", outcome.archive.display().to_string()),
            ("Reports archived", outcome.archived.len().to_string()),
            (
                "Work dir",
                outcome
                    .work_dir
                    .as_ref()
                    .map_or_else(|| "removed".to_string(), |d| d.display().to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    for failure in &outcome.summary.failures {
        println!("  failed: {}", failure);
    }

    if outcome.summary.plates.is_empty() {
        bail!("no plate produced a report");
    }
    Ok(())
}

fn cmd_thickness(
    fixture_path: &PathBuf,
    plate_path: &PathBuf,
    csv: Option<PathBuf>,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();

    let fixture = loaders::load_point_cloud(fixture_path)
        .with_context(|| format!("failed to load fixture {}", fixture_path.display()))?;
    let plate = loaders::load_point_cloud(plate_path)
        .with_context(|| format!("failed to load plate {}", plate_path.display()))?;

    let thickness = compute_thickness(&fixture, &plate)?;
    let summary = statistics::summarize(&thickness.values).context("no thickness values")?;

    if let Some(path) = &csv {
        let content = render_thickness_csv(&thickness, config.grid.columns)?;
        fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    }

    print_summary(
        "Thickness",
        &[
            ("Plate", plate_path.display().to_string()),
            ("Points", summary.count.to_string()),
            ("Mean (mm)", format!("{:.3}", summary.mean)),
            ("Std dev (mm)", format!("{:.3}", summary.std_dev)),
            ("Min (mm)", format!("{:.3}", summary.min)),
            ("Max (mm)", format!("{:.3}", summary.max)),
            (
                "Grid CSV",
                csv.map_or_else(|| "-".to_string(), |p| p.display().to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_inspect(file: &PathBuf) -> Result<()> {
    let mut reader = BufReader::new(
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?,
    );
    let delimiter = loaders::detect_delimiter(&mut reader)?;
    let cloud = loaders::load_point_cloud(file)?;
    let z: Vec<f64> = cloud.z().collect();
    let (z_min, z_max) = statistics::min_max(&z).unwrap_or((f64::NAN, f64::NAN));

    print_summary(
        "Point Cloud",
        &[
            ("File", file.display().to_string()),
            ("Delimiter", delimiter.name().to_string()),
            ("Rows", cloud.len().to_string()),
            ("Columns", cloud.num_columns().to_string()),
            ("Z range", format!("{:.3} .. {:.3}", z_min, z_max)),
        ],
    );
    Ok(())
}
