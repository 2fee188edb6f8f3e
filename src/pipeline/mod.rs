//! Batch report generation.
//!
//! A run owns a working directory with one subdirectory per plate. Each plate
//! goes through thickness, CSV grid, histogram, heatmap and report in that
//! order; the finished reports are then archived and the working directory is
//! removed.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use log::{debug, error, info, warn};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::PipelineConfig;
use crate::core::loaders::{self, LoaderError, PointCloud};
use crate::core::plate::{plate_name_from_path, Plate};
use crate::core::writers::write_thickness_csv;
use crate::processors::thickness::compute_thickness;
use crate::report::write_report;
use crate::visualization::{write_heatmap, write_histogram};

/// Errors that stop a whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to load '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: LoaderError,
    },

    #[error("working directory '{path}': {source}")]
    Workspace {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to archive reports into '{path}': {source}")]
    Archive {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("batch stopped: {0}")]
    Aborted(#[source] PlateFailure),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Processing step a plate failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Thickness,
    Directory,
    Csv,
    Histogram,
    Heatmap,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Thickness => "thickness computation",
            Stage::Directory => "plate directory creation",
            Stage::Csv => "CSV grid",
            Stage::Histogram => "histogram",
            Stage::Heatmap => "heatmap",
            Stage::Report => "report assembly",
        };
        f.write_str(name)
    }
}

/// A plate that could not be processed, with the step and cause.
#[derive(Error, Debug)]
#[error("plate '{plate}' failed at {stage}: {source}")]
pub struct PlateFailure {
    pub plate: String,
    pub stage: Stage,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

fn failure<E>(plate: &Plate, stage: Stage) -> impl FnOnce(E) -> PlateFailure
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let plate = plate.name.clone();
    move |e| PlateFailure {
        plate,
        stage,
        source: e.into(),
    }
}

/// A named, parsed plate waiting to be processed.
#[derive(Debug, Clone)]
pub struct PlateSource {
    pub name: String,
    pub cloud: PointCloud,
}

impl PlateSource {
    /// Parse an uploaded stream under the given display name.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> std::result::Result<Self, LoaderError> {
        Ok(Self {
            name: name.into(),
            cloud: loaders::parse_bytes(bytes)?,
        })
    }

    /// Load a plate file; its name is the file stem.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cloud = loaders::load_point_cloud(path).map_err(|source| PipelineError::Load {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            name: plate_name_from_path(path),
            cloud,
        })
    }
}

/// Per-run working directory.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    used_names: HashSet<String>,
}

impl Workspace {
    /// Create a fresh run directory inside `base`.
    pub fn create(base: &Path) -> Result<Self> {
        let stamp = Local::now().format("run-%Y%m%d-%H%M%S").to_string();
        let workspace_error = |path: &Path, source| PipelineError::Workspace {
            path: path.display().to_string(),
            source,
        };

        fs::create_dir_all(base).map_err(|e| workspace_error(base, e))?;

        let mut root = base.join(&stamp);
        let mut attempt = 1;
        loop {
            match fs::create_dir(&root) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    root = base.join(format!("{}-{}", stamp, attempt));
                }
                Err(e) => return Err(workspace_error(&root, e)),
            }
        }

        debug!("created working directory {}", root.display());
        Ok(Self {
            root,
            used_names: HashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve `name`, adding `_2`, `_3`, ... when it is already taken.
    pub fn reserve_name(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 1;
        while self.used_names.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", name, n);
        }
        self.used_names.insert(candidate.clone());
        candidate
    }

    /// Create and return the directory for a reserved plate name.
    pub fn plate_dir(&self, name: &str) -> io::Result<PathBuf> {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Delete the run directory and everything in it.
    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.root).map_err(|source| PipelineError::Workspace {
            path: self.root.display().to_string(),
            source,
        })?;
        debug!("removed working directory {}", self.root.display());
        Ok(())
    }
}

/// Outcome of processing a batch of plates.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Plates whose report was written
    pub plates: Vec<Plate>,
    pub failures: Vec<PlateFailure>,
}

impl BatchSummary {
    /// Paths of all written reports.
    pub fn reports(&self) -> Vec<&Path> {
        self.plates
            .iter()
            .filter_map(|p| p.artifacts.report.as_deref())
            .collect()
    }
}

/// Runs plates through every processing step against one fixture.
pub struct BatchOrchestrator<'a> {
    config: &'a PipelineConfig,
    fixture: &'a PointCloud,
    scanner_name: String,
    date: NaiveDate,
}

impl<'a> BatchOrchestrator<'a> {
    /// Uses the configured operator name and today's date.
    pub fn new(config: &'a PipelineConfig, fixture: &'a PointCloud) -> Self {
        Self {
            config,
            fixture,
            scanner_name: config.report.scanner_name.clone(),
            date: Local::now().date_naive(),
        }
    }

    pub fn with_scanner_name(mut self, scanner_name: impl Into<String>) -> Self {
        self.scanner_name = scanner_name.into();
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Process one plate inside `workspace`.
    pub fn process_plate(
        &self,
        workspace: &mut Workspace,
        source: PlateSource,
    ) -> std::result::Result<Plate, PlateFailure> {
        let name = workspace.reserve_name(&source.name);
        if name != source.name {
            warn!("duplicate plate name '{}' renamed to '{}'", source.name, name);
        }
        let mut plate = Plate::new(name, source.cloud);

        let thickness = compute_thickness(self.fixture, &plate.data)
            .map_err(failure(&plate, Stage::Thickness))?;
        info!(
            "plate '{}': {} points, mean {:.3} mm, std dev {:.3} mm",
            plate.name,
            thickness.len(),
            thickness.mean,
            thickness.std_dev
        );
        plate.set_thickness(thickness);

        let dir = workspace
            .plate_dir(&plate.name)
            .map_err(failure(&plate, Stage::Directory))?;

        write_thickness_csv(&mut plate, &dir, self.config.grid.columns)
            .map_err(failure(&plate, Stage::Csv))?;
        write_histogram(&mut plate, &dir, self.config).map_err(failure(&plate, Stage::Histogram))?;
        write_heatmap(&mut plate, &dir, self.config).map_err(failure(&plate, Stage::Heatmap))?;
        write_report(
            &mut plate,
            &dir,
            &self.config.report,
            &self.scanner_name,
            self.date,
        )
        .map_err(failure(&plate, Stage::Report))?;

        Ok(plate)
    }

    /// Process every source in order, calling `on_done` after each plate.
    ///
    /// Failed plates are collected in the summary; with
    /// `output.continue_on_error` off the first failure ends the batch.
    pub fn process_all<I, F>(&self, workspace: &mut Workspace, sources: I, mut on_done: F) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = PlateSource>,
        F: FnMut(&str),
    {
        let mut summary = BatchSummary::default();

        for source in sources {
            let name = source.name.clone();
            match self.process_plate(workspace, source) {
                Ok(plate) => summary.plates.push(plate),
                Err(failure) => {
                    error!("{}", failure);
                    if !self.config.output.continue_on_error {
                        return Err(PipelineError::Aborted(failure));
                    }
                    summary.failures.push(failure);
                }
            }
            on_done(&name);
        }

        Ok(summary)
    }
}

fn collect_pdfs(dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_pdfs(&path, found)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Store every `.pdf` under `work_dir` in a deflated ZIP at `zip_path`.
///
/// Entries are flat, named by file name. Returns the entry names in order.
pub fn archive_reports(work_dir: &Path, zip_path: &Path) -> Result<Vec<String>> {
    let mut pdfs = Vec::new();
    collect_pdfs(work_dir, &mut pdfs).map_err(io_error(work_dir))?;
    pdfs.sort();

    if let Some(parent) = zip_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
    }

    let archive_error = |source| PipelineError::Archive {
        path: zip_path.display().to_string(),
        source,
    };

    let file = File::create(zip_path).map_err(io_error(zip_path))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut names = Vec::with_capacity(pdfs.len());
    for pdf in &pdfs {
        let Some(name) = pdf.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if names.contains(&name) {
            warn!("skipping {}: an entry named '{}' is already archived", pdf.display(), name);
            continue;
        }

        zip.start_file(name.as_str(), options).map_err(archive_error)?;
        let mut input = File::open(pdf).map_err(io_error(pdf))?;
        io::copy(&mut input, &mut zip).map_err(io_error(pdf))?;
        names.push(name);
    }

    zip.finish()
        .map_err(archive_error)?
        .flush()
        .map_err(io_error(zip_path))?;
    info!("archived {} reports into {}", names.len(), zip_path.display());
    Ok(names)
}

/// A finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: BatchSummary,
    pub archive: PathBuf,
    pub archived: Vec<String>,
    /// Working directory, when it was kept or could not be removed
    pub work_dir: Option<PathBuf>,
}

/// Keep or remove the run directory; returns its path when it still exists.
fn release(workspace: Workspace, keep: bool) -> Option<PathBuf> {
    let root = workspace.root().to_path_buf();
    if keep {
        info!("working directory kept at {}", root.display());
        return Some(root);
    }
    match workspace.remove() {
        Ok(()) => None,
        Err(e) => {
            warn!("{}", e);
            Some(root)
        }
    }
}

/// Process all plates, archive their reports and clean up.
pub fn run_batch<I, F>(
    orchestrator: &BatchOrchestrator<'_>,
    sources: I,
    archive_path: &Path,
    on_done: F,
) -> Result<RunOutcome>
where
    I: IntoIterator<Item = PlateSource>,
    F: FnMut(&str),
{
    let output = &orchestrator.config.output;
    let mut workspace = Workspace::create(&output.work_dir)?;
    let keep = output.keep_work_dir;

    let summary = match orchestrator.process_all(&mut workspace, sources, on_done) {
        Ok(summary) => summary,
        Err(e) => {
            release(workspace, keep);
            return Err(e);
        }
    };

    let archived = match archive_reports(workspace.root(), archive_path) {
        Ok(names) => names,
        Err(e) => {
            release(workspace, keep);
            return Err(e);
        }
    };

    let work_dir = release(workspace, keep);

    Ok(RunOutcome {
        summary,
        archive: archive_path.to_path_buf(),
        archived,
        work_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualization::test_support::pipeline_config;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    /// `rows x 11` grid points with the given z.
    fn cloud_text(rows: usize, z: impl Fn(usize) -> f64, delimiter: &str) -> String {
        (0..rows * 11)
            .map(|i| {
                format!(
                    "{}{d}{}{d}{:.4}\n",
                    (i % 11) as f64 * 2.5,
                    (i / 11) as f64 * 2.5,
                    z(i),
                    d = delimiter
                )
            })
            .collect()
    }

    fn fixture() -> PointCloud {
        loaders::parse_bytes(cloud_text(3, |_| 10.0, ",").as_bytes()).unwrap()
    }

    fn plate(name: &str, offset: f64) -> PlateSource {
        let text = cloud_text(3, |i| 10.0 + offset + (i % 5) as f64 * 0.01, "\t");
        PlateSource::from_bytes(name, text.as_bytes()).unwrap()
    }

    fn config_in(dir: &Path) -> PipelineConfig {
        let mut config = pipeline_config();
        config.output.work_dir = dir.join("work");
        config
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_reserve_name_suffixes_duplicates() {
        let dir = tempdir().unwrap();
        let mut workspace = Workspace::create(dir.path()).unwrap();
        assert_eq!(workspace.reserve_name("P1"), "P1");
        assert_eq!(workspace.reserve_name("P1"), "P1_2");
        assert_eq!(workspace.reserve_name("P1"), "P1_3");
        assert_eq!(workspace.reserve_name("P2"), "P2");
    }

    #[test]
    fn test_workspaces_do_not_collide() {
        let dir = tempdir().unwrap();
        let a = Workspace::create(dir.path()).unwrap();
        let b = Workspace::create(dir.path()).unwrap();
        assert_ne!(a.root(), b.root());
        b.remove().unwrap();
        assert!(a.root().exists());
    }

    #[test]
    fn test_process_plate_writes_all_artifacts() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let fixture = fixture();
        let orchestrator = BatchOrchestrator::new(&config, &fixture).with_date(date());
        let mut workspace = Workspace::create(&config.output.work_dir).unwrap();

        let plate = orchestrator.process_plate(&mut workspace, plate("A1", 0.25)).unwrap();

        let plate_dir = workspace.root().join("A1");
        assert_eq!(plate.artifacts.csv, Some(plate_dir.join("A1_csv.csv")));
        assert_eq!(plate.artifacts.histogram, Some(plate_dir.join("A1_hist.png")));
        assert_eq!(plate.artifacts.heatmap, Some(plate_dir.join("A1_heat.png")));
        assert_eq!(plate.artifacts.report, Some(plate_dir.join("A1.pdf")));
        assert!((plate.mean().unwrap() - 0.269).abs() < 1e-3);
    }

    #[test]
    fn test_mismatched_plate_fails_at_thickness() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let fixture = fixture();
        let orchestrator = BatchOrchestrator::new(&config, &fixture);
        let mut workspace = Workspace::create(&config.output.work_dir).unwrap();

        let short = PlateSource::from_bytes("short", cloud_text(2, |_| 1.0, ",").as_bytes()).unwrap();
        let failure = orchestrator.process_plate(&mut workspace, short).unwrap_err();

        assert_eq!(failure.plate, "short");
        assert_eq!(failure.stage, Stage::Thickness);
        assert!(failure.to_string().contains("row count mismatch"));
        assert!(!workspace.root().join("short").exists());
    }

    #[test]
    fn test_run_batch_archives_and_cleans_up() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let fixture = fixture();
        let orchestrator = BatchOrchestrator::new(&config, &fixture)
            .with_scanner_name("Inspector")
            .with_date(date());
        let archive = dir.path().join("out").join("reports.zip");

        let mut seen = Vec::new();
        let sources = vec![plate("P1", 0.2), plate("P2", 0.3), plate("P1", 0.4)];
        let outcome = run_batch(&orchestrator, sources, &archive, |name| seen.push(name.to_string())).unwrap();

        assert_eq!(seen, vec!["P1", "P2", "P1"]);
        assert_eq!(outcome.summary.plates.len(), 3);
        assert!(outcome.summary.failures.is_empty());
        assert_eq!(outcome.archived, vec!["P1.pdf", "P1_2.pdf", "P2.pdf"]);
        assert!(outcome.work_dir.is_none());

        let work_entries = fs::read_dir(&config.output.work_dir).unwrap().count();
        assert_eq!(work_entries, 0);

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 3);
        let mut entry = zip.by_name("P2.pdf").unwrap();
        let mut head = [0u8; 5];
        entry.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"%PDF-");
    }

    #[test]
    fn test_failures_are_collected_when_continuing() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.output.keep_work_dir = true;
        let fixture = fixture();
        let orchestrator = BatchOrchestrator::new(&config, &fixture).with_date(date());
        let archive = dir.path().join("reports.zip");

        let bad = PlateSource::from_bytes("bad", cloud_text(1, |_| 1.0, ",").as_bytes()).unwrap();
        let outcome = run_batch(&orchestrator, vec![bad, plate("good", 0.1)], &archive, |_| {}).unwrap();

        assert_eq!(outcome.summary.plates.len(), 1);
        assert_eq!(outcome.summary.failures.len(), 1);
        assert_eq!(outcome.summary.failures[0].plate, "bad");
        assert_eq!(outcome.archived, vec!["good.pdf"]);
        assert_eq!(outcome.summary.reports().len(), 1);

        let kept = outcome.work_dir.unwrap();
        assert!(kept.join("good").join("good.pdf").exists());
    }

    #[test]
    fn test_fail_fast_stops_the_batch() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.output.continue_on_error = false;
        let fixture = fixture();
        let orchestrator = BatchOrchestrator::new(&config, &fixture).with_date(date());
        let archive = dir.path().join("reports.zip");

        let bad = PlateSource::from_bytes("bad", cloud_text(1, |_| 1.0, ",").as_bytes()).unwrap();
        let mut processed = 0;
        let result = run_batch(&orchestrator, vec![bad, plate("good", 0.1)], &archive, |_| processed += 1);

        match result {
            Err(PipelineError::Aborted(failure)) => assert_eq!(failure.plate, "bad"),
            other => panic!("Expected Aborted, got {:?}", other.map(|o| o.archived)),
        }
        assert_eq!(processed, 0);
        assert!(!archive.exists());
    }

    #[test]
    fn test_archive_failure_removes_working_directory() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let fixture = fixture();
        let orchestrator = BatchOrchestrator::new(&config, &fixture).with_date(date());

        // A directory where the archive file should go cannot be created as a file.
        let archive = dir.path().join("taken");
        fs::create_dir_all(&archive).unwrap();

        let result = run_batch(&orchestrator, vec![plate("P1", 0.2)], &archive, |_| {});

        assert!(matches!(result, Err(PipelineError::Io { .. })));
        assert_eq!(fs::read_dir(&config.output.work_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_plate_source_from_path_uses_stem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panel_04.xyz");
        fs::write(&path, cloud_text(2, |_| 3.0, " ")).unwrap();

        let source = PlateSource::from_path(&path).unwrap();
        assert_eq!(source.name, "panel_04");
        assert_eq!(source.cloud.len(), 22);

        let missing = PlateSource::from_path(&dir.path().join("absent.xyz"));
        assert!(matches!(missing, Err(PipelineError::Load { .. })));
    }

    #[test]
    fn test_archive_ignores_other_files() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("work");
        fs::create_dir_all(work.join("a")).unwrap();
        fs::write(work.join("a").join("a.pdf"), b"%PDF-1.5").unwrap();
        fs::write(work.join("a").join("a_csv.csv"), b"1.000\n").unwrap();

        let archive = dir.path().join("bundle.zip");
        let names = archive_reports(&work, &archive).unwrap();

        assert_eq!(names, vec!["a.pdf"]);
        assert_eq!(ZipArchive::new(File::open(&archive).unwrap()).unwrap().len(), 1);
    }
}
