//! PDF report assembly.
//!
//! One letter-size document per plate. Page one carries the summary: title,
//! run date, operator, measurement notes, the heatmap and histogram images and
//! a statistics table. The following pages reproduce the thickness grid as a
//! bordered table, split over as many pages as needed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use image::RgbImage;
use log::{debug, info, warn};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use thiserror::Error;

use crate::config::{LogoConfig, ReportConfig};
use crate::core::plate::{Plate, ThicknessNotComputed};
use crate::core::writers::{self, WriteError};

/// Letter page size in points.
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

const LEFT_MARGIN: f32 = 72.0;
const REGULAR: &str = "F1";
const BOLD: &str = "F2";

const LAYUP_NOTE: &str =
    "The plate was laid up and cured and post cured as per the manufacturer recommended procedure.";
const MEASUREMENT_NOTE: &str =
    "It was then measured on a Hexagon coordinate measuring machine for the thickness measurements.";

/// Errors that can occur while assembling a report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to write report '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load image '{path}': {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("plate '{plate}' has no {artifact} to put in the report")]
    MissingArtifact {
        plate: String,
        artifact: &'static str,
    },

    #[error(transparent)]
    ThicknessNotComputed(#[from] ThicknessNotComputed),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Everything a report needs from one processed plate.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
    pub csv_path: PathBuf,
    pub histogram_path: PathBuf,
    pub heatmap_path: PathBuf,
    /// Operator who ran the scan
    pub scanner_name: String,
    pub date: NaiveDate,
}

impl ReportInput {
    /// Collect the report input from a plate whose artifacts are all written.
    pub fn from_plate(plate: &Plate, scanner_name: &str, date: NaiveDate) -> Result<Self> {
        let thickness = plate.require_thickness()?;
        let artifact = |path: &Option<PathBuf>, artifact: &'static str| {
            path.clone().ok_or_else(|| ReportError::MissingArtifact {
                plate: plate.name.clone(),
                artifact,
            })
        };

        Ok(Self {
            name: plate.name.clone(),
            mean: thickness.mean,
            std_dev: thickness.std_dev,
            csv_path: artifact(&plate.artifacts.csv, "thickness grid")?,
            histogram_path: artifact(&plate.artifacts.histogram, "histogram")?,
            heatmap_path: artifact(&plate.artifacts.heatmap, "heatmap")?,
            scanner_name: scanner_name.to_string(),
            date,
        })
    }
}

/// Content stream under construction.
#[derive(Debug, Default)]
struct PageBuilder {
    operations: Vec<Operation>,
}

impl PageBuilder {
    fn text(&mut self, font: &str, size: f32, x: f32, y: f32, text: &str) {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::String(win_ansi(text), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn centered_text(&mut self, font: &str, size: f32, y: f32, text: &str) {
        let x = ((PAGE_WIDTH - text_width(text, size)) / 2.0).max(0.0);
        self.text(font, size, x, y, text);
    }

    fn image(&mut self, name: &str, x: f32, y: f32, width: f32, height: f32) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![width.into(), 0.into(), 0.into(), height.into(), x.into(), y.into()],
            ),
            Operation::new("Do", vec![name.into()]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn line_width(&mut self, width: f32) {
        self.operations.push(Operation::new("w", vec![width.into()]));
    }

    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.operations.extend([
            Operation::new("re", vec![x.into(), y.into(), width.into(), height.into()]),
            Operation::new("S", vec![]),
        ]);
    }

    fn finish(self) -> Content {
        Content {
            operations: self.operations,
        }
    }
}

/// Encode `text` for the standard fonts' `WinAnsiEncoding`.
///
/// Latin-1 maps to itself and the 0x80..=0x9F block carries the usual
/// typographic extras. Anything else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '\u{2014}' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}

/// Approximate advance width of `text` in a Times face.
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

/// A bordered table with a grid between every cell.
struct Table<'a> {
    rows: &'a [Vec<String>],
    column_widths: Vec<f32>,
    row_height: f32,
    font_size: f32,
}

impl Table<'_> {
    fn width(&self) -> f32 {
        self.column_widths.iter().sum()
    }

    /// Draw with the top-left corner at `(x, top)`.
    fn draw(&self, page: &mut PageBuilder, x: f32, top: f32) {
        page.line_width(0.25);
        for (r, row) in self.rows.iter().enumerate() {
            let y = top - (r + 1) as f32 * self.row_height;
            let mut cx = x;
            for (c, cell) in row.iter().enumerate() {
                let w = self.column_widths.get(c).copied().unwrap_or(0.0);
                page.stroke_rect(cx, y, w, self.row_height);
                page.text(REGULAR, self.font_size, cx + 3.0, y + self.row_height * 0.3, cell);
                cx += w;
            }
        }
    }
}

fn statistics_rows(input: &ReportInput) -> Vec<Vec<String>> {
    vec![
        vec!["Average Thickness:".to_string(), format!("{:.3}", input.mean)],
        vec![
            "Thickness Standard Deviation:".to_string(),
            format!("{:.3}", input.std_dev),
        ],
    ]
}

/// Operations of the summary page.
fn summary_page(input: &ReportInput, logos: &[(String, &LogoConfig)]) -> PageBuilder {
    let mut page = PageBuilder::default();

    for (name, logo) in logos {
        page.image(name, logo.x, logo.y, logo.width, logo.height);
    }

    page.text(BOLD, 16.0, LEFT_MARGIN, 680.0, &format!("Report on {}", input.name));
    page.text(REGULAR, 12.0, LEFT_MARGIN, 650.0, &input.date.format("%m/%d/%Y").to_string());
    page.text(REGULAR, 12.0, LEFT_MARGIN, 630.0, &input.scanner_name);
    page.text(REGULAR, 12.0, LEFT_MARGIN, 600.0, LAYUP_NOTE);
    page.text(REGULAR, 12.0, LEFT_MARGIN, 586.0, MEASUREMENT_NOTE);
    page.text(BOLD, 12.0, LEFT_MARGIN, 550.0, "Units in mm");

    page.image("Heat", 40.0, 300.0, 280.0, 210.0);
    page.image("Hist", PAGE_WIDTH / 2.0, 300.0, 230.0, 230.0);

    page.text(BOLD, 14.0, LEFT_MARGIN, 260.0, "Statistics");
    let rows = statistics_rows(input);
    let table = Table {
        rows: &rows,
        column_widths: vec![170.0, 60.0],
        row_height: 18.0,
        font_size: 12.0,
    };
    table.draw(&mut page, LEFT_MARGIN, PAGE_HEIGHT / 4.0 + 2.0 * table.row_height);

    page
}

/// Operations of the measurement table pages.
fn grid_pages(name: &str, grid: &[Vec<String>], columns: usize, rows_per_page: usize) -> Vec<PageBuilder> {
    let title = format!("{}x{} Thickness Measurements for {}", columns, grid.len(), name);
    let rows_per_page = rows_per_page.max(1);

    grid.chunks(rows_per_page)
        .map(|chunk| {
            let mut page = PageBuilder::default();
            page.centered_text(BOLD, 16.0, 730.0, &title);
            page.centered_text(BOLD, 12.0, 700.0, "Units in mm");

            let table = Table {
                rows: chunk,
                column_widths: vec![42.0; columns],
                row_height: 14.0,
                font_size: 10.0,
            };
            let x = ((PAGE_WIDTH - table.width()) / 2.0).max(0.0);
            table.draw(&mut page, x, 680.0);
            page
        })
        .collect()
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| ReportError::Image {
            path: path.display().to_string(),
            source: e,
        })
}

fn image_xobject(image: RgbImage) -> Stream {
    let (width, height) = image.dimensions();
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        image.into_raw(),
    )
}

fn type1_font(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Write the report for `input` to `out_path`.
pub fn assemble_report(input: &ReportInput, config: &ReportConfig, out_path: &Path) -> Result<()> {
    let grid = writers::read_thickness_csv(&input.csv_path)?;
    let grid_rows: Vec<Vec<String>> = grid
        .rows
        .iter()
        .map(|row| row.iter().map(|v| format!("{:.3}", v)).collect())
        .collect();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = type1_font(&mut doc, "Times-Roman");
    let bold = type1_font(&mut doc, "Times-Bold");

    let mut xobjects = Dictionary::new();
    let heat = doc.add_object(image_xobject(load_rgb(&input.heatmap_path)?));
    let hist = doc.add_object(image_xobject(load_rgb(&input.histogram_path)?));
    xobjects.set("Heat", heat);
    xobjects.set("Hist", hist);

    let mut logos = Vec::new();
    for (i, logo) in config.logos.iter().enumerate() {
        match load_rgb(&logo.path) {
            Ok(image) => {
                let name = format!("Logo{}", i);
                let id = doc.add_object(image_xobject(image));
                xobjects.set(name.as_bytes(), id);
                logos.push((name, logo));
            }
            Err(e) => warn!("skipping logo: {}", e),
        }
    }

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular,
            BOLD => bold,
        },
        "XObject" => xobjects,
    });

    let mut pages = vec![summary_page(input, &logos)];
    pages.extend(grid_pages(
        &input.name,
        &grid_rows,
        grid.columns(),
        config.table_rows_per_page,
    ));

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, page.finish().encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    writers::ensure_parent_dirs(out_path)?;
    let io_error = |e: std::io::Error| ReportError::Io {
        path: out_path.display().to_string(),
        source: e,
    };
    let mut file = BufWriter::new(File::create(out_path).map_err(io_error)?);
    doc.save_to(&mut file)
        .and_then(|_| file.flush())
        .map_err(io_error)?;

    debug!("report for '{}' has {} pages", input.name, page_count);
    Ok(())
}

/// Assemble `<name>.pdf` into `dir` and record its path on the plate.
pub fn write_report(
    plate: &mut Plate,
    dir: &Path,
    config: &ReportConfig,
    scanner_name: &str,
    date: NaiveDate,
) -> Result<PathBuf> {
    let input = ReportInput::from_plate(plate, scanner_name, date)?;
    let path = dir.join(format!("{}.pdf", plate.name));
    assemble_report(&input, config, &path)?;

    info!("report for '{}' saved to {}", plate.name, path.display());
    plate.artifacts.report = Some(path.clone());
    Ok(path)
}
