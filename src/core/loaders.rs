//! Point cloud loading for coordinate-measurement files.
//!
//! Measurement files are headerless text tables of `x, y, z[, ...]` rows. The
//! field delimiter is not fixed: exports seen in practice use commas, tabs,
//! semicolons, pipes or runs of spaces. The delimiter is inferred from the
//! first lines of the stream, the stream is rewound, and every row is parsed
//! into `f64` values in file order. Row order is significant because it
//! encodes the point correspondence between a fixture and its plates.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use thiserror::Error;

/// Number of non-blank lines inspected during delimiter detection.
const DETECTION_SAMPLE_LINES: usize = 10;

/// Minimum number of coordinates per point (x, y, z).
pub const MIN_COLUMNS: usize = 3;

/// Errors that can occur while loading a point cloud.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty input: no data rows found")]
    EmptyInput,

    #[error("Could not detect a field delimiter from first line '{first_line}'")]
    DelimiterDetection { first_line: String },

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("Rows have {columns} columns, at least 3 (x, y, z) are required")]
    TooFewColumns { columns: usize },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Field delimiters recognised in measurement files, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
    Semicolon,
    Pipe,
    /// One or more spaces or tabs
    Whitespace,
}

impl Delimiter {
    /// Detection candidates, highest priority first.
    pub const CANDIDATES: [Delimiter; 5] = [
        Delimiter::Comma,
        Delimiter::Tab,
        Delimiter::Semicolon,
        Delimiter::Pipe,
        Delimiter::Whitespace,
    ];

    /// The single delimiter byte, or `None` for whitespace runs.
    pub fn as_byte(self) -> Option<u8> {
        match self {
            Delimiter::Comma => Some(b','),
            Delimiter::Tab => Some(b'\t'),
            Delimiter::Semicolon => Some(b';'),
            Delimiter::Pipe => Some(b'|'),
            Delimiter::Whitespace => None,
        }
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        match self {
            Delimiter::Comma => "comma",
            Delimiter::Tab => "tab",
            Delimiter::Semicolon => "semicolon",
            Delimiter::Pipe => "pipe",
            Delimiter::Whitespace => "whitespace",
        }
    }

    fn field_count(self, line: &str) -> usize {
        match self.as_byte() {
            Some(b) => line.split(b as char).count(),
            None => line.split_whitespace().count(),
        }
    }
}

/// A rectangular, ordered table of coordinates.
///
/// Every row has the same number of columns (at least three: x, y, z) and the
/// cloud holds at least one row. Values are stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    columns: usize,
    values: Vec<f64>,
}

impl PointCloud {
    /// Builds a point cloud from rows, checking the rectangular invariant.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let columns = rows.first().map(|r| r.len()).ok_or(LoaderError::EmptyInput)?;
        if columns < MIN_COLUMNS {
            return Err(LoaderError::TooFewColumns { columns });
        }

        let mut values = Vec::with_capacity(columns * rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns {
                return Err(LoaderError::MalformedRow {
                    line: i as u64 + 1,
                    reason: format!("expected {} fields, found {}", columns, row.len()),
                });
            }
            values.extend(row);
        }

        Ok(Self { columns, values })
    }

    /// Returns the number of points (rows) in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len() / self.columns
    }

    /// Always false for a successfully constructed cloud.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of values per row.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns
    }

    /// Returns row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.columns..(i + 1) * self.columns]
    }

    /// Iterates over rows in file order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.columns)
    }

    /// Iterates over the z coordinate (third column) of every row.
    pub fn z(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.rows().map(|row| row[2])
    }

    /// Converts the cloud to a vector of `[x, y, z]` arrays, dropping extra columns.
    pub fn to_coords(&self) -> Vec<[f64; 3]> {
        self.rows().map(|r| [r[0], r[1], r[2]]).collect()
    }
}

/// Collects validated rows while parsing, tracking source line numbers.
struct RowAccumulator {
    columns: Option<usize>,
    values: Vec<f64>,
}

impl RowAccumulator {
    fn new() -> Self {
        Self {
            columns: None,
            values: Vec::with_capacity(4096),
        }
    }

    fn push<'a, I>(&mut self, line: u64, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let start = self.values.len();
        for field in fields {
            let field = field.trim();
            let value: f64 = field
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| LoaderError::MalformedRow {
                    line,
                    reason: format!("'{}' is not a finite number", field),
                })?;
            self.values.push(value);
        }

        let found = self.values.len() - start;
        match self.columns {
            None => {
                if found < MIN_COLUMNS {
                    return Err(LoaderError::TooFewColumns { columns: found });
                }
                self.columns = Some(found);
            }
            Some(expected) if expected != found => {
                return Err(LoaderError::MalformedRow {
                    line,
                    reason: format!("expected {} fields, found {}", expected, found),
                });
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<PointCloud> {
        match self.columns {
            Some(columns) => Ok(PointCloud {
                columns,
                values: self.values,
            }),
            None => Err(LoaderError::EmptyInput),
        }
    }
}

/// Infer the field delimiter from the first lines of `reader`.
///
/// The first non-blank line selects candidates that split it into at least two
/// fields; the first candidate (in [`Delimiter::CANDIDATES`] order) that yields
/// the same field count on every sampled line wins.
///
/// Consumes lines from `reader`; callers that still need the data must rewind.
pub fn detect_delimiter<R: BufRead>(reader: &mut R) -> Result<Delimiter> {
    let mut sample: Vec<String> = Vec::with_capacity(DETECTION_SAMPLE_LINES);
    let mut buf = String::new();

    while sample.len() < DETECTION_SAMPLE_LINES {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        let line = buf.trim_start_matches('\u{feff}').trim();
        if !line.is_empty() {
            sample.push(line.to_string());
        }
    }

    let first = sample.first().ok_or(LoaderError::EmptyInput)?;

    for candidate in Delimiter::CANDIDATES {
        let expected = candidate.field_count(first);
        if expected < 2 {
            continue;
        }
        if sample.iter().all(|line| candidate.field_count(line) == expected) {
            debug!(
                "detected {} delimiter ({} fields, {} lines sampled)",
                candidate.name(),
                expected,
                sample.len()
            );
            return Ok(candidate);
        }
    }

    Err(LoaderError::DelimiterDetection {
        first_line: first.clone(),
    })
}

/// Parse a point cloud using a known delimiter.
///
/// Lines are numbered from 1 in the source, blank lines included, so a
/// [`LoaderError::MalformedRow`] always names the physical line of the row.
pub fn parse_with_delimiter<R: Read>(source: R, delimiter: Delimiter) -> Result<PointCloud> {
    let mut rows = RowAccumulator::new();

    // One csv reader per line: the csv crate skips blank lines without
    // counting them, so line numbers come from the line loop instead.
    let fields = delimiter.as_byte().map(|byte| {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(byte)
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All);
        builder
    });
    let mut record = StringRecord::new();

    let reader = BufReader::new(source);
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let text = if idx == 0 {
            line.trim_start_matches('\u{feff}')
        } else {
            line.as_str()
        };
        if text.trim().is_empty() {
            continue;
        }
        let number = idx as u64 + 1;

        match &fields {
            Some(builder) => {
                if builder.from_reader(text.as_bytes()).read_record(&mut record)? {
                    rows.push(number, record.iter())?;
                }
            }
            None => rows.push(number, text.split_whitespace())?,
        }
    }

    rows.finish()
}

/// Detect the delimiter, rewind, and parse the whole stream.
///
/// # Errors
///
/// - [`LoaderError::DelimiterDetection`] when no candidate splits the sample consistently
/// - [`LoaderError::MalformedRow`] naming the line of a non-numeric field or a
///   row whose length differs from the first row
/// - [`LoaderError::TooFewColumns`] when rows carry fewer than x, y, z
pub fn parse_point_cloud<R: BufRead + Seek>(mut source: R) -> Result<PointCloud> {
    let delimiter = detect_delimiter(&mut source)?;
    source.seek(SeekFrom::Start(0))?;
    parse_with_delimiter(source, delimiter)
}

/// Parse a point cloud from an in-memory upload.
pub fn parse_bytes(bytes: &[u8]) -> Result<PointCloud> {
    parse_point_cloud(Cursor::new(bytes))
}

/// Load a point cloud from a file on disk.
pub fn load_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let cloud = parse_point_cloud(BufReader::new(file))?;
    debug!(
        "loaded {} points x {} columns from {}",
        cloud.len(),
        cloud.num_columns(),
        path.display()
    );
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EXPECTED: [[f64; 3]; 3] = [[1.0, 2.0, 0.5], [1.5, 2.0, 0.25], [2.0, 2.0, -0.125]];

    fn assert_expected(cloud: &PointCloud) {
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.num_columns(), 3);
        assert_eq!(cloud.to_coords(), EXPECTED.to_vec());
    }

    #[test]
    fn test_equivalent_files_parse_identically() {
        let comma = "1.0,2.0,0.5\n1.5,2.0,0.25\n2.0,2.0,-0.125\n";
        let semicolon = "1.0;2.0;0.5\n1.5;2.0;0.25\n2.0;2.0;-0.125\n";
        let tab = "1.0\t2.0\t0.5\n1.5\t2.0\t0.25\n2.0\t2.0\t-0.125\n";
        let pipe = "1.0|2.0|0.5\n1.5|2.0|0.25\n2.0|2.0|-0.125\n";
        let spaces = "1.0   2.0 0.5\n1.5 2.0   0.25\n  2.0 2.0 -0.125\n";

        let clouds: Vec<PointCloud> = [comma, semicolon, tab, pipe, spaces]
            .iter()
            .map(|text| parse_bytes(text.as_bytes()).unwrap())
            .collect();

        for cloud in &clouds {
            assert_expected(cloud);
        }
        assert!(clouds.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_detect_delimiter_priority() {
        let mut comma = Cursor::new("1, 2, 3\n4, 5, 6\n");
        assert_eq!(detect_delimiter(&mut comma).unwrap(), Delimiter::Comma);

        let mut tab = Cursor::new("1\t2\t3\n");
        assert_eq!(detect_delimiter(&mut tab).unwrap(), Delimiter::Tab);

        let mut spaces = Cursor::new("1 2 3\n4 5 6\n");
        assert_eq!(detect_delimiter(&mut spaces).unwrap(), Delimiter::Whitespace);
    }

    #[test]
    fn test_detection_requires_consistent_sample() {
        // Semicolon count differs between lines, whitespace gives one field.
        let mut input = Cursor::new("1;2;3\n4;5\n");
        match detect_delimiter(&mut input) {
            Err(LoaderError::DelimiterDetection { first_line }) => assert_eq!(first_line, "1;2;3"),
            other => panic!("Expected DelimiterDetection, got {:?}", other),
        }
    }

    #[test]
    fn test_single_column_fails_detection() {
        let result = parse_bytes(b"1.0\n2.0\n3.0\n");
        assert!(matches!(result, Err(LoaderError::DelimiterDetection { .. })));
    }

    #[test]
    fn test_detection_does_not_consume_rows() {
        let cloud = parse_bytes(b"9.0,8.0,7.0\n6.0,5.0,4.0\n").unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.row(0), &[9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_malformed_field_reports_line() {
        let result = parse_bytes(b"1,2,3\n4,5,6\n7,abc,9\n");
        match result {
            Err(LoaderError::MalformedRow { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("abc"));
            }
            other => panic!("Expected MalformedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_inconsistent_row_length_reports_line() {
        // Detection only samples the first lines; the short row comes later.
        let mut text = String::new();
        for i in 0..12 {
            text.push_str(&format!("{},0,1\n", i));
        }
        text.push_str("12,0\n");

        match parse_bytes(text.as_bytes()) {
            Err(LoaderError::MalformedRow { line, .. }) => assert_eq!(line, 13),
            other => panic!("Expected MalformedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let result = parse_bytes(b"1,2,3\n4,5,NaN\n");
        assert!(matches!(result, Err(LoaderError::MalformedRow { line: 2, .. })));
        let result = parse_bytes(b"1,2,inf\n");
        assert!(matches!(result, Err(LoaderError::MalformedRow { line: 1, .. })));
    }

    #[test]
    fn test_whitespace_malformed_row_reports_line() {
        let result = parse_bytes(b"1 2 3\n\n4 5 x\n");
        assert!(matches!(result, Err(LoaderError::MalformedRow { line: 3, .. })));
    }

    #[test]
    fn test_blank_lines_count_toward_reported_line() {
        let result = parse_bytes(b"1,2,3\n\n\n4,x,6\n");
        assert!(matches!(result, Err(LoaderError::MalformedRow { line: 4, .. })));

        let result = parse_bytes(b"1;2;3\n\n4;5;6\n\n7;8;z\n");
        assert!(matches!(result, Err(LoaderError::MalformedRow { line: 5, .. })));
    }

    #[test]
    fn test_crlf_blank_lines_count_toward_reported_line() {
        match parse_bytes(b"1,2,3\r\n\r\n4,x,6\r\n") {
            Err(LoaderError::MalformedRow { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains('x'));
            }
            other => panic!("Expected MalformedRow, got {:?}", other),
        }

        let result = parse_bytes(b"\xef\xbb\xbf1\t2\t3\r\n\r\n\r\n4\t5\tbad\r\n");
        assert!(matches!(result, Err(LoaderError::MalformedRow { line: 4, .. })));
    }

    #[test]
    fn test_two_columns_rejected() {
        let result = parse_bytes(b"1,2\n3,4\n");
        assert!(matches!(result, Err(LoaderError::TooFewColumns { columns: 2 })));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(parse_bytes(b""), Err(LoaderError::EmptyInput)));
        assert!(matches!(parse_bytes(b"\n  \n"), Err(LoaderError::EmptyInput)));
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let cloud = parse_bytes(b"1.0,2.0,0.5\r\n1.5,2.0,0.25\r\n\r\n2.0,2.0,-0.125\r\n\r\n").unwrap();
        assert_expected(&cloud);
    }

    #[test]
    fn test_extra_columns_are_kept() {
        let cloud = parse_bytes(b"1,2,3,4\n5,6,7,8\n").unwrap();
        assert_eq!(cloud.num_columns(), 4);
        assert_eq!(cloud.z().collect::<Vec<_>>(), vec![3.0, 7.0]);
        assert_eq!(cloud.to_coords()[1], [5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_from_rows_validates_shape() {
        assert!(PointCloud::from_rows(vec![]).is_err());
        assert!(matches!(
            PointCloud::from_rows(vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0]]),
            Err(LoaderError::MalformedRow { line: 2, .. })
        ));
        let cloud = PointCloud::from_rows(vec![vec![0.0, 0.0, 1.0]]).unwrap();
        assert_eq!(cloud.len(), 1);
        assert!(!cloud.is_empty());
    }

    #[test]
    fn test_load_point_cloud_from_file() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1.0;2.0;0.5").unwrap();
        writeln!(file, "1.5;2.0;0.25").unwrap();
        writeln!(file, "2.0;2.0;-0.125").unwrap();
        file.flush().unwrap();

        let cloud = load_point_cloud(file.path())?;
        assert_expected(&cloud);

        Ok(())
    }
}
