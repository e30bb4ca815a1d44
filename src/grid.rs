// 📄 Tabular Reader - uploaded bytes → 2-D text grid
//
// No type inference: every cell stays text so the header locator and the
// amount/date parsers see exactly what the export contained.

use crate::error::{LedgerError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use encoding_rs::WINDOWS_1252;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Declared type of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Delimited text; `None` sniffs the delimiter from the content
    Delimited { delimiter: Option<u8> },
    /// .xlsx / .xls / .ods (first sheet)
    Spreadsheet,
}

impl FileKind {
    /// Detect from a file name's extension
    pub fn from_filename(name: &str) -> Result<FileKind> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" | "txt" => Ok(FileKind::Delimited { delimiter: None }),
            "tsv" => Ok(FileKind::Delimited {
                delimiter: Some(b'\t'),
            }),
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(FileKind::Spreadsheet),
            _ => Err(LedgerError::UnsupportedFile(format!(
                "{} (expected .csv, .tsv, .xlsx, .xls or .ods)",
                name
            ))),
        }
    }

    /// Same as `from_filename`, with a forced delimiter for text files
    pub fn from_filename_with_delimiter(name: &str, delimiter: Option<char>) -> Result<FileKind> {
        match (FileKind::from_filename(name)?, delimiter) {
            (FileKind::Delimited { .. }, Some(c)) if c.is_ascii() => Ok(FileKind::Delimited {
                delimiter: Some(c as u8),
            }),
            (FileKind::Delimited { .. }, Some(c)) => Err(LedgerError::Config(format!(
                "csv delimiter must be a single ASCII character, got {:?}",
                c
            ))),
            (kind, _) => Ok(kind),
        }
    }
}

/// Raw rows of an import, every cell as text, rows padded to equal width.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGrid {
    pub rows: Vec<Vec<String>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        RawGrid { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn row(&self, idx: usize) -> Option<&[String]> {
        self.rows.get(idx).map(|r| r.as_slice())
    }
}

// ============================================================================
// READERS
// ============================================================================

/// How spreadsheet date cells are written into the grid by default
pub const DEFAULT_DATE_CELL_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Read an upload into a grid.
pub fn read_grid(bytes: &[u8], kind: FileKind) -> Result<RawGrid> {
    read_grid_with_date_format(bytes, kind, DEFAULT_DATE_CELL_FORMAT)
}

/// Same as `read_grid`, rendering spreadsheet date cells with `date_format`
/// (chrono syntax) so they round-trip through a strict timestamp parse.
pub fn read_grid_with_date_format(bytes: &[u8], kind: FileKind, date_format: &str) -> Result<RawGrid> {
    match kind {
        FileKind::Delimited { delimiter } => {
            let text = decode_text(bytes);
            let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&text));
            read_delimited(&text, delimiter)
        }
        FileKind::Spreadsheet => read_spreadsheet(bytes, date_format),
    }
}

/// Read a file from disk, detecting the kind from its extension.
pub fn read_grid_from_path(path: &Path, delimiter: Option<char>) -> Result<RawGrid> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let kind = FileKind::from_filename_with_delimiter(name, delimiter)?;
    let bytes = std::fs::read(path)?;
    read_grid(&bytes, kind)
}

/// UTF-8 when valid, otherwise Windows-1252 (the superset of Latin-1 that
/// Windows exports actually use).
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    decoded.into_owned()
}

/// Pick ';', ',' or '\t' by counting occurrences in the first lines.
pub fn sniff_delimiter(text: &str) -> u8 {
    let sample: Vec<&str> = text.lines().take(20).collect();
    let candidates = [b';', b',', b'\t'];

    candidates
        .iter()
        .copied()
        .max_by_key(|&d| {
            sample
                .iter()
                .map(|line| line.bytes().filter(|&b| b == d).count())
                .sum::<usize>()
        })
        .filter(|&d| sample.iter().any(|line| line.as_bytes().contains(&d)))
        .unwrap_or(b',')
}

fn read_delimited(text: &str, delimiter: u8) -> Result<RawGrid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    log::debug!(
        "Read {} delimited rows (delimiter {:?})",
        rows.len(),
        delimiter as char
    );
    Ok(RawGrid::new(rows))
}

fn read_spreadsheet(bytes: &[u8], date_format: &str) -> Result<RawGrid> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| LedgerError::Spreadsheet(e.to_string()))?;

    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LedgerError::Spreadsheet("workbook has no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| LedgerError::Spreadsheet(e.to_string()))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(|c| cell_text(c, date_format)).collect())
        .collect();

    log::debug!("Read {} rows from sheet '{}'", rows.len(), first_sheet);
    Ok(RawGrid::new(rows))
}

fn cell_text(cell: &Data, date_format: &str) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        // xlsx/xls: serial numbers
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => ts.format(date_format).to_string(),
            None => dt.to_string(),
        },
        // ods: ISO 8601 text
        Data::DateTimeIso(iso) => match parse_iso_cell(iso) {
            Some(ts) => ts.format(date_format).to_string(),
            None => iso.clone(),
        },
        other => other.to_string(),
    }
}

fn parse_iso_cell(iso: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(iso, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
