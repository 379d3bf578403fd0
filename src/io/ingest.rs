//! CSV ingest.
//!
//! Turns a semicolon-delimited source export into an all-text polars `DataFrame`:
//! - **Encoding**: UTF-8 (BOM stripped), falling back to Windows-1252 for
//!   spreadsheets saved with a Latin-1 code page
//! - **Headers**: normalized with `clean_column_name`; an exact duplicate after
//!   cleaning keeps its first occurrence
//! - **Ragged rows**: short rows are padded with missing cells, extra cells dropped
//!
//! No typing happens here. Numeric coercion and date parsing belong to the
//! warehouse builder.

use std::path::Path;

use csv::StringRecord;
use encoding_rs::WINDOWS_1252;
use log::{debug, warn};

use crate::domain::frame::{frame_from, text_column, DataFrame};
use crate::error::AppError;
use crate::io::columns::clean_column_name;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: all-text frame + what happened while reading it.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub frame: DataFrame,
    pub encoding: &'static str,
    pub rows_read: usize,
    pub row_errors: Vec<RowError>,
}

/// Read a `;`-delimited CSV into a text frame.
pub fn read_semicolon_csv(path: &Path) -> Result<RawTable, AppError> {
    let bytes = std::fs::read(path)
        .map_err(|e| AppError::partial(format!("Failed to open CSV '{}': {e}", path.display())))?;
    let (text, encoding) = decode_text(&bytes);
    if encoding != "UTF-8" {
        debug!("{}: decoded as {encoding}", path.display());
    }
    parse_semicolon_text(&text, encoding)
        .map_err(|e| AppError::partial(format!("Failed to read CSV '{}': {e}", path.display())))
}

/// Decode bytes as UTF-8 (without BOM), or Windows-1252 when that fails.
pub fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(body) {
        Ok(s) => (s.to_string(), "UTF-8"),
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1252.decode(body);
            (decoded.into_owned(), WINDOWS_1252.name())
        }
    }
}

fn parse_semicolon_text(text: &str, encoding: &'static str) -> Result<RawTable, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let (names, keep) = header_layout(&headers);

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header line; lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        if record.iter().all(str::is_empty) {
            continue;
        }
        for (slot, &src) in keep.iter().enumerate() {
            let value = record.get(src).filter(|s| !s.is_empty()).map(str::to_string);
            cells[slot].push(value);
        }
    }

    if !row_errors.is_empty() {
        warn!("{} row(s) could not be parsed and were skipped", row_errors.len());
    }

    // Every column has one entry per accepted record, so lengths always agree.
    let frame = frame_from(
        names
            .iter()
            .zip(cells)
            .map(|(name, values)| text_column(name, values))
            .collect(),
    )?;

    Ok(RawTable {
        frame,
        encoding,
        rows_read,
        row_errors,
    })
}

/// Cleaned header names and the source index each one reads from.
fn header_layout(headers: &StringRecord) -> (Vec<String>, Vec<usize>) {
    let mut names: Vec<String> = Vec::new();
    let mut keep = Vec::new();
    for (idx, raw) in headers.iter().enumerate() {
        let name = clean_column_name(raw);
        if name.is_empty() || names.contains(&name) {
            continue;
        }
        names.push(name);
        keep.push(idx);
    }
    (names, keep)
}
