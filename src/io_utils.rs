//! File discovery, raw sheet reading, and output naming.
//!
//! All input I/O flows through this module:
//!
//! - **Discovery**: [`list_source_files`] enumerates `.xlsx` / `.csv` files in
//!   a directory, sorted by name.
//! - **Encoding**: CSV input is decoded via `encoding_rs`, defaulting to UTF-8.
//! - **Raw reading**: [`read_raw_table`] returns every physical row of a file,
//!   metadata rows included, so header offsets stay meaningful. Spreadsheets
//!   are delegated to [`crate::workbook`].

use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use encoding_rs::{Encoding, UTF_8};
use log::warn;

use crate::{config::FormatSpec, data::Cell, workbook};

pub const SOURCE_EXTENSIONS: &[&str] = &["xlsx", "csv"];
pub const OUTPUT_PREFIX: &str = "cleaned";

/// Every physical row of a source file, before any header handling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<Vec<Cell>>,
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

pub fn is_source_file(path: &Path) -> bool {
    SOURCE_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}

pub fn list_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Listing source directory {dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Reading entry in {dir:?}"))?;
        let path = entry.path();
        if path.is_file() && is_source_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Display name of a source, used as its identity throughout a run.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn read_raw_table(path: &Path, spec: &FormatSpec) -> Result<RawTable> {
    if has_extension(path, "xlsx") {
        workbook::read_first_sheet(path)
    } else {
        let encoding = spec.resolved_encoding()?;
        let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
        read_csv_rows(BufReader::new(file), spec.delimiter_byte(), encoding, &file_name(path))
            .with_context(|| format!("Reading CSV {path:?}"))
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

/// Reads every record as text cells. A record that does not decode is warned
/// and kept as an empty row so later line positions stay put.
pub fn read_csv_rows<R>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
    label: &str,
) -> Result<RawTable>
where
    R: Read,
{
    let mut reader = open_csv_reader(reader, delimiter);
    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let line = row_idx + 1;
        let record = record.with_context(|| format!("Reading line {line}"))?;
        match decode_record(&record, encoding) {
            Ok(decoded) => rows.push(decoded.into_iter().map(|field| text_cell(&field)).collect()),
            Err(err) => {
                warn!("{label}: line {line}: {err}; skipping");
                rows.push(Vec::new());
            }
        }
    }
    Ok(RawTable { rows })
}

fn text_cell(field: &str) -> Cell {
    if field.trim().is_empty() {
        Cell::Null
    } else {
        Cell::text(field)
    }
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// `<timestamp>_cleaned_<name>.xlsx`, with path separators in `name` flattened.
pub fn output_file_name(name: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "{}_{OUTPUT_PREFIX}_{}.xlsx",
        timestamp.format("%Y%m%d_%H%M%S"),
        name.replace(['/', '\\'], "_")
    )
}
