//! Spreadsheet I/O.
//!
//! Import: first worksheet only, cell positions kept absolute so a format's
//!         header offset counts from the top of the sheet, not from the first
//!         used cell.
//! Export: one worksheet, bold header row, timestamps as real Excel dates.

use std::path::Path;

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, open_workbook_auto};
use log::debug;
use rust_xlsxwriter::{Format, Workbook};

use crate::{
    data::{self, Cell},
    io_utils::RawTable,
    table::Table,
};

const SHEET_NAME: &str = "consolidated";
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

pub fn read_first_sheet(path: &Path) -> Result<RawTable> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        bail!("Workbook {path:?} contains no sheets");
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Reading sheet '{sheet_name}' in {path:?}"))?;

    // calamine ranges start at the first used cell
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or_default();
    debug!(
        "Sheet '{sheet_name}' in {:?}: {:?} cells starting at ({row_offset}, {col_offset})",
        path.file_name(),
        range.get_size()
    );

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![Cell::Null; col_offset];
        cells.extend(row.iter().map(convert_cell));
        rows.push(cells);
    }
    Ok(RawTable { rows })
}

fn convert_cell(value: &Data) -> Cell {
    match value {
        Data::Empty => Cell::Null,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            if s.trim().is_empty() {
                Cell::Null
            } else {
                Cell::text(s)
            }
        }
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::text(if *b { "true" } else { "false" }),
        Data::DateTime(dt) => Cell::from_opt_date(data::excel_serial_to_datetime(dt.as_f64())),
        Data::Error(_) => Cell::Null,
    }
}

/// Writes `table` as a single-sheet workbook. An empty table is an error.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    if table.is_empty() {
        bail!("Refusing to write an empty table to {path:?}");
    }
    if table.len() + 1 > MAX_ROWS || table.columns().len() > MAX_COLUMNS {
        bail!(
            "Table of {} row(s) x {} column(s) exceeds worksheet limits",
            table.len(),
            table.columns().len()
        );
    }

    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(SHEET_NAME)
        .context("Naming output worksheet")?;

    for (col, name) in table.columns().iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, name, &header_format)
            .with_context(|| format!("Writing header '{name}'"))?;
    }

    for (row_idx, row) in table.rows().iter().enumerate() {
        let row_num = (row_idx + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col_num = col as u16;
            match cell {
                Cell::Null => {}
                Cell::Text(s) => {
                    worksheet
                        .write_string(row_num, col_num, &**s)
                        .with_context(|| format!("Writing row {row_num}"))?;
                }
                Cell::Number(n) => {
                    worksheet
                        .write_number(row_num, col_num, *n)
                        .with_context(|| format!("Writing row {row_num}"))?;
                }
                Cell::Date(dt) => {
                    worksheet
                        .write_number_with_format(
                            row_num,
                            col_num,
                            data::datetime_to_excel_serial(*dt),
                            &date_format,
                        )
                        .with_context(|| format!("Writing row {row_num}"))?;
                }
            }
        }
    }
    worksheet
        .set_freeze_panes(1, 0)
        .context("Freezing header row")?;

    workbook
        .save(path)
        .with_context(|| format!("Saving workbook {path:?}"))?;
    Ok(())
}
