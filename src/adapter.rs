//! Schema adapter: raw sheet rows → unified reading table.
//!
//! A [`FormatSpec`] drives everything: rows above `header_row` are dropped,
//! mapped raw columns are coerced to their unified kind, constant and sentinel
//! columns are synthesized, and the result is laid out in canonical column
//! order with unproducible columns present but null.

use std::{collections::HashMap, path::Path, sync::Arc};

use log::{debug, warn};

use crate::{
    config::{ColumnKind, FormatSpec, PipelineConfig, SourceFormat, UnifiedColumn},
    data::{self, Cell},
    error::AdapterError,
    io_utils::{self, RawTable},
    table::Table,
};

enum ColumnSource {
    Raw(usize),
    Fixed(Cell),
    Absent,
}

/// Interns categorical values so repeated labels share one allocation.
#[derive(Default)]
struct Categories {
    values: HashMap<String, Arc<str>>,
}

impl Categories {
    fn intern(&mut self, value: &str) -> Cell {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Cell::Null;
        }
        let shared = self
            .values
            .entry(trimmed.to_string())
            .or_insert_with(|| Arc::from(trimmed));
        Cell::Text(Arc::clone(shared))
    }
}

/// Reads `path` and adapts it. Any failure is scoped to this one file.
pub fn load_source(
    path: &Path,
    format: SourceFormat,
    config: &PipelineConfig,
) -> Result<Table, AdapterError> {
    let spec = format_spec(path, format, config)?;
    let raw = io_utils::read_raw_table(path, spec).map_err(|err| AdapterError::Read {
        path: path.to_path_buf(),
        message: format!("{err:#}"),
    })?;
    adapt(&raw, format, config, path)
}

fn format_spec<'a>(
    path: &Path,
    format: SourceFormat,
    config: &'a PipelineConfig,
) -> Result<&'a FormatSpec, AdapterError> {
    config.format(format).ok_or_else(|| AdapterError::Read {
        path: path.to_path_buf(),
        message: format!("format {format} is not configured"),
    })
}

pub fn adapt(
    raw: &RawTable,
    format: SourceFormat,
    config: &PipelineConfig,
    path: &Path,
) -> Result<Table, AdapterError> {
    let spec = format_spec(path, format, config)?;
    let header = raw
        .rows
        .get(spec.header_row)
        .ok_or_else(|| AdapterError::MissingHeader {
            path: path.to_path_buf(),
            line: spec.header_row + 1,
        })?;
    let width = header.len();

    if let Some(mapping) = spec.mapping_for(UnifiedColumn::MeterId)
        && mapping.index >= width
    {
        return Err(AdapterError::MissingColumn {
            path: path.to_path_buf(),
            column: UnifiedColumn::MeterId.name().to_string(),
            index: mapping.index,
            width,
        });
    }

    let mut categories = Categories::default();
    let sources: Vec<ColumnSource> = UnifiedColumn::ALL
        .iter()
        .map(|column| {
            column_source(*column, spec, &config.sentinel, width, &mut categories, path)
        })
        .collect();
    let Some(ColumnSource::Raw(meter_idx)) = sources
        .get(UnifiedColumn::MeterId as usize)
    else {
        return Err(AdapterError::MissingColumn {
            path: path.to_path_buf(),
            column: UnifiedColumn::MeterId.name().to_string(),
            index: 0,
            width,
        });
    };
    let meter_idx = *meter_idx;
    let selected: Vec<usize> = sources
        .iter()
        .filter_map(|s| match s {
            ColumnSource::Raw(idx) => Some(*idx),
            _ => None,
        })
        .collect();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    let data_start = spec.header_row + 1;
    for (offset, row) in raw.rows.iter().enumerate().skip(data_start) {
        let line = offset + 1;
        if row.iter().skip(width).any(|cell| !cell.is_empty()) {
            warn!(
                "{}: line {line} has {} field(s), header has {width}; skipping",
                io_utils::file_name(path),
                row.len()
            );
            skipped += 1;
            continue;
        }
        let cell_at = |idx: usize| row.get(idx).unwrap_or(&Cell::Null);
        if selected.iter().all(|idx| cell_at(*idx).is_empty()) {
            continue;
        }
        let meter_cell = cell_at(meter_idx);
        if data::meter_id_text(meter_cell).is_none() {
            warn!(
                "{}: line {line} has no meter id; skipping",
                io_utils::file_name(path)
            );
            skipped += 1;
            continue;
        }

        let out = UnifiedColumn::ALL
            .iter()
            .zip(&sources)
            .map(|(column, source)| match source {
                ColumnSource::Raw(idx) => coerce(
                    cell_at(*idx),
                    column.kind(),
                    spec.decimal_separator,
                    &mut categories,
                ),
                ColumnSource::Fixed(cell) => cell.clone(),
                ColumnSource::Absent => Cell::Null,
            })
            .collect();
        rows.push(out);
    }

    if skipped > 0 {
        warn!(
            "{}: skipped {skipped} malformed row(s)",
            io_utils::file_name(path)
        );
    }
    debug!(
        "{}: adapted {} row(s) as {format}",
        io_utils::file_name(path),
        rows.len()
    );
    Ok(Table::from_rows(UnifiedColumn::canonical_names(), rows))
}

fn column_source(
    column: UnifiedColumn,
    spec: &FormatSpec,
    sentinel: &str,
    width: usize,
    categories: &mut Categories,
    path: &Path,
) -> ColumnSource {
    if let Some(mapping) = spec.mapping_for(column) {
        if mapping.index < width {
            return ColumnSource::Raw(mapping.index);
        }
        debug!(
            "{}: column '{column}' maps to raw column {} beyond header width {width}",
            io_utils::file_name(path),
            mapping.index
        );
        return ColumnSource::Absent;
    }
    if let Some(value) = spec.constants.get(&column) {
        return ColumnSource::Fixed(categories.intern(value));
    }
    if spec.sentinel_columns.contains(&column) {
        return ColumnSource::Fixed(categories.intern(sentinel));
    }
    ColumnSource::Absent
}

fn coerce(cell: &Cell, kind: ColumnKind, decimal_separator: char, categories: &mut Categories) -> Cell {
    match kind {
        ColumnKind::Key => data::meter_id_text(cell)
            .map(|id| Cell::text(&id))
            .unwrap_or_default(),
        ColumnKind::Date => Cell::from_opt_date(data::reading_date(cell)),
        ColumnKind::Number => match cell {
            Cell::Number(n) => Cell::Number(*n),
            Cell::Text(s) => Cell::from_opt_number(data::parse_decimal(s, decimal_separator)),
            _ => Cell::Null,
        },
        ColumnKind::Category => match cell {
            Cell::Null => Cell::Null,
            other => categories.intern(&other.as_display()),
        },
    }
}
