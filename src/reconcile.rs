//! Multi-source reconciliation.
//!
//! For every meter in the primary table the reconciler picks one best reading
//! across all source tables and then lays every source's own reading out side
//! by side, one numbered block per source.
//!
//! Best-reading preference, strongest first:
//!
//! 1. the reading falls in the current calendar month,
//! 2. the reading has a total,
//! 3. the larger total,
//! 4. the later date.
//!
//! Candidates equal on all four keep source order (sources iterate by file
//! name). Month currency dominates value: an in-month reading without a total
//! beats an older reading with one.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::{debug, info};

use crate::{
    config::{PipelineConfig, SourceFormat, UnifiedColumn},
    data::{self, Cell},
    error::ReconcileError,
    table::Table,
};

pub const SOURCE_COLUMN: &str = "source";
pub const NOTE_COLUMN: &str = "note";
pub const FILE_COLUMN_PREFIX: &str = "file";

const BEST_READING_COLUMNS: [UnifiedColumn; 4] = [
    UnifiedColumn::ReadingDate,
    UnifiedColumn::Total,
    UnifiedColumn::Day,
    UnifiedColumn::Night,
];

/// One adapted, deduplicated input file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub file_name: String,
    pub format: SourceFormat,
    pub table: Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Note {
    NoDate,
    Current,
    PriorMonths,
    NoData,
}

impl Note {
    pub fn label(self) -> &'static str {
        match self {
            Note::NoDate => "no date",
            Note::Current => "current data",
            Note::PriorMonths => "from prior months",
            Note::NoData => "no data",
        }
    }
}

/// A source's most recent reading for one meter.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub source: String,
    pub date: Option<NaiveDateTime>,
    pub total: Option<f64>,
    pub day: Option<f64>,
    pub night: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestReading {
    pub reading: Option<Reading>,
    pub note: Note,
}

impl BestReading {
    fn cells(&self) -> [Cell; 6] {
        match &self.reading {
            Some(r) => [
                Cell::from_opt_date(r.date),
                Cell::from_opt_number(r.total),
                Cell::from_opt_number(r.day),
                Cell::from_opt_number(r.night),
                Cell::text(&r.source),
                Cell::text(self.note.label()),
            ],
            None => [
                Cell::Null,
                Cell::Null,
                Cell::Null,
                Cell::Null,
                Cell::Null,
                Cell::text(self.note.label()),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub id_column: String,
    /// Columns repeated in every per-source block.
    pub reading_columns: Vec<String>,
    /// Defines the "current month".
    pub today: NaiveDate,
}

impl ReconcileOptions {
    pub fn from_config(config: &PipelineConfig, today: NaiveDate) -> Self {
        Self {
            id_column: UnifiedColumn::MeterId.name().to_string(),
            reading_columns: config.reading_column_names(),
            today,
        }
    }
}

pub fn is_current_month(date: Option<NaiveDateTime>, today: NaiveDate) -> bool {
    date.is_some_and(|d| d.month() == today.month() && d.year() == today.year())
}

/// `Greater` means `a` is the better reading.
pub fn compare_candidates(a: &Reading, b: &Reading, today: NaiveDate) -> Ordering {
    is_current_month(a.date, today)
        .cmp(&is_current_month(b.date, today))
        .then_with(|| a.total.is_some().cmp(&b.total.is_some()))
        .then_with(|| match (a.total, b.total) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        })
        .then_with(|| a.date.cmp(&b.date))
}

pub fn select_best(candidates: &[Reading], today: NaiveDate) -> BestReading {
    let best = candidates.iter().fold(None::<&Reading>, |best, candidate| match best {
        Some(current) if compare_candidates(candidate, current, today) != Ordering::Greater => {
            Some(current)
        }
        _ => Some(candidate),
    });
    match best {
        None => BestReading {
            reading: None,
            note: Note::NoData,
        },
        Some(reading) => {
            let note = if reading.date.is_none() {
                Note::NoDate
            } else if is_current_month(reading.date, today) {
                Note::Current
            } else {
                Note::PriorMonths
            };
            BestReading {
                reading: Some(reading.clone()),
                note,
            }
        }
    }
}

/// Per-source lookup: meter key → row holding that source's latest reading.
struct SourceIndex<'a> {
    source: &'a SourceTable,
    best_columns: [usize; 4],
    block_columns: Vec<usize>,
    latest: HashMap<String, usize>,
}

impl<'a> SourceIndex<'a> {
    fn build(
        source: &'a SourceTable,
        options: &ReconcileOptions,
    ) -> Result<Option<Self>, ReconcileError> {
        let table = &source.table;
        let Some(id_idx) = table.column_index(&options.id_column) else {
            debug!(
                "{}: no '{}' column, left out of reconciliation",
                source.file_name, options.id_column
            );
            return Ok(None);
        };
        let require = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| ReconcileError::MissingColumn {
                    stage: format!("source '{}'", source.file_name),
                    column: name.to_string(),
                })
        };
        let best_columns = [
            require(BEST_READING_COLUMNS[0].name())?,
            require(BEST_READING_COLUMNS[1].name())?,
            require(BEST_READING_COLUMNS[2].name())?,
            require(BEST_READING_COLUMNS[3].name())?,
        ];
        let block_columns = options
            .reading_columns
            .iter()
            .map(|name| require(name))
            .collect::<Result<Vec<_>, _>>()?;

        // A source normally holds each meter once; keep the latest if not.
        let date_idx = best_columns[0];
        let mut latest: HashMap<String, (Option<NaiveDateTime>, usize)> = HashMap::new();
        for (row_idx, row) in table.rows().iter().enumerate() {
            let Some(key) = data::meter_key(&row[id_idx]) else {
                continue;
            };
            let date = data::reading_date(&row[date_idx]);
            latest
                .entry(key)
                .and_modify(|current| {
                    if date > current.0 {
                        *current = (date, row_idx);
                    }
                })
                .or_insert((date, row_idx));
        }

        Ok(Some(Self {
            source,
            best_columns,
            block_columns,
            latest: latest
                .into_iter()
                .map(|(key, (_, row_idx))| (key, row_idx))
                .collect(),
        }))
    }

    fn row(&self, key: &str) -> Option<&'a [Cell]> {
        let row_idx = *self.latest.get(key)?;
        Some(self.source.table.rows()[row_idx].as_slice())
    }

    fn reading(&self, key: &str) -> Option<Reading> {
        let row = self.row(key)?;
        let [date, total, day, night] = self.best_columns;
        Some(Reading {
            source: self.source.file_name.clone(),
            date: data::reading_date(&row[date]),
            total: row[total].as_number(),
            day: row[day].as_number(),
            night: row[night].as_number(),
        })
    }

    fn block(&self, key: &str) -> Vec<Cell> {
        match self.row(key) {
            Some(row) => self
                .block_columns
                .iter()
                .map(|idx| row[*idx].clone())
                .chain(std::iter::once(Cell::text(&self.source.file_name)))
                .collect(),
            None => vec![Cell::Null; self.block_columns.len() + 1],
        }
    }
}

/// Builds the consolidated table: six best-reading columns, the primary
/// table's remaining columns, then one block per source in ordinal order.
pub fn reconcile(
    primary: &Table,
    sources: &BTreeMap<String, SourceTable>,
    options: &ReconcileOptions,
) -> Result<Table, ReconcileError> {
    let stage = "primary table";
    let id_idx = primary
        .column_index(&options.id_column)
        .ok_or_else(|| ReconcileError::MissingColumn {
            stage: stage.to_string(),
            column: options.id_column.clone(),
        })?;

    let mut seen = HashSet::new();
    let mut meters: Vec<(String, usize)> = Vec::new();
    for (row_idx, row) in primary.rows().iter().enumerate() {
        let key = data::meter_key(&row[id_idx]).ok_or_else(|| ReconcileError::MissingKey {
            stage: stage.to_string(),
            row: row_idx + 1,
        })?;
        if seen.insert(key.clone()) {
            meters.push((key, row_idx));
        }
    }

    let mut indexes = Vec::new();
    for source in sources.values() {
        if let Some(index) = SourceIndex::build(source, options)? {
            indexes.push(index);
        }
    }

    let best: HashMap<&str, BestReading> = meters
        .iter()
        .map(|(key, _)| {
            let candidates: Vec<Reading> = indexes.iter().filter_map(|i| i.reading(key)).collect();
            (key.as_str(), select_best(&candidates, options.today))
        })
        .collect();

    let best_names: Vec<String> = BEST_READING_COLUMNS
        .iter()
        .map(|c| c.name().to_string())
        .chain([SOURCE_COLUMN.to_string(), NOTE_COLUMN.to_string()])
        .collect();
    let carried: Vec<usize> = primary
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !best_names.contains(name))
        .map(|(idx, _)| idx)
        .collect();

    let mut columns = best_names.clone();
    columns.extend(carried.iter().map(|idx| primary.columns()[*idx].clone()));
    for (ordinal, _) in (1..).zip(&indexes) {
        columns.extend(
            options
                .reading_columns
                .iter()
                .map(|name| format!("{name}_{ordinal}")),
        );
        columns.push(format!("{FILE_COLUMN_PREFIX}_{ordinal}"));
    }

    let mut rows = Vec::with_capacity(meters.len());
    for (key, row_idx) in &meters {
        let source_row = &primary.rows()[*row_idx];
        let mut row = Vec::with_capacity(columns.len());
        row.extend(best[key.as_str()].cells());
        row.extend(carried.iter().map(|idx| source_row[*idx].clone()));
        for index in &indexes {
            row.extend(index.block(key));
        }
        rows.push(row);
    }

    let no_data = best.values().filter(|b| b.note == Note::NoData).count();
    info!(
        "Reconciled {} meter(s) across {} source(s); {no_data} without data",
        rows.len(),
        indexes.len()
    );
    Ok(Table::from_rows(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 20).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn reading(source: &str, date: Option<NaiveDateTime>, total: Option<f64>) -> Reading {
        Reading {
            source: source.to_string(),
            date,
            total,
            day: None,
            night: None,
        }
    }

    #[test]
    fn current_month_beats_larger_older_total() {
        let fresh = reading("a", Some(at(2025, 6, 2)), None);
        let stale = reading("b", Some(at(2025, 5, 28)), Some(500.0));
        let best = select_best(&[stale, fresh.clone()], today());
        assert_eq!(best.reading, Some(fresh));
        assert_eq!(best.note, Note::Current);
    }

    #[test]
    fn larger_total_wins_within_month() {
        let low = reading("a", Some(at(2025, 6, 10)), Some(300.0));
        let high = reading("b", Some(at(2025, 6, 1)), Some(700.0));
        let best = select_best(&[low, high.clone()], today());
        assert_eq!(best.reading, Some(high));
    }

    #[test]
    fn later_date_breaks_equal_totals() {
        let early = reading("a", Some(at(2025, 6, 1)), Some(300.0));
        let late = reading("b", Some(at(2025, 6, 15)), Some(300.0));
        let best = select_best(&[late.clone(), early], today());
        assert_eq!(best.reading, Some(late));
    }

    #[test]
    fn present_total_beats_missing_total() {
        let missing = reading("a", Some(at(2025, 4, 30)), None);
        let present = reading("b", Some(at(2025, 3, 1)), Some(1.0));
        let best = select_best(&[missing, present.clone()], today());
        assert_eq!(best.reading, Some(present));
        assert_eq!(best.note, Note::PriorMonths);
    }

    #[test]
    fn full_tie_keeps_source_order() {
        let first = reading("a", Some(at(2025, 6, 1)), Some(5.0));
        let second = reading("b", Some(at(2025, 6, 1)), Some(5.0));
        let best = select_best(&[first.clone(), second], today());
        assert_eq!(best.reading, Some(first));
    }

    #[test]
    fn notes_reflect_the_winner() {
        assert_eq!(select_best(&[], today()).note, Note::NoData);
        let undated = reading("a", None, Some(1.0));
        assert_eq!(select_best(&[undated], today()).note, Note::NoDate);
        let same_month_last_year = reading("a", Some(at(2024, 6, 20)), Some(1.0));
        assert_eq!(
            select_best(&[same_month_last_year], today()).note,
            Note::PriorMonths
        );
    }

    fn unified(rows: Vec<(&str, Option<NaiveDateTime>, Option<f64>)>) -> Table {
        Table::from_rows(
            ["meter_id", "region", "reading_date", "total", "day", "night"],
            rows.into_iter()
                .map(|(id, date, total)| {
                    vec![
                        Cell::text(id),
                        Cell::text("Север"),
                        Cell::from_opt_date(date),
                        Cell::from_opt_number(total),
                        Cell::Null,
                        Cell::Null,
                    ]
                })
                .collect(),
        )
    }

    fn source(name: &str, table: Table) -> (String, SourceTable) {
        (
            name.to_string(),
            SourceTable {
                file_name: name.to_string(),
                format: SourceFormat::Emis,
                table,
            },
        )
    }

    fn options() -> ReconcileOptions {
        ReconcileOptions {
            id_column: "meter_id".to_string(),
            reading_columns: vec![
                "reading_date".to_string(),
                "total".to_string(),
                "day".to_string(),
                "night".to_string(),
            ],
            today: today(),
        }
    }

    #[test]
    fn output_layout_puts_best_columns_first() {
        let a = unified(vec![("5", Some(at(2025, 6, 3)), Some(10.0))]);
        let b = unified(vec![("5", Some(at(2025, 5, 3)), Some(99.0)), ("9", None, None)]);
        let primary = Table::concat([&a, &b]);
        let sources = BTreeMap::from([source("a.xlsx", a), source("b.xlsx", b)]);

        let result = reconcile(&primary, &sources, &options()).unwrap();
        assert_eq!(
            result.columns(),
            [
                "reading_date", "total", "day", "night", "source", "note", "meter_id", "region",
                "reading_date_1", "total_1", "day_1", "night_1", "file_1",
                "reading_date_2", "total_2", "day_2", "night_2", "file_2",
            ]
        );
        assert_eq!(result.len(), 2);
        assert_eq!(result.get(0, "source"), Some(&Cell::text("a.xlsx")));
        assert_eq!(result.get(0, "total"), Some(&Cell::Number(10.0)));
        assert_eq!(result.get(0, "file_2"), Some(&Cell::text("b.xlsx")));
        assert_eq!(result.get(1, "note"), Some(&Cell::text("no date")));
        assert_eq!(result.get(1, "file_1"), Some(&Cell::Null));
        assert_eq!(result.get(1, "total_1"), Some(&Cell::Null));
        assert_eq!(result.get(1, "file_2"), Some(&Cell::text("b.xlsx")));
    }

    #[test]
    fn meters_no_source_knows_get_placeholder() {
        let primary = unified(vec![("77", Some(at(2025, 6, 3)), Some(1.0))]);
        let other = unified(vec![("5", Some(at(2025, 6, 3)), Some(10.0))]);
        let sources = BTreeMap::from([source("other.xlsx", other)]);
        let result = reconcile(&primary, &sources, &options()).unwrap();
        assert_eq!(result.get(0, "note"), Some(&Cell::text("no data")));
        assert_eq!(result.get(0, "source"), Some(&Cell::Null));
        assert_eq!(result.get(0, "reading_date"), Some(&Cell::Null));
        assert_eq!(result.get(0, "meter_id"), Some(&Cell::text("77")));
    }

    #[test]
    fn duplicate_rows_in_a_source_resolve_to_latest() {
        let primary = unified(vec![("5", None, None)]);
        let noisy = unified(vec![
            ("5", Some(at(2025, 6, 1)), Some(1.0)),
            ("005", Some(at(2025, 6, 9)), Some(2.0)),
        ]);
        let sources = BTreeMap::from([source("noisy.csv", noisy)]);
        let result = reconcile(&primary, &sources, &options()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get(0, "total"), Some(&Cell::Number(2.0)));
        assert_eq!(result.get(0, "total_1"), Some(&Cell::Number(2.0)));
    }

    #[test]
    fn sources_without_meter_column_are_left_out() {
        let primary = unified(vec![("5", None, None)]);
        let stray = Table::from_rows(["serial"], vec![vec![Cell::text("5")]]);
        let sources = BTreeMap::from([source("stray.xlsx", stray)]);
        let result = reconcile(&primary, &sources, &options()).unwrap();
        assert!(!result.has_column("file_1"));
        assert_eq!(result.get(0, "note"), Some(&Cell::text("no data")));
    }

    #[test]
    fn structural_problems_are_fatal_with_context() {
        let primary = Table::from_rows(["serial"], vec![vec![Cell::text("5")]]);
        let err = reconcile(&primary, &BTreeMap::new(), &options()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "primary table: column 'meter_id' not found"
        );

        let primary = unified(vec![("5", None, None)]);
        let broken = Table::from_rows(["meter_id", "reading_date"], vec![vec![Cell::text("5")]]);
        let sources = BTreeMap::from([source("broken.xlsx", broken)]);
        let err = reconcile(&primary, &sources, &options()).unwrap_err();
        assert_eq!(err.to_string(), "source 'broken.xlsx': column 'total' not found");

        let keyless = Table::from_rows(["meter_id"], vec![vec![Cell::Null]]);
        let err = reconcile(&keyless, &BTreeMap::new(), &options()).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingKey { row: 1, .. }));
    }
}
