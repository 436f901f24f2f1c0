use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::{debug, info};

use crate::{
    data::{self, Cell},
    error::DedupeError,
    table::Table,
};

/// Keeps the most recent reading per normalized meter key.
///
/// Rows are grouped by [`data::meter_key`]; within a group the row with the
/// latest date survives (a null date never beats a real one, and the first row
/// wins an exact tie). Output is sorted by key, with the id column rewritten to
/// the normalized key and the date column coerced to timestamps, so a second
/// pass is a no-op. Rows without a usable meter id are dropped.
pub fn dedupe(table: &Table, date_column: &str, id_column: &str) -> Result<Table, DedupeError> {
    let date_idx = table
        .column_index(date_column)
        .ok_or_else(|| DedupeError::MissingColumn(date_column.to_string()))?;
    let id_idx = table
        .column_index(id_column)
        .ok_or_else(|| DedupeError::MissingColumn(id_column.to_string()))?;

    let mut latest: BTreeMap<String, (Option<NaiveDateTime>, usize)> = BTreeMap::new();
    let mut keyless = 0usize;
    for (row_idx, row) in table.rows().iter().enumerate() {
        let Some(key) = data::meter_key(&row[id_idx]) else {
            keyless += 1;
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

    let rows = latest
        .into_iter()
        .map(|(key, (date, row_idx))| {
            let mut row = table.rows()[row_idx].clone();
            row[id_idx] = Cell::text(&key);
            row[date_idx] = Cell::from_opt_date(date);
            row
        })
        .collect::<Vec<_>>();

    if keyless > 0 {
        debug!("Dropped {keyless} row(s) without a meter id");
    }
    info!(
        "Removed {} duplicate(s), {} meter(s) remain",
        table.len() - keyless - rows.len(),
        rows.len()
    );
    Ok(Table::from_rows(table.columns().to_vec(), rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Cell {
        Cell::Date(
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn readings(rows: Vec<(&str, Cell, f64)>) -> Table {
        Table::from_rows(
            ["meter_id", "reading_date", "total"],
            rows.into_iter()
                .map(|(id, date, total)| vec![Cell::text(id), date, Cell::Number(total)])
                .collect(),
        )
    }

    #[test]
    fn keeps_latest_reading_per_meter() {
        let table = readings(vec![
            ("1", date(2023, 1, 1), 100.0),
            ("1", date(2023, 1, 2), 200.0),
            ("2", date(2023, 1, 1), 300.0),
            ("2", date(2023, 1, 3), 400.0),
        ]);
        let result = dedupe(&table, "reading_date", "meter_id").unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get(0, "meter_id"), Some(&Cell::text("1")));
        assert_eq!(result.get(0, "total"), Some(&Cell::Number(200.0)));
        assert_eq!(result.get(1, "total"), Some(&Cell::Number(400.0)));
    }

    #[test]
    fn groups_on_normalized_key() {
        let table = readings(vec![
            ("00042", date(2023, 5, 1), 1.0),
            ("42", date(2023, 4, 1), 2.0),
            ("000", Cell::Null, 3.0),
        ]);
        let result = dedupe(&table, "reading_date", "meter_id").unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get(0, "meter_id"), Some(&Cell::text("0")));
        assert_eq!(result.get(1, "meter_id"), Some(&Cell::text("42")));
        assert_eq!(result.get(1, "total"), Some(&Cell::Number(1.0)));
    }

    #[test]
    fn null_dates_never_win() {
        let table = readings(vec![
            ("7", Cell::Null, 10.0),
            ("7", date(2020, 1, 1), 20.0),
            ("7", Cell::Null, 30.0),
        ]);
        let result = dedupe(&table, "reading_date", "meter_id").unwrap();
        assert_eq!(result.get(0, "total"), Some(&Cell::Number(20.0)));
    }

    #[test]
    fn text_dates_are_coerced() {
        let table = readings(vec![
            ("3", Cell::text("01.02.2024"), 1.0),
            ("3", Cell::text("2024-01-15"), 2.0),
        ]);
        let result = dedupe(&table, "reading_date", "meter_id").unwrap();
        assert_eq!(result.get(0, "reading_date"), Some(&date(2024, 2, 1)));
        assert_eq!(result.get(0, "total"), Some(&Cell::Number(1.0)));
    }

    #[test]
    fn sorts_keys_lexicographically() {
        let table = readings(vec![
            ("10", date(2023, 1, 1), 1.0),
            ("9", date(2023, 1, 1), 1.0),
            ("100", date(2023, 1, 1), 1.0),
        ]);
        let result = dedupe(&table, "reading_date", "meter_id").unwrap();
        let ids: Vec<String> = result
            .column_values("meter_id")
            .unwrap()
            .map(|c| c.as_display())
            .collect();
        assert_eq!(ids, vec!["10", "100", "9"]);
    }

    #[test]
    fn missing_column_is_reported() {
        let table = readings(vec![("1", date(2023, 1, 1), 1.0)]);
        let err = dedupe(&table, "when", "meter_id").unwrap_err();
        assert!(matches!(err, DedupeError::MissingColumn(ref c) if c == "when"));
        let err = dedupe(&table, "reading_date", "serial").unwrap_err();
        assert_eq!(err.to_string(), "Column 'serial' not found");
    }
}
