//! In-memory tabular model shared by every pipeline stage.
//!
//! A [`Table`] is an ordered list of column names plus rows of [`Cell`]s.
//! Every row is exactly as wide as the column list; stages never mutate a
//! table they were handed, they build a new one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::Cell;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Cell>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(columns);
        table.rows.reserve(rows.len());
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Appends a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at `row` in the named column, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a Cell> + 'a> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Row-wise union. The result carries every column seen, in first-seen
    /// order; cells a table cannot supply are null.
    pub fn concat<'a, I>(tables: I) -> Table
    where
        I: IntoIterator<Item = &'a Table>,
    {
        let tables: Vec<&Table> = tables.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for table in &tables {
            for name in &table.columns {
                if !positions.contains_key(name) {
                    positions.insert(name.clone(), columns.len());
                    columns.push(name.clone());
                }
            }
        }

        let total_rows = tables.iter().map(|t| t.len()).sum();
        let mut rows = Vec::with_capacity(total_rows);
        for table in &tables {
            let mapping: Vec<usize> = table.columns.iter().map(|c| positions[c]).collect();
            for row in &table.rows {
                let mut out = vec![Cell::Null; columns.len()];
                for (src, cell) in row.iter().enumerate() {
                    out[mapping[src]] = cell.clone();
                }
                rows.push(out);
            }
        }
        Table { columns, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_row_pads_short_rows() {
        let mut table = Table::new(["a", "b", "c"]);
        table.push_row(vec![Cell::text("x")]);
        assert_eq!(table.rows()[0], vec![Cell::text("x"), Cell::Null, Cell::Null]);
    }

    #[test]
    fn concat_unions_columns_in_first_seen_order() {
        let left = Table::from_rows(["id", "total"], vec![vec![Cell::text("1"), Cell::Number(5.0)]]);
        let right = Table::from_rows(
            ["id", "note"],
            vec![vec![Cell::text("2"), Cell::text("late")]],
        );
        let merged = Table::concat([&left, &right]);
        assert_eq!(merged.columns(), ["id", "total", "note"]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(0, "note"), Some(&Cell::Null));
        assert_eq!(merged.get(1, "total"), Some(&Cell::Null));
        assert_eq!(merged.get(1, "note"), Some(&Cell::text("late")));
    }

    #[test]
    fn get_returns_none_for_unknown_column() {
        let table = Table::from_rows(["id"], vec![vec![Cell::text("1")]]);
        assert!(table.get(0, "missing").is_none());
        assert!(table.get(5, "id").is_none());
    }
}
