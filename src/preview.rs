use std::borrow::Cow;
use std::fmt::Write as _;

use itertools::Itertools;

use crate::{data::Cell, table::Table};

const NULL_MARKER: &str = "-";

/// Renders at most `limit` rows of `table` as aligned plain text.
pub fn render_table(table: &Table, limit: usize) -> String {
    let shown = &table.rows()[..table.len().min(limit)];
    let rendered: Vec<Vec<String>> = shown
        .iter()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    let mut widths: Vec<usize> = table.columns().iter().map(|c| display_width(c)).collect();
    for row in &rendered {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(table.columns(), &widths));
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat((*w).max(1))).collect();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in &rendered {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    let hidden = table.len() - shown.len();
    if hidden > 0 {
        let _ = writeln!(output, "... {hidden} more row(s)");
    }
    output
}

pub fn print_table(table: &Table, limit: usize) {
    print!("{}", render_table(table, limit));
}

fn render_cell(cell: &Cell) -> String {
    match cell {
        Cell::Null => NULL_MARKER.to_string(),
        other => sanitize(&other.as_display()).into_owned(),
    }
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(display_width(value));
            format!("{value}{}", " ".repeat(padding))
        })
        .join("  ");
    line.trim_end().to_string()
}

// Cyrillic labels are multi-byte; width counts chars.
fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
