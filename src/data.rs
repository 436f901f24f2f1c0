use std::{fmt, sync::Arc};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Largest serial Excel accepts (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Cell {
    #[default]
    Null,
    Text(Arc<str>),
    Number(f64),
    Date(NaiveDateTime),
}

impl Cell {
    pub fn text(value: &str) -> Self {
        Cell::Text(Arc::from(value))
    }

    pub fn from_opt_number(value: Option<f64>) -> Self {
        value.map(Cell::Number).unwrap_or_default()
    }

    pub fn from_opt_date(value: Option<NaiveDateTime>) -> Self {
        value.map(Cell::Date).unwrap_or_default()
    }

    /// Null cells and whitespace-only text both count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Text(s) => s.to_string(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    (*n as i64).to_string()
                } else {
                    n.to_string()
                }
            }
            Cell::Date(dt) => {
                if dt.time() == NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Strips leading zeros; an all-zero id collapses to `"0"`.
pub fn normalize_meter_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() && !trimmed.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// Renders a raw meter id cell as text. Whole numbers lose their `.0`.
pub fn meter_id_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Text(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Cell::Number(n) if n.is_finite() => Some(Cell::Number(*n).as_display()),
        _ => None,
    }
}

/// Normalized grouping key for a meter id cell.
pub fn meter_key(cell: &Cell) -> Option<String> {
    meter_id_text(cell).map(|text| normalize_meter_key(&text))
}

/// Parses a locale-formatted number. Group separators (spaces, NBSP) are
/// dropped and `decimal_separator` is read as the decimal point.
pub fn parse_decimal(value: &str, decimal_separator: char) -> Option<f64> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
        .map(|c| if c == decimal_separator { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// `%y` layouts come before `%Y`: chrono reads `%Y` as 1-4 digits, so
/// `"18.06.25"` would otherwise parse as year 25.
pub fn parse_mixed_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%d.%m.%y %H:%M:%S",
        "%d.%m.%y %H:%M",
        "%d.%m.%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d-%m-%Y %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ];
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%d.%m.%y", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y",
    ];

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(parsed.and_time(NaiveTime::MIN));
        }
    }
    None
}

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
}

/// Converts an Excel (1900 system) serial date to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial > EXCEL_MAX_SERIAL {
        return None;
    }
    let seconds = (serial * 86_400.0).round() as i64;
    excel_epoch().checked_add_signed(Duration::seconds(seconds))
}

pub fn datetime_to_excel_serial(value: NaiveDateTime) -> f64 {
    (value - excel_epoch()).num_seconds() as f64 / 86_400.0
}

/// Reads a cell as a reading date, whatever form the source left it in.
pub fn reading_date(cell: &Cell) -> Option<NaiveDateTime> {
    match cell {
        Cell::Date(dt) => Some(*dt),
        Cell::Text(s) => parse_mixed_datetime(s),
        Cell::Number(n) => excel_serial_to_datetime(*n),
        Cell::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn normalize_meter_key_strips_leading_zeros() {
        assert_eq!(normalize_meter_key("00042"), "42");
        assert_eq!(normalize_meter_key("0"), "0");
        assert_eq!(normalize_meter_key("000"), "0");
        assert_eq!(normalize_meter_key("7"), "7");
        assert_eq!(normalize_meter_key(" 0105 "), "105");
        assert_eq!(normalize_meter_key("A001"), "A001");
    }

    #[test]
    fn meter_key_renders_whole_numbers_without_fraction() {
        assert_eq!(meter_key(&Cell::Number(42.0)), Some("42".to_string()));
        assert_eq!(meter_key(&Cell::text("0042")), Some("42".to_string()));
        assert_eq!(meter_key(&Cell::text("   ")), None);
        assert_eq!(meter_key(&Cell::Null), None);
    }

    #[test]
    fn parse_decimal_honours_separator() {
        assert_eq!(parse_decimal("1 234,5", ','), Some(1234.5));
        assert_eq!(parse_decimal("12.75", '.'), Some(12.75));
        assert_eq!(parse_decimal("n/a", ','), None);
        assert_eq!(parse_decimal("", '.'), None);
    }

    #[test]
    fn parse_mixed_datetime_supports_several_layouts() {
        let expected = dt(2025, 6, 18, 14, 30);
        assert_eq!(parse_mixed_datetime("2025-06-18 14:30:00"), Some(expected));
        assert_eq!(parse_mixed_datetime("18.06.2025 14:30"), Some(expected));
        assert_eq!(parse_mixed_datetime("2025-06-18T14:30"), Some(expected));
        assert_eq!(parse_mixed_datetime("18.06.2025"), Some(dt(2025, 6, 18, 0, 0)));
        assert_eq!(parse_mixed_datetime("yesterday"), None);
    }

    #[test]
    fn parse_mixed_datetime_reads_two_digit_years_as_this_century() {
        assert_eq!(parse_mixed_datetime("18.06.25"), Some(dt(2025, 6, 18, 0, 0)));
        assert_eq!(parse_mixed_datetime("18.06.25 14:30"), Some(dt(2025, 6, 18, 14, 30)));
        assert_eq!(parse_mixed_datetime("18.06.2025 14:30"), Some(dt(2025, 6, 18, 14, 30)));
        assert_eq!(parse_mixed_datetime("01.02.2024"), Some(dt(2024, 2, 1, 0, 0)));
    }

    #[test]
    fn excel_serial_round_trips_through_datetime() {
        let value = dt(2025, 6, 18, 12, 0);
        let serial = datetime_to_excel_serial(value);
        assert_eq!(serial, 45826.5);
        assert_eq!(excel_serial_to_datetime(serial), Some(value));
        assert_eq!(excel_serial_to_datetime(-3.0), None);
    }

    #[test]
    fn reading_date_coerces_text_and_serials() {
        assert_eq!(reading_date(&Cell::text("01.02.2024")), Some(dt(2024, 2, 1, 0, 0)));
        assert_eq!(reading_date(&Cell::Number(45826.5)), Some(dt(2025, 6, 18, 12, 0)));
        assert_eq!(reading_date(&Cell::text("garbage")), None);
    }

    #[test]
    fn display_trims_integral_numbers_and_midnight() {
        assert_eq!(Cell::Number(500.0).as_display(), "500");
        assert_eq!(Cell::Number(12.5).as_display(), "12.5");
        assert_eq!(Cell::Date(dt(2024, 5, 6, 0, 0)).as_display(), "2024-05-06");
        assert_eq!(Cell::Null.as_display(), "");
    }
}
