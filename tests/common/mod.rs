#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use encoding_rs::WINDOWS_1251;
use rust_xlsxwriter::Workbook;
use tempfile::{TempDir, tempdir};

/// A cell in a generated spreadsheet fixture.
#[derive(Debug, Clone, Copy)]
pub enum Fx<'a> {
    Text(&'a str),
    Number(f64),
    Empty,
}

pub fn june(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, day).expect("valid date")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Creates (if needed) and returns a subdirectory of the workspace.
    pub fn dir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::create_dir_all(&path).expect("create workspace subdirectory");
        path
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Writes `contents` re-encoded as windows-1251, the way SIMS exports it.
    pub fn write_cp1251(&self, name: &str, contents: &str) -> PathBuf {
        let (bytes, _, unmappable) = WINDOWS_1251.encode(contents);
        assert!(!unmappable, "fixture text must be representable in cp1251");
        let path = self.temp_dir.path().join(name);
        fs::write(&path, bytes).expect("write cp1251 file");
        path
    }

    /// Writes a single-sheet workbook; `rows[0]` lands in A1.
    pub fn write_xlsx(&self, name: &str, rows: &[Vec<Fx<'_>>]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match cell {
                    Fx::Text(s) => {
                        sheet.write_string(r, c, *s).expect("write string");
                    }
                    Fx::Number(n) => {
                        sheet.write_number(r, c, *n).expect("write number");
                    }
                    Fx::Empty => {}
                }
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }
}

/// EMIS layout: two title rows, a header on row 3, ten columns.
pub fn emis_rows<'a>(data: &[Vec<Fx<'a>>]) -> Vec<Vec<Fx<'a>>> {
    let mut rows = vec![
        vec![Fx::Text("Ведомость опроса по ЭМИС")],
        vec![Fx::Text("Период: июнь 2025")],
        [
            "РЭС", "Населенный пункт", "Потребитель", "Лицевой счет", "Тип ПУ", "Номер ПУ",
            "Дата", "Сумма", "День", "Ночь",
        ]
        .into_iter()
        .map(Fx::Text)
        .collect(),
    ];
    rows.extend(data.iter().cloned());
    rows
}

/// PYRAMIDA layout: four title rows, header on row 5, all twelve columns.
pub fn pyramida_rows<'a>(data: &[Vec<Fx<'a>>]) -> Vec<Vec<Fx<'a>>> {
    let mut rows = vec![
        vec![Fx::Text("Отчет КУЭМ")],
        vec![Fx::Empty],
        vec![Fx::Text("Сформирован: 18.06.2025")],
        vec![Fx::Empty],
        [
            "ПО", "РЭС", "Населенный пункт", "ПС", "Потребитель", "Лицевой счет", "Тип ПУ",
            "Номер ПУ", "Дата", "Сумма", "День", "Ночь",
        ]
        .into_iter()
        .map(Fx::Text)
        .collect(),
    ];
    rows.extend(data.iter().cloned());
    rows
}

pub const SIMS_HEADER: &str = "Выгрузка Симс\n№;РЭС;Тип ПУ;Номер ПУ;Дата;Сумма;День;Ночь\n";
