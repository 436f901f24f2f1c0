//! Source-format definitions and run configuration.
//!
//! Everything format-specific lives here as data: the file-name marker used by
//! the classifier, the header offset, the positional column map, text encoding,
//! delimiter, decimal separator, and the constant columns a format cannot
//! supply. Adding a format means adding a [`SourceFormat`] variant and a
//! [`FormatSpec`], not new control flow.
//!
//! The built-in configuration is [`PipelineConfig::default`]; a YAML file with
//! the same shape (see `init-config`) replaces it wholesale.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

use anyhow::{Context, Result, bail, ensure};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::io_utils;

pub const DEFAULT_SENTINEL: &str = "not specified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    Pyramida,
    Telescop,
    Sims,
    Emis,
}

impl SourceFormat {
    /// Classification order. The first marker found in a file name wins.
    pub const PRIORITY: [SourceFormat; 4] = [
        SourceFormat::Pyramida,
        SourceFormat::Telescop,
        SourceFormat::Sims,
        SourceFormat::Emis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Pyramida => "PYRAMIDA",
            SourceFormat::Telescop => "TELESCOP",
            SourceFormat::Sims => "SIMS",
            SourceFormat::Emis => "EMIS",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Key,
    Date,
    Number,
    Category,
}

/// Columns of the unified reading schema, declared in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedColumn {
    Software,
    Region,
    Settlement,
    Substation,
    Consumer,
    Account,
    DeviceType,
    MeterId,
    ReadingDate,
    Total,
    Day,
    Night,
}

impl UnifiedColumn {
    pub const ALL: [UnifiedColumn; 12] = [
        UnifiedColumn::Software,
        UnifiedColumn::Region,
        UnifiedColumn::Settlement,
        UnifiedColumn::Substation,
        UnifiedColumn::Consumer,
        UnifiedColumn::Account,
        UnifiedColumn::DeviceType,
        UnifiedColumn::MeterId,
        UnifiedColumn::ReadingDate,
        UnifiedColumn::Total,
        UnifiedColumn::Day,
        UnifiedColumn::Night,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UnifiedColumn::Software => "software",
            UnifiedColumn::Region => "region",
            UnifiedColumn::Settlement => "settlement",
            UnifiedColumn::Substation => "substation",
            UnifiedColumn::Consumer => "consumer",
            UnifiedColumn::Account => "account",
            UnifiedColumn::DeviceType => "device_type",
            UnifiedColumn::MeterId => "meter_id",
            UnifiedColumn::ReadingDate => "reading_date",
            UnifiedColumn::Total => "total",
            UnifiedColumn::Day => "day",
            UnifiedColumn::Night => "night",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            UnifiedColumn::MeterId => ColumnKind::Key,
            UnifiedColumn::ReadingDate => ColumnKind::Date,
            UnifiedColumn::Total | UnifiedColumn::Day | UnifiedColumn::Night => ColumnKind::Number,
            _ => ColumnKind::Category,
        }
    }

    /// Canonical column names of a unified table.
    pub fn canonical_names() -> Vec<String> {
        Self::ALL.iter().map(|c| c.name().to_string()).collect()
    }
}

impl fmt::Display for UnifiedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// 0-based position in the raw sheet.
    pub index: usize,
    pub target: UnifiedColumn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    pub marker: String,
    /// 0-based row holding the column headers. Rows above it are report
    /// metadata; data starts on the next row.
    pub header_row: usize,
    pub columns: Vec<ColumnMapping>,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: char,
    /// Columns this format cannot supply, filled with a fixed value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constants: BTreeMap<UnifiedColumn, String>,
    /// Columns this format cannot supply, filled with the run sentinel.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sentinel_columns: Vec<UnifiedColumn>,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_decimal_separator() -> char {
    '.'
}

impl FormatSpec {
    fn new(marker: &str, header_row: usize, columns: &[(usize, UnifiedColumn)]) -> Self {
        Self {
            marker: marker.to_string(),
            header_row,
            columns: columns
                .iter()
                .map(|&(index, target)| ColumnMapping { index, target })
                .collect(),
            encoding: default_encoding(),
            delimiter: default_delimiter(),
            decimal_separator: default_decimal_separator(),
            constants: BTreeMap::new(),
            sentinel_columns: Vec::new(),
        }
    }

    pub fn resolved_encoding(&self) -> Result<&'static Encoding> {
        io_utils::resolve_encoding(Some(&self.encoding))
    }

    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter).unwrap_or(b',')
    }

    pub fn mapping_for(&self, column: UnifiedColumn) -> Option<&ColumnMapping> {
        self.columns.iter().find(|m| m.target == column)
    }

    fn validate(&self, format: SourceFormat, sentinel: &str) -> Result<()> {
        ensure!(
            !self.marker.trim().is_empty(),
            "Format {format}: marker cannot be empty"
        );
        ensure!(
            self.mapping_for(UnifiedColumn::MeterId).is_some(),
            "Format {format}: no column is mapped to '{}'",
            UnifiedColumn::MeterId
        );
        ensure!(
            self.delimiter.is_ascii(),
            "Format {format}: delimiter '{}' must be a single ASCII character",
            self.delimiter
        );
        ensure!(
            self.decimal_separator != self.delimiter,
            "Format {format}: decimal separator and delimiter are both '{}'",
            self.delimiter
        );
        self.resolved_encoding()
            .with_context(|| format!("Format {format}"))?;

        let mut seen = HashSet::new();
        for mapping in &self.columns {
            if !seen.insert(mapping.target) {
                bail!("Format {format}: column '{}' is mapped twice", mapping.target);
            }
        }
        for column in self.constants.keys().chain(self.sentinel_columns.iter()) {
            if !seen.insert(*column) {
                bail!("Format {format}: column '{column}' is both mapped and filled");
            }
        }
        if !self.sentinel_columns.is_empty() {
            ensure!(
                !sentinel.is_empty(),
                "Format {format} fills sentinel columns but the sentinel is empty"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sentinel: String,
    /// Reading columns compared across sources and repeated per source.
    pub reading_columns: Vec<UnifiedColumn>,
    pub formats: BTreeMap<SourceFormat, FormatSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use UnifiedColumn::*;

        let pyramida = FormatSpec::new(
            "Отчет КУЭМ",
            4,
            &UnifiedColumn::ALL
                .iter()
                .enumerate()
                .map(|(idx, col)| (idx, *col))
                .collect::<Vec<_>>(),
        );

        let mut telescop = FormatSpec::new(
            "типом ПУ без AD",
            2,
            &[
                (1, Region),
                (2, Settlement),
                (3, Substation),
                (4, Consumer),
                (5, Account),
                (7, DeviceType),
                (8, MeterId),
                (10, ReadingDate),
                (11, Total),
                (12, Day),
                (13, Night),
            ],
        );
        telescop.decimal_separator = ',';

        let mut sims = FormatSpec::new(
            "Симс",
            1,
            &[
                (1, Region),
                (2, DeviceType),
                (3, MeterId),
                (4, ReadingDate),
                (5, Total),
                (6, Day),
                (7, Night),
            ],
        );
        sims.encoding = "windows-1251".to_string();
        sims.delimiter = ';';
        sims.decimal_separator = ',';
        sims.constants.insert(Software, "SIMS".to_string());
        sims.sentinel_columns = vec![Settlement, Substation, Consumer, Account];

        let emis = FormatSpec::new(
            "ЭМИС",
            2,
            &[
                (0, Region),
                (1, Settlement),
                (2, Consumer),
                (3, Account),
                (4, DeviceType),
                (5, MeterId),
                (6, ReadingDate),
                (7, Total),
                (8, Day),
                (9, Night),
            ],
        );

        let formats = BTreeMap::from([
            (SourceFormat::Pyramida, pyramida),
            (SourceFormat::Telescop, telescop),
            (SourceFormat::Sims, sims),
            (SourceFormat::Emis, emis),
        ]);

        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            reading_columns: vec![ReadingDate, Total, Day, Night],
            formats,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: PipelineConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config
            .validate()
            .with_context(|| format!("Validating config {path:?}"))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Serializing config YAML")?;
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Writing config file {path:?}"))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for format in SourceFormat::PRIORITY {
            let spec = self
                .formats
                .get(&format)
                .with_context(|| format!("Format {format} is not configured"))?;
            spec.validate(format, &self.sentinel)?;
        }
        ensure!(
            !self.reading_columns.is_empty(),
            "At least one reading column is required"
        );
        ensure!(
            !self.reading_columns.contains(&UnifiedColumn::MeterId),
            "'{}' cannot be a reading column",
            UnifiedColumn::MeterId
        );
        Ok(())
    }

    pub fn format(&self, format: SourceFormat) -> Option<&FormatSpec> {
        self.formats.get(&format)
    }

    pub fn reading_column_names(&self) -> Vec<String> {
        self.reading_columns
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }
}
