use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pipeline::{DEFAULT_RESULT_NAME, DEFAULT_WORKERS};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Consolidate meter-reading exports into one reconciled report",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Consolidate every recognised export in a directory into one workbook
    Consolidate(ConsolidateArgs),
    /// List source files in a directory with their detected format
    Classify(ClassifyArgs),
    /// Load a single export and print its unified rows
    Inspect(InspectArgs),
    /// Write the built-in format configuration as YAML for editing
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
pub struct ConsolidateArgs {
    /// Directory holding the source exports
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Directory the consolidated workbook is written to
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// YAML format configuration (built-in defaults if omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Persist adapted tables here and reuse them for unchanged files
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,
    /// Number of files loaded in parallel
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
    /// Logical result name used in the output file name
    #[arg(long, default_value = DEFAULT_RESULT_NAME)]
    pub name: String,
    /// Print the first N consolidated rows after writing
    #[arg(long)]
    pub preview: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Directory to scan
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML format configuration (built-in defaults if omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Source export to load
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML format configuration (built-in defaults if omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Destination YAML file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Replace an existing file
    #[arg(long)]
    pub force: bool,
}
