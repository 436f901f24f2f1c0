pub mod adapter;
pub mod cache;
pub mod classify;
pub mod cli;
pub mod config;
pub mod data;
pub mod dedupe;
pub mod error;
pub mod io_utils;
pub mod pipeline;
pub mod preview;
pub mod reconcile;
pub mod table;
pub mod workbook;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    config::PipelineConfig,
    pipeline::{PipelineOptions, RunOutcome},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("meter_consolidate", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Consolidate(args) => handle_consolidate(&args),
        Commands::Classify(args) => handle_classify(&args),
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            debug!("Loading format configuration from {path:?}");
            PipelineConfig::load(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn handle_consolidate(args: &cli::ConsolidateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut options = PipelineOptions::new(&args.input, &args.output);
    options.name = args.name.clone();
    options.workers = args.workers;
    options.cache_dir = args.cache_dir.clone();
    info!(
        "Consolidating {:?} into {:?} with {} worker(s)",
        args.input, args.output, options.workers
    );

    match pipeline::run(&config, &options)
        .with_context(|| format!("Consolidating {:?}", args.input))?
    {
        RunOutcome::NoData => println!("No data: nothing to process in {:?}", args.input),
        RunOutcome::Written {
            path,
            table,
            sources,
        } => {
            println!(
                "Wrote {} meter(s) from {sources} source(s) to {}",
                table.len(),
                path.display()
            );
            if let Some(rows) = args.preview {
                preview::print_table(&table, rows);
            }
        }
    }
    Ok(())
}

fn handle_classify(args: &cli::ClassifyArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let files = io_utils::list_source_files(&args.input)?;
    for path in &files {
        let label = classify::classify_path(path, &config)
            .map(|format| format.as_str())
            .unwrap_or("UNKNOWN");
        println!("{label}\t{}", io_utils::file_name(path));
    }
    info!("Classified {} file(s) in {:?}", files.len(), args.input);
    Ok(())
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let (format, table) = pipeline::inspect_file(&config, &args.input)?;
    println!(
        "{}: {format}, {} meter(s)",
        io_utils::file_name(&args.input),
        table.len()
    );
    preview::print_table(&table, args.rows);
    Ok(())
}

fn handle_init_config(args: &cli::InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite",
            args.output
        );
    }
    PipelineConfig::default()
        .save(&args.output)
        .with_context(|| format!("Writing configuration to {:?}", args.output))?;
    info!("Default configuration written to {:?}", args.output);
    Ok(())
}
