//! Run orchestration: discover → classify → adapt → dedupe per file on a small
//! worker pool, then concatenate → global dedupe → reconcile → write on the
//! calling thread.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate};
use log::{debug, info, warn};

use crate::{
    adapter,
    cache::{AdaptCache, CacheKey},
    classify,
    config::{PipelineConfig, SourceFormat, UnifiedColumn},
    dedupe,
    io_utils,
    reconcile::{self, ReconcileOptions, SourceTable},
    table::Table,
    workbook,
};

pub const DEFAULT_RESULT_NAME: &str = "Result";
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub name: String,
    pub workers: usize,
    pub cache_dir: Option<PathBuf>,
    pub today: NaiveDate,
}

impl PipelineOptions {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            name: DEFAULT_RESULT_NAME.to_string(),
            workers: DEFAULT_WORKERS,
            cache_dir: None,
            today: Local::now().date_naive(),
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// No file produced a usable table; nothing was written.
    NoData,
    Written {
        path: PathBuf,
        table: Table,
        sources: usize,
    },
}

/// One classified file handed to a worker.
struct Job {
    path: PathBuf,
    format: SourceFormat,
}

/// What a worker hands back for one file.
struct Loaded {
    source: SourceTable,
    /// Set when the adapted table came from a fresh parse and should be cached.
    fresh: Option<(CacheKey, Table)>,
}

pub fn run(config: &PipelineConfig, options: &PipelineOptions) -> Result<RunOutcome> {
    let files = io_utils::list_source_files(&options.input_dir)?;
    info!(
        "Found {} source file(s) in {:?}",
        files.len(),
        options.input_dir
    );
    let mut cache = match &options.cache_dir {
        Some(dir) => AdaptCache::persistent(dir),
        None => AdaptCache::in_memory(),
    };

    let Some((table, sources)) =
        consolidate(config, &files, &mut cache, options.workers, options.today)?
    else {
        info!("No usable source files; nothing to process");
        return Ok(RunOutcome::NoData);
    };

    fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("Creating output directory {:?}", options.output_dir))?;
    let path = options.output_dir.join(io_utils::output_file_name(
        &options.name,
        Local::now().naive_local(),
    ));
    workbook::write_table(&table, &path)?;
    info!(
        "Wrote {} meter(s) from {sources} source(s) to {path:?}",
        table.len()
    );
    Ok(RunOutcome::Written {
        path,
        table,
        sources,
    })
}

/// Builds the consolidated table from `files`. `None` when no file loaded.
pub fn consolidate(
    config: &PipelineConfig,
    files: &[PathBuf],
    cache: &mut AdaptCache,
    workers: usize,
    today: NaiveDate,
) -> Result<Option<(Table, usize)>> {
    let jobs: Vec<Job> = files
        .iter()
        .filter_map(|path| match classify::classify_path(path, config) {
            Some(format) => {
                debug!("{}: {format}", io_utils::file_name(path));
                Some(Job {
                    path: path.clone(),
                    format,
                })
            }
            None => {
                warn!(
                    "{}: unknown source format, skipping",
                    io_utils::file_name(path)
                );
                None
            }
        })
        .collect();

    let loaded = load_all(config, &jobs, cache, workers)?;
    let mut sources = BTreeMap::new();
    for item in loaded {
        if let Some((key, table)) = item.fresh
            && let Err(err) = cache.put(key, table)
        {
            warn!("{}: not cached: {err}", item.source.file_name);
        }
        sources.insert(item.source.file_name.clone(), item.source);
    }
    if sources.is_empty() {
        return Ok(None);
    }
    let table = combine_sources(config, &sources, today)?;
    Ok(Some((table, sources.len())))
}

/// Concatenates, globally dedupes and reconciles loaded sources. Any
/// reconciliation failure aborts the run.
pub fn combine_sources(
    config: &PipelineConfig,
    sources: &BTreeMap<String, SourceTable>,
    today: NaiveDate,
) -> Result<Table> {
    let combined = Table::concat(sources.values().map(|s| &s.table));
    let primary = dedupe_or_keep(combined, "combined table");
    let options = ReconcileOptions::from_config(config, today);
    reconcile::reconcile(&primary, sources, &options).context("Reconciling source tables")
}

fn load_all(
    config: &PipelineConfig,
    jobs: &[Job],
    cache: &AdaptCache,
    workers: usize,
) -> Result<Vec<Loaded>> {
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, jobs.len());
    let next = &AtomicUsize::new(0);
    debug!("Loading {} file(s) on {workers} worker(s)", jobs.len());

    thread::scope(|scope| -> Result<Vec<Loaded>> {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(idx) else {
                            break;
                        };
                        if let Some(loaded) = load_file(config, job, cache) {
                            done.push(loaded);
                        }
                    }
                    done
                })
            })
            .collect();
        let mut loaded = Vec::new();
        for handle in handles {
            let done = handle
                .join()
                .map_err(|_| anyhow!("Source loading worker panicked"))?;
            loaded.extend(done);
        }
        Ok(loaded)
    })
}

/// Adapts and dedupes one file. Failures are logged and yield `None`.
fn load_file(config: &PipelineConfig, job: &Job, cache: &AdaptCache) -> Option<Loaded> {
    let file_name = io_utils::file_name(&job.path);
    let key = match CacheKey::for_file(&job.path, job.format) {
        Ok(key) => key,
        Err(err) => {
            warn!("{file_name}: failed to load: {err:#}");
            return None;
        }
    };

    let (adapted, fresh) = match cache.get(&key) {
        Some(table) => {
            debug!("{file_name}: cache hit");
            (table, None)
        }
        None => match adapter::load_source(&job.path, job.format, config) {
            Ok(table) => (table.clone(), Some((key, table))),
            Err(err) => {
                warn!("{file_name}: failed to load: {err}");
                return None;
            }
        },
    };

    let table = dedupe_or_keep(adapted, &file_name);
    info!(
        "{file_name}: loaded {} meter(s) as {}",
        table.len(),
        job.format
    );
    Some(Loaded {
        source: SourceTable {
            file_name,
            format: job.format,
            table,
        },
        fresh,
    })
}

fn dedupe_or_keep(table: Table, label: &str) -> Table {
    match dedupe::dedupe(
        &table,
        UnifiedColumn::ReadingDate.name(),
        UnifiedColumn::MeterId.name(),
    ) {
        Ok(deduped) => deduped,
        Err(err) => {
            warn!("{label}: deduplication skipped: {err}");
            table
        }
    }
}

/// Adapts and dedupes a single file outside a full run.
pub fn inspect_file(config: &PipelineConfig, path: &Path) -> Result<(SourceFormat, Table)> {
    let format = classify::classify_path(path, config)
        .with_context(|| format!("{path:?} does not match any known source format"))?;
    let table = adapter::load_source(path, format, config)
        .with_context(|| format!("Loading {path:?} as {format}"))?;
    Ok((format, dedupe_or_keep(table, &io_utils::file_name(path))))
}
