//! Adapter output cache.
//!
//! Adapted tables are keyed by source path, a SHA-256 of the file content, and
//! the format used to read it. Entries live in memory for the run and, when a
//! cache directory is configured, as bincode files named after a hash of the
//! key. A lookup that cannot be satisfied for any reason is a miss.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{config::SourceFormat, error::CacheError, table::Table};

const CACHE_VERSION: u32 = 1;
const ENTRY_EXTENSION: &str = "bin";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub path: PathBuf,
    pub content_hash: String,
    pub format: SourceFormat,
}

impl CacheKey {
    pub fn new(path: &Path, content: &[u8], format: SourceFormat) -> Self {
        Self {
            path: path.to_path_buf(),
            content_hash: content_hash(content),
            format,
        }
    }

    /// Reads and hashes `path`.
    pub fn for_file(path: &Path, format: SourceFormat) -> Result<Self> {
        let content = fs::read(path).with_context(|| format!("Hashing {path:?}"))?;
        Ok(Self::new(path, &content, format))
    }

    fn entry_file_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.path.to_string_lossy().as_bytes());
        hasher.update([0]);
        hasher.update(self.content_hash.as_bytes());
        hasher.update([0]);
        hasher.update(self.format.as_str().as_bytes());
        format!("{:x}.{ENTRY_EXTENSION}", hasher.finalize())
    }
}

pub fn content_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    key: CacheKey,
    table: Table,
}

#[derive(Debug, Default)]
pub struct AdaptCache {
    memory: HashMap<CacheKey, Table>,
    dir: Option<PathBuf>,
}

impl AdaptCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A cache that also persists entries under `dir`, created on first use.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            memory: HashMap::new(),
            dir: Some(dir.into()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Table> {
        if let Some(table) = self.memory.get(key) {
            return Some(table.clone());
        }
        let path = self.dir.as_ref()?.join(key.entry_file_name());
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("Cache miss for {:?}: {err}", key.path);
                return None;
            }
        };
        let entry = match bincode::serde::decode_from_slice::<CacheEntry, _>(
            &bytes,
            bincode::config::standard(),
        ) {
            Ok((entry, _)) => entry,
            Err(err) => {
                debug!("Ignoring unreadable cache entry {path:?}: {err}");
                return None;
            }
        };
        if entry.version != CACHE_VERSION || &entry.key != key {
            debug!("Ignoring stale cache entry {path:?}");
            return None;
        }
        Some(entry.table)
    }

    pub fn put(&mut self, key: CacheKey, table: Table) -> Result<(), CacheError> {
        if let Some(dir) = &self.dir {
            fs::create_dir_all(dir).map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = dir.join(key.entry_file_name());
            let entry = CacheEntry {
                version: CACHE_VERSION,
                key: key.clone(),
                table: table.clone(),
            };
            let bytes = bincode::serde::encode_to_vec(&entry, bincode::config::standard())?;
            let io_err = |source| CacheError::Io {
                path: path.clone(),
                source,
            };
            let mut writer = BufWriter::new(File::create(&path).map_err(io_err)?);
            writer.write_all(&bytes).map_err(io_err)?;
            writer.flush().map_err(io_err)?;
            debug!("Cached {:?} as {path:?}", key.path);
        }
        self.memory.insert(key, table);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}
