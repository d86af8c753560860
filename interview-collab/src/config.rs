//! Store and engine configuration.
//!
//! Each store is an embedded RocksDB database; its directory is the
//! store's connection target. The two stores are configured separately and
//! may live on different volumes.

use rocksdb::{BlockBasedOptions, Cache, DBCompressionType, Options};
use std::path::{Path, PathBuf};

use crate::error::{CollabError, CollabResult};

/// Updates per namespace before the log is compacted into one update.
pub const DEFAULT_FLUSH_SIZE: usize = 100;

const ROOM_DB_PATH_VAR: &str = "COLLAB_DB_PATH";
const DOCUMENT_DB_PATH_VAR: &str = "YJS_DB_PATH";
const FLUSH_SIZE_VAR: &str = "YJS_FLUSH_SIZE";

/// Settings for one RocksDB store.
///
/// Memory is budgeted per store, not per column family: every column family
/// shares one block cache, and `memtable_budget` caps the memtables of all
/// column families together. The document store opens one column family
/// per room, so its footprint stays flat as rooms accumulate.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Capacity of the block cache shared by the whole store. 32MB.
    pub block_cache_size: usize,
    pub bloom_filter_bits: i32,
    /// fsync each write before acknowledging it. Off by default; the WAL
    /// still makes acknowledged writes survive a process crash.
    pub sync_writes: bool,
    pub max_open_files: i32,
    /// Memtable size of a single column family. 1MB, since most rooms
    /// see a few hundred small updates.
    pub write_buffer_size: usize,
    /// Ceiling on memtable memory across all column families. 32MB.
    pub memtable_budget: usize,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 32 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 1024 * 1024,
            memtable_budget: 32 * 1024 * 1024,
        }
    }

    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 256 * 1024,
            memtable_budget: 4 * 1024 * 1024,
        }
    }

    /// The block cache every column family of this store reads through.
    /// Create it once per store and pass it to [`Self::cf_options`].
    pub(crate) fn block_cache(&self) -> Cache {
        Cache::new_lru_cache(self.block_cache_size)
    }

    pub(crate) fn db_options(&self) -> Options {
        let parallelism = std::thread::available_parallelism().map_or(4, |n| n.get() as i32);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_keep_log_file_num(5);
        opts.increase_parallelism(parallelism);
        opts.set_db_write_buffer_size(self.memtable_budget);
        opts
    }

    /// Column family options backed by the store's shared `cache`.
    pub(crate) fn cf_options(&self, cache: &Cache) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(cache);
        block_opts.set_bloom_filter(self.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_max_write_buffer_number(2);
        opts
    }
}

/// Configuration for both stores and the document engine.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    pub room_store: StoreConfig,
    pub document_store: StoreConfig,
    /// Compaction threshold for a document's update log.
    pub flush_size: usize,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            room_store: StoreConfig::new("interview_data/rooms"),
            document_store: StoreConfig::new("interview_data/yjs"),
            flush_size: DEFAULT_FLUSH_SIZE,
        }
    }
}

impl CollabConfig {
    /// Both stores under `dir`, with small caches.
    pub fn for_testing(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            room_store: StoreConfig::for_testing(dir.join("rooms")),
            document_store: StoreConfig::for_testing(dir.join("yjs")),
            flush_size: DEFAULT_FLUSH_SIZE,
        }
    }

    pub fn with_flush_size(mut self, flush_size: usize) -> Self {
        self.flush_size = flush_size;
        self
    }

    /// Read `COLLAB_DB_PATH`, `YJS_DB_PATH` and `YJS_FLUSH_SIZE` from the
    /// process environment. Unset variables keep their defaults.
    pub fn from_env() -> CollabResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CollabResult<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup(ROOM_DB_PATH_VAR) {
            config.room_store.path = PathBuf::from(path);
        }
        if let Some(path) = lookup(DOCUMENT_DB_PATH_VAR) {
            config.document_store.path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(FLUSH_SIZE_VAR) {
            config.flush_size = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(CollabError::Config(format!(
                        "{FLUSH_SIZE_VAR} must be a positive integer, got {raw:?}"
                    )))
                }
            };
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CollabConfig::default();
        assert_eq!(config.flush_size, 100);
        assert_ne!(config.room_store.path, config.document_store.path);
        assert!(!config.room_store.sync_writes);
    }

    #[test]
    fn test_env_overrides() {
        let config = CollabConfig::from_lookup(lookup(&[
            ("COLLAB_DB_PATH", "/srv/rooms"),
            ("YJS_DB_PATH", "/srv/yjs"),
            ("YJS_FLUSH_SIZE", "25"),
        ]))
        .unwrap();
        assert_eq!(config.room_store.path, PathBuf::from("/srv/rooms"));
        assert_eq!(config.document_store.path, PathBuf::from("/srv/yjs"));
        assert_eq!(config.flush_size, 25);
    }

    #[test]
    fn test_env_missing_keeps_defaults() {
        let config = CollabConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.flush_size, DEFAULT_FLUSH_SIZE);
        assert_eq!(config.room_store.path, PathBuf::from("interview_data/rooms"));
    }

    #[test]
    fn test_env_bad_flush_size() {
        for bad in ["zero", "0", "-3"] {
            let err = CollabConfig::from_lookup(lookup(&[("YJS_FLUSH_SIZE", bad)])).unwrap_err();
            assert!(matches!(err, CollabError::Config(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_store_defaults_bound_memory_per_store() {
        let config = StoreConfig::new("/srv/yjs");
        assert_eq!(config.block_cache_size, 32 * 1024 * 1024);
        assert_eq!(config.write_buffer_size, 1024 * 1024);
        assert_eq!(config.memtable_budget, 32 * 1024 * 1024);
        assert!(config.write_buffer_size * 2 <= config.memtable_budget);

        let testing = StoreConfig::for_testing("/tmp/yjs");
        assert!(testing.write_buffer_size < testing.memtable_budget);
    }

    #[test]
    fn test_for_testing_layout() {
        let config = CollabConfig::for_testing("/tmp/x").with_flush_size(5);
        assert_eq!(config.room_store.path, PathBuf::from("/tmp/x/rooms"));
        assert_eq!(config.document_store.path, PathBuf::from("/tmp/x/yjs"));
        assert_eq!(config.flush_size, 5);
    }
}
