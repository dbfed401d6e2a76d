use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Where index directories live. `Default` places every entity's index under
/// a root path chosen by the application; `Custom` points at an explicitly
/// configured directory; `Disabled` turns indexing off entirely (searches
/// fail fast, writers refuse work).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum IndexStorage {
    Default { root: PathBuf },
    Custom { path: PathBuf },
    Disabled,
}

impl IndexStorage {
    /// Resolved index root, or `None` when indexing is disabled.
    pub fn root(&self) -> Option<&Path> {
        match self {
            IndexStorage::Default { root } => Some(root),
            IndexStorage::Custom { path } => Some(path),
            IndexStorage::Disabled => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, IndexStorage::Disabled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub storage: IndexStorage,

    /// Assets fetched from the source per reindex batch. Cancellation is
    /// checked between batches, so this also bounds cancel latency.
    pub reindex_batch_size: usize,

    /// Upper bound on terminal clauses per query.
    pub max_clause_count: usize,

    /// Upper bound on clause-tree nesting.
    pub max_query_depth: usize,

    /// Tantivy writer heap per index, in bytes.
    pub writer_buffer_bytes: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            storage: IndexStorage::Default {
                root: PathBuf::from("./index"),
            },
            reindex_batch_size: 200,
            max_clause_count: 500,
            max_query_depth: 25,
            writer_buffer_bytes: 20_000_000,
        }
    }
}

impl SearchConfig {
    /// Build a config from `LODESTONE_*` environment variables, falling back
    /// to defaults for anything unset.
    ///
    /// * `LODESTONE_INDEX_MODE`: `default` | `custom` | `disabled`
    /// * `LODESTONE_INDEX_PATH`: root (default mode) or exact path (custom)
    /// * `LODESTONE_REINDEX_BATCH`: batch size for full reindex
    /// * `LODESTONE_MAX_CLAUSES`: clause-count cap per query
    pub fn from_env() -> Self {
        let defaults = SearchConfig::default();
        let path = env::var("LODESTONE_INDEX_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./index"));

        let storage = match env::var("LODESTONE_INDEX_MODE").as_deref() {
            Ok("disabled") => IndexStorage::Disabled,
            Ok("custom") => IndexStorage::Custom { path },
            _ => IndexStorage::Default { root: path },
        };

        SearchConfig {
            storage,
            reindex_batch_size: env::var("LODESTONE_REINDEX_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.reindex_batch_size),
            max_clause_count: env::var("LODESTONE_MAX_CLAUSES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_clause_count),
            max_query_depth: defaults.max_query_depth,
            writer_buffer_bytes: env::var("LODESTONE_WRITER_BUFFER_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.writer_buffer_bytes),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| crate::error::LodestoneError::Config(format!("malformed search config: {e}")))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
