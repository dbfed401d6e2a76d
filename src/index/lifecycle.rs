//! Generation-based index lifecycle.
//!
//! Each full reindex builds a fresh generation directory next to the live
//! one and swaps a pointer file on success. Failed or cancelled builds are
//! discarded; the previous generation keeps serving searches throughout.

use crate::config::SearchConfig;
use crate::error::{LodestoneError, Result};
use crate::index::fields::FieldIndexerManager;
use crate::index::schema::AssetSchema;
use crate::index::writer::FlushPolicy;
use crate::index::{AssetIndex, SearchLease};
use crate::types::{Asset, AssetId, AssetSource};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tantivy::Term;
use tracing::{error, info, warn};
use uuid::Uuid;

const ENTITY_ASSET: &str = "asset";
const POINTER_FILE: &str = "current";
const GENERATION_PREFIX: &str = "gen-";

/// Commit cadence for bulk generation builds. The generation is invisible
/// until the swap, so commits here only bound writer memory.
const BULK_FLUSH_OPS: usize = 50_000;
const BULK_FLUSH_AGE: Duration = Duration::from_secs(60);

/// Cooperative cancellation token checked between reindex batches.
#[derive(Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Point-in-time view of a running reindex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexProgress {
    pub indexed: u64,
    pub total: u64,
}

#[derive(Default)]
struct ProgressCounter {
    indexed: AtomicU64,
    total: AtomicU64,
}

impl ProgressCounter {
    fn reset(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
        self.indexed.store(0, Ordering::SeqCst);
    }

    fn advance(&self, count: u64) {
        self.indexed.fetch_add(count, Ordering::SeqCst);
    }

    fn snapshot(&self) -> ReindexProgress {
        ReindexProgress {
            indexed: self.indexed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }
}

/// Lifecycle of one indexed entity type. The asset index is the primary
/// manager; secondary indexes opt in to background reindex runs via
/// `include_secondary`.
pub trait EntityIndexManager: Send + Sync {
    fn entity(&self) -> &str;

    fn is_primary(&self) -> bool {
        true
    }

    /// Open the current generation, creating one when none exists. With
    /// `reindex` set, follow up with a full rebuild.
    fn activate(&self, reindex: bool) -> Result<()>;

    /// Drop the in-memory handle. The generation directory stays; the
    /// pointer still names it and `activate` reopens it.
    fn deactivate(&self);

    fn shutdown(&self);

    fn is_active(&self) -> bool;

    /// Rebuild into a fresh generation and swap it in. Returns wall time.
    fn reindex_all(&self, cancel: &CancellationFlag) -> Result<Duration>;

    /// Merge to one segment and drop files no generation references.
    fn optimize(&self) -> Result<Duration>;

    fn progress(&self) -> ReindexProgress;

    /// Active and holding exactly as many documents as the source reports.
    fn is_consistent(&self) -> Result<bool>;
}

struct RetiredGeneration {
    index: Arc<AssetIndex>,
    dir: PathBuf,
}

/// Asset index lifecycle: generation directories under `{root}/asset/`,
/// a `current` pointer file, and delay-closed superseded generations.
pub struct AssetIndexManager {
    entity_dir: PathBuf,
    schema: Arc<AssetSchema>,
    fields: Arc<FieldIndexerManager>,
    source: Arc<dyn AssetSource>,
    batch_size: usize,
    buffer_bytes: usize,
    active: RwLock<Option<Arc<AssetIndex>>>,
    retired: Mutex<Vec<RetiredGeneration>>,
    progress: ProgressCounter,
}

impl std::fmt::Debug for AssetIndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetIndexManager")
            .field("entity_dir", &self.entity_dir)
            .finish_non_exhaustive()
    }
}

impl AssetIndexManager {
    pub fn new(
        config: &SearchConfig,
        fields: Arc<FieldIndexerManager>,
        source: Arc<dyn AssetSource>,
    ) -> Result<Self> {
        let root = config
            .storage
            .root()
            .ok_or(LodestoneError::IndexingDisabled)?;
        Ok(AssetIndexManager {
            entity_dir: root.join(ENTITY_ASSET),
            schema: Arc::clone(fields.schema()),
            fields,
            source,
            batch_size: config.reindex_batch_size.max(1),
            buffer_bytes: config.writer_buffer_bytes,
            active: RwLock::new(None),
            retired: Mutex::new(Vec::new()),
            progress: ProgressCounter::default(),
        })
    }

    /// Searcher pinned to the live generation.
    pub fn lease(&self) -> Result<SearchLease> {
        Ok(self.active_index()?.lease())
    }

    /// Upsert one asset. A previously indexed asset is replaced in a single
    /// update; a new one is added.
    pub fn index_asset(&self, asset: &Asset) -> Result<()> {
        let index = self.active_index()?;
        let doc = self.fields.build_document(asset);
        let term = Term::from_field_u64(self.schema.id_field(), asset.id);
        index.writer().update_documents(term, vec![doc])
    }

    pub fn remove_asset(&self, id: AssetId) -> Result<()> {
        let index = self.active_index()?;
        let term = Term::from_field_u64(self.schema.id_field(), id);
        index.writer().delete_documents(term)
    }

    pub fn doc_count(&self) -> Result<u64> {
        Ok(self.active_index()?.doc_count())
    }

    fn active_index(&self) -> Result<Arc<AssetIndex>> {
        self.active
            .read()
            .expect("lifecycle lock poisoned")
            .clone()
            .ok_or_else(|| LodestoneError::IndexDeactivated(ENTITY_ASSET.to_string()))
    }

    fn pointer_path(&self) -> PathBuf {
        self.entity_dir.join(POINTER_FILE)
    }

    fn read_pointer(&self) -> Result<Option<PathBuf>> {
        let name = match std::fs::read_to_string(self.pointer_path()) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if name.is_empty() {
            return Ok(None);
        }
        let dir = self.entity_dir.join(&name);
        if dir.is_dir() {
            Ok(Some(dir))
        } else {
            warn!(pointer = %name, "current pointer names a missing generation");
            Ok(None)
        }
    }

    /// Write-then-rename so the pointer is never observed half-written.
    fn write_pointer(&self, generation: &str) -> Result<()> {
        std::fs::create_dir_all(&self.entity_dir)?;
        let staged = self.entity_dir.join(format!("{POINTER_FILE}.tmp"));
        std::fs::write(&staged, generation)?;
        std::fs::rename(&staged, self.pointer_path())?;
        Ok(())
    }

    fn generation_name() -> String {
        format!("{GENERATION_PREFIX}{}", Uuid::new_v4())
    }

    fn create_generation(&self) -> Result<AssetIndex> {
        let name = Self::generation_name();
        let dir = self.entity_dir.join(&name);
        info!(entity = ENTITY_ASSET, dir = %dir.display(), "creating index generation");
        let index = AssetIndex::create_in_dir(
            &dir,
            Arc::clone(&self.schema),
            FlushPolicy::Flush,
            self.buffer_bytes,
        )?;
        self.write_pointer(&name)?;
        Ok(index)
    }

    /// Fill a fresh generation from the source, one batch at a time. The
    /// cancellation flag is honored at batch boundaries.
    fn build_generation(&self, dir: &Path, cancel: &CancellationFlag) -> Result<()> {
        let builder = AssetIndex::create_in_dir(
            dir,
            Arc::clone(&self.schema),
            FlushPolicy::Batch {
                max_pending_ops: BULK_FLUSH_OPS,
                max_pending_age: BULK_FLUSH_AGE,
            },
            self.buffer_bytes,
        )?;

        let mut offset = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(LodestoneError::ReindexCancelled(ENTITY_ASSET.to_string()));
            }
            let batch = self.source.batch(offset, self.batch_size)?;
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();
            let docs = batch
                .iter()
                .map(|asset| self.fields.build_document(asset))
                .collect();
            builder.writer().add_documents(docs)?;
            self.progress.advance(fetched as u64);
            offset += fetched;
            if fetched < self.batch_size {
                break;
            }
        }

        builder.writer().flush()?;
        // Dropping the builder releases the writer lock before the
        // generation is reopened for interactive writes.
        Ok(())
    }

    fn retire(&self, index: Arc<AssetIndex>) {
        match index.directory().map(Path::to_path_buf) {
            Some(dir) => self
                .retired
                .lock()
                .expect("lifecycle lock poisoned")
                .push(RetiredGeneration { index, dir }),
            None => drop(index),
        }
    }

    /// Remove superseded generation directories whose last lease has
    /// dropped. Still-leased generations stay until a later sweep.
    fn cleanup_retired(&self) {
        let mut retired = self.retired.lock().expect("lifecycle lock poisoned");
        let mut still_leased = Vec::new();
        for generation in retired.drain(..) {
            if Arc::strong_count(&generation.index) > 1 {
                still_leased.push(generation);
                continue;
            }
            let dir = generation.dir.clone();
            // The index must close before its files go away.
            drop(generation);
            info!(dir = %dir.display(), "removing superseded index generation");
            Self::discard_dir(&dir);
        }
        *retired = still_leased;
    }

    fn discard_dir(dir: &Path) {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), error = %e, "could not remove index generation");
            }
        }
    }
}

impl EntityIndexManager for AssetIndexManager {
    fn entity(&self) -> &str {
        ENTITY_ASSET
    }

    fn activate(&self, reindex: bool) -> Result<()> {
        {
            let mut active = self.active.write().expect("lifecycle lock poisoned");
            if active.is_none() {
                let index = match self.read_pointer()? {
                    Some(dir) => {
                        info!(entity = ENTITY_ASSET, dir = %dir.display(), "opening current index generation");
                        AssetIndex::open_in_dir(
                            &dir,
                            Arc::clone(&self.schema),
                            FlushPolicy::Flush,
                            self.buffer_bytes,
                        )?
                    }
                    None => self.create_generation()?,
                };
                *active = Some(Arc::new(index));
            }
        }
        if reindex {
            self.reindex_all(&CancellationFlag::new())?;
        }
        Ok(())
    }

    fn deactivate(&self) {
        let previous = self
            .active
            .write()
            .expect("lifecycle lock poisoned")
            .take();
        if previous.is_some() {
            info!(entity = ENTITY_ASSET, "index deactivated");
        }
        self.cleanup_retired();
    }

    fn shutdown(&self) {
        self.deactivate();
        let leased = self.retired.lock().expect("lifecycle lock poisoned").len();
        if leased > 0 {
            warn!(
                entity = ENTITY_ASSET,
                generations = leased,
                "superseded generations still leased at shutdown"
            );
        }
    }

    fn is_active(&self) -> bool {
        self.active
            .read()
            .expect("lifecycle lock poisoned")
            .is_some()
    }

    fn reindex_all(&self, cancel: &CancellationFlag) -> Result<Duration> {
        let started = Instant::now();
        if !self.is_active() {
            return Err(LodestoneError::IndexDeactivated(ENTITY_ASSET.to_string()));
        }

        let total = self.source.count()?;
        self.progress.reset(total as u64);

        let name = Self::generation_name();
        let dir = self.entity_dir.join(&name);
        info!(
            entity = ENTITY_ASSET,
            total,
            dir = %dir.display(),
            "starting full reindex into fresh generation"
        );

        if let Err(e) = self.build_generation(&dir, cancel) {
            Self::discard_dir(&dir);
            return match e {
                LodestoneError::ReindexCancelled(_) => {
                    info!(entity = ENTITY_ASSET, "reindex cancelled; build discarded");
                    Err(e)
                }
                other => {
                    error!(
                        entity = ENTITY_ASSET,
                        error = %other,
                        "reindex failed; previous generation stays live"
                    );
                    Err(LodestoneError::ReindexFailed {
                        entity: ENTITY_ASSET.to_string(),
                        message: other.to_string(),
                    })
                }
            };
        }

        let rebuilt = AssetIndex::open_in_dir(
            &dir,
            Arc::clone(&self.schema),
            FlushPolicy::Flush,
            self.buffer_bytes,
        )?;
        self.write_pointer(&name)?;
        let previous = self
            .active
            .write()
            .expect("lifecycle lock poisoned")
            .replace(Arc::new(rebuilt));
        if let Some(previous) = previous {
            self.retire(previous);
        }
        self.cleanup_retired();

        let elapsed = started.elapsed();
        info!(
            entity = ENTITY_ASSET,
            docs = total,
            ?elapsed,
            "reindex complete; generation swapped"
        );
        Ok(elapsed)
    }

    fn optimize(&self) -> Result<Duration> {
        let started = Instant::now();
        let index = self.active_index()?;
        index.writer().compact()?;
        let elapsed = started.elapsed();
        info!(entity = ENTITY_ASSET, ?elapsed, "index optimized");
        Ok(elapsed)
    }

    fn progress(&self) -> ReindexProgress {
        self.progress.snapshot()
    }

    fn is_consistent(&self) -> Result<bool> {
        let active = self.active.read().expect("lifecycle lock poisoned").clone();
        let Some(index) = active else {
            return Ok(false);
        };
        let expected = self.source.count()? as u64;
        Ok(index.doc_count() == expected)
    }
}

/// One front door for every entity index. Operations fan out to the
/// sub-managers; reindex attempts every one before reporting the first
/// failure.
pub struct IndexLifecycleManager {
    asset: Arc<AssetIndexManager>,
    managers: Vec<Arc<dyn EntityIndexManager>>,
}

impl IndexLifecycleManager {
    pub fn new(asset: Arc<AssetIndexManager>) -> Self {
        let managers: Vec<Arc<dyn EntityIndexManager>> = vec![Arc::clone(&asset) as _];
        IndexLifecycleManager { asset, managers }
    }

    /// Register an additional entity index behind the same lifecycle.
    pub fn with_secondary(mut self, manager: Arc<dyn EntityIndexManager>) -> Self {
        self.managers.push(manager);
        self
    }

    pub fn asset_manager(&self) -> &Arc<AssetIndexManager> {
        &self.asset
    }

    pub fn lease(&self) -> Result<SearchLease> {
        self.asset.lease()
    }

    pub fn activate(&self, reindex: bool) -> Result<()> {
        for manager in &self.managers {
            manager.activate(reindex)?;
        }
        Ok(())
    }

    pub fn deactivate(&self) {
        for manager in &self.managers {
            manager.deactivate();
        }
    }

    pub fn shutdown(&self) {
        for manager in &self.managers {
            manager.shutdown();
        }
    }

    /// Rebuild every entity index, returning total wall time. Every
    /// sub-manager gets its attempt; the first failure is reported after
    /// the rest have run.
    pub fn reindex_all(&self) -> Result<Duration> {
        Self::run_reindex(&self.managers, &CancellationFlag::new())
    }

    pub fn reindex_all_in_background(&self, include_secondary: bool) -> BackgroundReindex {
        let cancel = CancellationFlag::new();
        let selected: Vec<Arc<dyn EntityIndexManager>> = self
            .managers
            .iter()
            .filter(|m| include_secondary || m.is_primary())
            .cloned()
            .collect();
        let task_managers = selected.clone();
        let flag = cancel.clone();
        let handle =
            tokio::task::spawn_blocking(move || Self::run_reindex(&task_managers, &flag));
        BackgroundReindex {
            cancel,
            managers: selected,
            handle,
        }
    }

    fn run_reindex(
        managers: &[Arc<dyn EntityIndexManager>],
        cancel: &CancellationFlag,
    ) -> Result<Duration> {
        let mut elapsed = Duration::ZERO;
        let mut first_failure = None;
        for manager in managers {
            match manager.reindex_all(cancel) {
                Ok(duration) => elapsed += duration,
                Err(e) => {
                    error!(entity = manager.entity(), error = %e, "reindex failed");
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }
        match first_failure {
            None => Ok(elapsed),
            Some(e) => Err(e),
        }
    }

    pub fn optimize(&self) -> Result<Duration> {
        let mut elapsed = Duration::ZERO;
        for manager in &self.managers {
            elapsed += manager.optimize()?;
        }
        Ok(elapsed)
    }

    pub fn index_consistent(&self) -> Result<bool> {
        for manager in &self.managers {
            if !manager.is_consistent()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Handle to a reindex running on the blocking pool.
pub struct BackgroundReindex {
    cancel: CancellationFlag,
    managers: Vec<Arc<dyn EntityIndexManager>>,
    handle: tokio::task::JoinHandle<Result<Duration>>,
}

impl BackgroundReindex {
    /// Request cancellation. The build stops at the next batch boundary
    /// and the partial generation is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn progress(&self) -> ReindexProgress {
        self.managers
            .iter()
            .fold(ReindexProgress::default(), |acc, manager| {
                let p = manager.progress();
                ReindexProgress {
                    indexed: acc.indexed + p.indexed,
                    total: acc.total + p.total,
                }
            })
    }

    pub async fn join(self) -> Result<Duration> {
        self.handle
            .await
            .map_err(|e| LodestoneError::ReindexFailed {
                entity: "background".to_string(),
                message: e.to_string(),
            })?
    }
}
