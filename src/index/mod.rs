//! Tantivy-backed asset index: schema, per-field document assembly, the
//! committing writer wrapper, and generation lifecycle management.

pub mod fields;
pub mod lifecycle;
pub mod schema;
pub mod writer;

use crate::error::Result;
use schema::AssetSchema;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::Index as TantivyIndex;

pub use fields::{FieldIndexer, FieldIndexerManager};
pub use lifecycle::{
    AssetIndexManager, BackgroundReindex, CancellationFlag, EntityIndexManager,
    IndexLifecycleManager, ReindexProgress,
};
pub use writer::{FlushPolicy, WriterStats, WriterWrapper};

/// One generation of the asset index: a tantivy index in its own directory,
/// the reader every search goes through, and the single writer.
///
/// The reader uses manual reload; [`WriterWrapper`] reloads it after each
/// commit, so visibility changes exactly at flush boundaries.
pub struct AssetIndex {
    inner: TantivyIndex,
    reader: tantivy::IndexReader,
    schema: Arc<AssetSchema>,
    writer: WriterWrapper,
    dir: Option<PathBuf>,
}

impl AssetIndex {
    pub const DEFAULT_BUFFER_SIZE: usize = 20_000_000;

    /// Create a fresh index under `dir`, creating the directory if needed.
    pub fn create_in_dir<P: AsRef<Path>>(
        dir: P,
        schema: Arc<AssetSchema>,
        policy: FlushPolicy,
        buffer_bytes: usize,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let inner = TantivyIndex::create_in_dir(dir.as_ref(), schema.tantivy().clone())?;
        Self::from_parts(inner, schema, policy, buffer_bytes, Some(dir.as_ref().into()))
    }

    /// Open an index previously created under `dir`.
    pub fn open_in_dir<P: AsRef<Path>>(
        dir: P,
        schema: Arc<AssetSchema>,
        policy: FlushPolicy,
        buffer_bytes: usize,
    ) -> Result<Self> {
        let inner = TantivyIndex::open_in_dir(dir.as_ref())?;
        Self::from_parts(inner, schema, policy, buffer_bytes, Some(dir.as_ref().into()))
    }

    /// RAM-backed index for tests and embedding.
    pub fn create_in_ram(schema: Arc<AssetSchema>, policy: FlushPolicy) -> Result<Self> {
        let inner = TantivyIndex::create_in_ram(schema.tantivy().clone());
        Self::from_parts(inner, schema, policy, Self::DEFAULT_BUFFER_SIZE, None)
    }

    fn from_parts(
        inner: TantivyIndex,
        schema: Arc<AssetSchema>,
        policy: FlushPolicy,
        buffer_bytes: usize,
        dir: Option<PathBuf>,
    ) -> Result<Self> {
        // Analyzers are not persisted with the index; registration has to
        // happen on the open path as well or stored segments stop tokenizing.
        schema.register_analyzers(&inner);
        let reader: tantivy::IndexReader = inner
            .reader_builder()
            .reload_policy(tantivy::ReloadPolicy::Manual)
            .try_into()?;
        // Reader handles share state, so the writer's post-commit reload is
        // visible through this one as well.
        let writer = WriterWrapper::new(inner.clone(), reader.clone(), policy, buffer_bytes)?;
        Ok(AssetIndex {
            inner,
            reader,
            schema,
            writer,
            dir,
        })
    }

    pub fn schema(&self) -> &AssetSchema {
        &self.schema
    }

    pub fn schema_handle(&self) -> Arc<AssetSchema> {
        Arc::clone(&self.schema)
    }

    pub fn writer(&self) -> &WriterWrapper {
        &self.writer
    }

    pub fn reader(&self) -> &tantivy::IndexReader {
        &self.reader
    }

    pub fn tantivy(&self) -> &TantivyIndex {
        &self.inner
    }

    /// Directory this generation lives in; `None` for RAM-backed indexes.
    pub fn directory(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Documents visible to searches right now.
    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Hand out a searcher pinned to this generation. The lease keeps the
    /// generation alive: a superseded index is closed only after the last
    /// lease drops.
    pub fn lease(self: &Arc<Self>) -> SearchLease {
        SearchLease {
            index: Arc::clone(self),
            searcher: self.reader.searcher(),
        }
    }
}

impl std::fmt::Debug for AssetIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetIndex")
            .field("dir", &self.dir)
            .field("docs", &self.doc_count())
            .finish_non_exhaustive()
    }
}

/// A searcher plus the `Arc` that keeps its generation's files open. Held
/// for the duration of one search; dropping it releases the generation.
pub struct SearchLease {
    index: Arc<AssetIndex>,
    searcher: tantivy::Searcher,
}

impl SearchLease {
    pub fn searcher(&self) -> &tantivy::Searcher {
        &self.searcher
    }

    pub fn schema(&self) -> &AssetSchema {
        self.index.schema()
    }

    pub fn index(&self) -> &AssetIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::InMemoryCustomFields;
    use crate::types::Asset;
    use tempfile::TempDir;

    fn fields(schema: &Arc<AssetSchema>) -> FieldIndexerManager {
        FieldIndexerManager::new(
            Arc::clone(schema),
            Arc::new(InMemoryCustomFields::default()),
        )
    }

    #[test]
    fn create_then_reopen_keeps_documents_searchable() {
        let dir = TempDir::new().unwrap();
        let schema = Arc::new(AssetSchema::new());
        {
            let index = AssetIndex::create_in_dir(
                dir.path(),
                Arc::clone(&schema),
                FlushPolicy::Flush,
                AssetIndex::DEFAULT_BUFFER_SIZE,
            )
            .unwrap();
            let fields = fields(&schema);
            index
                .writer()
                .add_documents(vec![fields.build_document(&Asset::new(1, "S-1", "Gear", 1))])
                .unwrap();
            assert_eq!(index.doc_count(), 1);
        }

        let reopened = AssetIndex::open_in_dir(
            dir.path(),
            Arc::clone(&schema),
            FlushPolicy::Flush,
            AssetIndex::DEFAULT_BUFFER_SIZE,
        )
        .unwrap();
        assert_eq!(reopened.doc_count(), 1);

        // The open path registered analyzers too, so writes into existing
        // text fields still tokenize.
        let fields = fields(&schema);
        reopened
            .writer()
            .add_documents(vec![fields.build_document(&Asset::new(
                2,
                "S-2",
                "Rotating Gear",
                1,
            ))])
            .unwrap();
        assert_eq!(reopened.doc_count(), 2);
    }

    #[test]
    fn lease_pins_the_generation() {
        let schema = Arc::new(AssetSchema::new());
        let index =
            Arc::new(AssetIndex::create_in_ram(Arc::clone(&schema), FlushPolicy::Flush).unwrap());
        let fields = fields(&schema);
        index
            .writer()
            .add_documents(vec![fields.build_document(&Asset::new(1, "S-1", "Gear", 1))])
            .unwrap();

        let lease = index.lease();
        assert_eq!(Arc::strong_count(&index), 2);
        assert_eq!(lease.searcher().num_docs(), 1);

        // A write after the lease was taken stays invisible to it.
        index
            .writer()
            .add_documents(vec![fields.build_document(&Asset::new(2, "S-2", "Gear", 1))])
            .unwrap();
        assert_eq!(lease.searcher().num_docs(), 1);
        assert_eq!(index.doc_count(), 2);

        drop(lease);
        assert_eq!(Arc::strong_count(&index), 1);
    }
}
