use crate::error::{LodestoneError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tantivy::collector::Count;
use tantivy::query::TermQuery;
use tantivy::schema::IndexRecordOption;
use tantivy::{TantivyDocument, Term};
use tracing::{debug, error, info};

/// When the wrapper commits.
///
/// Interactive writes use `Flush` so a change is searchable as soon as the
/// call returns. Bulk loads use `Batch` and pay the commit cost once per
/// threshold instead of once per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Commit and reload the reader after every operation.
    Flush,
    /// Commit when either threshold is crossed, or on an explicit `flush()`.
    Batch {
        max_pending_ops: usize,
        max_pending_age: Duration,
    },
}

/// Operation counters since the wrapper was created. An update that
/// collapsed into a single replace counts once, under `updates`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub adds: u64,
    pub updates: u64,
    pub deletes: u64,
    pub flushes: u64,
}

struct WriterState {
    writer: tantivy::IndexWriter,
    pending_ops: usize,
    first_pending: Option<Instant>,
    stats: WriterStats,
}

impl WriterState {
    fn note_ops(&mut self, count: usize) {
        self.pending_ops += count;
        if self.first_pending.is_none() {
            self.first_pending = Some(Instant::now());
        }
    }
}

/// Serialized front door to the one logical `tantivy::IndexWriter` an index
/// owns. Concurrent writers queue on the mutex; operations never
/// interleave.
pub struct WriterWrapper {
    index: tantivy::Index,
    reader: tantivy::IndexReader,
    policy: FlushPolicy,
    state: Mutex<WriterState>,
}

impl WriterWrapper {
    pub fn new(
        index: tantivy::Index,
        reader: tantivy::IndexReader,
        policy: FlushPolicy,
        buffer_bytes: usize,
    ) -> Result<Self> {
        let writer: tantivy::IndexWriter = index.writer(buffer_bytes)?;
        Ok(WriterWrapper {
            index,
            reader,
            policy,
            state: Mutex::new(WriterState {
                writer,
                pending_ops: 0,
                first_pending: None,
                stats: WriterStats::default(),
            }),
        })
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    pub fn stats(&self) -> WriterStats {
        match self.state.lock() {
            Ok(state) => state.stats,
            Err(_) => WriterStats::default(),
        }
    }

    /// A poisoned lock means a writer thread panicked mid-operation; the
    /// wrapper is unusable from then on.
    fn state(&self) -> Result<MutexGuard<'_, WriterState>> {
        self.state.lock().map_err(|_| LodestoneError::WriterClosed)
    }

    /// Documents currently visible for `term`. Reads the committed view:
    /// pending uncommitted operations are not counted.
    pub fn committed_count(&self, term: &Term) -> Result<usize> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(term.clone(), IndexRecordOption::Basic);
        Ok(searcher.search(&query, &Count)?)
    }

    pub fn add_documents(&self, docs: Vec<TantivyDocument>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut state = self.state()?;
        let count = docs.len();
        for doc in docs {
            state.writer.add_document(doc)?;
        }
        state.stats.adds += count as u64;
        state.note_ops(count);
        self.apply_policy(state)
    }

    /// Replace whatever `term` currently matches with `docs`.
    ///
    /// The common case, one existing document replaced by one new one,
    /// collapses into a single update operation: the delete and the add ride
    /// the same uncommitted batch, so no searcher ever observes the zero-doc
    /// window. Anything else is a group delete (when priors exist) followed
    /// by the adds.
    pub fn update_documents(&self, term: Term, docs: Vec<TantivyDocument>) -> Result<()> {
        let prior = self.committed_count(&term)?;
        let mut state = self.state()?;
        if prior == 1 && docs.len() == 1 {
            state.writer.delete_term(term);
            for doc in docs {
                state.writer.add_document(doc)?;
            }
            state.stats.updates += 1;
            state.note_ops(1);
        } else {
            let mut ops = docs.len();
            if prior > 0 {
                state.writer.delete_term(term);
                state.stats.deletes += 1;
                ops += 1;
            }
            let count = docs.len();
            for doc in docs {
                state.writer.add_document(doc)?;
            }
            state.stats.adds += count as u64;
            state.note_ops(ops);
        }
        self.apply_policy(state)
    }

    pub fn delete_documents(&self, term: Term) -> Result<()> {
        let mut state = self.state()?;
        state.writer.delete_term(term);
        state.stats.deletes += 1;
        state.note_ops(1);
        self.apply_policy(state)
    }

    /// Commit pending operations and refresh the reader.
    pub fn flush(&self) -> Result<()> {
        let state = self.state()?;
        self.commit(state)
    }

    fn apply_policy(&self, state: MutexGuard<'_, WriterState>) -> Result<()> {
        match self.policy {
            FlushPolicy::Flush => self.commit(state),
            FlushPolicy::Batch {
                max_pending_ops,
                max_pending_age,
            } => {
                let over_ops = state.pending_ops >= max_pending_ops;
                let over_age = state
                    .first_pending
                    .map(|since| since.elapsed() >= max_pending_age)
                    .unwrap_or(false);
                if over_ops || over_age {
                    debug!(
                        pending = state.pending_ops,
                        over_ops, over_age, "batch threshold crossed"
                    );
                    self.commit(state)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn commit(&self, mut state: MutexGuard<'_, WriterState>) -> Result<()> {
        // Tantivy can panic inside commit on storage failure; contain it so
        // the caller sees an error, not a torn-down thread.
        match catch_unwind(AssertUnwindSafe(|| state.writer.commit())) {
            Ok(Ok(_opstamp)) => {}
            Ok(Err(e)) => {
                error!(error = %e, "index commit failed");
                return Err(e.into());
            }
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "unknown panic in index commit".to_string()
                };
                error!(message = %msg, "panic during index commit");
                return Err(LodestoneError::Tantivy(msg));
            }
        }
        state.pending_ops = 0;
        state.first_pending = None;
        state.stats.flushes += 1;
        drop(state);
        self.reader.reload()?;
        Ok(())
    }

    /// Force-merge all segments into one and garbage-collect stale files.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.state()?;
        let segment_ids = self.index.searchable_segment_ids()?;
        info!(segments = segment_ids.len(), "compacting index");
        if segment_ids.len() > 1 {
            // Blocks on tantivy's merge thread pool. None from wait() means
            // every document in the merged segments was deleted.
            state
                .writer
                .merge(&segment_ids)
                .wait()
                .map_err(|e| LodestoneError::Tantivy(e.to_string()))?;
        }
        state
            .writer
            .garbage_collect_files()
            .wait()
            .map_err(|e| LodestoneError::Tantivy(e.to_string()))?;
        drop(state);
        self.reader.reload()?;
        Ok(())
    }
}
