//! The front door for query evaluation: normalize, validate, compile,
//! execute, and report, all against one pinned index generation.

use crate::error::{LodestoneError, Result};
use crate::handlers::{ClauseHandler, ClauseHandlerRegistry};
use crate::index::lifecycle::IndexLifecycleManager;
use crate::index::SearchLease;
use crate::query::cache::{CachedContexts, QueryContextCache};
use crate::query::clause::Clause;
use crate::query::compile::QueryCompiler;
use crate::query::context::{ContextExtractor, QueryContext, ScopeView};
use crate::query::messages::{keys, MessageSet};
use crate::query::normalize::normalize;
use crate::query::operand::{FunctionRegistry, ResolutionContext};
use crate::query::validate::ClauseValidator;
use crate::types::{AssetId, CatalogDirectory, ScopePermissions, User};
use std::sync::Arc;
use std::time::Instant;
use tantivy::collector::{Count, TopDocs};
use tantivy::schema::OwnedValue;
use tantivy::{DocAddress, TantivyDocument};
use tracing::debug;

use crate::index::fields::NULL_SORT_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Ordering request, named by handler field. The field must be registered
/// and sortable; anything else downgrades to score order with a warning.
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub limit: usize,
    pub offset: usize,
    pub sort: Option<SortSpec>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        SearchRequest {
            limit: 50,
            offset: 0,
            sort: None,
        }
    }
}

impl SearchRequest {
    pub fn page(limit: usize, offset: usize) -> Self {
        SearchRequest {
            limit,
            offset,
            sort: None,
        }
    }

    pub fn sorted_by(field: &str, order: SortOrder) -> Self {
        SearchRequest {
            sort: Some(SortSpec {
                field: field.to_string(),
                order,
            }),
            ..SearchRequest::default()
        }
    }
}

/// What a search returns: the page of asset ids in final order, the total
/// match count, and every message collected along the way. Validation
/// errors mean zero ids; warnings ride along with real results.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub ids: Vec<AssetId>,
    pub total: usize,
    pub messages: MessageSet,
}

impl SearchOutcome {
    fn rejected(messages: MessageSet) -> SearchOutcome {
        SearchOutcome {
            ids: Vec::new(),
            total: 0,
            messages,
        }
    }
}

/// Query evaluation service. Holds the field registry, the function
/// registry, the scope collaborators, and the index lifecycle it leases
/// searchers from.
pub struct SearchService {
    registry: Arc<ClauseHandlerRegistry>,
    functions: Arc<FunctionRegistry>,
    directory: Arc<dyn CatalogDirectory>,
    permissions: Arc<dyn ScopePermissions>,
    lifecycle: Arc<IndexLifecycleManager>,
    cache: QueryContextCache,
    max_clause_count: usize,
    max_depth: usize,
}

impl SearchService {
    pub fn new(
        registry: Arc<ClauseHandlerRegistry>,
        functions: Arc<FunctionRegistry>,
        directory: Arc<dyn CatalogDirectory>,
        permissions: Arc<dyn ScopePermissions>,
        lifecycle: Arc<IndexLifecycleManager>,
    ) -> Self {
        let defaults = crate::config::SearchConfig::default();
        SearchService {
            registry,
            functions,
            directory,
            permissions,
            lifecycle,
            cache: QueryContextCache::new(),
            max_clause_count: defaults.max_clause_count,
            max_depth: defaults.max_query_depth,
        }
    }

    pub fn with_limits(mut self, max_clause_count: usize, max_depth: usize) -> Self {
        self.max_clause_count = max_clause_count;
        self.max_depth = max_depth;
        self
    }

    pub fn registry(&self) -> &ClauseHandlerRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<IndexLifecycleManager> {
        &self.lifecycle
    }

    /// Rebuild the handler registry and drop every memoized context. Must
    /// run after custom field definitions change.
    pub fn refresh_fields(&self) -> Result<()> {
        self.registry.refresh()?;
        self.cache.invalidate();
        Ok(())
    }

    /// Handlers answering to `name` for this user, memoized per name.
    pub fn field_handlers(&self, name: &str) -> Arc<Vec<Arc<ClauseHandler>>> {
        self.cache
            .handlers(name, || self.registry.get_handlers(name))
    }

    /// Evaluate one clause tree and return the requested page of ids.
    pub fn search(
        &self,
        user: Option<&User>,
        clause: &Clause,
        request: &SearchRequest,
    ) -> Result<SearchOutcome> {
        let started = Instant::now();
        let normalized = normalize(clause);

        let mut messages = ClauseValidator::new(
            &self.registry,
            &self.functions,
            self.resolution(user),
            self.view(user),
        )
        .validate(&normalized);
        if messages.has_errors() {
            debug!(query = %normalized, errors = messages.len(), "query rejected by validation");
            return Ok(SearchOutcome::rejected(messages));
        }

        let lease = self.lifecycle.lease()?;
        let compiled = QueryCompiler::new(
            &self.registry,
            &self.functions,
            self.resolution(user),
            self.view(user),
            lease.schema(),
            self.max_clause_count,
            self.max_depth,
        )
        .compile(&normalized);
        let query = match compiled {
            Ok(query) => query,
            // An inexpressible clause is an answer about the query, not an
            // engine failure; it must stay distinguishable from zero hits.
            Err(LodestoneError::UnsupportedClause { field, operator }) => {
                messages.add_error(keys::CLAUSE_TOO_COMPLEX, &[field.as_str(), operator.as_str()]);
                return Ok(SearchOutcome::rejected(messages));
            }
            Err(other) => return Err(other),
        };

        let (total, page) = match &request.sort {
            Some(sort) => {
                self.sorted_page(&lease, query.as_ref(), sort, request, &mut messages)?
            }
            None => Self::scored_page(&lease, query.as_ref(), request)?,
        };

        let ids = self.collect_ids(&lease, page)?;
        debug!(
            query = %normalized,
            total,
            returned = ids.len(),
            elapsed = ?started.elapsed(),
            "search executed"
        );
        Ok(SearchOutcome {
            ids,
            total,
            messages,
        })
    }

    /// Count matches without materializing a page.
    pub fn count(&self, user: Option<&User>, clause: &Clause) -> Result<usize> {
        let outcome = self.search(
            user,
            clause,
            &SearchRequest {
                limit: 0,
                ..SearchRequest::default()
            },
        )?;
        Ok(outcome.total)
    }

    /// Full narrowing for a query: every (catalog, manufacturer) scope it
    /// could match. Memoized per user and canonical query text.
    pub fn query_context(&self, user: Option<&User>, clause: &Clause) -> QueryContext {
        self.cached_contexts(user, clause).full.clone()
    }

    /// Conservative narrowing that is cheap to reason about downstream;
    /// always covers the full context.
    pub fn simple_query_context(&self, user: Option<&User>, clause: &Clause) -> QueryContext {
        self.cached_contexts(user, clause).simple.clone()
    }

    pub fn context_cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    fn cached_contexts(&self, user: Option<&User>, clause: &Clause) -> Arc<CachedContexts> {
        self.cache.contexts(user, clause, || {
            let normalized = normalize(clause);
            let pair = ContextExtractor::new(
                &self.registry,
                &self.functions,
                self.resolution(user),
                self.view(user),
            )
            .extract(&normalized);
            CachedContexts {
                full: QueryContext::new(pair.full),
                simple: QueryContext::new(pair.simple),
            }
        })
    }

    fn resolution<'a>(&'a self, user: Option<&'a User>) -> ResolutionContext<'a> {
        ResolutionContext {
            user,
            now: chrono::Utc::now().naive_utc(),
            permissions: self.permissions.as_ref(),
        }
    }

    fn view<'a>(&'a self, user: Option<&'a User>) -> ScopeView<'a> {
        ScopeView {
            user,
            permissions: self.permissions.as_ref(),
            directory: self.directory.as_ref(),
        }
    }

    fn scored_page(
        lease: &SearchLease,
        query: &dyn tantivy::query::Query,
        request: &SearchRequest,
    ) -> Result<(usize, Vec<DocAddress>)> {
        let searcher = lease.searcher();
        if request.limit == 0 {
            let total = searcher.search(query, &Count)?;
            return Ok((total, Vec::new()));
        }
        let collector = TopDocs::with_limit(request.limit).and_offset(request.offset);
        let (total, hits) = searcher.search(query, &(Count, collector))?;
        Ok((total, hits.into_iter().map(|(_score, addr)| addr).collect()))
    }

    /// Lexicographic page ordering on a dedicated sort field. The match set
    /// is over-fetched, keyed from stored values, sorted in memory, and
    /// sliced to the requested page.
    fn sorted_page(
        &self,
        lease: &SearchLease,
        query: &dyn tantivy::query::Query,
        sort: &SortSpec,
        request: &SearchRequest,
        messages: &mut MessageSet,
    ) -> Result<(usize, Vec<DocAddress>)> {
        let sort_field = self
            .registry
            .get_handlers(&sort.field)
            .first()
            .and_then(|handler| handler.information.sort_field.clone())
            .and_then(|name| lease.schema().raw_field(&name));
        let Some(sort_field) = sort_field else {
            messages.add_warning(keys::SORT_UNSUPPORTED, &[sort.field.as_str()]);
            return Self::scored_page(lease, query, request);
        };

        let searcher = lease.searcher();
        let wanted = request.limit + request.offset;
        let prelim_limit = wanted.saturating_mul(100).max(1000);
        let collector = TopDocs::with_limit(prelim_limit);
        let (total, prelim) = searcher.search(query, &(Count, collector))?;

        let mut keyed: Vec<(String, DocAddress)> = Vec::with_capacity(prelim.len());
        for (_score, addr) in prelim {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let key = doc
                .get_first(sort_field)
                .map(|value| {
                    let owned: OwnedValue = value.into();
                    match owned {
                        OwnedValue::Str(text) => text,
                        _ => NULL_SORT_KEY.to_string(),
                    }
                })
                .unwrap_or_else(|| NULL_SORT_KEY.to_string());
            keyed.push((key, addr));
        }

        match sort.order {
            SortOrder::Asc => keyed.sort_by(|a, b| a.0.cmp(&b.0)),
            SortOrder::Desc => keyed.sort_by(|a, b| b.0.cmp(&a.0)),
        }

        let start = request.offset.min(keyed.len());
        let end = wanted.min(keyed.len());
        Ok((
            total,
            keyed[start..end].iter().map(|(_, addr)| *addr).collect(),
        ))
    }

    fn collect_ids(&self, lease: &SearchLease, page: Vec<DocAddress>) -> Result<Vec<AssetId>> {
        let searcher = lease.searcher();
        let id_field = lease.schema().id_field();
        let mut ids = Vec::with_capacity(page.len());
        for addr in page {
            let doc: TantivyDocument = searcher.doc(addr)?;
            if let Some(value) = doc.get_first(id_field) {
                let owned: OwnedValue = value.into();
                if let OwnedValue::U64(id) = owned {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}
