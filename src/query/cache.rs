use crate::handlers::ClauseHandler;
use crate::query::clause::Clause;
use crate::query::context::QueryContext;
use crate::types::User;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ContextKey {
    user: Option<String>,
    query: String,
}

impl ContextKey {
    fn new(user: Option<&User>, clause: &Clause) -> ContextKey {
        ContextKey {
            user: user.map(|u| u.key.clone()),
            query: clause.to_string(),
        }
    }
}

/// Both context variants for one (user, query) pair.
#[derive(Debug, Clone)]
pub struct CachedContexts {
    pub full: QueryContext,
    pub simple: QueryContext,
}

/// Memoizes computed query contexts and resolved handler lookups. Context
/// identity is the user plus the query's canonical text, so structurally
/// equal trees share an entry. Entries survive until [`invalidate`] runs,
/// which must happen whenever the handler registry is rebuilt.
///
/// [`invalidate`]: QueryContextCache::invalidate
#[derive(Default)]
pub struct QueryContextCache {
    contexts: DashMap<ContextKey, Arc<CachedContexts>>,
    handlers: DashMap<String, Arc<Vec<Arc<ClauseHandler>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contexts(
        &self,
        user: Option<&User>,
        clause: &Clause,
        compute: impl FnOnce() -> CachedContexts,
    ) -> Arc<CachedContexts> {
        let key = ContextKey::new(user, clause);
        if let Some(hit) = self.contexts.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let computed = Arc::new(compute());
        self.contexts.insert(key, computed.clone());
        computed
    }

    pub fn handlers(
        &self,
        name: &str,
        resolve: impl FnOnce() -> Vec<Arc<ClauseHandler>>,
    ) -> Arc<Vec<Arc<ClauseHandler>>> {
        let folded = name.to_lowercase();
        if let Some(hit) = self.handlers.get(&folded) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let resolved = Arc::new(resolve());
        self.handlers.insert(folded, resolved.clone());
        resolved
    }

    /// Drops every memoized entry. Readers holding an [`Arc`] keep their
    /// snapshot; new lookups recompute.
    pub fn invalidate(&self) {
        self.contexts.clear();
        self.handlers.clear();
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::context::{ClauseContext, QueryContext};

    fn pair() -> CachedContexts {
        CachedContexts {
            full: QueryContext::new(ClauseContext::none()),
            simple: QueryContext::all(),
        }
    }

    #[test]
    fn second_lookup_hits() {
        let cache = QueryContextCache::new();
        let clause = Clause::equals("catalog", "Widgets");

        cache.contexts(None, &clause, pair);
        cache.contexts(None, &clause, || panic!("must not recompute"));
        let (hits, misses) = cache.stats();
        assert_eq!((hits, misses), (1, 1));
    }

    #[test]
    fn different_users_get_distinct_entries() {
        let cache = QueryContextCache::new();
        let clause = Clause::equals("catalog", "Widgets");
        let alice = User::new("alice", "Alice");

        cache.contexts(None, &clause, pair);
        cache.contexts(Some(&alice), &clause, pair);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_clears_entries() {
        let cache = QueryContextCache::new();
        let clause = Clause::equals("catalog", "Widgets");
        cache.contexts(None, &clause, pair);
        cache.invalidate();
        assert!(cache.is_empty());
    }
}
