use crate::handlers::ClauseHandlerRegistry;
use crate::query::clause::{ChangedClause, Clause, ClauseVisitor, TerminalClause, WasClause};
use crate::query::messages::MessageSet;
use crate::query::operand::{FunctionRegistry, ResolutionContext};
use crate::types::{CatalogDirectory, CatalogId, ManufacturerId, ScopePermissions, User};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// One dimension of a scope: a concrete id or the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeId {
    Any,
    Id(u64),
}

impl ScopeId {
    fn intersect(self, other: ScopeId) -> Option<ScopeId> {
        match (self, other) {
            (ScopeId::Any, x) | (x, ScopeId::Any) => Some(x),
            (ScopeId::Id(a), ScopeId::Id(b)) if a == b => Some(ScopeId::Id(a)),
            _ => None,
        }
    }

    fn covers(self, other: ScopeId) -> bool {
        match (self, other) {
            (ScopeId::Any, _) => true,
            (ScopeId::Id(a), ScopeId::Id(b)) => a == b,
            (ScopeId::Id(_), ScopeId::Any) => false,
        }
    }

    pub fn is_any(self) -> bool {
        matches!(self, ScopeId::Any)
    }
}

/// A (catalog, manufacturer) pair a clause could possibly match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub catalog: ScopeId,
    pub manufacturer: ScopeId,
}

impl Scope {
    pub const ALL: Scope = Scope {
        catalog: ScopeId::Any,
        manufacturer: ScopeId::Any,
    };

    pub fn catalog(id: CatalogId) -> Scope {
        Scope {
            catalog: ScopeId::Id(id),
            manufacturer: ScopeId::Any,
        }
    }

    pub fn manufacturer(id: ManufacturerId) -> Scope {
        Scope {
            catalog: ScopeId::Any,
            manufacturer: ScopeId::Id(id),
        }
    }

    fn intersect(&self, other: &Scope) -> Option<Scope> {
        Some(Scope {
            catalog: self.catalog.intersect(other.catalog)?,
            manufacturer: self.manufacturer.intersect(other.manufacturer)?,
        })
    }

    fn covers(&self, other: &Scope) -> bool {
        self.catalog.covers(other.catalog) && self.manufacturer.covers(other.manufacturer)
    }
}

/// The scope set one clause (or subtree) could match. The two distinguished
/// values are `all` (no narrowing, a single wildcard pair) and `none` (an
/// empty set, the clause provably matches nothing).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClauseContext {
    scopes: IndexSet<Scope>,
}

impl ClauseContext {
    pub fn all() -> ClauseContext {
        let mut scopes = IndexSet::new();
        scopes.insert(Scope::ALL);
        ClauseContext { scopes }
    }

    pub fn none() -> ClauseContext {
        ClauseContext::default()
    }

    pub fn of<I: IntoIterator<Item = Scope>>(scopes: I) -> ClauseContext {
        let scopes: IndexSet<Scope> = scopes.into_iter().collect();
        if scopes.contains(&Scope::ALL) {
            return ClauseContext::all();
        }
        ClauseContext { scopes }
    }

    pub fn is_all(&self) -> bool {
        self.scopes.contains(&Scope::ALL)
    }

    pub fn is_none(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Pairwise scope merge. Incompatible pairs (different concrete ids on
    /// the same dimension) drop out; an empty result means the combination
    /// can match nothing.
    pub fn intersect(&self, other: &ClauseContext) -> ClauseContext {
        let mut merged = IndexSet::new();
        for left in &self.scopes {
            for right in &other.scopes {
                if let Some(scope) = left.intersect(right) {
                    merged.insert(scope);
                }
            }
        }
        ClauseContext::of(merged)
    }

    pub fn union(&self, other: &ClauseContext) -> ClauseContext {
        ClauseContext::of(self.scopes.iter().chain(other.scopes.iter()).copied())
    }

    /// True when every scope of `other` is covered by some scope here. This
    /// is the superset relation behind "simple covers full".
    pub fn covers(&self, other: &ClauseContext) -> bool {
        other
            .scopes
            .iter()
            .all(|needed| self.scopes.iter().any(|have| have.covers(needed)))
    }

    /// Whether any scope constrains the catalog and/or the manufacturer
    /// dimension. `none` constrains nothing.
    fn narrowed_dimensions(&self) -> (bool, bool) {
        let catalog = self.scopes.iter().any(|s| !s.catalog.is_any());
        let manufacturer = self.scopes.iter().any(|s| !s.manufacturer.is_any());
        (catalog, manufacturer)
    }
}

/// The final narrowing computed for a whole query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    context: ClauseContext,
}

impl QueryContext {
    pub fn new(context: ClauseContext) -> QueryContext {
        QueryContext { context }
    }

    pub fn all() -> QueryContext {
        QueryContext {
            context: ClauseContext::all(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.context.is_all()
    }

    pub fn is_none(&self) -> bool {
        self.context.is_none()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.context.scopes()
    }

    /// Concrete catalog ids this query is limited to, or `None` when the
    /// catalog dimension is unbounded somewhere.
    pub fn catalog_ids(&self) -> Option<Vec<CatalogId>> {
        let mut ids = Vec::new();
        for scope in self.context.scopes() {
            match scope.catalog {
                ScopeId::Id(id) => {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ScopeId::Any => return None,
            }
        }
        Some(ids)
    }

    pub fn manufacturer_ids(&self) -> Option<Vec<ManufacturerId>> {
        let mut ids = Vec::new();
        for scope in self.context.scopes() {
            match scope.manufacturer {
                ScopeId::Id(id) => {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ScopeId::Any => return None,
            }
        }
        Some(ids)
    }

    pub fn covers(&self, other: &QueryContext) -> bool {
        self.context.covers(&other.context)
    }

    pub fn inner(&self) -> &ClauseContext {
        &self.context
    }
}

/// What a context factory gets to see: who is asking plus the directories
/// needed to turn names into ids.
pub struct ScopeView<'a> {
    pub user: Option<&'a User>,
    pub permissions: &'a dyn ScopePermissions,
    pub directory: &'a dyn CatalogDirectory,
}

/// Full and simple narrowing for the same tree, produced together by one
/// traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPair {
    pub full: ClauseContext,
    pub simple: ClauseContext,
}

impl ContextPair {
    fn all() -> ContextPair {
        ContextPair {
            full: ClauseContext::all(),
            simple: ClauseContext::all(),
        }
    }
}

/// Computes both context variants for a clause tree.
///
/// Full narrows as far as the clause handlers allow. Simple follows along
/// but gives up, dropping to `all`, wherever narrowing would need reasoning
/// it cannot do safely: any NOT, any history leaf, any clause shape without
/// exactly one recognized handler, and any OR whose branches narrow
/// different dimensions. Simple therefore always covers full.
pub struct ContextExtractor<'a> {
    registry: &'a ClauseHandlerRegistry,
    functions: &'a FunctionRegistry,
    resolution: ResolutionContext<'a>,
    view: ScopeView<'a>,
}

impl<'a> ContextExtractor<'a> {
    pub fn new(
        registry: &'a ClauseHandlerRegistry,
        functions: &'a FunctionRegistry,
        resolution: ResolutionContext<'a>,
        view: ScopeView<'a>,
    ) -> Self {
        ContextExtractor {
            registry,
            functions,
            resolution,
            view,
        }
    }

    pub fn extract(&mut self, clause: &Clause) -> ContextPair {
        clause.accept(self)
    }
}

impl ClauseVisitor for ContextExtractor<'_> {
    type Output = ContextPair;

    fn visit_and(&mut self, children: &[Clause]) -> ContextPair {
        let mut result: Option<ContextPair> = None;
        for child in children {
            let pair = child.accept(self);
            result = Some(match result {
                None => pair,
                Some(acc) => ContextPair {
                    full: acc.full.intersect(&pair.full),
                    simple: acc.simple.intersect(&pair.simple),
                },
            });
        }
        result.unwrap_or_else(ContextPair::all)
    }

    fn visit_or(&mut self, children: &[Clause]) -> ContextPair {
        let mut full = ClauseContext::none();
        let mut simple = ClauseContext::none();
        let mut degrade = false;
        let mut seen_catalog = false;
        let mut seen_manufacturer = false;

        for child in children {
            let pair = child.accept(self);
            full = full.union(&pair.full);
            if pair.simple.is_all() {
                degrade = true;
            }
            let (catalog, manufacturer) = pair.simple.narrowed_dimensions();
            seen_catalog |= catalog;
            seen_manufacturer |= manufacturer;
            simple = simple.union(&pair.simple);
        }

        // A disjunction that narrows catalogs in one branch and
        // manufacturers in another is beyond what the simple variant
        // promises to represent.
        if degrade || (seen_catalog && seen_manufacturer) {
            simple = ClauseContext::all();
        }

        ContextPair { full, simple }
    }

    fn visit_not(&mut self, _child: &Clause) -> ContextPair {
        // The complement of a narrowed scope set is not enumerated.
        ContextPair::all()
    }

    fn visit_terminal(&mut self, clause: &TerminalClause) -> ContextPair {
        let handlers = self
            .registry
            .visible_handlers(&clause.field, self.view.user, self.view.permissions);
        let [handler] = handlers.as_slice() else {
            return ContextPair::all();
        };

        let mut scratch = MessageSet::new();
        let literals = clause
            .operand
            .resolve(&self.resolution, self.functions, &mut scratch);
        let context = handler
            .context_factory
            .clause_context(clause, &literals, &self.view);
        ContextPair {
            full: context.clone(),
            simple: context,
        }
    }

    fn visit_was(&mut self, _clause: &WasClause) -> ContextPair {
        ContextPair::all()
    }

    fn visit_changed(&mut self, _clause: &ChangedClause) -> ContextPair {
        ContextPair::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_drops_incompatible_pairs() {
        let widgets = ClauseContext::of([Scope::catalog(1)]);
        let gadgets = ClauseContext::of([Scope::catalog(2)]);
        assert!(widgets.intersect(&gadgets).is_none());

        let either = ClauseContext::of([Scope::catalog(1), Scope::catalog(2)]);
        let narrowed = either.intersect(&widgets);
        assert_eq!(narrowed, widgets);
    }

    #[test]
    fn all_is_intersection_identity() {
        let ctx = ClauseContext::of([Scope::catalog(4), Scope::manufacturer(9)]);
        assert_eq!(ClauseContext::all().intersect(&ctx), ctx);
        assert_eq!(ctx.intersect(&ClauseContext::all()), ctx);
    }

    #[test]
    fn union_collapses_to_all_when_wildcard_present() {
        let ctx = ClauseContext::of([Scope::catalog(4)]);
        let merged = ctx.union(&ClauseContext::all());
        assert!(merged.is_all());
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn covers_is_reflexive_and_respects_wildcards() {
        let narrow = ClauseContext::of([Scope::catalog(3)]);
        assert!(narrow.covers(&narrow));
        assert!(ClauseContext::all().covers(&narrow));
        assert!(!narrow.covers(&ClauseContext::all()));
        assert!(narrow.covers(&ClauseContext::none()));
    }

    #[test]
    fn query_context_exposes_concrete_catalogs_only() {
        let bounded = QueryContext::new(ClauseContext::of([Scope::catalog(1), Scope::catalog(2)]));
        assert_eq!(bounded.catalog_ids(), Some(vec![1, 2]));
        assert_eq!(bounded.manufacturer_ids(), None);

        let unbounded = QueryContext::all();
        assert_eq!(unbounded.catalog_ids(), None);
    }
}
