use crate::handlers::validators::{permitted_entity_ids, EntityDimension};
use crate::query::clause::{Operator, TerminalClause};
use crate::query::context::{ClauseContext, Scope, ScopeView};
use crate::query::operand::QueryLiteral;

/// Computes the scope set one leaf clause could possibly match. Factories
/// may only ever err on the wide side; returning `all` is always safe.
pub trait ClauseContextFactory: Send + Sync {
    fn clause_context(
        &self,
        clause: &TerminalClause,
        literals: &[QueryLiteral],
        view: &ScopeView<'_>,
    ) -> ClauseContext;
}

/// For fields whose value says nothing about catalogs or manufacturers.
pub struct AllScopesContextFactory;

impl ClauseContextFactory for AllScopesContextFactory {
    fn clause_context(
        &self,
        _clause: &TerminalClause,
        _literals: &[QueryLiteral],
        _view: &ScopeView<'_>,
    ) -> ClauseContext {
        ClauseContext::all()
    }
}

/// Narrows along one scope dimension when the clause pins it down. Only the
/// positive membership operators narrow; a negated or emptiness comparison
/// admits everything outside the named scopes, which is not representable,
/// so those stay at `all`.
pub struct EntityContextFactory {
    pub dimension: EntityDimension,
}

impl ClauseContextFactory for EntityContextFactory {
    fn clause_context(
        &self,
        clause: &TerminalClause,
        literals: &[QueryLiteral],
        view: &ScopeView<'_>,
    ) -> ClauseContext {
        if !matches!(clause.operator, Operator::Equals | Operator::In) {
            return ClauseContext::all();
        }

        let scopes = literals.iter().flat_map(|literal| {
            permitted_entity_ids(self.dimension, &literal.value, view)
                .into_iter()
                .map(|id| match self.dimension {
                    EntityDimension::Catalog => Scope::catalog(id),
                    EntityDimension::Manufacturer => Scope::manufacturer(id),
                })
        });
        // No resolvable scope means the clause provably matches nothing.
        ClauseContext::of(scopes)
    }
}
