use crate::query::clause::{
    ChangedClause, Clause, ClauseVisitor, TerminalClause, WasClause,
};
use tracing::warn;

/// Rewrites a tree into an equivalent one with negation pushed into the
/// leaves: `NOT (a AND b)` becomes `(NOT a OR NOT b)` and `NOT (f = x)`
/// becomes `f != x`, for every operator pair in the negation table.
///
/// Negation state is a depth parity, not a recursive flag, so arbitrarily
/// stacked `Not(Not(...))` collapses in a single pass. The output of one
/// pass is a fixed point: normalizing it again returns an equal tree.
pub fn normalize(clause: &Clause) -> Clause {
    clause.accept(&mut DeMorganNormalizer { negations: 0 })
}

struct DeMorganNormalizer {
    negations: u32,
}

impl DeMorganNormalizer {
    fn negating(&self) -> bool {
        self.negations % 2 == 1
    }

    fn rewrite_children(&mut self, children: &[Clause]) -> Vec<Clause> {
        children.iter().map(|child| child.accept(self)).collect()
    }
}

impl ClauseVisitor for DeMorganNormalizer {
    type Output = Clause;

    fn visit_and(&mut self, children: &[Clause]) -> Clause {
        let rewritten = self.rewrite_children(children);
        if self.negating() {
            Clause::Or(rewritten)
        } else {
            Clause::And(rewritten)
        }
    }

    fn visit_or(&mut self, children: &[Clause]) -> Clause {
        let rewritten = self.rewrite_children(children);
        if self.negating() {
            Clause::And(rewritten)
        } else {
            Clause::Or(rewritten)
        }
    }

    fn visit_not(&mut self, child: &Clause) -> Clause {
        self.negations += 1;
        let rewritten = child.accept(self);
        self.negations -= 1;
        rewritten
    }

    fn visit_terminal(&mut self, clause: &TerminalClause) -> Clause {
        if !self.negating() {
            return Clause::Terminal(clause.clone());
        }
        match clause.operator.negated() {
            Some(negated) => Clause::Terminal(TerminalClause {
                field: clause.field.clone(),
                operator: negated,
                operand: clause.operand.clone(),
            }),
            None => {
                // Unreachable for the documented operator set; if a new
                // operator lands without a table entry we keep the Not
                // rather than silently dropping the negation.
                warn!(
                    operator = %clause.operator,
                    field = %clause.field,
                    "no negated operator defined, keeping NOT wrapper"
                );
                Clause::Not(Box::new(Clause::Terminal(clause.clone())))
            }
        }
    }

    fn visit_was(&mut self, clause: &WasClause) -> Clause {
        if !self.negating() {
            return Clause::Was(clause.clone());
        }
        match clause.operator.negated() {
            Some(negated) => Clause::Was(WasClause {
                field: clause.field.clone(),
                operator: negated,
                operand: clause.operand.clone(),
            }),
            None => {
                warn!(
                    operator = %clause.operator,
                    field = %clause.field,
                    "no negated operator defined, keeping NOT wrapper"
                );
                Clause::Not(Box::new(Clause::Was(clause.clone())))
            }
        }
    }

    fn visit_changed(&mut self, clause: &ChangedClause) -> Clause {
        if !self.negating() {
            return Clause::Changed(clause.clone());
        }
        match clause.operator.negated() {
            Some(negated) => Clause::Changed(ChangedClause {
                field: clause.field.clone(),
                operator: negated,
            }),
            None => {
                warn!(
                    operator = %clause.operator,
                    field = %clause.field,
                    "no negated operator defined, keeping NOT wrapper"
                );
                Clause::Not(Box::new(Clause::Changed(clause.clone())))
            }
        }
    }
}
