use crate::handlers::ClauseHandlerRegistry;
use crate::query::clause::{
    ChangedClause, Clause, ClauseVisitor, Operator, TerminalClause, WasClause,
};
use crate::query::context::ScopeView;
use crate::query::messages::{keys, MessageSet};
use crate::query::operand::{FunctionRegistry, Operand, ResolutionContext};

/// Walks every leaf of a tree and collects everything wrong with it. Never
/// short-circuits: a query with five bad clauses reports all five. Traversal
/// is pre-order, left to right, so message order is stable for a tree.
pub struct ClauseValidator<'a> {
    registry: &'a ClauseHandlerRegistry,
    functions: &'a FunctionRegistry,
    resolution: ResolutionContext<'a>,
    view: ScopeView<'a>,
}

impl<'a> ClauseValidator<'a> {
    pub fn new(
        registry: &'a ClauseHandlerRegistry,
        functions: &'a FunctionRegistry,
        resolution: ResolutionContext<'a>,
        view: ScopeView<'a>,
    ) -> Self {
        ClauseValidator {
            registry,
            functions,
            resolution,
            view,
        }
    }

    pub fn validate(&mut self, clause: &Clause) -> MessageSet {
        clause.accept(self)
    }

    fn validate_leaf(
        &mut self,
        field: &str,
        operator: Operator,
        operand: Option<&Operand>,
    ) -> MessageSet {
        let mut messages = MessageSet::new();

        // A field hidden by permission reports the same way as one that
        // does not exist.
        let handlers =
            self.registry
                .visible_handlers(field, self.view.user, self.view.permissions);
        let handler = match handlers.as_slice() {
            [] => {
                messages.add_error(keys::UNKNOWN_FIELD, &[field]);
                return messages;
            }
            [handler] => handler.clone(),
            _ => {
                messages.add_error(keys::AMBIGUOUS_FIELD, &[field]);
                return messages;
            }
        };

        let info = &handler.information;
        if !info.supports(operator) {
            messages.add_error(
                keys::UNSUPPORTED_OPERATOR,
                &[operator.display_name(), field],
            );
            return messages;
        }

        let Some(operand) = operand else {
            // CHANGED / NOT CHANGED carry no operand; operator support was
            // the whole check.
            return messages;
        };

        if operator.is_emptiness() {
            if !operand.is_empty_operand() {
                messages.add_error(keys::EMPTY_REQUIRED, &[field, operator.display_name()]);
                return messages;
            }
        } else if operand.is_empty_operand() {
            messages.add_error(keys::EMPTY_NOT_ALLOWED, &[field, operator.display_name()]);
            return messages;
        } else if !operator.is_list() && matches!(operand, Operand::Multi(_)) {
            messages.add_error(keys::SINGLE_REQUIRED, &[field, operator.display_name()]);
            return messages;
        }

        let literals = operand.resolve(&self.resolution, self.functions, &mut messages);
        let probe = TerminalClause {
            field: field.to_string(),
            operator,
            operand: operand.clone(),
        };
        handler
            .validator
            .validate(&probe, info, &literals, &self.view, &mut messages);
        messages
    }
}

impl ClauseVisitor for ClauseValidator<'_> {
    type Output = MessageSet;

    fn visit_and(&mut self, children: &[Clause]) -> MessageSet {
        let mut messages = MessageSet::new();
        // A group with no children is a malformed tree, usually the residue
        // of a buggy rewrite.
        if children.is_empty() {
            messages.add_error(keys::EMPTY_GROUP, &["AND"]);
        }
        for child in children {
            messages.merge(child.accept(self));
        }
        messages
    }

    fn visit_or(&mut self, children: &[Clause]) -> MessageSet {
        let mut messages = MessageSet::new();
        if children.is_empty() {
            messages.add_error(keys::EMPTY_GROUP, &["OR"]);
        }
        for child in children {
            messages.merge(child.accept(self));
        }
        messages
    }

    fn visit_not(&mut self, child: &Clause) -> MessageSet {
        child.accept(self)
    }

    fn visit_terminal(&mut self, clause: &TerminalClause) -> MessageSet {
        self.validate_leaf(&clause.field, clause.operator, Some(&clause.operand))
    }

    fn visit_was(&mut self, clause: &WasClause) -> MessageSet {
        self.validate_leaf(&clause.field, clause.operator, Some(&clause.operand))
    }

    fn visit_changed(&mut self, clause: &ChangedClause) -> MessageSet {
        self.validate_leaf(&clause.field, clause.operator, None)
    }
}
