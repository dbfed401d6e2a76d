use crate::error::{LodestoneError, Result};
use crate::handlers::factories::{disjunction, match_all, match_nothing, negate};
use crate::handlers::{ClauseHandlerRegistry, QueryBuildEnv};
use crate::index::schema::AssetSchema;
use crate::query::clause::{
    ChangedClause, Clause, ClauseVisitor, Operator, TerminalClause, WasClause,
};
use crate::query::context::ScopeView;
use crate::query::messages::MessageSet;
use crate::query::operand::{FunctionRegistry, ResolutionContext};
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::Term;

/// Lowers a validated clause tree into one engine query. Logical nodes map
/// onto boolean combinations; each leaf delegates to its field's registered
/// factory.
pub struct QueryCompiler<'a> {
    registry: &'a ClauseHandlerRegistry,
    functions: &'a FunctionRegistry,
    resolution: ResolutionContext<'a>,
    view: ScopeView<'a>,
    schema: &'a AssetSchema,
    max_clause_count: usize,
    max_depth: usize,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(
        registry: &'a ClauseHandlerRegistry,
        functions: &'a FunctionRegistry,
        resolution: ResolutionContext<'a>,
        view: ScopeView<'a>,
        schema: &'a AssetSchema,
        max_clause_count: usize,
        max_depth: usize,
    ) -> Self {
        QueryCompiler {
            registry,
            functions,
            resolution,
            view,
            schema,
            max_clause_count,
            max_depth,
        }
    }

    pub fn compile(&mut self, clause: &Clause) -> Result<Box<dyn Query>> {
        let size = clause.size();
        if size > self.max_clause_count {
            return Err(LodestoneError::InvalidQuery(format!(
                "query has {} clauses, exceeds maximum {}",
                size, self.max_clause_count
            )));
        }
        let depth = clause.depth();
        if depth > self.max_depth {
            return Err(LodestoneError::InvalidQuery(format!(
                "query nests {} levels deep, exceeds maximum {}",
                depth, self.max_depth
            )));
        }
        clause.accept(self)
    }

    fn history_terms(&self, clause: &WasClause) -> Result<Vec<Box<dyn Query>>> {
        let handlers =
            self.registry
                .visible_handlers(&clause.field, self.view.user, self.view.permissions);
        let [handler] = handlers.as_slice() else {
            return Err(LodestoneError::FieldNotFound(clause.field.clone()));
        };
        let history_field = handler
            .information
            .history_field
            .as_deref()
            .ok_or_else(|| LodestoneError::UnsupportedClause {
                field: clause.field.clone(),
                operator: clause.operator.display_name().to_string(),
            })?;
        let field = self.schema.raw_field(history_field).ok_or_else(|| {
            LodestoneError::UnsupportedClause {
                field: clause.field.clone(),
                operator: clause.operator.display_name().to_string(),
            }
        })?;

        let mut scratch = MessageSet::new();
        let literals = clause
            .operand
            .resolve(&self.resolution, self.functions, &mut scratch);
        Ok(literals
            .iter()
            .filter_map(|l| l.value.as_text())
            .map(|text| {
                Box::new(TermQuery::new(
                    Term::from_field_text(field, &text.to_lowercase()),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>
            })
            .collect())
    }
}

impl ClauseVisitor for QueryCompiler<'_> {
    type Output = Result<Box<dyn Query>>;

    fn visit_and(&mut self, children: &[Clause]) -> Result<Box<dyn Query>> {
        if children.is_empty() {
            return Ok(match_all());
        }
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push((Occur::Must, child.accept(self)?));
        }
        Ok(Box::new(BooleanQuery::new(parts)))
    }

    fn visit_or(&mut self, children: &[Clause]) -> Result<Box<dyn Query>> {
        if children.is_empty() {
            return Ok(match_nothing());
        }
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push((Occur::Should, child.accept(self)?));
        }
        Ok(Box::new(BooleanQuery::new(parts)))
    }

    fn visit_not(&mut self, child: &Clause) -> Result<Box<dyn Query>> {
        // Normalization removes NOT wherever an operator negation exists;
        // anything left is compiled as complement against all documents.
        let inner = child.accept(self)?;
        Ok(negate(match_all(), inner))
    }

    fn visit_terminal(&mut self, clause: &TerminalClause) -> Result<Box<dyn Query>> {
        let handlers =
            self.registry
                .visible_handlers(&clause.field, self.view.user, self.view.permissions);
        let handler = match handlers.as_slice() {
            [] => return Err(LodestoneError::FieldNotFound(clause.field.clone())),
            [handler] => handler,
            _ => return Err(LodestoneError::AmbiguousField(clause.field.clone())),
        };

        let mut scratch = MessageSet::new();
        let literals = clause
            .operand
            .resolve(&self.resolution, self.functions, &mut scratch);
        let env = QueryBuildEnv {
            schema: self.schema,
            view: &self.view,
        };
        handler
            .factory
            .build(clause, &handler.information, &literals, &env)
    }

    fn visit_was(&mut self, clause: &WasClause) -> Result<Box<dyn Query>> {
        let terms = self.history_terms(clause)?;
        match clause.operator {
            Operator::Was | Operator::WasIn => Ok(disjunction(terms)),
            Operator::WasNot | Operator::WasNotIn => {
                Ok(negate(match_all(), disjunction(terms)))
            }
            _ => Err(LodestoneError::UnsupportedClause {
                field: clause.field.clone(),
                operator: clause.operator.display_name().to_string(),
            }),
        }
    }

    fn visit_changed(&mut self, clause: &ChangedClause) -> Result<Box<dyn Query>> {
        let handlers =
            self.registry
                .visible_handlers(&clause.field, self.view.user, self.view.permissions);
        let [handler] = handlers.as_slice() else {
            return Err(LodestoneError::FieldNotFound(clause.field.clone()));
        };
        if handler.information.history_field.is_none() {
            return Err(LodestoneError::UnsupportedClause {
                field: clause.field.clone(),
                operator: clause.operator.display_name().to_string(),
            });
        }

        let marker = Box::new(TermQuery::new(
            Term::from_field_text(
                self.schema.changed_fields(),
                &handler.information.name.to_lowercase(),
            ),
            IndexRecordOption::Basic,
        )) as Box<dyn Query>;

        match clause.operator {
            Operator::Changed => Ok(marker),
            Operator::NotChanged => Ok(negate(match_all(), marker)),
            _ => Err(LodestoneError::UnsupportedClause {
                field: clause.field.clone(),
                operator: clause.operator.display_name().to_string(),
            }),
        }
    }
}
