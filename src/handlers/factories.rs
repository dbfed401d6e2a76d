use crate::error::{LodestoneError, Result};
use crate::handlers::validators::{parse_date_literal, permitted_entity_ids, EntityDimension};
use crate::handlers::FieldInformation;
use crate::index::schema::AssetSchema;
use crate::query::clause::{Operator, TerminalClause};
use crate::query::context::ScopeView;
use crate::query::operand::{LiteralValue, QueryLiteral};
use crate::types::canonical_timestamp;
use std::ops::Bound;
use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, Occur, PhraseQuery, Query, RangeQuery, TermQuery,
};
use tantivy::schema::IndexRecordOption;
use tantivy::Term;

/// What a factory gets to work with when turning one leaf clause into an
/// engine query.
pub struct QueryBuildEnv<'a> {
    pub schema: &'a AssetSchema,
    pub view: &'a ScopeView<'a>,
}

/// Builds the index-engine query fragment for one leaf clause. A factory
/// that cannot express the clause returns an error; "matches nothing" is an
/// [`EmptyQuery`], which is a different outcome.
pub trait ClauseQueryFactory: Send + Sync {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>>;
}

pub(crate) fn match_nothing() -> Box<dyn Query> {
    Box::new(EmptyQuery)
}

pub(crate) fn match_all() -> Box<dyn Query> {
    Box::new(AllQuery)
}

/// `base AND NOT inner`. The underlying engine cannot evaluate a bare
/// must-not, so every negation is anchored on a positive query.
pub(crate) fn negate(base: Box<dyn Query>, inner: Box<dyn Query>) -> Box<dyn Query> {
    Box::new(BooleanQuery::new(vec![
        (Occur::Must, base),
        (Occur::MustNot, inner),
    ]))
}

pub(crate) fn disjunction(mut queries: Vec<Box<dyn Query>>) -> Box<dyn Query> {
    match queries.len() {
        0 => match_nothing(),
        1 => queries.pop().expect("len checked"),
        _ => Box::new(BooleanQuery::new(
            queries.into_iter().map(|q| (Occur::Should, q)).collect(),
        )),
    }
}

pub(crate) fn conjunction(mut queries: Vec<Box<dyn Query>>) -> Box<dyn Query> {
    match queries.len() {
        0 => match_nothing(),
        1 => queries.pop().expect("len checked"),
        _ => Box::new(BooleanQuery::new(
            queries.into_iter().map(|q| (Occur::Must, q)).collect(),
        )),
    }
}

fn term_query(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

/// Matches assets whose sidecar records a value under the field's canonical
/// name.
pub(crate) fn presence(schema: &AssetSchema, info: &FieldInformation) -> Box<dyn Query> {
    term_query(Term::from_field_text(
        schema.nonempty_fields(),
        &info.name.to_lowercase(),
    ))
}

/// Matches assets with no value for the field.
pub(crate) fn absence(schema: &AssetSchema, info: &FieldInformation) -> Box<dyn Query> {
    negate(match_all(), presence(schema, info))
}

fn unsupported(clause: &TerminalClause) -> LodestoneError {
    LodestoneError::UnsupportedClause {
        field: clause.field.clone(),
        operator: clause.operator.display_name().to_string(),
    }
}

fn phrase_or_term(terms: Vec<Term>) -> Box<dyn Query> {
    match terms.len() {
        0 => match_nothing(),
        1 => term_query(terms.into_iter().next().expect("len checked")),
        _ => Box::new(PhraseQuery::new(terms)),
    }
}

/// Tokenized text fields. Equality is an exact phrase over the un-stemmed
/// shadow field; `~` matches the stemmed tokens.
pub struct TextQueryFactory;

impl TextQueryFactory {
    fn equals_one(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literal: &QueryLiteral,
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        match &literal.value {
            LiteralValue::Empty => Ok(absence(env.schema, info)),
            value => {
                let exact = env
                    .schema
                    .exact_variant(&info.index_field)
                    .ok_or_else(|| unsupported(clause))?;
                let terms = env.schema.exact_terms(exact, &value.to_index_text());
                Ok(phrase_or_term(terms))
            }
        }
    }

    fn like_one(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literal: &QueryLiteral,
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        let field = env
            .schema
            .text_field(&info.index_field)
            .ok_or_else(|| unsupported(clause))?;
        let terms = env
            .schema
            .stemmed_terms(field, &literal.value.to_index_text());
        Ok(conjunction(terms.into_iter().map(term_query).collect()))
    }
}

impl ClauseQueryFactory for TextQueryFactory {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        match clause.operator {
            Operator::Equals | Operator::In => {
                let branches = literals
                    .iter()
                    .map(|l| self.equals_one(clause, info, l, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(disjunction(branches))
            }
            Operator::NotEquals | Operator::NotIn => {
                let branches = literals
                    .iter()
                    .map(|l| self.equals_one(clause, info, l, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(negate(presence(env.schema, info), disjunction(branches)))
            }
            Operator::Like => {
                let branches = literals
                    .iter()
                    .map(|l| self.like_one(clause, info, l, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(disjunction(branches))
            }
            Operator::NotLike => {
                let branches = literals
                    .iter()
                    .map(|l| self.like_one(clause, info, l, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(negate(presence(env.schema, info), disjunction(branches)))
            }
            Operator::Is => Ok(absence(env.schema, info)),
            Operator::IsNot => Ok(presence(env.schema, info)),
            _ => Err(unsupported(clause)),
        }
    }
}

/// Raw identifier fields (SKU). Values match byte for byte, untokenized and
/// case-sensitive.
pub struct IdentifierQueryFactory;

impl IdentifierQueryFactory {
    fn equals_one(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literal: &QueryLiteral,
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        let field = env
            .schema
            .raw_field(&info.index_field)
            .ok_or_else(|| unsupported(clause))?;
        match &literal.value {
            LiteralValue::Empty => Ok(absence(env.schema, info)),
            value => Ok(term_query(Term::from_field_text(
                field,
                &value.to_index_text(),
            ))),
        }
    }
}

impl ClauseQueryFactory for IdentifierQueryFactory {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        match clause.operator {
            Operator::Equals | Operator::In => {
                let branches = literals
                    .iter()
                    .map(|l| self.equals_one(clause, info, l, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(disjunction(branches))
            }
            Operator::NotEquals | Operator::NotIn => {
                let branches = literals
                    .iter()
                    .map(|l| self.equals_one(clause, info, l, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(negate(presence(env.schema, info), disjunction(branches)))
            }
            Operator::Is => Ok(absence(env.schema, info)),
            Operator::IsNot => Ok(presence(env.schema, info)),
            _ => Err(unsupported(clause)),
        }
    }
}

fn literal_f64(clause: &TerminalClause, literal: &QueryLiteral) -> Result<f64> {
    match &literal.value {
        LiteralValue::Number(n) => Ok(*n as f64),
        LiteralValue::Text(text) => {
            text.trim()
                .parse::<f64>()
                .map_err(|_| LodestoneError::InvalidLiteral {
                    field: clause.field.clone(),
                    message: format!("'{}' is not a number", text),
                })
        }
        LiteralValue::Empty => Err(LodestoneError::InvalidLiteral {
            field: clause.field.clone(),
            message: "expected a number, found EMPTY".to_string(),
        }),
    }
}

/// Numeric fields, compared as numbers.
pub struct NumberQueryFactory;

impl ClauseQueryFactory for NumberQueryFactory {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        let field = env
            .schema
            .number_field(&info.index_field)
            .ok_or_else(|| unsupported(clause))?;

        match clause.operator {
            Operator::Equals | Operator::In => {
                let mut branches = Vec::new();
                for literal in literals {
                    if literal.value.is_empty_literal() {
                        branches.push(absence(env.schema, info));
                        continue;
                    }
                    let value = literal_f64(clause, literal)?;
                    branches.push(term_query(Term::from_field_f64(field, value)));
                }
                Ok(disjunction(branches))
            }
            Operator::NotEquals | Operator::NotIn => {
                let mut branches = Vec::new();
                for literal in literals {
                    let value = literal_f64(clause, literal)?;
                    branches.push(term_query(Term::from_field_f64(field, value)));
                }
                Ok(negate(presence(env.schema, info), disjunction(branches)))
            }
            Operator::LessThan
            | Operator::LessThanEquals
            | Operator::GreaterThan
            | Operator::GreaterThanEquals => {
                let [literal] = literals else {
                    return Err(unsupported(clause));
                };
                let value = literal_f64(clause, literal)?;
                let term = Term::from_field_f64(field, value);
                let (lower, upper) = match clause.operator {
                    Operator::LessThan => (Bound::Unbounded, Bound::Excluded(term)),
                    Operator::LessThanEquals => (Bound::Unbounded, Bound::Included(term)),
                    Operator::GreaterThan => (Bound::Excluded(term), Bound::Unbounded),
                    _ => (Bound::Included(term), Bound::Unbounded),
                };
                Ok(Box::new(RangeQuery::new(lower, upper)))
            }
            Operator::Is => Ok(absence(env.schema, info)),
            Operator::IsNot => Ok(presence(env.schema, info)),
            _ => Err(unsupported(clause)),
        }
    }
}

fn date_bounds(clause: &TerminalClause, literal: &QueryLiteral) -> Result<(String, String)> {
    let text = match &literal.value {
        LiteralValue::Text(text) => text.clone(),
        other => {
            return Err(LodestoneError::InvalidLiteral {
                field: clause.field.clone(),
                message: format!("expected a date, found {}", other.to_index_text()),
            })
        }
    };
    let (start, end) = parse_date_literal(&text).ok_or_else(|| LodestoneError::InvalidLiteral {
        field: clause.field.clone(),
        message: format!("'{}' is not a recognized date", text),
    })?;
    Ok((canonical_timestamp(start), canonical_timestamp(end)))
}

/// Date fields, stored as canonical sortable text and compared
/// lexicographically. A bare date expands to the whole day.
pub struct DateQueryFactory;

impl ClauseQueryFactory for DateQueryFactory {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        let field = env
            .schema
            .raw_field(&info.index_field)
            .ok_or_else(|| unsupported(clause))?;

        let day_range = |literal: &QueryLiteral| -> Result<Box<dyn Query>> {
            let (start, end) = date_bounds(clause, literal)?;
            Ok(Box::new(RangeQuery::new(
                Bound::Included(Term::from_field_text(field, &start)),
                Bound::Included(Term::from_field_text(field, &end)),
            )))
        };

        match clause.operator {
            Operator::Equals | Operator::In => {
                let branches = literals.iter().map(day_range).collect::<Result<Vec<_>>>()?;
                Ok(disjunction(branches))
            }
            Operator::NotEquals | Operator::NotIn => {
                let branches = literals.iter().map(day_range).collect::<Result<Vec<_>>>()?;
                Ok(negate(match_all(), disjunction(branches)))
            }
            Operator::LessThan
            | Operator::LessThanEquals
            | Operator::GreaterThan
            | Operator::GreaterThanEquals => {
                let [literal] = literals else {
                    return Err(unsupported(clause));
                };
                let (start, end) = date_bounds(clause, literal)?;
                let (lower, upper) = match clause.operator {
                    Operator::LessThan => (
                        Bound::Unbounded,
                        Bound::Excluded(Term::from_field_text(field, &start)),
                    ),
                    Operator::LessThanEquals => (
                        Bound::Unbounded,
                        Bound::Included(Term::from_field_text(field, &end)),
                    ),
                    Operator::GreaterThan => (
                        Bound::Excluded(Term::from_field_text(field, &end)),
                        Bound::Unbounded,
                    ),
                    _ => (
                        Bound::Included(Term::from_field_text(field, &start)),
                        Bound::Unbounded,
                    ),
                };
                Ok(Box::new(RangeQuery::new(lower, upper)))
            }
            _ => Err(unsupported(clause)),
        }
    }
}

/// Status values, matched as lowercase raw terms.
pub struct StatusQueryFactory;

impl ClauseQueryFactory for StatusQueryFactory {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        let field = env
            .schema
            .raw_field(&info.index_field)
            .ok_or_else(|| unsupported(clause))?;
        let terms = |literals: &[QueryLiteral]| -> Vec<Box<dyn Query>> {
            literals
                .iter()
                .filter_map(|l| l.value.as_text())
                .map(|text| term_query(Term::from_field_text(field, &text.to_lowercase())))
                .collect()
        };

        match clause.operator {
            Operator::Equals | Operator::In => Ok(disjunction(terms(literals))),
            // Status is always present, so plain complement is safe.
            Operator::NotEquals | Operator::NotIn => {
                Ok(negate(match_all(), disjunction(terms(literals))))
            }
            _ => Err(unsupported(clause)),
        }
    }
}

/// Catalog and manufacturer references, matched by id with name literals
/// resolved through the directory. Ids the searcher may not see are dropped
/// before the query is built.
pub struct EntityQueryFactory {
    pub dimension: EntityDimension,
}

impl ClauseQueryFactory for EntityQueryFactory {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        let field = env
            .schema
            .u64_field(&info.index_field)
            .ok_or_else(|| unsupported(clause))?;

        let id_terms = |literals: &[QueryLiteral]| -> Vec<Box<dyn Query>> {
            literals
                .iter()
                .flat_map(|l| permitted_entity_ids(self.dimension, &l.value, env.view))
                .map(|id| term_query(Term::from_field_u64(field, id)))
                .collect()
        };

        match clause.operator {
            Operator::Equals | Operator::In => {
                let mut branches = id_terms(literals);
                for literal in literals {
                    if literal.value.is_empty_literal() {
                        branches.push(absence(env.schema, info));
                    }
                }
                Ok(disjunction(branches))
            }
            Operator::NotEquals | Operator::NotIn => Ok(negate(
                presence(env.schema, info),
                disjunction(id_terms(literals)),
            )),
            Operator::Is => Ok(absence(env.schema, info)),
            Operator::IsNot => Ok(presence(env.schema, info)),
            _ => Err(unsupported(clause)),
        }
    }
}

/// The numeric asset id, matched exactly.
pub struct IdQueryFactory;

impl ClauseQueryFactory for IdQueryFactory {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        let field = env
            .schema
            .u64_field(&info.index_field)
            .ok_or_else(|| unsupported(clause))?;
        let id_terms = literals
            .iter()
            .filter_map(|l| match &l.value {
                LiteralValue::Number(n) if *n >= 0 => Some(*n as u64),
                LiteralValue::Text(text) => text.trim().parse::<u64>().ok(),
                _ => None,
            })
            .map(|id| term_query(Term::from_field_u64(field, id)))
            .collect::<Vec<_>>();

        match clause.operator {
            Operator::Equals | Operator::In => Ok(disjunction(id_terms)),
            Operator::NotEquals | Operator::NotIn => {
                Ok(negate(match_all(), disjunction(id_terms)))
            }
            _ => Err(unsupported(clause)),
        }
    }
}

/// Custom fields, matched inside the shared JSON index field under the
/// custom field's id path.
pub struct CustomFieldQueryFactory {
    pub field_id: u64,
}

impl CustomFieldQueryFactory {
    fn tokens_query(&self, text: &str, phrase: bool, env: &QueryBuildEnv<'_>) -> Box<dyn Query> {
        let terms = env.schema.custom_terms(self.field_id, text);
        if phrase {
            phrase_or_term(terms)
        } else {
            conjunction(terms.into_iter().map(term_query).collect())
        }
    }
}

impl ClauseQueryFactory for CustomFieldQueryFactory {
    fn build(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        env: &QueryBuildEnv<'_>,
    ) -> Result<Box<dyn Query>> {
        let branches = |phrase: bool| -> Vec<Box<dyn Query>> {
            literals
                .iter()
                .map(|l| match &l.value {
                    LiteralValue::Empty => absence(env.schema, info),
                    value => self.tokens_query(&value.to_index_text(), phrase, env),
                })
                .collect()
        };

        match clause.operator {
            Operator::Equals | Operator::In => Ok(disjunction(branches(true))),
            Operator::NotEquals | Operator::NotIn => Ok(negate(
                presence(env.schema, info),
                disjunction(branches(true)),
            )),
            Operator::Like => Ok(disjunction(branches(false))),
            Operator::NotLike => Ok(negate(
                presence(env.schema, info),
                disjunction(branches(false)),
            )),
            Operator::Is => Ok(absence(env.schema, info)),
            Operator::IsNot => Ok(presence(env.schema, info)),
            _ => Err(unsupported(clause)),
        }
    }
}
