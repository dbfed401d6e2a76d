use crate::handlers::FieldInformation;
use crate::query::clause::TerminalClause;
use crate::query::context::ScopeView;
use crate::query::messages::{keys, MessageSet};
use crate::query::operand::{LiteralValue, QueryLiteral};
use crate::types::AssetStatus;
use chrono::{NaiveDate, NaiveDateTime};

/// Type-specific legality checks for one field's operand. Structural rules
/// shared by every field (operator support, emptiness shape) are enforced by
/// the validating visitor before this runs.
pub trait OperandValidator: Send + Sync {
    fn validate(
        &self,
        clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        view: &ScopeView<'_>,
        messages: &mut MessageSet,
    );
}

/// Free-text fields accept any literal.
pub struct TextValidator;

impl OperandValidator for TextValidator {
    fn validate(
        &self,
        _clause: &TerminalClause,
        _info: &FieldInformation,
        _literals: &[QueryLiteral],
        _view: &ScopeView<'_>,
        _messages: &mut MessageSet,
    ) {
    }
}

pub struct NumberValidator;

impl OperandValidator for NumberValidator {
    fn validate(
        &self,
        _clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        _view: &ScopeView<'_>,
        messages: &mut MessageSet,
    ) {
        for literal in literals {
            match &literal.value {
                LiteralValue::Number(_) | LiteralValue::Empty => {}
                LiteralValue::Text(text) => {
                    if text.trim().parse::<f64>().is_err() {
                        messages.add_error(keys::INVALID_NUMBER, &[&info.name, text]);
                    }
                }
            }
        }
    }
}

/// Accepted date literal forms. A bare date is legal wherever a timestamp
/// is; the factory expands it to the day's boundaries.
pub fn parse_date_literal(text: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let trimmed = text.trim();
    if let Ok(at) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some((at, at));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M") {
        return Some((at, at));
    }
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let start = day.and_hms_opt(0, 0, 0)?;
        let end = day.and_hms_opt(23, 59, 59)?;
        return Some((start, end));
    }
    None
}

pub struct DateValidator;

impl OperandValidator for DateValidator {
    fn validate(
        &self,
        _clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        _view: &ScopeView<'_>,
        messages: &mut MessageSet,
    ) {
        for literal in literals {
            match &literal.value {
                LiteralValue::Empty => {}
                LiteralValue::Number(n) => {
                    messages.add_error(keys::INVALID_DATE, &[&info.name, &n.to_string()]);
                }
                LiteralValue::Text(text) => {
                    if parse_date_literal(text).is_none() {
                        messages.add_error(keys::INVALID_DATE, &[&info.name, text]);
                    }
                }
            }
        }
    }
}

pub struct StatusValidator;

impl OperandValidator for StatusValidator {
    fn validate(
        &self,
        _clause: &TerminalClause,
        _info: &FieldInformation,
        literals: &[QueryLiteral],
        _view: &ScopeView<'_>,
        messages: &mut MessageSet,
    ) {
        for literal in literals {
            if let LiteralValue::Text(text) = &literal.value {
                if AssetStatus::parse(text).is_none() {
                    messages.add_error(keys::UNKNOWN_STATUS, &[text]);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityDimension {
    Catalog,
    Manufacturer,
}

/// Resolves an entity literal to the ids the searcher is allowed to see.
/// Name literals go through the directory; id literals pass as given. The
/// permission filter applies to both.
pub(crate) fn permitted_entity_ids(
    dimension: EntityDimension,
    literal: &LiteralValue,
    view: &ScopeView<'_>,
) -> Vec<u64> {
    let candidates: Vec<u64> = match (literal, dimension) {
        (LiteralValue::Number(id), _) => vec![*id as u64],
        (LiteralValue::Text(name), EntityDimension::Catalog) => {
            view.directory.catalog_ids_by_name(name)
        }
        (LiteralValue::Text(name), EntityDimension::Manufacturer) => {
            view.directory.manufacturer_ids_by_name(name)
        }
        (LiteralValue::Empty, _) => Vec::new(),
    };
    candidates
        .into_iter()
        .filter(|&id| match dimension {
            EntityDimension::Catalog => view.permissions.can_see_catalog(view.user, id),
            EntityDimension::Manufacturer => view.permissions.can_see_manufacturer(view.user, id),
        })
        .collect()
}

/// Catalog and manufacturer references must name something that exists and
/// that the searcher may see. Both failures produce the same message, so a
/// query cannot probe for entities hidden by permission.
pub struct EntityValidator {
    pub dimension: EntityDimension,
}

impl EntityValidator {
    fn resolves(&self, literal: &LiteralValue, view: &ScopeView<'_>) -> bool {
        match self.dimension {
            EntityDimension::Catalog => match literal {
                LiteralValue::Number(id) => {
                    let id = *id as u64;
                    view.directory.catalog(id).is_some()
                        && view.permissions.can_see_catalog(view.user, id)
                }
                LiteralValue::Text(name) => view
                    .directory
                    .catalog_ids_by_name(name)
                    .into_iter()
                    .any(|id| view.permissions.can_see_catalog(view.user, id)),
                LiteralValue::Empty => true,
            },
            EntityDimension::Manufacturer => match literal {
                LiteralValue::Number(id) => {
                    let id = *id as u64;
                    view.directory.manufacturer(id).is_some()
                        && view.permissions.can_see_manufacturer(view.user, id)
                }
                LiteralValue::Text(name) => view
                    .directory
                    .manufacturer_ids_by_name(name)
                    .into_iter()
                    .any(|id| view.permissions.can_see_manufacturer(view.user, id)),
                LiteralValue::Empty => true,
            },
        }
    }
}

impl OperandValidator for EntityValidator {
    fn validate(
        &self,
        _clause: &TerminalClause,
        info: &FieldInformation,
        literals: &[QueryLiteral],
        view: &ScopeView<'_>,
        messages: &mut MessageSet,
    ) {
        for literal in literals {
            if !self.resolves(&literal.value, view) {
                let shown = match &literal.value {
                    LiteralValue::Text(s) => s.clone(),
                    LiteralValue::Number(n) => n.to_string(),
                    LiteralValue::Empty => continue,
                };
                messages.add_error(keys::UNKNOWN_ENTITY, &[&info.name, &shown]);
            }
        }
    }
}
