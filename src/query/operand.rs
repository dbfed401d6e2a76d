use crate::query::messages::{keys, MessageSet};
use crate::types::{canonical_timestamp, ScopePermissions, User};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A literal exactly as the parser captured it. Decimal numbers arrive as
/// text and are interpreted by the field's validator and factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawValue {
    Text(String),
    Number(i64),
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValue::Text(s) => write!(f, "\"{}\"", s),
            RawValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Right-hand side of a leaf clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Single(RawValue),
    Multi(Vec<Operand>),
    Function { name: String, args: Vec<Operand> },
    Empty,
}

impl Operand {
    pub fn text(value: &str) -> Operand {
        Operand::Single(RawValue::Text(value.to_string()))
    }

    pub fn number(value: i64) -> Operand {
        Operand::Single(RawValue::Number(value))
    }

    pub fn list<I: IntoIterator<Item = Operand>>(values: I) -> Operand {
        Operand::Multi(values.into_iter().collect())
    }

    pub fn texts<'a, I: IntoIterator<Item = &'a str>>(values: I) -> Operand {
        Operand::Multi(values.into_iter().map(Operand::text).collect())
    }

    pub fn function(name: &str, args: Vec<Operand>) -> Operand {
        Operand::Function {
            name: name.to_string(),
            args,
        }
    }

    pub fn is_empty_operand(&self) -> bool {
        matches!(self, Operand::Empty)
    }

    /// Resolves this operand to its literal values, in order, preserving
    /// duplicates. Failures are recorded, never thrown; an unresolvable
    /// function contributes nothing beyond its error.
    pub fn resolve(
        &self,
        ctx: &ResolutionContext<'_>,
        functions: &FunctionRegistry,
        messages: &mut MessageSet,
    ) -> Vec<QueryLiteral> {
        match self {
            Operand::Single(raw) => vec![QueryLiteral {
                value: match raw {
                    RawValue::Text(s) => LiteralValue::Text(s.clone()),
                    RawValue::Number(n) => LiteralValue::Number(*n),
                },
                source: self.clone(),
            }],
            Operand::Multi(children) => children
                .iter()
                .flat_map(|child| child.resolve(ctx, functions, messages))
                .collect(),
            Operand::Function { name, args } => match functions.get(name) {
                Some(function) => function.resolve(args, ctx, messages),
                None => {
                    messages.add_error(keys::UNKNOWN_FUNCTION, &[name]);
                    Vec::new()
                }
            },
            Operand::Empty => vec![QueryLiteral {
                value: LiteralValue::Empty,
                source: Operand::Empty,
            }],
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Single(raw) => write!(f, "{}", raw),
            Operand::Multi(children) => {
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Operand::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Operand::Empty => f.write_str("EMPTY"),
        }
    }
}

/// A resolved concrete value. `Empty` is the distinguished literal behind
/// IS / IS NOT semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralValue {
    Text(String),
    Number(i64),
    Empty,
}

impl LiteralValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            LiteralValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            LiteralValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_empty_literal(&self) -> bool {
        matches!(self, LiteralValue::Empty)
    }

    /// The value as index-comparable text. Numbers keep their decimal form.
    pub fn to_index_text(&self) -> String {
        match self {
            LiteralValue::Text(s) => s.clone(),
            LiteralValue::Number(n) => n.to_string(),
            LiteralValue::Empty => String::new(),
        }
    }
}

/// A literal paired with the operand it came from, so diagnostics later in
/// the pipeline can still point at what the user actually wrote.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryLiteral {
    pub value: LiteralValue,
    pub source: Operand,
}

impl QueryLiteral {
    pub fn text(value: &str) -> Self {
        QueryLiteral {
            value: LiteralValue::Text(value.to_string()),
            source: Operand::text(value),
        }
    }

    pub fn number(value: i64) -> Self {
        QueryLiteral {
            value: LiteralValue::Number(value),
            source: Operand::number(value),
        }
    }
}

/// Everything a function needs to resolve deterministically within one
/// evaluation. `now` is sampled once per query, not per call, so repeated
/// resolution of the same operand cannot drift.
pub struct ResolutionContext<'a> {
    pub user: Option<&'a User>,
    pub now: NaiveDateTime,
    pub permissions: &'a dyn ScopePermissions,
}

/// A named query function such as `currentUser()`. Implementations may
/// recurse into argument resolution.
pub trait QueryFunction: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(
        &self,
        args: &[Operand],
        ctx: &ResolutionContext<'_>,
        messages: &mut MessageSet,
    ) -> Vec<QueryLiteral>;
}

/// Case-folded function lookup. Built once at service construction; the set
/// of functions does not change at runtime.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, Arc<dyn QueryFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CurrentUserFunction));
        registry.register(Arc::new(NowFunction));
        registry.register(Arc::new(VisibleCatalogsFunction));
        registry
    }

    pub fn register(&mut self, function: Arc<dyn QueryFunction>) {
        self.functions
            .insert(function.name().to_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn QueryFunction>> {
        self.functions.get(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.values().map(|f| f.name())
    }
}

/// `currentUser()` resolves to the searching user's key. Anonymous sessions
/// get an error and no literals, so `owner = currentUser()` simply matches
/// nothing for them instead of failing the whole query.
struct CurrentUserFunction;

impl QueryFunction for CurrentUserFunction {
    fn name(&self) -> &str {
        "currentUser"
    }

    fn resolve(
        &self,
        args: &[Operand],
        ctx: &ResolutionContext<'_>,
        messages: &mut MessageSet,
    ) -> Vec<QueryLiteral> {
        if !args.is_empty() {
            messages.add_error(keys::FUNCTION_ARGS, &[self.name()]);
            return Vec::new();
        }
        match ctx.user {
            Some(user) => vec![QueryLiteral {
                value: LiteralValue::Text(user.key.clone()),
                source: Operand::function(self.name(), Vec::new()),
            }],
            None => {
                messages.add_error(keys::FUNCTION_ANONYMOUS, &[self.name()]);
                Vec::new()
            }
        }
    }
}

/// `now()` resolves to the canonical timestamp text of the evaluation
/// instant, directly comparable against indexed date fields.
struct NowFunction;

impl QueryFunction for NowFunction {
    fn name(&self) -> &str {
        "now"
    }

    fn resolve(
        &self,
        args: &[Operand],
        ctx: &ResolutionContext<'_>,
        messages: &mut MessageSet,
    ) -> Vec<QueryLiteral> {
        if !args.is_empty() {
            messages.add_error(keys::FUNCTION_ARGS, &[self.name()]);
            return Vec::new();
        }
        vec![QueryLiteral {
            value: LiteralValue::Text(canonical_timestamp(ctx.now)),
            source: Operand::function(self.name(), Vec::new()),
        }]
    }
}

/// `visibleCatalogs()` expands to the ids of every catalog the user may
/// see, for `catalog IN visibleCatalogs()` style queries.
struct VisibleCatalogsFunction;

impl QueryFunction for VisibleCatalogsFunction {
    fn name(&self) -> &str {
        "visibleCatalogs"
    }

    fn resolve(
        &self,
        args: &[Operand],
        ctx: &ResolutionContext<'_>,
        messages: &mut MessageSet,
    ) -> Vec<QueryLiteral> {
        if !args.is_empty() {
            messages.add_error(keys::FUNCTION_ARGS, &[self.name()]);
            return Vec::new();
        }
        let source = Operand::function(self.name(), Vec::new());
        ctx.permissions
            .visible_catalogs(ctx.user)
            .into_iter()
            .map(|id| QueryLiteral {
                value: LiteralValue::Number(id as i64),
                source: source.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CatalogAllowList;

    fn ctx<'a>(user: Option<&'a User>, perms: &'a dyn ScopePermissions) -> ResolutionContext<'a> {
        ResolutionContext {
            user,
            now: chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            permissions: perms,
        }
    }

    #[test]
    fn multi_preserves_order_and_duplicates() {
        let perms = CatalogAllowList::new();
        let functions = FunctionRegistry::with_builtins();
        let mut messages = MessageSet::new();
        let operand = Operand::texts(["a", "b", "a"]);

        let literals = operand.resolve(&ctx(None, &perms), &functions, &mut messages);
        let texts: Vec<_> = literals
            .iter()
            .filter_map(|l| l.value.as_text())
            .collect();
        assert_eq!(texts, vec!["a", "b", "a"]);
        assert!(messages.is_empty());
    }

    #[test]
    fn unknown_function_records_error_without_literals() {
        let perms = CatalogAllowList::new();
        let functions = FunctionRegistry::with_builtins();
        let mut messages = MessageSet::new();
        let operand = Operand::function("noSuchThing", Vec::new());

        let literals = operand.resolve(&ctx(None, &perms), &functions, &mut messages);
        assert!(literals.is_empty());
        assert_eq!(messages.errors().count(), 1);
    }

    #[test]
    fn current_user_requires_a_user() {
        let perms = CatalogAllowList::new();
        let functions = FunctionRegistry::with_builtins();
        let operand = Operand::function("currentUser", Vec::new());

        let mut messages = MessageSet::new();
        let anonymous = operand.resolve(&ctx(None, &perms), &functions, &mut messages);
        assert!(anonymous.is_empty());
        assert!(messages.has_errors());

        let user = User::new("alice", "Alice");
        let mut messages = MessageSet::new();
        let resolved = operand.resolve(&ctx(Some(&user), &perms), &functions, &mut messages);
        assert_eq!(resolved[0].value.as_text(), Some("alice"));
        assert!(messages.is_empty());
    }

    #[test]
    fn function_lookup_is_case_insensitive() {
        let perms = CatalogAllowList::new().grant_anonymous(vec![3, 9]);
        let functions = FunctionRegistry::with_builtins();
        let mut messages = MessageSet::new();
        let operand = Operand::function("VISIBLECATALOGS", Vec::new());

        let literals = operand.resolve(&ctx(None, &perms), &functions, &mut messages);
        let ids: Vec<_> = literals
            .iter()
            .filter_map(|l| l.value.as_number())
            .collect();
        assert_eq!(ids, vec![3, 9]);
    }
}
