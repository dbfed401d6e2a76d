use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Message keys shared by the parser contract, the validator, and operand
/// resolution. Keys are i18n identifiers; rendering happens in the caller.
pub mod keys {
    pub const UNKNOWN_FIELD: &str = "clause.unknown.field";
    pub const AMBIGUOUS_FIELD: &str = "clause.ambiguous.field";
    pub const UNSUPPORTED_OPERATOR: &str = "clause.unsupported.operator";
    pub const INVALID_NUMBER: &str = "clause.invalid.number";
    pub const INVALID_DATE: &str = "clause.invalid.date";
    pub const UNKNOWN_STATUS: &str = "clause.unknown.status";
    pub const EMPTY_NOT_ALLOWED: &str = "clause.empty.operand.not.allowed";
    pub const EMPTY_REQUIRED: &str = "clause.empty.operand.required";
    pub const SINGLE_REQUIRED: &str = "clause.single.value.required";
    pub const EMPTY_GROUP: &str = "clause.group.without.children";
    pub const CLAUSE_TOO_COMPLEX: &str = "clause.too.complex";
    pub const SORT_UNSUPPORTED: &str = "search.sort.not.supported";
    pub const UNKNOWN_FUNCTION: &str = "operand.unknown.function";
    pub const FUNCTION_ANONYMOUS: &str = "operand.function.requires.user";
    pub const FUNCTION_ARGS: &str = "operand.function.bad.arguments";
    pub const UNKNOWN_ENTITY: &str = "clause.unknown.entity";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Source position of the token a message refers to. Only parse errors carry
/// one; validation messages usually do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// One diagnostic. Identity covers every component, so repeating the exact
/// same problem in two places of a query collapses to a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub severity: Severity,
    pub key: String,
    pub args: Vec<String>,
    pub position: Option<Position>,
}

impl Message {
    pub fn error(key: &str) -> Self {
        Message {
            severity: Severity::Error,
            key: key.to_string(),
            args: Vec::new(),
            position: None,
        }
    }

    pub fn warning(key: &str) -> Self {
        Message {
            severity: Severity::Warning,
            key: key.to_string(),
            args: Vec::new(),
            position: None,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.position = Some(Position { line, column });
        self
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)?;
        if !self.args.is_empty() {
            write!(f, "({})", self.args.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered, deduplicating collection of diagnostics. Insertion order is
/// traversal order, which keeps reported problems stable for a given tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSet {
    messages: IndexSet<Message>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: Message) {
        self.messages.insert(message);
    }

    pub fn add_error(&mut self, key: &str, args: &[&str]) {
        let mut message = Message::error(key);
        for arg in args {
            message = message.with_arg(*arg);
        }
        self.add(message);
    }

    pub fn add_warning(&mut self, key: &str, args: &[&str]) {
        let mut message = Message::warning(key);
        for arg in args {
            message = message.with_arg(*arg);
        }
        self.add(message);
    }

    /// Appends every message of `other`, preserving this set's order first.
    pub fn merge(&mut self, other: MessageSet) {
        for message in other.messages {
            self.messages.insert(message);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl FromIterator<Message> for MessageSet {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        let mut set = MessageSet::new();
        for message in iter {
            set.add(message);
        }
        set
    }
}

impl IntoIterator for MessageSet {
    type Item = Message;
    type IntoIter = indexmap::set::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

/// What the external text parser hands over: the tree it built, if any, plus
/// whatever it had to complain about. A `None` query with errors is a failed
/// parse; a query plus warnings is still executable.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub query: Option<crate::query::clause::Clause>,
    pub errors: MessageSet,
}

impl ParseResult {
    pub fn parsed(query: crate::query::clause::Clause) -> Self {
        ParseResult {
            query: Some(query),
            errors: MessageSet::new(),
        }
    }

    pub fn failed(errors: MessageSet) -> Self {
        ParseResult {
            query: None,
            errors,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.query.is_some() && !self.errors.has_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_messages_collapse() {
        let mut set = MessageSet::new();
        set.add_error(keys::UNKNOWN_FIELD, &["bogus"]);
        set.add_error(keys::UNKNOWN_FIELD, &["bogus"]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn merge_preserves_first_seen_order() {
        let mut left = MessageSet::new();
        left.add_error(keys::UNKNOWN_FIELD, &["a"]);
        let mut right = MessageSet::new();
        right.add_error(keys::UNKNOWN_FIELD, &["b"]);
        right.add_error(keys::UNKNOWN_FIELD, &["a"]);
        left.merge(right);

        let args: Vec<_> = left.iter().map(|m| m.args[0].clone()).collect();
        assert_eq!(args, vec!["a", "b"]);
    }

    #[test]
    fn severity_filters() {
        let mut set = MessageSet::new();
        set.add_error(keys::UNKNOWN_FIELD, &["x"]);
        set.add_warning(keys::UNKNOWN_STATUS, &["y"]);
        assert!(set.has_errors());
        assert!(set.has_warnings());
        assert_eq!(set.errors().count(), 1);
        assert_eq!(set.warnings().count(), 1);
    }
}
