use crate::query::operand::Operand;
use serde::{Deserialize, Serialize};

/// Comparison and history operators a leaf clause may carry. The set is
/// closed; the parser maps surface syntax onto it and everything downstream
/// matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Like,
    NotLike,
    In,
    NotIn,
    Is,
    IsNot,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
    Was,
    WasNot,
    WasIn,
    WasNotIn,
    Changed,
    NotChanged,
}

impl Operator {
    /// Operator classes, written out as plain tables so callers can pass
    /// them around instead of re-deriving membership.
    pub const EQUALITY: &'static [Operator] = &[Operator::Equals, Operator::NotEquals];
    pub const TEXT: &'static [Operator] = &[Operator::Like, Operator::NotLike];
    pub const LIST: &'static [Operator] = &[
        Operator::In,
        Operator::NotIn,
        Operator::WasIn,
        Operator::WasNotIn,
    ];
    pub const EMPTINESS: &'static [Operator] = &[Operator::Is, Operator::IsNot];
    pub const RELATIONAL: &'static [Operator] = &[
        Operator::LessThan,
        Operator::LessThanEquals,
        Operator::GreaterThan,
        Operator::GreaterThanEquals,
    ];
    pub const HISTORY: &'static [Operator] = &[
        Operator::Was,
        Operator::WasNot,
        Operator::WasIn,
        Operator::WasNotIn,
        Operator::Changed,
        Operator::NotChanged,
    ];
    pub const NEGATIVE: &'static [Operator] = &[
        Operator::NotEquals,
        Operator::NotLike,
        Operator::NotIn,
        Operator::IsNot,
        Operator::WasNot,
        Operator::WasNotIn,
        Operator::NotChanged,
    ];

    /// The operator that expresses `NOT (a op b)` directly. Total for the
    /// documented set; the normalizer treats a `None` as an internal
    /// invariant violation and keeps the `Not` wrapper.
    pub fn negated(&self) -> Option<Operator> {
        match self {
            Operator::Equals => Some(Operator::NotEquals),
            Operator::NotEquals => Some(Operator::Equals),
            Operator::Like => Some(Operator::NotLike),
            Operator::NotLike => Some(Operator::Like),
            Operator::In => Some(Operator::NotIn),
            Operator::NotIn => Some(Operator::In),
            Operator::Is => Some(Operator::IsNot),
            Operator::IsNot => Some(Operator::Is),
            Operator::LessThan => Some(Operator::GreaterThanEquals),
            Operator::GreaterThanEquals => Some(Operator::LessThan),
            Operator::GreaterThan => Some(Operator::LessThanEquals),
            Operator::LessThanEquals => Some(Operator::GreaterThan),
            Operator::Was => Some(Operator::WasNot),
            Operator::WasNot => Some(Operator::Was),
            Operator::WasIn => Some(Operator::WasNotIn),
            Operator::WasNotIn => Some(Operator::WasIn),
            Operator::Changed => Some(Operator::NotChanged),
            Operator::NotChanged => Some(Operator::Changed),
        }
    }

    pub fn is_list(&self) -> bool {
        Self::LIST.contains(self)
    }

    pub fn is_relational(&self) -> bool {
        Self::RELATIONAL.contains(self)
    }

    pub fn is_emptiness(&self) -> bool {
        Self::EMPTINESS.contains(self)
    }

    pub fn is_history(&self) -> bool {
        Self::HISTORY.contains(self)
    }

    pub fn is_negative(&self) -> bool {
        Self::NEGATIVE.contains(self)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::Like => "~",
            Operator::NotLike => "!~",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Is => "is",
            Operator::IsNot => "is not",
            Operator::LessThan => "<",
            Operator::LessThanEquals => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanEquals => ">=",
            Operator::Was => "was",
            Operator::WasNot => "was not",
            Operator::WasIn => "was in",
            Operator::WasNotIn => "was not in",
            Operator::Changed => "changed",
            Operator::NotChanged => "not changed",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A present-value comparison leaf: `field op operand`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalClause {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

/// A historical-value leaf: `field WAS operand`, matching any value the
/// field held at some point, not just the current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WasClause {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

/// A transition leaf: `field CHANGED`. Carries no operand; it matches any
/// asset whose history records a change of the field at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangedClause {
    pub field: String,
    pub operator: Operator,
}

/// The query expression tree. Immutable once built; every transformation
/// produces a new tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    And(Vec<Clause>),
    Or(Vec<Clause>),
    Not(Box<Clause>),
    Terminal(TerminalClause),
    Was(WasClause),
    Changed(ChangedClause),
}

/// One traversal strategy over the closed clause variant set. Adding a
/// variant breaks every visitor at compile time, which is the point.
pub trait ClauseVisitor {
    type Output;

    fn visit_and(&mut self, children: &[Clause]) -> Self::Output;
    fn visit_or(&mut self, children: &[Clause]) -> Self::Output;
    fn visit_not(&mut self, child: &Clause) -> Self::Output;
    fn visit_terminal(&mut self, clause: &TerminalClause) -> Self::Output;
    fn visit_was(&mut self, clause: &WasClause) -> Self::Output;
    fn visit_changed(&mut self, clause: &ChangedClause) -> Self::Output;
}

impl Clause {
    pub fn accept<V: ClauseVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Clause::And(children) => visitor.visit_and(children),
            Clause::Or(children) => visitor.visit_or(children),
            Clause::Not(child) => visitor.visit_not(child),
            Clause::Terminal(clause) => visitor.visit_terminal(clause),
            Clause::Was(clause) => visitor.visit_was(clause),
            Clause::Changed(clause) => visitor.visit_changed(clause),
        }
    }

    pub fn and(children: Vec<Clause>) -> Clause {
        Clause::And(children)
    }

    pub fn or(children: Vec<Clause>) -> Clause {
        Clause::Or(children)
    }

    pub fn negate(child: Clause) -> Clause {
        Clause::Not(Box::new(child))
    }

    pub fn terminal(field: &str, operator: Operator, operand: Operand) -> Clause {
        Clause::Terminal(TerminalClause {
            field: field.to_string(),
            operator,
            operand,
        })
    }

    pub fn was(field: &str, operator: Operator, operand: Operand) -> Clause {
        Clause::Was(WasClause {
            field: field.to_string(),
            operator,
            operand,
        })
    }

    pub fn changed(field: &str, operator: Operator) -> Clause {
        Clause::Changed(ChangedClause {
            field: field.to_string(),
            operator,
        })
    }

    /// `field = "value"` with a text literal, the most common leaf by far.
    pub fn equals(field: &str, value: &str) -> Clause {
        Clause::terminal(field, Operator::Equals, Operand::text(value))
    }

    pub fn number(field: &str, operator: Operator, value: i64) -> Clause {
        Clause::terminal(field, operator, Operand::number(value))
    }

    pub fn is_empty(field: &str) -> Clause {
        Clause::terminal(field, Operator::Is, Operand::Empty)
    }

    /// Count of nodes, used to bound query complexity before compilation.
    pub fn size(&self) -> usize {
        match self {
            Clause::And(children) | Clause::Or(children) => {
                1 + children.iter().map(Clause::size).sum::<usize>()
            }
            Clause::Not(child) => 1 + child.size(),
            Clause::Terminal(_) | Clause::Was(_) | Clause::Changed(_) => 1,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Clause::And(children) | Clause::Or(children) => {
                1 + children.iter().map(Clause::depth).max().unwrap_or(0)
            }
            Clause::Not(child) => 1 + child.depth(),
            Clause::Terminal(_) | Clause::Was(_) | Clause::Changed(_) => 1,
        }
    }
}

fn write_joined(
    f: &mut std::fmt::Formatter<'_>,
    children: &[Clause],
    separator: &str,
) -> std::fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", child)?;
    }
    f.write_str(")")
}

impl std::fmt::Display for Clause {
    /// Canonical text form. Used for logging and as part of cache keys, so
    /// it must be deterministic for a given tree.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Clause::And(children) => write_joined(f, children, " AND "),
            Clause::Or(children) => write_joined(f, children, " OR "),
            Clause::Not(child) => write!(f, "NOT {}", child),
            Clause::Terminal(c) => write!(f, "{} {} {}", c.field, c.operator, c.operand),
            Clause::Was(c) => write!(f, "{} {} {}", c.field, c.operator, c.operand),
            Clause::Changed(c) => write!(f, "{} {}", c.field, c.operator),
        }
    }
}
