//! The query model: an immutable clause tree plus the single-purpose
//! passes that walk it. Each pass is a [`clause::ClauseVisitor`], so the
//! closed variant set keeps them exhaustive by construction.

pub mod cache;
pub mod clause;
pub mod compile;
pub mod context;
pub mod messages;
pub mod normalize;
pub mod operand;
pub mod validate;

pub use cache::QueryContextCache;
pub use clause::{Clause, ClauseVisitor, Operator};
pub use compile::QueryCompiler;
pub use context::{ClauseContext, ContextExtractor, QueryContext, Scope, ScopeId, ScopeView};
pub use messages::{Message, MessageSet, ParseResult, Severity};
pub use normalize::normalize;
pub use operand::{FunctionRegistry, Operand, QueryFunction, QueryLiteral, ResolutionContext};
pub use validate::ClauseValidator;
