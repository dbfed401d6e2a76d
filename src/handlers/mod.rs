//! Per-field clause handling: each searchable field registers a bundle of
//! behaviors (validate, build an index query, compute scope context, gate by
//! permission) looked up by name for every leaf clause.

pub mod factories;
pub mod scopes;
pub mod system;
pub mod validators;

use crate::error::Result;
use crate::query::clause::Operator;
use crate::types::{CustomFieldId, ScopePermissions, User};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

pub use factories::{ClauseQueryFactory, QueryBuildEnv};
pub use scopes::ClauseContextFactory;
pub use system::{
    CustomFieldDefinition, CustomFieldProvider, CustomFieldSource, InMemoryCustomFields,
    SystemFieldSource,
};
pub use validators::OperandValidator;

/// Declared type of a field, driving which validator and factory the
/// registry wires up for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Text,
    Identifier,
    Number,
    Date,
    Status,
    Catalog,
    Manufacturer,
    CustomText,
}

/// Static description of one searchable field.
#[derive(Debug, Clone)]
pub struct FieldInformation {
    /// Canonical name, as reported back in diagnostics.
    pub name: String,
    /// Additional names the field answers to, matched case-insensitively.
    pub aliases: Vec<String>,
    /// Underlying index field holding the searchable value.
    pub index_field: String,
    /// Index field used for ordering results, when the field is sortable.
    pub sort_field: Option<String>,
    /// Index field holding historical values, when WAS / CHANGED apply.
    pub history_field: Option<String>,
    pub data_type: DataType,
    pub operators: Vec<Operator>,
    pub custom_field_id: Option<CustomFieldId>,
}

impl FieldInformation {
    pub fn supports(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }

    pub fn answers_to(&self, folded: &str) -> bool {
        self.name.to_lowercase() == folded
            || self.aliases.iter().any(|a| a.to_lowercase() == folded)
    }
}

/// Per-field usage gate. Policy lives in [`ScopePermissions`]; this only
/// decides whether that policy applies to the field at all.
pub trait FieldPermission: Send + Sync {
    fn can_use(&self, user: Option<&User>, permissions: &dyn ScopePermissions) -> bool;
}

/// The default gate: every searcher may reference the field.
pub struct OpenField;

impl FieldPermission for OpenField {
    fn can_use(&self, _user: Option<&User>, _permissions: &dyn ScopePermissions) -> bool {
        true
    }
}

/// Everything the engine knows how to do with one field. Built once per
/// registry snapshot and never mutated afterwards.
pub struct ClauseHandler {
    pub information: FieldInformation,
    pub validator: Arc<dyn OperandValidator>,
    pub factory: Arc<dyn ClauseQueryFactory>,
    pub context_factory: Arc<dyn ClauseContextFactory>,
    pub permission: Arc<dyn FieldPermission>,
}

impl ClauseHandler {
    pub fn name(&self) -> &str {
        &self.information.name
    }
}

impl std::fmt::Debug for ClauseHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClauseHandler")
            .field("information", &self.information)
            .finish()
    }
}

/// Contributes handlers to a registry build. The system source covers the
/// built-in asset fields; a custom-field source contributes one handler per
/// user-defined field.
pub trait FieldSource: Send + Sync {
    fn field_handlers(&self) -> Result<Vec<ClauseHandler>>;
}

struct RegistrySnapshot {
    /// Registration order, which is also alias resolution order.
    handlers: Vec<Arc<ClauseHandler>>,
    /// Folded name or alias to handler positions.
    by_name: HashMap<String, Vec<usize>>,
}

impl RegistrySnapshot {
    fn build(sources: &[Arc<dyn FieldSource>]) -> Result<RegistrySnapshot> {
        let mut handlers = Vec::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();

        for source in sources {
            for handler in source.field_handlers()? {
                let position = handlers.len();
                let mut names = vec![handler.information.name.to_lowercase()];
                for alias in &handler.information.aliases {
                    names.push(alias.to_lowercase());
                }
                handlers.push(Arc::new(handler));
                for name in names {
                    let slots = by_name.entry(name).or_default();
                    if !slots.contains(&position) {
                        slots.push(position);
                    }
                }
            }
        }

        debug!(fields = handlers.len(), "built clause handler snapshot");
        Ok(RegistrySnapshot { handlers, by_name })
    }
}

/// Name-to-handler lookup with rebuild support.
///
/// `refresh` swaps in a freshly built immutable snapshot; concurrent readers
/// keep whatever snapshot they resolved against and never observe a partial
/// rebuild.
pub struct ClauseHandlerRegistry {
    sources: Vec<Arc<dyn FieldSource>>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl ClauseHandlerRegistry {
    pub fn new(sources: Vec<Arc<dyn FieldSource>>) -> Result<ClauseHandlerRegistry> {
        let snapshot = RegistrySnapshot::build(&sources)?;
        Ok(ClauseHandlerRegistry {
            sources,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Rebuilds from the sources and atomically replaces the snapshot. Call
    /// after custom fields are added, renamed, or removed.
    pub fn refresh(&self) -> Result<()> {
        let rebuilt = Arc::new(RegistrySnapshot::build(&self.sources)?);
        let mut guard = self.snapshot.write().expect("registry lock poisoned");
        *guard = rebuilt;
        Ok(())
    }

    fn current(&self) -> Arc<RegistrySnapshot> {
        self.snapshot
            .read()
            .expect("registry lock poisoned")
            .clone()
    }

    /// Every registered handler in registration order.
    pub fn handlers(&self) -> Vec<Arc<ClauseHandler>> {
        self.current().handlers.to_vec()
    }

    /// All handlers answering to `name`, case-insensitively, including
    /// alias matches. More than one result means the name is ambiguous.
    pub fn get_handlers(&self, name: &str) -> Vec<Arc<ClauseHandler>> {
        let snapshot = self.current();
        let folded = name.to_lowercase();
        snapshot
            .by_name
            .get(&folded)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&i| snapshot.handlers[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Handlers for `name` the given user is allowed to reference. A field
    /// hidden by permission is indistinguishable from one that does not
    /// exist.
    pub fn visible_handlers(
        &self,
        name: &str,
        user: Option<&User>,
        permissions: &dyn ScopePermissions,
    ) -> Vec<Arc<ClauseHandler>> {
        self.get_handlers(name)
            .into_iter()
            .filter(|h| h.permission.can_use(user, permissions))
            .collect()
    }

    pub fn field_count(&self) -> usize {
        self.current().handlers.len()
    }
}
