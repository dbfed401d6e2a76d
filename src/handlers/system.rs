use crate::error::Result;
use crate::handlers::factories::{
    CustomFieldQueryFactory, DateQueryFactory, EntityQueryFactory, IdQueryFactory,
    IdentifierQueryFactory, NumberQueryFactory, StatusQueryFactory, TextQueryFactory,
};
use crate::handlers::scopes::{AllScopesContextFactory, EntityContextFactory};
use crate::handlers::validators::{
    DateValidator, EntityDimension, EntityValidator, NumberValidator, StatusValidator,
    TextValidator,
};
use crate::handlers::{
    ClauseHandler, DataType, FieldInformation, FieldSource, OpenField,
};
use crate::index::schema::names;
use crate::query::clause::Operator;
use crate::types::CustomFieldId;
use std::sync::{Arc, RwLock};

fn equality() -> Vec<Operator> {
    vec![
        Operator::Equals,
        Operator::NotEquals,
        Operator::In,
        Operator::NotIn,
    ]
}

fn with_emptiness(mut operators: Vec<Operator>) -> Vec<Operator> {
    operators.push(Operator::Is);
    operators.push(Operator::IsNot);
    operators
}

fn with_relational(mut operators: Vec<Operator>) -> Vec<Operator> {
    operators.extend_from_slice(Operator::RELATIONAL);
    operators
}

fn with_text_match(mut operators: Vec<Operator>) -> Vec<Operator> {
    operators.push(Operator::Like);
    operators.push(Operator::NotLike);
    operators
}

/// The built-in asset fields. One handler each, constructed the same way on
/// every registry build.
pub struct SystemFieldSource;

impl SystemFieldSource {
    pub fn new() -> Self {
        SystemFieldSource
    }
}

impl Default for SystemFieldSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldSource for SystemFieldSource {
    fn field_handlers(&self) -> Result<Vec<ClauseHandler>> {
        let mut handlers = Vec::new();

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "id".to_string(),
                aliases: vec![],
                index_field: names::ID.to_string(),
                sort_field: None,
                history_field: None,
                data_type: DataType::Number,
                operators: equality(),
                custom_field_id: None,
            },
            validator: Arc::new(NumberValidator),
            factory: Arc::new(IdQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "sku".to_string(),
                aliases: vec!["key".to_string()],
                index_field: names::SKU.to_string(),
                sort_field: Some(names::SORT_SKU.to_string()),
                history_field: None,
                data_type: DataType::Identifier,
                operators: with_emptiness(equality()),
                custom_field_id: None,
            },
            validator: Arc::new(TextValidator),
            factory: Arc::new(IdentifierQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "name".to_string(),
                aliases: vec!["title".to_string()],
                index_field: names::NAME.to_string(),
                sort_field: Some(names::SORT_NAME.to_string()),
                history_field: None,
                data_type: DataType::Text,
                operators: with_emptiness(with_text_match(equality())),
                custom_field_id: None,
            },
            validator: Arc::new(TextValidator),
            factory: Arc::new(TextQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "description".to_string(),
                aliases: vec![],
                index_field: names::DESCRIPTION.to_string(),
                sort_field: None,
                history_field: None,
                data_type: DataType::Text,
                operators: with_emptiness(with_text_match(equality())),
                custom_field_id: None,
            },
            validator: Arc::new(TextValidator),
            factory: Arc::new(TextQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "catalog".to_string(),
                aliases: vec![],
                index_field: names::CATALOG.to_string(),
                sort_field: None,
                history_field: None,
                data_type: DataType::Catalog,
                operators: equality(),
                custom_field_id: None,
            },
            validator: Arc::new(EntityValidator {
                dimension: EntityDimension::Catalog,
            }),
            factory: Arc::new(EntityQueryFactory {
                dimension: EntityDimension::Catalog,
            }),
            context_factory: Arc::new(EntityContextFactory {
                dimension: EntityDimension::Catalog,
            }),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "manufacturer".to_string(),
                aliases: vec!["brand".to_string()],
                index_field: names::MANUFACTURER.to_string(),
                sort_field: None,
                history_field: None,
                data_type: DataType::Manufacturer,
                operators: with_emptiness(equality()),
                custom_field_id: None,
            },
            validator: Arc::new(EntityValidator {
                dimension: EntityDimension::Manufacturer,
            }),
            factory: Arc::new(EntityQueryFactory {
                dimension: EntityDimension::Manufacturer,
            }),
            context_factory: Arc::new(EntityContextFactory {
                dimension: EntityDimension::Manufacturer,
            }),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "cost".to_string(),
                aliases: vec![],
                index_field: names::COST.to_string(),
                sort_field: None,
                history_field: None,
                data_type: DataType::Number,
                operators: with_emptiness(with_relational(equality())),
                custom_field_id: None,
            },
            validator: Arc::new(NumberValidator),
            factory: Arc::new(NumberQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "listprice".to_string(),
                aliases: vec!["price".to_string()],
                index_field: names::LIST_PRICE.to_string(),
                sort_field: None,
                history_field: None,
                data_type: DataType::Number,
                operators: with_emptiness(with_relational(equality())),
                custom_field_id: None,
            },
            validator: Arc::new(NumberValidator),
            factory: Arc::new(NumberQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "status".to_string(),
                aliases: vec![],
                index_field: names::STATUS.to_string(),
                sort_field: Some(names::SORT_STATUS.to_string()),
                history_field: Some(names::WAS_STATUS.to_string()),
                data_type: DataType::Status,
                operators: {
                    let mut operators = equality();
                    operators.extend_from_slice(Operator::HISTORY);
                    operators
                },
                custom_field_id: None,
            },
            validator: Arc::new(StatusValidator),
            factory: Arc::new(StatusQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "created".to_string(),
                aliases: vec![],
                index_field: names::CREATED.to_string(),
                sort_field: Some(names::CREATED.to_string()),
                history_field: None,
                data_type: DataType::Date,
                operators: with_relational(equality()),
                custom_field_id: None,
            },
            validator: Arc::new(DateValidator),
            factory: Arc::new(DateQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        handlers.push(ClauseHandler {
            information: FieldInformation {
                name: "updated".to_string(),
                aliases: vec![],
                index_field: names::UPDATED.to_string(),
                sort_field: Some(names::UPDATED.to_string()),
                history_field: None,
                data_type: DataType::Date,
                operators: with_relational(equality()),
                custom_field_id: None,
            },
            validator: Arc::new(DateValidator),
            factory: Arc::new(DateQueryFactory),
            context_factory: Arc::new(AllScopesContextFactory),
            permission: Arc::new(OpenField),
        });

        Ok(handlers)
    }
}

/// A user-defined field as the application stores it.
#[derive(Debug, Clone)]
pub struct CustomFieldDefinition {
    pub id: CustomFieldId,
    pub display_name: String,
}

/// Where custom field definitions come from. Queried on every registry
/// build, so `refresh` picks up additions and removals.
pub trait CustomFieldProvider: Send + Sync {
    fn custom_fields(&self) -> Result<Vec<CustomFieldDefinition>>;
}

/// Contributes one handler per custom field. Each field answers to the
/// stable `cf[<id>]` form and to its display name; display names are not
/// guaranteed unique, which is where ambiguous lookups come from.
pub struct CustomFieldSource {
    provider: Arc<dyn CustomFieldProvider>,
}

impl CustomFieldSource {
    pub fn new(provider: Arc<dyn CustomFieldProvider>) -> Self {
        CustomFieldSource { provider }
    }
}

impl FieldSource for CustomFieldSource {
    fn field_handlers(&self) -> Result<Vec<ClauseHandler>> {
        let mut handlers = Vec::new();
        for definition in self.provider.custom_fields()? {
            handlers.push(ClauseHandler {
                information: FieldInformation {
                    name: format!("cf[{}]", definition.id),
                    aliases: vec![definition.display_name.clone()],
                    index_field: names::CUSTOM.to_string(),
                    sort_field: None,
                    history_field: None,
                    data_type: DataType::CustomText,
                    operators: with_emptiness(with_text_match(equality())),
                    custom_field_id: Some(definition.id),
                },
                validator: Arc::new(TextValidator),
                factory: Arc::new(CustomFieldQueryFactory {
                    field_id: definition.id,
                }),
                context_factory: Arc::new(AllScopesContextFactory),
                permission: Arc::new(OpenField),
            });
        }
        Ok(handlers)
    }
}

/// In-memory definition store for embedding and tests.
#[derive(Default)]
pub struct InMemoryCustomFields {
    fields: RwLock<Vec<CustomFieldDefinition>>,
}

impl InMemoryCustomFields {
    pub fn new(fields: Vec<CustomFieldDefinition>) -> Self {
        InMemoryCustomFields {
            fields: RwLock::new(fields),
        }
    }

    pub fn add(&self, definition: CustomFieldDefinition) {
        self.fields
            .write()
            .expect("custom field store poisoned")
            .push(definition);
    }

    pub fn remove(&self, id: CustomFieldId) {
        self.fields
            .write()
            .expect("custom field store poisoned")
            .retain(|f| f.id != id);
    }
}

impl CustomFieldProvider for InMemoryCustomFields {
    fn custom_fields(&self) -> Result<Vec<CustomFieldDefinition>> {
        Ok(self
            .fields
            .read()
            .expect("custom field store poisoned")
            .clone())
    }
}
