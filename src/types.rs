use crate::error::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Asset identifier, the index document identity.
pub type AssetId = u64;
/// Catalog identifier, one scope dimension of a query context.
pub type CatalogId = u64;
/// Manufacturer identifier, the other scope dimension.
pub type ManufacturerId = u64;
/// Custom field identifier (numeric part of `cf[10010]`).
pub type CustomFieldId = u64;

/// Stable identifier of a searchable field, stored in the `visiblefieldids`
/// sidecar so the UI can ask "which columns can I show" without re-deriving
/// visibility per asset.
pub type FieldId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Active,
    Pending,
    Discontinued,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Active => "active",
            AssetStatus::Pending => "pending",
            AssetStatus::Discontinued => "discontinued",
        }
    }

    /// Case-insensitive parse; `None` for unknown values (the validator turns
    /// that into a per-clause error rather than a hard failure).
    pub fn parse(value: &str) -> Option<AssetStatus> {
        match value.to_lowercase().as_str() {
            "active" => Some(AssetStatus::Active),
            "pending" => Some(AssetStatus::Pending),
            "discontinued" => Some(AssetStatus::Discontinued),
            _ => None,
        }
    }

    pub fn all() -> &'static [AssetStatus] {
        &[
            AssetStatus::Active,
            AssetStatus::Pending,
            AssetStatus::Discontinued,
        ]
    }
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custom-field value attached to an asset. Custom fields are plain text
/// (free text or select options); their definitions live in the clause
/// handler registry's custom-field source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomValue {
    pub field_id: CustomFieldId,
    pub value: String,
}

/// One entry of an asset's change history. Drives the WAS and CHANGED
/// clause operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetChange {
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub at: NaiveDateTime,
}

/// A catalog/quote asset record, the unit the index pipeline turns into an
/// index document. Persistence of these records belongs to the surrounding
/// application; the engine only reads them through [`AssetSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub catalog_id: CatalogId,
    /// Nullable by design: imported assets may lack a manufacturer. Indexing
    /// must tolerate this (the manufacturer fields are simply absent).
    pub manufacturer_id: Option<ManufacturerId>,
    pub cost: Option<f64>,
    pub list_price: Option<f64>,
    pub status: AssetStatus,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
    pub custom_values: Vec<CustomValue>,
    pub history: Vec<AssetChange>,
}

impl Asset {
    /// Minimal constructor for tests and import paths; everything optional
    /// starts empty.
    pub fn new(id: AssetId, sku: &str, name: &str, catalog_id: CatalogId) -> Self {
        Asset {
            id,
            sku: sku.to_string(),
            name: name.to_string(),
            description: None,
            catalog_id,
            manufacturer_id: None,
            cost: None,
            list_price: None,
            status: AssetStatus::Active,
            created: NaiveDateTime::default(),
            updated: NaiveDateTime::default(),
            custom_values: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn custom_value(&self, field_id: CustomFieldId) -> Option<&str> {
        self.custom_values
            .iter()
            .find(|v| v.field_id == field_id)
            .map(|v| v.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub id: CatalogId,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manufacturer {
    pub id: ManufacturerId,
    pub name: String,
}

/// The searching user. Anonymous sessions pass `None` wherever an
/// `Option<&User>` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Stable key, used for cache identity and the `currentUser()` function.
    pub key: String,
    pub display_name: String,
}

impl User {
    pub fn new(key: &str, display_name: &str) -> Self {
        User {
            key: key.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// Canonical sortable timestamp text. Date fields are indexed and compared
/// lexicographically, so the representation must sort chronologically.
pub fn canonical_timestamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Feeds the reindexing pipeline. Implemented by the application's
/// persistence layer; an in-memory implementation ships for embedding and
/// tests.
pub trait AssetSource: Send + Sync {
    fn count(&self) -> Result<usize>;
    /// Page of assets in a stable order. Reindex walks offset 0.. until a
    /// short page comes back.
    fn batch(&self, offset: usize, limit: usize) -> Result<Vec<Asset>>;
    fn asset(&self, id: AssetId) -> Result<Option<Asset>>;
}

/// Name/id resolution for catalogs and manufacturers. Lookups are
/// case-insensitive and may legitimately return several ids (duplicate
/// display names across archived catalogs).
pub trait CatalogDirectory: Send + Sync {
    fn catalog_ids_by_name(&self, name: &str) -> Vec<CatalogId>;
    fn manufacturer_ids_by_name(&self, name: &str) -> Vec<ManufacturerId>;
    fn catalog(&self, id: CatalogId) -> Option<Catalog>;
    fn manufacturer(&self, id: ManufacturerId) -> Option<Manufacturer>;
    fn catalogs(&self) -> Vec<Catalog>;
}

/// The permission predicate the engine consults. Policy lives entirely in
/// the application; the engine only asks yes/no questions.
pub trait ScopePermissions: Send + Sync {
    fn can_see_catalog(&self, user: Option<&User>, id: CatalogId) -> bool;
    fn can_see_manufacturer(&self, user: Option<&User>, id: ManufacturerId) -> bool;
    fn visible_catalogs(&self, user: Option<&User>) -> Vec<CatalogId>;
}

/// In-memory asset store. Batches come back in insertion order, which keeps
/// reindex runs reproducible in tests.
#[derive(Default)]
pub struct InMemoryAssetSource {
    assets: RwLock<Vec<Asset>>,
}

impl InMemoryAssetSource {
    pub fn new(assets: Vec<Asset>) -> Self {
        InMemoryAssetSource {
            assets: RwLock::new(assets),
        }
    }

    pub fn push(&self, asset: Asset) {
        self.assets.write().expect("asset store poisoned").push(asset);
    }
}

impl AssetSource for InMemoryAssetSource {
    fn count(&self) -> Result<usize> {
        Ok(self.assets.read().expect("asset store poisoned").len())
    }

    fn batch(&self, offset: usize, limit: usize) -> Result<Vec<Asset>> {
        let assets = self.assets.read().expect("asset store poisoned");
        Ok(assets.iter().skip(offset).take(limit).cloned().collect())
    }

    fn asset(&self, id: AssetId) -> Result<Option<Asset>> {
        let assets = self.assets.read().expect("asset store poisoned");
        Ok(assets.iter().find(|a| a.id == id).cloned())
    }
}

/// In-memory catalog/manufacturer directory keyed by folded names.
#[derive(Default)]
pub struct InMemoryDirectory {
    catalogs: Vec<Catalog>,
    manufacturers: Vec<Manufacturer>,
}

impl InMemoryDirectory {
    pub fn new(catalogs: Vec<Catalog>, manufacturers: Vec<Manufacturer>) -> Self {
        InMemoryDirectory {
            catalogs,
            manufacturers,
        }
    }
}

impl CatalogDirectory for InMemoryDirectory {
    fn catalog_ids_by_name(&self, name: &str) -> Vec<CatalogId> {
        let folded = name.to_lowercase();
        self.catalogs
            .iter()
            .filter(|c| c.name.to_lowercase() == folded)
            .map(|c| c.id)
            .collect()
    }

    fn manufacturer_ids_by_name(&self, name: &str) -> Vec<ManufacturerId> {
        let folded = name.to_lowercase();
        self.manufacturers
            .iter()
            .filter(|m| m.name.to_lowercase() == folded)
            .map(|m| m.id)
            .collect()
    }

    fn catalog(&self, id: CatalogId) -> Option<Catalog> {
        self.catalogs.iter().find(|c| c.id == id).cloned()
    }

    fn manufacturer(&self, id: ManufacturerId) -> Option<Manufacturer> {
        self.manufacturers.iter().find(|m| m.id == id).cloned()
    }

    fn catalogs(&self) -> Vec<Catalog> {
        self.catalogs.clone()
    }
}

/// Grants everything to everyone. The right default for embedded,
/// single-user deployments, and the base for test fixtures.
#[derive(Default, Clone, Copy)]
pub struct AllowAllScopes;

impl ScopePermissions for AllowAllScopes {
    fn can_see_catalog(&self, _user: Option<&User>, _id: CatalogId) -> bool {
        true
    }

    fn can_see_manufacturer(&self, _user: Option<&User>, _id: ManufacturerId) -> bool {
        true
    }

    fn visible_catalogs(&self, _user: Option<&User>) -> Vec<CatalogId> {
        Vec::new()
    }
}

/// Per-user catalog allow-lists; anything not listed is denied. Manufacturer
/// visibility is open (the common production shape: catalogs carry the
/// permission scheme, manufacturers do not).
#[derive(Default)]
pub struct CatalogAllowList {
    grants: HashMap<String, Vec<CatalogId>>,
    anonymous: Vec<CatalogId>,
}

impl CatalogAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, user_key: &str, catalogs: Vec<CatalogId>) -> Self {
        self.grants.insert(user_key.to_string(), catalogs);
        self
    }

    pub fn grant_anonymous(mut self, catalogs: Vec<CatalogId>) -> Self {
        self.anonymous = catalogs;
        self
    }
}

impl ScopePermissions for CatalogAllowList {
    fn can_see_catalog(&self, user: Option<&User>, id: CatalogId) -> bool {
        self.visible_catalogs(user).contains(&id)
    }

    fn can_see_manufacturer(&self, _user: Option<&User>, _id: ManufacturerId) -> bool {
        true
    }

    fn visible_catalogs(&self, user: Option<&User>) -> Vec<CatalogId> {
        match user {
            Some(u) => self.grants.get(&u.key).cloned().unwrap_or_default(),
            None => self.anonymous.clone(),
        }
    }
}
