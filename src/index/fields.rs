use crate::error::Result;
use crate::handlers::CustomFieldProvider;
use crate::index::schema::{names, AssetSchema};
use crate::types::{canonical_timestamp, Asset};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tantivy::schema::OwnedValue;
use tantivy::TantivyDocument;
use tracing::warn;

/// Sort keys keep at most this many characters. Characters, not bytes; a
/// multi-byte value near the limit must never split a code point.
pub const SORT_KEY_MAX_CHARS: usize = 50;

/// Sort key written for null or blank values. U+FFFD orders after every
/// printable string, so empty cells land at the end of an ascending sort.
pub const NULL_SORT_KEY: &str = "\u{FFFD}";

/// Canonical sort key for a field value: trimmed, truncated, case preserved.
/// Folding would bake one locale's casing rules into every stored key, so
/// ordering is left byte-wise on the original text.
pub fn sort_key(value: Option<&str>) -> String {
    let trimmed = value.map(str::trim).unwrap_or("");
    if trimmed.is_empty() {
        return NULL_SORT_KEY.to_string();
    }
    trimmed.chars().take(SORT_KEY_MAX_CHARS).collect()
}

/// One field's contribution to an asset's index document.
///
/// `field_id` is the canonical handler name (`sku`, `catalog`, `cf[7]`) and
/// is what the sidecar fields record, so presence queries and visibility
/// lookups share one vocabulary with the clause registry.
pub trait FieldIndexer: Send + Sync {
    fn field_id(&self) -> &str;

    /// Write the asset's value into the document. Returns whether the asset
    /// holds a value for this field, which feeds the `nonemptyfieldids`
    /// sidecar.
    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool>;

    /// Whether the field is advertised as searchable for this record.
    /// Distinct from having been indexed: bookkeeping fields index terms but
    /// stay invisible.
    fn is_visible(&self, _asset: &Asset) -> bool {
        true
    }
}

struct IdIndexer;

impl FieldIndexer for IdIndexer {
    fn field_id(&self) -> &str {
        "id"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        doc.add_u64(schema.id_field(), asset.id);
        Ok(true)
    }
}

struct SkuIndexer;

impl FieldIndexer for SkuIndexer {
    fn field_id(&self) -> &str {
        "sku"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        let sku = asset.sku.trim();
        if sku.is_empty() {
            return Ok(false);
        }
        if let Some(field) = schema.raw_field(names::SKU) {
            doc.add_text(field, sku);
            // Folded copy as a second value, so lookups match either case
            // while the stored identifier keeps its own.
            let folded = sku.to_lowercase();
            if folded != sku {
                doc.add_text(field, &folded);
            }
        }
        if let Some(field) = schema.raw_field(names::SORT_SKU) {
            doc.add_text(field, &sort_key(Some(sku)));
        }
        Ok(true)
    }
}

struct NameIndexer;

impl FieldIndexer for NameIndexer {
    fn field_id(&self) -> &str {
        "name"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        add_text_pair(doc, schema, names::NAME, &asset.name);
        if let Some(field) = schema.raw_field(names::SORT_NAME) {
            doc.add_text(field, &sort_key(Some(&asset.name)));
        }
        Ok(!asset.name.trim().is_empty())
    }
}

struct DescriptionIndexer;

impl FieldIndexer for DescriptionIndexer {
    fn field_id(&self) -> &str {
        "description"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        match asset.description.as_deref() {
            Some(text) if !text.trim().is_empty() => {
                add_text_pair(doc, schema, names::DESCRIPTION, text);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

struct CatalogIndexer;

impl FieldIndexer for CatalogIndexer {
    fn field_id(&self) -> &str {
        "catalog"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        if let Some(field) = schema.u64_field(names::CATALOG) {
            doc.add_u64(field, asset.catalog_id);
        }
        Ok(true)
    }
}

struct ManufacturerIndexer;

impl FieldIndexer for ManufacturerIndexer {
    fn field_id(&self) -> &str {
        "manufacturer"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        // Imported assets may have no manufacturer. The document still gets
        // built; this field is simply absent.
        match asset.manufacturer_id {
            Some(id) => {
                if let Some(field) = schema.u64_field(names::MANUFACTURER) {
                    doc.add_u64(field, id);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

struct CostIndexer;

impl FieldIndexer for CostIndexer {
    fn field_id(&self) -> &str {
        "cost"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        match asset.cost {
            Some(cost) => {
                if let Some(field) = schema.number_field(names::COST) {
                    doc.add_f64(field, cost);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

struct ListPriceIndexer;

impl FieldIndexer for ListPriceIndexer {
    fn field_id(&self) -> &str {
        "listprice"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        match asset.list_price {
            Some(price) => {
                if let Some(field) = schema.number_field(names::LIST_PRICE) {
                    doc.add_f64(field, price);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

struct StatusIndexer;

impl FieldIndexer for StatusIndexer {
    fn field_id(&self) -> &str {
        "status"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        let current = asset.status.as_str();
        if let Some(field) = schema.raw_field(names::STATUS) {
            doc.add_text(field, current);
        }
        if let Some(field) = schema.raw_field(names::SORT_STATUS) {
            doc.add_text(field, &sort_key(Some(current)));
        }
        // WAS matches values the asset holds now or held at any earlier
        // point, so the history field carries the current value too.
        if let Some(field) = schema.raw_field(names::WAS_STATUS) {
            let mut seen = vec![current.to_string()];
            for change in asset.history.iter().filter(|c| c.field == "status") {
                for value in [change.from.as_deref(), change.to.as_deref()] {
                    if let Some(value) = value {
                        let folded = value.trim().to_lowercase();
                        if !folded.is_empty() && !seen.contains(&folded) {
                            seen.push(folded);
                        }
                    }
                }
            }
            for value in &seen {
                doc.add_text(field, value);
            }
        }
        Ok(true)
    }
}

struct CreatedIndexer;

impl FieldIndexer for CreatedIndexer {
    fn field_id(&self) -> &str {
        "created"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        if let Some(field) = schema.raw_field(names::CREATED) {
            doc.add_text(field, &canonical_timestamp(asset.created));
        }
        Ok(true)
    }
}

struct UpdatedIndexer;

impl FieldIndexer for UpdatedIndexer {
    fn field_id(&self) -> &str {
        "updated"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        if let Some(field) = schema.raw_field(names::UPDATED) {
            doc.add_text(field, &canonical_timestamp(asset.updated));
        }
        Ok(true)
    }
}

/// Records which fields changed at any point, for the CHANGED operator.
/// Terms are handler names, matching what the compiler emits.
struct ChangeHistoryIndexer;

impl FieldIndexer for ChangeHistoryIndexer {
    fn field_id(&self) -> &str {
        "changed_fields"
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        let mut seen: Vec<String> = Vec::new();
        for change in &asset.history {
            let folded = change.field.trim().to_lowercase();
            if !folded.is_empty() && !seen.contains(&folded) {
                seen.push(folded);
            }
        }
        for name in &seen {
            doc.add_text(schema.changed_fields(), name);
        }
        Ok(false)
    }

    fn is_visible(&self, _asset: &Asset) -> bool {
        false
    }
}

/// One user-defined field, indexed under its id inside the shared JSON
/// field.
struct CustomFieldIndexer {
    id: u64,
    canonical: String,
}

impl CustomFieldIndexer {
    fn new(id: u64) -> Self {
        CustomFieldIndexer {
            id,
            canonical: format!("cf[{}]", id),
        }
    }
}

impl FieldIndexer for CustomFieldIndexer {
    fn field_id(&self) -> &str {
        &self.canonical
    }

    fn add_fields(
        &self,
        doc: &mut TantivyDocument,
        asset: &Asset,
        schema: &AssetSchema,
    ) -> Result<bool> {
        match asset.custom_value(self.id) {
            Some(value) if !value.trim().is_empty() => {
                let mut object = BTreeMap::new();
                object.insert(self.id.to_string(), OwnedValue::Str(value.to_string()));
                doc.add_object(schema.custom_field(), object);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Owns the ordered indexer list and turns assets into index documents.
///
/// Indexers fail independently: an error or panic in one is logged and that
/// field left out, and the document build always completes. A half-written
/// asset record must degrade to a findable document, not a reindex abort.
pub struct FieldIndexerManager {
    schema: Arc<AssetSchema>,
    indexers: Vec<Arc<dyn FieldIndexer>>,
}

impl FieldIndexerManager {
    pub fn new(schema: Arc<AssetSchema>, custom_fields: Arc<dyn CustomFieldProvider>) -> Self {
        let mut indexers: Vec<Arc<dyn FieldIndexer>> = vec![
            Arc::new(IdIndexer),
            Arc::new(SkuIndexer),
            Arc::new(NameIndexer),
            Arc::new(DescriptionIndexer),
            Arc::new(CatalogIndexer),
            Arc::new(ManufacturerIndexer),
            Arc::new(CostIndexer),
            Arc::new(ListPriceIndexer),
            Arc::new(StatusIndexer),
            Arc::new(CreatedIndexer),
            Arc::new(UpdatedIndexer),
            Arc::new(ChangeHistoryIndexer),
        ];
        match custom_fields.custom_fields() {
            Ok(definitions) => {
                for definition in definitions {
                    indexers.push(Arc::new(CustomFieldIndexer::new(definition.id)));
                }
            }
            Err(err) => {
                warn!(error = %err, "custom field definitions unavailable; indexing system fields only");
            }
        }
        FieldIndexerManager { schema, indexers }
    }

    pub fn schema(&self) -> &Arc<AssetSchema> {
        &self.schema
    }

    pub fn all_asset_indexers(&self) -> &[Arc<dyn FieldIndexer>] {
        &self.indexers
    }

    /// Build the index document for one asset. Always succeeds; individual
    /// indexer failures cost that field, nothing more.
    pub fn build_document(&self, asset: &Asset) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        let mut visible: Vec<&str> = Vec::new();
        let mut nonempty: Vec<&str> = Vec::new();

        for indexer in &self.indexers {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                indexer.add_fields(&mut doc, asset, &self.schema)
            }));
            let has_value = match outcome {
                Ok(Ok(has_value)) => has_value,
                Ok(Err(err)) => {
                    warn!(
                        asset = asset.id,
                        field = indexer.field_id(),
                        error = %err,
                        "field indexer failed; field left out of document"
                    );
                    false
                }
                Err(_) => {
                    warn!(
                        asset = asset.id,
                        field = indexer.field_id(),
                        "field indexer panicked; field left out of document"
                    );
                    false
                }
            };
            if has_value {
                nonempty.push(indexer.field_id());
            }
            if indexer.is_visible(asset) {
                visible.push(indexer.field_id());
            }
        }

        for id in visible {
            doc.add_text(self.schema.visible_fields(), id);
        }
        for id in nonempty {
            doc.add_text(self.schema.nonempty_fields(), id);
        }
        doc
    }
}

fn add_text_pair(doc: &mut TantivyDocument, schema: &AssetSchema, name: &str, value: &str) {
    if let Some(field) = schema.text_field(name) {
        doc.add_text(field, value);
    }
    if let Some(field) = schema.exact_variant(name) {
        doc.add_text(field, value);
    }
}
