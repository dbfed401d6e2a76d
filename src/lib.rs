//! # Lodestone
//!
//! A structured query engine and search index for asset catalogs, built on
//! [Tantivy](https://github.com/quickwit-oss/tantivy). Queries arrive as an
//! immutable clause tree (`catalog = "Widgets" AND cost > 100`), get
//! normalized, validated against a per-field handler registry, compiled to
//! an index query, and executed against a generation-managed index.
//!
//! Lodestone is an embeddable core: parsing, HTTP, and storage of the asset
//! records themselves belong to the caller, wired in through the
//! [`types::AssetSource`], [`types::CatalogDirectory`], and
//! [`types::ScopePermissions`] traits.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lodestone::config::SearchConfig;
//! use lodestone::handlers::{
//!     ClauseHandlerRegistry, CustomFieldSource, InMemoryCustomFields, SystemFieldSource,
//! };
//! use lodestone::index::fields::FieldIndexerManager;
//! use lodestone::index::lifecycle::{AssetIndexManager, IndexLifecycleManager};
//! use lodestone::index::schema::AssetSchema;
//! use lodestone::query::clause::Clause;
//! use lodestone::query::operand::FunctionRegistry;
//! use lodestone::search::{SearchRequest, SearchService};
//! use lodestone::types::{AllowAllScopes, Asset, InMemoryAssetSource, InMemoryDirectory};
//! use std::sync::Arc;
//!
//! # fn main() -> lodestone::Result<()> {
//! let schema = Arc::new(AssetSchema::new());
//! let custom = Arc::new(InMemoryCustomFields::default());
//! let fields = Arc::new(FieldIndexerManager::new(Arc::clone(&schema), custom.clone()));
//! let source = Arc::new(InMemoryAssetSource::new(vec![
//!     Asset::new(1, "SKU-100", "Rotating widget", 1),
//! ]));
//!
//! // Index lifecycle: generation directories under the configured root.
//! let config = SearchConfig::default();
//! let assets = Arc::new(AssetIndexManager::new(&config, fields, source)?);
//! let lifecycle = Arc::new(IndexLifecycleManager::new(assets));
//! lifecycle.activate(true)?;
//!
//! // One handler per searchable field, system and custom alike.
//! let registry = Arc::new(ClauseHandlerRegistry::new(vec![
//!     Arc::new(SystemFieldSource::new()),
//!     Arc::new(CustomFieldSource::new(custom)),
//! ])?);
//!
//! let service = SearchService::new(
//!     registry,
//!     Arc::new(FunctionRegistry::with_builtins()),
//!     Arc::new(InMemoryDirectory::default()),
//!     Arc::new(AllowAllScopes),
//!     lifecycle,
//! );
//!
//! let outcome = service.search(
//!     None,
//!     &Clause::equals("name", "widget"),
//!     &SearchRequest::default(),
//! )?;
//! println!("{} matching assets", outcome.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod index;
pub mod query;
pub mod search;
pub mod types;

pub use error::{LodestoneError, Result};
pub use index::lifecycle::{
    AssetIndexManager, BackgroundReindex, CancellationFlag, EntityIndexManager,
    IndexLifecycleManager, ReindexProgress,
};
pub use index::schema::AssetSchema;
pub use index::{AssetIndex, FieldIndexerManager, FlushPolicy, SearchLease, WriterStats};
pub use query::clause::{Clause, Operator};
pub use query::messages::{Message, MessageSet, ParseResult, Severity};
pub use query::operand::{FunctionRegistry, Operand};
pub use search::{SearchOutcome, SearchRequest, SearchService, SortOrder, SortSpec};
pub use types::*;

/// Install a console subscriber honoring `RUST_LOG`, defaulting to `info`.
///
/// Embedding applications that already manage their own subscriber should
/// skip this. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
