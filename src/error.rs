use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LodestoneError {
    #[error("Index is deactivated for entity: {0}")]
    IndexDeactivated(String),

    #[error("Indexing is disabled by configuration")]
    IndexingDisabled,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Clause on field {field} cannot be executed with operator {operator}")]
    UnsupportedClause { field: String, operator: String },

    #[error("Field not registered: {0}")]
    FieldNotFound(String),

    #[error("Ambiguous clause name: {0}")]
    AmbiguousField(String),

    #[error("Invalid literal for field {field}: {message}")]
    InvalidLiteral { field: String, message: String },

    #[error("Reindex failed for entity {entity}: {message}")]
    ReindexFailed { entity: String, message: String },

    #[error("Reindex cancelled for entity: {0}")]
    ReindexCancelled(String),

    #[error("Writer is closed")]
    WriterClosed,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tantivy error: {0}")]
    Tantivy(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LodestoneError>;

impl From<std::io::Error> for LodestoneError {
    fn from(e: std::io::Error) -> Self {
        LodestoneError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for LodestoneError {
    fn from(e: tantivy::TantivyError) -> Self {
        LodestoneError::Tantivy(e.to_string())
    }
}

impl From<serde_json::Error> for LodestoneError {
    fn from(e: serde_json::Error) -> Self {
        LodestoneError::Json(e.to_string())
    }
}

impl LodestoneError {
    /// True for failures that invalidate a whole operation (reindex, writer,
    /// storage) as opposed to per-clause problems that are collected into
    /// message sets and reported alongside results.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LodestoneError::ReindexFailed { .. }
                | LodestoneError::WriterClosed
                | LodestoneError::Io(_)
                | LodestoneError::Tantivy(_)
                | LodestoneError::Config(_)
        )
    }
}
