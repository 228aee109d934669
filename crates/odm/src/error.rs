// Error types for store operations
use std::fmt;

/// Which catalog (or registry) a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Unit,
    Variable,
    Method,
    ProcessingLevel,
    SamplingFeature,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CatalogKind::Unit => "unit",
            CatalogKind::Variable => "variable",
            CatalogKind::Method => "method",
            CatalogKind::ProcessingLevel => "processing level",
            CatalogKind::SamplingFeature => "sampling feature",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown {kind}: {code}")]
    UnknownReference { kind: CatalogKind, code: String },

    #[error("Duplicate {kind} code: {code}")]
    DuplicateCode { kind: CatalogKind, code: String },

    #[error("Measurement of {variable_code} at site {site_code} has {rows} rows, expected one")]
    CardinalityError {
        site_code: String,
        variable_code: String,
        rows: usize,
    },

    #[error("Ambiguous join: input {input} has more than one value at site {site_code}, {timestamp}")]
    AmbiguousJoin {
        input: String,
        site_code: String,
        timestamp: String,
    },

    #[error("Invalid vocabulary: '{term}' is not a recognized {field}")]
    InvalidVocabulary { field: String, term: String },

    #[error("No joined rows for site {site_code}")]
    EmptyJoin { site_code: String },

    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store conflict: {0}")]
    Conflict(String),

    #[error("Store connection mutex poisoned")]
    Poisoned,

    #[error("DuckDB error: {0}")]
    Store(#[from] duckdb::Error),

    #[error("Query builder error: {0}")]
    Query(#[from] sea_query::error::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_arrow::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for write-write or uniqueness conflicts between concurrent
    /// transactions. The failed transaction has been rolled back and may be
    /// rerun from the start.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Store(e) => is_conflict_message(&e.to_string()),
            _ => false,
        }
    }

    pub(crate) fn unknown(kind: CatalogKind, code: &str) -> Self {
        Error::UnknownReference {
            kind,
            code: code.to_string(),
        }
    }

    pub(crate) fn duplicate(kind: CatalogKind, code: &str) -> Self {
        Error::DuplicateCode {
            kind,
            code: code.to_string(),
        }
    }
}

/// DuckDB reports both unique-index collisions and optimistic concurrency
/// failures through message text.
pub(crate) fn is_conflict_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("duplicate key") || msg.contains("conflict") || msg.contains("write-write")
}

/// True when the error is a uniqueness collision on a single insert.
pub(crate) fn is_unique_violation(err: &duckdb::Error) -> bool {
    err.to_string().to_ascii_lowercase().contains("duplicate key")
}
