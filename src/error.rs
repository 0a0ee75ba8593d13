use thiserror::Error;

/// Rejection produced by the report validator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Required field missing: {field}")]
    Incomplete { field: String },

    #[error("Field '{field}' has the wrong type: expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("Field '{field}' is invalid: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl SchemaError {
    pub fn field(&self) -> &str {
        match self {
            SchemaError::Incomplete { field }
            | SchemaError::TypeMismatch { field, .. }
            | SchemaError::InvalidValue { field, .. } => field,
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Extraction service unavailable: {0}")]
    ExtractionUnavailable(String),

    #[error("Extraction rejected: {0}")]
    ExtractionRejected(String),

    #[error("A report with id '{0}' already exists in the library")]
    DuplicateIdentity(String),

    #[error("Unknown report: {0}")]
    UnknownReport(String),

    #[error("Report '{id}' cannot change immutable field '{field}'")]
    ImmutableFieldMutation { id: String, field: String },

    #[error("Persisted library is corrupt: {0}")]
    PersistenceCorrupt(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Comparison is invalid: {}", .0.join("; "))]
    ComparisonInvalid(Vec<String>),

    #[error("Live session error: {0}")]
    LiveSession(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("JSON patch error: {0}")]
    JsonPatch(#[from] json_patch::PatchError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AnalyzerError {
    /// Upstream failures that leave the library untouched.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            AnalyzerError::ExtractionUnavailable(_)
                | AnalyzerError::ExtractionRejected(_)
                | AnalyzerError::Schema(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
