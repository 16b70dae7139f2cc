//! Error types for the cosign core library.

/// Top-level error enum for the cosign core library.
#[derive(Debug, thiserror::Error)]
pub enum CosignError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Unknown party code {code:?} in {identity:?}")]
    UnknownParty { code: char, identity: String },

    #[error("Malformed identity string {0:?}")]
    MalformedIdentity(String),

    #[error("No member resolves sponsor {identity:?} on bill {bill_number}")]
    UnresolvedSponsor { identity: String, bill_number: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used when reporting a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InputMalformed,
    LookupFailure,
    StorageFailure,
}

impl CosignError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CosignError::Parse(_)
            | CosignError::Xml(_)
            | CosignError::UnknownParty { .. }
            | CosignError::MalformedIdentity(_)
            | CosignError::Io(_) => ErrorCategory::InputMalformed,
            CosignError::UnresolvedSponsor { .. } => ErrorCategory::LookupFailure,
            CosignError::Database(_) | CosignError::Sqlite(_) | CosignError::Json(_) => {
                ErrorCategory::StorageFailure
            }
        }
    }
}

pub type CosignResult<T> = Result<T, CosignError>;
