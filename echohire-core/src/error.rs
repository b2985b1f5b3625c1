use thiserror::Error;

/// Infrastructure errors raised while wiring the service together.
#[derive(Error, Debug)]
pub enum EchoHireError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Document store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    Missing(String),
}

/// Client-visible failures of the interview operations.
///
/// Provider failures never appear here: every provider call has a fallback,
/// so the only errors a caller sees are about identity, ownership, ordering
/// and the store itself.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Access denied")]
    AccessDenied,

    #[error("Missing caller identity")]
    Unauthenticated,

    /// The interview has not reached the state the operation requires yet.
    /// Clients are expected to poll and retry.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Stable machine-readable code for HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::AccessDenied => "access_denied",
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::PreconditionFailed(_) => "precondition_failed",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Store(_) => "store_error",
        }
    }
}
