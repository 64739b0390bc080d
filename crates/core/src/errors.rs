use thiserror::Error;

/// Operation-level failure taxonomy shared by the store, the HTTP surface,
/// and the client. Each variant maps to a distinct HTTP-equivalent class:
/// validation (400), missing identity (401), denied access (403), absent
/// target (404).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{resource} not found")]
    NotFound { resource: String },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Whether retrying the same call unchanged could succeed. Validation
    /// failures are correctable by the user; authorization failures are not
    /// retryable without a privilege change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
