use thiserror::Error;

/// Error types for the back-office engine
#[derive(Error, Debug)]
pub enum DeskError {
    /// A referenced record does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The identity is not allowed to see or touch the record
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request is well formed but violates a business rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error from the database operations
    #[error("Database error: {0}")]
    Persistence(#[from] sea_orm::DbErr),

    /// No usable session was presented
    #[error("Login required")]
    Unauthenticated,

    /// Password hashing or session signing failed
    #[error("Credential error: {0}")]
    Credential(String),
}

impl DeskError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DeskError::NotFound(what.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        DeskError::Forbidden(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        DeskError::Validation(reason.into())
    }
}

/// Type alias for Result with DeskError
pub type Result<T> = std::result::Result<T, DeskError>;
