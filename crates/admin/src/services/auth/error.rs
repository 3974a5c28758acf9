//! Seller authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during seller authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] shelfkeeper_core::EmailError),

    /// Wrong password or unknown email. The two are never distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A seller with this email already exists.
    #[error("a seller with this email already exists")]
    SellerAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// A required profile field was blank.
    #[error("{0} must not be blank")]
    MissingField(&'static str),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
