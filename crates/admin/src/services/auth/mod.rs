//! Seller authentication service.
//!
//! Email and password only. Passwords are hashed with Argon2id; a failed
//! login never reveals whether the email exists.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;

use shelfkeeper_core::Email;

use crate::db::RepositoryError;
use crate::db::sellers::SellerRepository;
use crate::models::Seller;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Fields for registering a seller.
#[derive(Debug, Clone)]
pub struct Registration<'r> {
    pub email: &'r str,
    pub password: &'r str,
    pub display_name: &'r str,
    pub store_name: &'r str,
}

/// Seller authentication service.
pub struct AuthService<'a> {
    sellers: SellerRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            sellers: SellerRepository::new(pool),
        }
    }

    /// Register a new seller.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password is too short.
    /// Returns `AuthError::MissingField` if a name is blank.
    /// Returns `AuthError::SellerAlreadyExists` if the email is already registered.
    pub async fn register(&self, registration: &Registration<'_>) -> Result<Seller, AuthError> {
        let email = Email::parse(registration.email)?;
        validate_password(registration.password)?;

        let display_name = registration.display_name.trim();
        if display_name.is_empty() {
            return Err(AuthError::MissingField("display_name"));
        }
        let store_name = registration.store_name.trim();
        if store_name.is_empty() {
            return Err(AuthError::MissingField("store_name"));
        }

        let password_hash = hash_password(registration.password)?;

        let seller = self
            .sellers
            .create(&email, &password_hash, display_name, store_name)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::SellerAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(seller_id = %seller.id, "Seller registered");
        Ok(seller)
    }

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for a malformed email, an
    /// unknown email, or a wrong password.
    pub async fn login(&self, email: &str, password: &str) -> Result<Seller, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (seller, password_hash) = self
            .sellers
            .get_by_email_with_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(seller)
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn test_validate_password_counts_characters_not_bytes() {
        // Seven characters, fourteen bytes.
        assert!(validate_password("ééééééé").is_err());
    }

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_garbage_hash_is_invalid_credentials() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
