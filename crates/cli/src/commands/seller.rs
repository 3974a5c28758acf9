//! Seller account commands.
//!
//! # Usage
//!
//! ```bash
//! sk-cli seller create -e owner@example.com -n "Ada" -s "Ada's Patterns" -p 'long-password'
//! ```

use shelfkeeper_admin::services::AuthService;
use shelfkeeper_admin::services::auth::Registration;
use shelfkeeper_core::SellerId;

use super::{CommandError, connect};

/// Create a seller account.
///
/// # Errors
///
/// Returns an error if the email is invalid or taken, the password is too
/// short, or the database is unreachable.
pub async fn create(
    email: &str,
    name: &str,
    store: &str,
    password: &str,
) -> Result<SellerId, CommandError> {
    let pool = connect().await?;

    let seller = AuthService::new(&pool)
        .register(&Registration {
            email,
            password,
            display_name: name,
            store_name: store,
        })
        .await?;

    tracing::info!(seller_id = %seller.id, email = %seller.email, "Seller created");
    Ok(seller.id)
}
