//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions with
//! SameSite=Strict cookies that expire after 24 hours of inactivity.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::DeskConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "shelfkeeper_session";

/// Session expiry time in seconds (24 hours of inactivity).
const SESSION_EXPIRY_SECONDS: i64 = 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// # Panics
///
/// Panics if the schema name or table name is invalid (should never happen
/// with hardcoded "desk" and "session" values).
#[must_use]
#[allow(clippy::expect_used)]
pub fn create_session_layer(
    pool: &PgPool,
    config: &DeskConfig,
) -> SessionManagerLayer<PostgresStore> {
    // The session table is created by migration in the desk schema.
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("desk")
        .expect("valid schema name")
        .with_table_name("session")
        .expect("valid table name");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        .with_same_site(tower_sessions::cookie::SameSite::Strict)
        .with_http_only(true)
        .with_path("/")
}
