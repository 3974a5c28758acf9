//! CLI command implementations.

pub mod billing;
pub mod migrate;
pub mod seed;
pub mod seller;

use sqlx::PgPool;
use thiserror::Error;

use shelfkeeper_admin::config::{ConfigError, get_database_url};
use shelfkeeper_admin::db::{self, RepositoryError};
use shelfkeeper_admin::services::{AuthError, CommunicationError, CouponError};

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Coupon(#[from] CouponError),

    #[error("{0}")]
    Communication(#[from] CommunicationError),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("SMTP is not configured (set SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD, SMTP_FROM)")]
    NoSmtp,

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid seed file: {0}")]
    InvalidSeed(String),
}

/// Connect to the dashboard database.
async fn connect() -> Result<PgPool, CommandError> {
    let _ = dotenvy::dotenv();
    let database_url = get_database_url("DESK_DATABASE_URL")?;
    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}
