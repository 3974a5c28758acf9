//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use url::Url;

use crate::config::DeskConfig;
use crate::services::{DownloadSigner, EmailService, FileStore, StatsCache};

/// Error building application state from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid base_url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("invalid download signing key: {0}")]
    SigningKey(#[from] hmac::digest::InvalidLength),
    #[error("download link ttl out of range")]
    LinkTtl,
    #[error("SMTP configuration error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: DeskConfig,
    pool: PgPool,
    base_url: Url,
    files: FileStore,
    mailer: Option<EmailService>,
    stats: StatsCache,
    signer: DownloadSigner,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL, signing key or SMTP settings are
    /// unusable.
    pub fn new(config: DeskConfig, pool: PgPool) -> Result<Self, StateError> {
        let base_url = Url::parse(&config.base_url)?;
        let ttl = chrono::Duration::from_std(config.storage.link_ttl)
            .map_err(|_| StateError::LinkTtl)?;
        let signer = DownloadSigner::new(&config.storage.signing_key, ttl)?;
        let files = FileStore::new(config.storage.dir.clone());
        let mailer = config.email.as_ref().map(EmailService::new).transpose()?;
        if mailer.is_none() {
            tracing::warn!("SMTP not configured; communications will stay queued");
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                base_url,
                files,
                mailer,
                stats: StatsCache::default(),
                signer,
            }),
        })
    }

    /// Get a reference to the dashboard configuration.
    #[must_use]
    pub fn config(&self) -> &DeskConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Parsed public base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    #[must_use]
    pub fn files(&self) -> &FileStore {
        &self.inner.files
    }

    /// SMTP transport, when configured.
    #[must_use]
    pub fn mailer(&self) -> Option<&EmailService> {
        self.inner.mailer.as_ref()
    }

    #[must_use]
    pub fn stats(&self) -> &StatsCache {
        &self.inner.stats
    }

    #[must_use]
    pub fn signer(&self) -> &DownloadSigner {
        &self.inner.signer
    }
}
