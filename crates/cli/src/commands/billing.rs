//! Scheduled jobs: the subscription renewal sweep and the communication queue.
//!
//! Both are meant to run from cron (or a Fly.io scheduled machine) every few
//! minutes. Each is safe to run concurrently with the server.
//!
//! # Usage
//!
//! ```bash
//! sk-cli subscriptions renew-due --limit 500
//! sk-cli communications flush --limit 200
//! ```

use chrono::Utc;

use shelfkeeper_admin::config::EmailConfig;
use shelfkeeper_admin::services::subscriptions::RenewalReport;
use shelfkeeper_admin::services::{
    CommunicationService, EmailService, StatsCache, SubscriptionService,
};
use shelfkeeper_admin::services::communications::FlushReport;

use super::{CommandError, connect};

/// SMTP transport if configured.
fn mailer() -> Result<Option<EmailService>, CommandError> {
    EmailConfig::from_env()?
        .as_ref()
        .map(EmailService::new)
        .transpose()
        .map_err(|e| CommandError::Smtp(e.to_string()))
}

/// Renew, mark past due or expire every subscription whose period has ended.
///
/// Receipts for renewals are sent when SMTP is configured and left queued
/// otherwise.
///
/// # Errors
///
/// Returns an error if the database is unreachable or SMTP is misconfigured.
/// Failures on individual subscriptions are counted in the report.
pub async fn renew_due(limit: i64) -> Result<RenewalReport, CommandError> {
    let pool = connect().await?;
    let mailer = mailer()?;
    // The server's cache expires on its own; this one is just for the service
    let stats = StatsCache::default();

    let report = SubscriptionService::new(&pool, &stats, mailer.as_ref())
        .renew_due(Utc::now(), limit)
        .await?;

    tracing::info!(
        examined = report.examined,
        renewed = report.renewed,
        past_due = report.past_due,
        expired = report.expired,
        failed = report.failed,
        "Renewal sweep complete"
    );
    Ok(report)
}

/// Send every queued communication.
///
/// # Errors
///
/// Returns `CommandError::NoSmtp` when SMTP is not configured.
pub async fn flush_communications(limit: i64) -> Result<FlushReport, CommandError> {
    let mailer = mailer()?.ok_or(CommandError::NoSmtp)?;
    let pool = connect().await?;

    let report = CommunicationService::new(&pool, Some(&mailer))
        .flush_queued(None, limit)
        .await?;
    Ok(report)
}
