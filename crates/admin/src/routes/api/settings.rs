//! Payment settings endpoints.

use axum::{Json, Router, extract::State, routing::get};
use serde::Deserialize;

use shelfkeeper_core::{CurrencyCode, Email};

use super::optional;
use crate::db::PaymentSettingsRepository;
use crate::db::payment_settings::SettingsUpdate;
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::PaymentSettings;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/payment-settings", get(show).put(replace))
}

#[derive(Debug, Deserialize)]
pub struct SettingsInput {
    pub currency: CurrencyCode,
    pub payout_email: Option<String>,
    pub statement_descriptor: Option<String>,
    #[serde(default = "default_send_receipts")]
    pub send_receipts: bool,
}

const fn default_send_receipts() -> bool {
    true
}

impl TryFrom<SettingsInput> for SettingsUpdate {
    type Error = AppError;

    fn try_from(input: SettingsInput) -> Result<Self, Self::Error> {
        let payout_email = optional(input.payout_email.as_deref())
            .map(|e| Email::parse(&e).map(|e| e.to_string()))
            .transpose()
            .map_err(|e| AppError::Unprocessable(format!("payout_email: {e}")))?;

        let statement_descriptor = optional(input.statement_descriptor.as_deref());
        if let Some(descriptor) = &statement_descriptor
            && descriptor.chars().count() > PaymentSettings::MAX_DESCRIPTOR_LENGTH
        {
            return Err(AppError::Unprocessable(format!(
                "statement_descriptor must be at most {} characters",
                PaymentSettings::MAX_DESCRIPTOR_LENGTH
            )));
        }

        Ok(Self {
            currency: input.currency,
            payout_email,
            statement_descriptor,
            send_receipts: input.send_receipts,
        })
    }
}

/// GET /api/payment-settings
async fn show(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
) -> Result<Json<PaymentSettings>, AppError> {
    Ok(Json(
        PaymentSettingsRepository::new(state.pool()).get(seller.id).await?,
    ))
}

/// PUT /api/payment-settings
async fn replace(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<SettingsInput>,
) -> Result<Json<PaymentSettings>, AppError> {
    let update = SettingsUpdate::try_from(body)?;
    let settings = PaymentSettingsRepository::new(state.pool())
        .upsert(seller.id, &update)
        .await?;
    state.stats().invalidate(seller.id).await;
    tracing::info!(seller_id = %seller.id, currency = %settings.currency, "Payment settings saved");
    Ok(Json(settings))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> SettingsInput {
        SettingsInput {
            currency: CurrencyCode::EUR,
            payout_email: Some(" Payouts@Example.com ".into()),
            statement_descriptor: Some("SHELF*BOOKS".into()),
            send_receipts: false,
        }
    }

    #[test]
    fn test_settings_input_normalises() {
        let update = SettingsUpdate::try_from(input()).unwrap();
        assert_eq!(update.payout_email.as_deref(), Some("Payouts@example.com"));
        assert_eq!(update.statement_descriptor.as_deref(), Some("SHELF*BOOKS"));
        assert!(!update.send_receipts);
    }

    #[test]
    fn test_settings_input_rejects_long_descriptor() {
        let long = SettingsInput {
            statement_descriptor: Some("X".repeat(23)),
            ..input()
        };
        assert!(SettingsUpdate::try_from(long).is_err());

        let bad_email = SettingsInput {
            payout_email: Some("nope".into()),
            ..input()
        };
        assert!(SettingsUpdate::try_from(bad_email).is_err());
    }
}
