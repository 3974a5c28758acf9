//! Membership plan endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use shelfkeeper_core::{BillingCycle, CurrencyCode, MembershipId};

use super::{non_negative, optional, required};
use crate::db::memberships::{MembershipChanges, NewMembership};
use crate::db::{MembershipRepository, Page, PaymentSettingsRepository};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::Membership;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/memberships", get(list).post(create))
        .route("/api/memberships/{id}", get(show).patch(update).delete(remove))
}

#[derive(Debug, Default, Deserialize)]
pub struct MembershipQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MembershipInput {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: Option<CurrencyCode>,
    pub billing_cycle: BillingCycle,
    #[serde(default)]
    pub trial_days: i32,
}

fn trial_days(days: i32) -> Result<i32, AppError> {
    if days < 0 {
        return Err(AppError::Unprocessable("trial_days must not be negative".into()));
    }
    Ok(days)
}

impl MembershipInput {
    fn validate(self, default_currency: CurrencyCode) -> Result<NewMembership, AppError> {
        Ok(NewMembership {
            name: required("name", &self.name)?,
            description: optional(self.description.as_deref()),
            price: non_negative("price", self.price)?,
            currency: self.currency.unwrap_or(default_currency),
            billing_cycle: self.billing_cycle,
            trial_days: trial_days(self.trial_days)?,
        })
    }
}

/// Partial update. Price changes apply to new subscriptions only; live
/// subscriptions keep the price they started at.
#[derive(Debug, Default, Deserialize)]
pub struct MembershipPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub trial_days: Option<i32>,
    pub is_active: Option<bool>,
}

/// GET /api/memberships?active=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(query): Query<MembershipQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Membership>>, AppError> {
    let memberships = MembershipRepository::new(state.pool())
        .list(seller.id, query.active, page)
        .await?;
    Ok(Json(memberships))
}

/// POST /api/memberships
async fn create(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<MembershipInput>,
) -> Result<(StatusCode, Json<Membership>), AppError> {
    let settings = PaymentSettingsRepository::new(state.pool()).get(seller.id).await?;
    let new = body.validate(settings.currency)?;
    let membership = MembershipRepository::new(state.pool())
        .create(seller.id, &new)
        .await?;
    tracing::info!(membership_id = %membership.id, "Membership created");
    Ok((StatusCode::CREATED, Json(membership)))
}

/// GET /api/memberships/{id}
async fn show(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<MembershipId>,
) -> Result<Json<Membership>, AppError> {
    Ok(Json(
        MembershipRepository::new(state.pool()).get(seller.id, id).await?,
    ))
}

/// PATCH /api/memberships/{id}
async fn update(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<MembershipId>,
    Json(body): Json<MembershipPatch>,
) -> Result<Json<Membership>, AppError> {
    let changes = MembershipChanges {
        name: body.name.as_deref().map(|n| required("name", n)).transpose()?,
        description: body.description,
        price: body.price.map(|p| non_negative("price", p)).transpose()?,
        trial_days: body.trial_days.map(trial_days).transpose()?,
    };
    let repo = MembershipRepository::new(state.pool());
    let mut membership = repo.update(seller.id, id, &changes).await?;
    if let Some(active) = body.is_active
        && active != membership.is_active
    {
        membership = repo.set_active(seller.id, id, active).await?;
    }
    Ok(Json(membership))
}

/// DELETE /api/memberships/{id}
///
/// Memberships with subscriptions or sales cannot be deleted (409); deactivate
/// them instead.
async fn remove(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<MembershipId>,
) -> Result<StatusCode, AppError> {
    MembershipRepository::new(state.pool()).delete(seller.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_input() {
        let input: MembershipInput = serde_json::from_str(
            r#"{"name": "Pro", "price": "9.00", "billing_cycle": "monthly"}"#,
        )
        .unwrap();
        let new = input.validate(CurrencyCode::USD).unwrap();
        assert_eq!(new.trial_days, 0);
        assert_eq!(new.billing_cycle, BillingCycle::Monthly);
        assert_eq!(new.price, Decimal::new(900, 2));
    }

    #[test]
    fn test_negative_trial_rejected() {
        assert!(trial_days(-1).is_err());
        assert_eq!(trial_days(14).unwrap(), 14);
    }
}
