//! Coupon endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use shelfkeeper_core::CouponId;

use crate::db::{CouponRepository, Page};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::{Coupon, CouponRedemption};
use crate::services::CouponService;
use crate::services::coupons::{CouponInput, CouponPatch, CouponPreview, PreviewRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/coupons", get(list).post(create))
        .route("/api/coupons/validate", post(validate))
        .route("/api/coupons/generate-code", post(generate_code))
        .route("/api/coupons/{id}", get(show).patch(update).delete(remove))
        .route("/api/coupons/{id}/redemptions", get(redemptions))
}

#[derive(Debug, Default, Deserialize)]
pub struct CouponQuery {
    pub active: Option<bool>,
}

/// A coupon patch plus the active flag, which is toggled separately.
#[derive(Debug, Default, Deserialize)]
pub struct CouponUpdate {
    #[serde(flatten)]
    pub patch: CouponPatch,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedCode {
    pub code: String,
}

/// GET /api/coupons?active=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(query): Query<CouponQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Coupon>>, AppError> {
    let coupons = CouponRepository::new(state.pool())
        .list(seller.id, query.active, page)
        .await?;
    Ok(Json(coupons))
}

/// POST /api/coupons
async fn create(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<CouponInput>,
) -> Result<(StatusCode, Json<Coupon>), AppError> {
    let coupon = CouponService::new(state.pool()).create(seller.id, &body).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// GET /api/coupons/{id}
async fn show(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
) -> Result<Json<Coupon>, AppError> {
    Ok(Json(CouponRepository::new(state.pool()).get(seller.id, id).await?))
}

/// PATCH /api/coupons/{id}
async fn update(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    Json(body): Json<CouponUpdate>,
) -> Result<Json<Coupon>, AppError> {
    let mut coupon = CouponService::new(state.pool())
        .update(seller.id, id, &body.patch)
        .await?;
    if let Some(active) = body.is_active
        && active != coupon.is_active
    {
        coupon = CouponRepository::new(state.pool())
            .set_active(seller.id, id, active)
            .await?;
    }
    Ok(Json(coupon))
}

/// DELETE /api/coupons/{id}
///
/// Redeemed coupons cannot be deleted (409); deactivate them instead.
async fn remove(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
) -> Result<StatusCode, AppError> {
    CouponRepository::new(state.pool()).delete(seller.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check a code for a customer and target without redeeming it.
///
/// POST /api/coupons/validate
async fn validate(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<PreviewRequest>,
) -> Result<Json<CouponPreview>, AppError> {
    let preview = CouponService::new(state.pool())
        .preview(seller.id, &body, Utc::now())
        .await?;
    Ok(Json(preview))
}

/// POST /api/coupons/generate-code
async fn generate_code(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
) -> Result<Json<GeneratedCode>, AppError> {
    let code = CouponService::new(state.pool()).unused_code(seller.id).await?;
    Ok(Json(GeneratedCode { code }))
}

/// GET /api/coupons/{id}/redemptions
async fn redemptions(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<CouponRedemption>>, AppError> {
    let repo = CouponRepository::new(state.pool());
    repo.get(seller.id, id).await?;
    Ok(Json(repo.redemptions(seller.id, id, page).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_update_splits_active_flag() {
        let update: CouponUpdate =
            serde_json::from_str(r#"{"is_active": false, "expires_at": null, "description": "Spring"}"#)
                .unwrap();
        assert_eq!(update.is_active, Some(false));
        assert_eq!(update.patch.expires_at, Some(None));
        assert_eq!(update.patch.starts_at, None);
        assert_eq!(update.patch.description.as_deref(), Some("Spring"));
    }
}
