//! Sale endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;

use shelfkeeper_core::SaleId;

use crate::db::sales::SaleFilter;
use crate::db::{Page, SaleRepository};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::Sale;
use crate::services::SaleService;
use crate::services::sales::{RecordedSale, SaleRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sales", get(list).post(create))
        .route("/api/sales/{id}", get(show))
        .route("/api/sales/{id}/refund", post(refund))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
}

/// GET /api/sales?status=&customer_id=&product_id=&membership_id=&from=&to=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(filter): Query<SaleFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Sale>>, AppError> {
    let sales = SaleRepository::new(state.pool())
        .list(seller.id, &filter, page)
        .await?;
    Ok(Json(sales))
}

/// Record a sale, applying a coupon code if given.
///
/// POST /api/sales
async fn create(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<SaleRequest>,
) -> Result<(StatusCode, Json<RecordedSale>), AppError> {
    let recorded = SaleService::new(state.pool(), state.stats(), state.mailer())
        .create(&seller, &body, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

/// GET /api/sales/{id}
async fn show(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<SaleId>,
) -> Result<Json<Sale>, AppError> {
    Ok(Json(SaleRepository::new(state.pool()).get(seller.id, id).await?))
}

/// POST /api/sales/{id}/refund
async fn refund(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<SaleId>,
    body: Option<Json<RefundRequest>>,
) -> Result<Json<Sale>, AppError> {
    let reason = body.and_then(|Json(b)| super::optional(b.reason.as_deref()));
    let sale = SaleService::new(state.pool(), state.stats(), state.mailer())
        .refund(seller.id, id, reason.as_deref())
        .await?;
    Ok(Json(sale))
}
