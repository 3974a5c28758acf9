//! Access record endpoints.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
};
use chrono::Utc;

use crate::db::access_records::AccessFilter;
use crate::db::{AccessRecordRepository, Page};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::{AccessRecord, AccessSummary};
use crate::routes::client_info;
use crate::services::AccessService;
use crate::services::access::{AccessRequest, RecordedAccess};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/access-records", get(list).post(record))
        .route("/api/access-records/summary", get(summary))
}

/// GET /api/access-records?customer_id=&product_id=&membership_id=&access_type=&from=&to=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(filter): Query<AccessFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<AccessRecord>>, AppError> {
    let records = AccessRecordRepository::new(state.pool())
        .list(seller.id, &filter, page)
        .await?;
    Ok(Json(records))
}

/// Check entitlement and record an access. Refusals answer 403.
///
/// POST /api/access-records
async fn record(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AccessRequest>,
) -> Result<(StatusCode, Json<RecordedAccess>), AppError> {
    let recorded = AccessService::new(state.pool())
        .record(seller.id, &body, &client_info(&headers), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

/// GET /api/access-records/summary
async fn summary(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(filter): Query<AccessFilter>,
) -> Result<Json<AccessSummary>, AppError> {
    let summary = AccessRecordRepository::new(state.pool())
        .summary(seller.id, &filter)
        .await?;
    Ok(Json(summary))
}
