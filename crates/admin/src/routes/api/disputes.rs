//! Dispute endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use shelfkeeper_core::{DisputeId, DisputeStatus};

use crate::db::{DisputeRepository, Page};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::Dispute;
use crate::services::DisputeService;
use crate::services::disputes::OpenDispute;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/disputes", get(list).post(open))
        .route("/api/disputes/{id}", get(show))
        .route("/api/disputes/{id}/status", post(transition))
        .route("/api/disputes/{id}/evidence", post(add_evidence))
}

#[derive(Debug, Default, Deserialize)]
pub struct DisputeQuery {
    pub status: Option<DisputeStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: DisputeStatus,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceNote {
    pub note: String,
}

/// GET /api/disputes?status=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(query): Query<DisputeQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Dispute>>, AppError> {
    let disputes = DisputeRepository::new(state.pool())
        .list(seller.id, query.status, page)
        .await?;
    Ok(Json(disputes))
}

/// POST /api/disputes
async fn open(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<OpenDispute>,
) -> Result<(StatusCode, Json<Dispute>), AppError> {
    let dispute = DisputeService::new(state.pool(), state.stats())
        .open(seller.id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// GET /api/disputes/{id}
async fn show(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<DisputeId>,
) -> Result<Json<Dispute>, AppError> {
    Ok(Json(DisputeRepository::new(state.pool()).get(seller.id, id).await?))
}

/// Move a dispute to a new status. `lost` refunds the sale.
///
/// POST /api/disputes/{id}/status
async fn transition(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<DisputeId>,
    Json(body): Json<StatusChange>,
) -> Result<Json<Dispute>, AppError> {
    let dispute = DisputeService::new(state.pool(), state.stats())
        .transition(seller.id, id, body.status)
        .await?;
    Ok(Json(dispute))
}

/// POST /api/disputes/{id}/evidence
async fn add_evidence(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<DisputeId>,
    Json(body): Json<EvidenceNote>,
) -> Result<Json<Dispute>, AppError> {
    let dispute = DisputeService::new(state.pool(), state.stats())
        .add_evidence(seller.id, id, &body.note)
        .await?;
    Ok(Json(dispute))
}
