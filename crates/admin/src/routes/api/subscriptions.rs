//! Subscription endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;

use shelfkeeper_core::SubscriptionId;

use crate::db::subscriptions::SubscriptionFilter;
use crate::db::{Page, SubscriptionRepository};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::Subscription;
use crate::services::SubscriptionService;
use crate::services::subscriptions::{StartRequest, StartedSubscription};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/subscriptions", get(list).post(start))
        .route("/api/subscriptions/{id}", get(show))
        .route("/api/subscriptions/{id}/cancel", post(cancel))
        .route("/api/subscriptions/{id}/resume", post(resume))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    /// Keep access until the current period ends instead of cancelling now.
    #[serde(default)]
    pub at_period_end: bool,
}

/// GET /api/subscriptions?status=&customer_id=&membership_id=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(filter): Query<SubscriptionFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    let subscriptions = SubscriptionRepository::new(state.pool())
        .list(seller.id, &filter, page)
        .await?;
    Ok(Json(subscriptions))
}

/// POST /api/subscriptions
async fn start(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartedSubscription>), AppError> {
    let started = SubscriptionService::new(state.pool(), state.stats(), state.mailer())
        .start(&seller, &body, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// GET /api/subscriptions/{id}
async fn show(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>, AppError> {
    Ok(Json(
        SubscriptionRepository::new(state.pool()).get(seller.id, id).await?,
    ))
}

/// POST /api/subscriptions/{id}/cancel
async fn cancel(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Subscription>, AppError> {
    let at_period_end = body.is_some_and(|Json(b)| b.at_period_end);
    let subscription = SubscriptionService::new(state.pool(), state.stats(), state.mailer())
        .cancel(seller.id, id, at_period_end)
        .await?;
    Ok(Json(subscription))
}

/// POST /api/subscriptions/{id}/resume
async fn resume(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Subscription>, AppError> {
    let subscription = SubscriptionService::new(state.pool(), state.stats(), state.mailer())
        .resume(seller.id, id, Utc::now())
        .await?;
    Ok(Json(subscription))
}
