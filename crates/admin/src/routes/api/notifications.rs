//! Seller notification endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use shelfkeeper_core::NotificationId;

use crate::db::{NotificationRepository, Page};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::Notification;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/{id}/read", post(mark_read))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub marked: u64,
}

/// GET /api/notifications?unread=true
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = NotificationRepository::new(state.pool())
        .list(seller.id, query.unread, page)
        .await?;
    Ok(Json(notifications))
}

/// GET /api/notifications/unread-count
async fn unread_count(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
) -> Result<Json<UnreadCount>, AppError> {
    let unread = NotificationRepository::new(state.pool())
        .unread_count(seller.id)
        .await?;
    Ok(Json(UnreadCount { unread }))
}

/// POST /api/notifications/{id}/read
async fn mark_read(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>, AppError> {
    let notification = NotificationRepository::new(state.pool())
        .mark_read(seller.id, id)
        .await?;
    state.stats().invalidate(seller.id).await;
    Ok(Json(notification))
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
) -> Result<Json<MarkedRead>, AppError> {
    let marked = NotificationRepository::new(state.pool())
        .mark_all_read(seller.id)
        .await?;
    state.stats().invalidate(seller.id).await;
    Ok(Json(MarkedRead { marked }))
}
