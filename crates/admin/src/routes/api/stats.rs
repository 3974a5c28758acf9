//! Dashboard statistics endpoint.

use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;

use shelfkeeper_core::stats::DashboardStats;

use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/dashboard/stats", get(dashboard_stats))
}

/// Totals, the last 30 days of revenue and top products. Cached per seller
/// for up to a minute; writes that change the numbers clear the cache.
///
/// GET /api/dashboard/stats
async fn dashboard_stats(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, AppError> {
    let stats = state
        .stats()
        .dashboard(state.pool(), seller.id, Utc::now())
        .await?;
    Ok(Json(DashboardStats::clone(&stats)))
}
