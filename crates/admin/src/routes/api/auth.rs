//! Seller registration and session endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireSeller, clear_current_seller, set_current_seller};
use crate::models::CurrentSeller;
use crate::services::AuthService;
use crate::services::auth::Registration;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub store_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

async fn start_session(session: &Session, seller: &CurrentSeller) -> Result<(), AppError> {
    set_current_seller(session, seller)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    set_sentry_user(seller.id, Some(seller.email.as_str()));
    Ok(())
}

/// Register a seller and log them in.
///
/// POST /api/auth/register
#[instrument(skip(state, session, body), fields(email = %body.email))]
async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<CurrentSeller>), AppError> {
    let seller = AuthService::new(state.pool())
        .register(&Registration {
            email: &body.email,
            password: &body.password,
            display_name: &body.display_name,
            store_name: &body.store_name,
        })
        .await?;

    let current = CurrentSeller::from(&seller);
    start_session(&session, &current).await?;
    Ok((StatusCode::CREATED, Json(current)))
}

/// POST /api/auth/login
#[instrument(skip(state, session, body), fields(email = %body.email))]
async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<CurrentSeller>, AppError> {
    let seller = AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await?;

    let current = CurrentSeller::from(&seller);
    start_session(&session, &current).await?;
    tracing::info!(seller_id = %current.id, "Seller logged in");
    Ok(Json(current))
}

/// POST /api/auth/logout
async fn logout(session: Session) -> StatusCode {
    if let Err(e) = clear_current_seller(&session).await {
        tracing::warn!(error = %e, "Failed to clear session");
    }
    clear_sentry_user();
    StatusCode::NO_CONTENT
}

/// GET /api/auth/me
async fn me(RequireSeller(seller): RequireSeller) -> Json<CurrentSeller> {
    Json(seller)
}
