//! Login and logout pages.
//!
//! The JSON equivalents live under `/api/auth`.

use askama::Template;
use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalSeller, clear_current_seller, set_current_seller};
use crate::models::CurrentSeller;
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

/// Login page template.
#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginPageTemplate<'a> {
    email: &'a str,
    error: Option<&'a str>,
}

/// Login form fields.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}

fn render_login(status: StatusCode, email: &str, error: Option<&str>) -> Response {
    let page = LoginPageTemplate { email, error }.render().unwrap_or_else(|e| {
        tracing::error!("Template render error: {e}");
        String::from("Error rendering template")
    });
    (status, Html(page)).into_response()
}

/// Render the login page, or go to the dashboard if already logged in.
///
/// GET /login
async fn login_page(OptionalSeller(seller): OptionalSeller) -> Response {
    if seller.is_some() {
        return Redirect::to("/").into_response();
    }
    render_login(StatusCode::OK, "", None)
}

/// Check credentials and start a session.
///
/// POST /login
#[instrument(skip(state, session, form), fields(email = %form.email))]
async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let seller = match AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await
    {
        Ok(seller) => seller,
        Err(AuthError::InvalidCredentials) => {
            return render_login(
                StatusCode::UNAUTHORIZED,
                &form.email,
                Some("Invalid email or password."),
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Login failed");
            return render_login(
                StatusCode::INTERNAL_SERVER_ERROR,
                &form.email,
                Some("Something went wrong. Please try again."),
            );
        }
    };

    let current = CurrentSeller::from(&seller);
    if let Err(e) = set_current_seller(&session, &current).await {
        tracing::error!(error = %e, "Failed to store session");
        return render_login(
            StatusCode::INTERNAL_SERVER_ERROR,
            &form.email,
            Some("Something went wrong. Please try again."),
        );
    }
    set_sentry_user(current.id, Some(current.email.as_str()));
    tracing::info!(seller_id = %current.id, "Seller logged in");

    Redirect::to("/").into_response()
}

/// Logout and clear session.
///
/// POST /logout
async fn logout(session: Session) -> impl IntoResponse {
    if let Err(e) = clear_current_seller(&session).await {
        tracing::warn!(error = %e, "Failed to clear session");
    }
    clear_sentry_user();
    Redirect::to("/login")
}
