//! Authentication extractors for seller routes.
//!
//! The logged-in seller's [`CurrentSeller`] lives in the session. Every
//! handler that touches seller data takes [`RequireSeller`] and passes its
//! `id` down as the ownership key.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::models::{CurrentSeller, session_keys};

/// Extractor that requires a logged-in seller.
///
/// If nobody is logged in, returns a redirect to the login page for HTML
/// requests, or 401 Unauthorized for API requests.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireSeller(seller): RequireSeller,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", seller.display_name)
/// }
/// ```
pub struct RequireSeller(pub CurrentSeller);

/// Error returned when a seller session is required but absent.
#[derive(Debug)]
pub enum SellerAuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
}

impl IntoResponse for SellerAuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Not logged in",
                })),
            )
                .into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireSeller
where
    S: Send + Sync,
{
    type Rejection = SellerAuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let is_api = parts.uri.path().starts_with("/api/");
        let rejection = || {
            if is_api {
                SellerAuthRejection::Unauthorized
            } else {
                SellerAuthRejection::RedirectToLogin
            }
        };

        // Set by SessionManagerLayer
        let session = parts.extensions.get::<Session>().ok_or_else(rejection)?;

        let seller: CurrentSeller = session
            .get(session_keys::CURRENT_SELLER)
            .await
            .ok()
            .flatten()
            .ok_or_else(rejection)?;

        Ok(Self(seller))
    }
}

/// Extractor that optionally gets the current seller.
///
/// Unlike `RequireSeller`, this does not reject the request if nobody is
/// logged in.
pub struct OptionalSeller(pub Option<CurrentSeller>);

impl<S> FromRequestParts<S> for OptionalSeller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let seller = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentSeller>(session_keys::CURRENT_SELLER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(seller))
    }
}

/// Store the seller in the session, rotating the session ID first.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_seller(
    session: &Session,
    seller: &CurrentSeller,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_SELLER, seller).await
}

/// Remove the seller from the session and discard it (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_seller(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentSeller>(session_keys::CURRENT_SELLER)
        .await?;
    session.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_rejection_is_json_401() {
        let response = SellerAuthRejection::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_html_rejection_redirects_to_login() {
        let response = SellerAuthRejection::RedirectToLogin.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(axum::http::header::LOCATION).map(|v| v.as_bytes()),
            Some(b"/login".as_slice())
        );
    }
}
