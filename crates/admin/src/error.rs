//! Unified error handling for the dashboard.
//!
//! Service errors convert into [`AppError`], which renders as a JSON body
//! `{"error": "...", "message": "..."}`. Server-side failures are reported
//! to Sentry and answered with a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use shelfkeeper_core::SellerId;

use crate::db::RepositoryError;
use crate::services::{
    AccessError, AuthError, CommunicationError, CouponError, DisputeError, LinkError, SaleError,
    StorageError, SubscriptionError,
};

/// Application-level error type for the dashboard.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Resource not found (or owned by another seller).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Seller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Seller lacks permission (bad download link, denied access).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Well-formed request that breaks a business rule.
    #[error("{0}")]
    Unprocessable(String),

    /// Upload exceeds the configured limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::Database(_) | Self::Internal(_) => "internal",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::Unprocessable(_) => "unprocessable",
            Self::PayloadTooLarge(_) => "payload_too_large",
        }
    }

    fn unprocessable(err: impl std::fmt::Display) -> Self {
        Self::Unprocessable(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Dashboard request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::BadRequest(m)
            | Self::Conflict(m)
            | Self::Unprocessable(m)
            | Self::PayloadTooLarge(m) => m.clone(),
        };

        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("resource not found".to_string()),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other => Self::Database(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Unauthorized(err.to_string()),
            AuthError::SellerAlreadyExists => Self::Conflict(err.to_string()),
            AuthError::InvalidEmail(_) | AuthError::WeakPassword(_) | AuthError::MissingField(_) => {
                Self::unprocessable(err)
            }
            AuthError::Repository(e) => e.into(),
            AuthError::PasswordHash => Self::Internal(err.to_string()),
        }
    }
}

impl From<SaleError> for AppError {
    fn from(err: SaleError) -> Self {
        match err {
            SaleError::CustomerNotFound
            | SaleError::ProductNotFound
            | SaleError::MembershipNotFound
            | SaleError::CouponNotFound
            | SaleError::PaymentMethodNotFound
            | SaleError::SaleNotFound => Self::NotFound(err.to_string()),
            SaleError::NotRefundable(_) => Self::Conflict(err.to_string()),
            SaleError::Repository(e) => e.into(),
            SaleError::InvalidTarget(_)
            | SaleError::ProductUnavailable
            | SaleError::MembershipInactive
            | SaleError::InvalidCouponCode(_)
            | SaleError::CouponRejected(_) => Self::unprocessable(err),
        }
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::CustomerNotFound
            | SubscriptionError::MembershipNotFound
            | SubscriptionError::PaymentMethodNotFound
            | SubscriptionError::SubscriptionNotFound => Self::NotFound(err.to_string()),
            SubscriptionError::AlreadySubscribed | SubscriptionError::InvalidState(_) => {
                Self::Conflict(err.to_string())
            }
            SubscriptionError::MembershipInactive | SubscriptionError::PaymentMethodRequired => {
                Self::unprocessable(err)
            }
            SubscriptionError::Repository(e) => e.into(),
        }
    }
}

impl From<CouponError> for AppError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::CouponNotFound | CouponError::CustomerNotFound => {
                Self::NotFound(err.to_string())
            }
            CouponError::Target(inner) => inner.into(),
            CouponError::Repository(e) => e.into(),
            CouponError::CodeSpaceExhausted => Self::Internal(err.to_string()),
            CouponError::InvalidCode(_)
            | CouponError::InvalidDiscount(_)
            | CouponError::InvalidWindow
            | CouponError::InvalidLimit(_)
            | CouponError::NegativeMinimum
            | CouponError::InvalidTarget(_) => Self::unprocessable(err),
        }
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::CustomerNotFound
            | AccessError::ProductNotFound
            | AccessError::MembershipNotFound
            | AccessError::FileNotFound => Self::NotFound(err.to_string()),
            AccessError::Denied(_) => Self::Forbidden(err.to_string()),
            AccessError::FileMismatch | AccessError::InvalidTarget(_) => Self::unprocessable(err),
            AccessError::Repository(e) => e.into(),
        }
    }
}

impl From<DisputeError> for AppError {
    fn from(err: DisputeError) -> Self {
        match err {
            DisputeError::SaleNotFound | DisputeError::DisputeNotFound => {
                Self::NotFound(err.to_string())
            }
            DisputeError::InvalidTransition { .. } | DisputeError::Conflict(_) => {
                Self::Conflict(err.to_string())
            }
            DisputeError::SaleNotDisputable(_)
            | DisputeError::InvalidAmount(_)
            | DisputeError::MissingReason
            | DisputeError::MissingEvidence => Self::unprocessable(err),
            DisputeError::Repository(e) => e.into(),
        }
    }
}

impl From<CommunicationError> for AppError {
    fn from(err: CommunicationError) -> Self {
        match err {
            CommunicationError::CustomerNotFound | CommunicationError::TemplateNotFound => {
                Self::NotFound(err.to_string())
            }
            CommunicationError::Template(_) | CommunicationError::MissingContent(_) => {
                Self::unprocessable(err)
            }
            CommunicationError::NoTransport => Self::Conflict(err.to_string()),
            CommunicationError::Repository(e) => e.into(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::NotFound("file content missing".to_string()),
            StorageError::InvalidKey(_) | StorageError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<LinkError> for AppError {
    fn from(err: LinkError) -> Self {
        Self::Forbidden(err.to_string())
    }
}

/// Set the Sentry user context from the logged-in seller.
pub fn set_sentry_user(seller_id: SellerId, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(seller_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("sale".to_string());
        assert_eq!(err.to_string(), "Not found: sale");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(get_status(AppError::NotFound("t".into())), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Unauthorized("t".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AppError::Forbidden("t".into())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AppError::BadRequest("t".into())), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(AppError::Conflict("t".into())), StatusCode::CONFLICT);
        assert_eq!(
            get_status(AppError::Unprocessable("t".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::Internal("t".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = body_json(AppError::Internal("disk on fire".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal");
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_repository_errors_map_to_http() {
        let (status, _) = body_json(RepositoryError::NotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            body_json(RepositoryError::Conflict("email already exists".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "email already exists");
    }

    #[test]
    fn test_service_errors_map_to_http() {
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(SaleError::NotRefundable("refunded".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(SubscriptionError::PaymentMethodRequired).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(CouponError::Target(SaleError::ProductNotFound)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(LinkError::Expired).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(CommunicationError::NoTransport).status(),
            StatusCode::CONFLICT
        );
    }
}
