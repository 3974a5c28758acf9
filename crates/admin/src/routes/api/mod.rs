//! JSON API for the seller dashboard.
//!
//! Everything under `/api` except registration and login requires a seller
//! session. Handlers pass the session's seller ID down to the repositories,
//! so another seller's rows answer 404.

pub mod access;
pub mod auth;
pub mod communications;
pub mod coupons;
pub mod customers;
pub mod disputes;
pub mod memberships;
pub mod notifications;
pub mod products;
pub mod sales;
pub mod settings;
pub mod stats;
pub mod subscriptions;

use axum::Router;
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::state::AppState;

/// Build the complete API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(customers::router())
        .merge(products::router())
        .merge(memberships::router())
        .merge(sales::router())
        .merge(subscriptions::router())
        .merge(coupons::router())
        .merge(disputes::router())
        .merge(access::router())
        .merge(communications::router())
        .merge(notifications::router())
        .merge(settings::router())
        .merge(stats::router())
}

/// Trim a required text field, rejecting blanks.
pub(crate) fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Unprocessable(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_owned())
}

/// Trim an optional text field; blank becomes `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

pub(crate) fn non_negative(field: &str, amount: Decimal) -> Result<Decimal, AppError> {
    if amount.is_sign_negative() {
        return Err(AppError::Unprocessable(format!("{field} must not be negative")));
    }
    Ok(amount)
}

pub(crate) fn positive(field: &str, value: Option<i32>) -> Result<Option<i32>, AppError> {
    match value {
        Some(n) if n <= 0 => Err(AppError::Unprocessable(format!(
            "{field} must be greater than zero"
        ))),
        other => Ok(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required("name", "  Ebook ").unwrap(), "Ebook");
        assert!(matches!(required("name", "   "), Err(AppError::Unprocessable(_))));
    }

    #[test]
    fn test_optional_drops_blank() {
        assert_eq!(optional(Some("  ")), None);
        assert_eq!(optional(Some(" note ")).as_deref(), Some("note"));
        assert_eq!(optional(None), None);
    }

    #[test]
    fn test_numeric_bounds() {
        assert!(non_negative("price", Decimal::ZERO).is_ok());
        assert!(non_negative("price", Decimal::new(-1, 2)).is_err());
        assert_eq!(positive("download_limit", None).unwrap(), None);
        assert_eq!(positive("download_limit", Some(3)).unwrap(), Some(3));
        assert!(positive("download_limit", Some(0)).is_err());
    }
}
