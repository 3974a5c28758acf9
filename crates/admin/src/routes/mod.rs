//! HTTP route handlers for the dashboard.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Pages
//! GET  /login                  - Login page
//! POST /login                  - Password login (form)
//! POST /logout                 - Logout
//! GET  /                       - Dashboard overview
//!
//! # Downloads (public, signed)
//! GET  /downloads/{file}       - Stream a product file
//!
//! # JSON API
//! /api/...                     - See `api` module
//! ```

pub mod api;
pub mod auth;
pub mod dashboard;
pub mod downloads;
pub mod health;

use axum::Router;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;

use crate::services::access::ClientInfo;
use crate::state::AppState;

/// Build the complete application router (without state or outer layers).
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(downloads::router())
        .merge(api::router())
}

/// Client address and user agent for access records.
///
/// The address comes from the first `X-Forwarded-For` hop, which the proxy
/// in front of the server sets.
pub(crate) fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header = |name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    ClientInfo {
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_owned()),
        user_agent: header(USER_AGENT.as_str()).map(str::to_owned),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_client_info_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.5"));

        let info = client_info(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.5"));

        let empty = client_info(&HeaderMap::new());
        assert!(empty.ip_address.is_none());
        assert!(empty.user_agent.is_none());
    }
}
