//! Shelfkeeper seller dashboard library.
//!
//! The server binary, the CLI and the integration tests all build on this
//! crate: repositories, services, HTTP routes and the shared state.
//!
//! # Security
//!
//! Every repository call is scoped to a seller ID taken from the session.
//! The only unauthenticated data route is `/downloads/{file}`, which is
//! guarded by an HMAC-signed, expiring link.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::state::AppState;

/// Directory served under `/static`, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/admin/static";

/// Build the application router with request tracing.
///
/// The session layer and Sentry layers are added by the caller, so tests can
/// exercise the router without a session store.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    /// Randomness comes from argon2's `OsRng` here and from core for codes.
    #[test]
    fn test_manifest_has_no_direct_rand() {
        let manifest = include_str!("../Cargo.toml");
        assert!(!manifest.lines().any(|line| line.trim_start().starts_with("rand ")));
    }
}
