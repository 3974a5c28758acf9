//! HTTP middleware for the dashboard.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. Session layer (tower-sessions with `PostgreSQL` store)
//! 4. Auth extractors (`RequireSeller`, `OptionalSeller`) in handlers

pub mod auth;
pub mod session;

pub use auth::{OptionalSeller, RequireSeller, clear_current_seller, set_current_seller};
pub use session::{SESSION_COOKIE_NAME, create_session_layer};
