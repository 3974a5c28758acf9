//! Business logic services for the seller dashboard.
//!
//! # Services
//!
//! - `auth` - Seller registration and password login
//! - `sales` - Recording sales with coupons, and refunds
//! - `subscriptions` - Subscription lifecycle and the renewal sweep
//! - `coupons` - Coupon validation, code generation and previews
//! - `access` - Entitlement checks and access records
//! - `disputes` - Dispute lifecycle
//! - `communications` - Templated customer messages
//! - `email` - Email delivery via SMTP
//! - `storage` - Product file store
//! - `downloads` - Signed, expiring download links
//! - `stats` - Cached dashboard statistics

pub mod access;
pub mod auth;
pub mod communications;
pub mod coupons;
pub mod disputes;
pub mod downloads;
pub mod email;
pub mod sales;
pub mod stats;
pub mod storage;
pub mod subscriptions;

pub use access::{AccessError, AccessService};
pub use auth::{AuthError, AuthService};
pub use communications::{CommunicationError, CommunicationService};
pub use coupons::{CouponError, CouponService};
pub use disputes::{DisputeError, DisputeService};
pub use downloads::{DownloadSigner, LinkError};
pub use email::{EmailError, EmailService};
pub use sales::{SaleError, SaleService};
pub use stats::StatsCache;
pub use storage::{FileStore, StorageError};
pub use subscriptions::{SubscriptionError, SubscriptionService};
