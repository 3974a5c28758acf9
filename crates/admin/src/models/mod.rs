//! Domain models for the seller dashboard.
//!
//! Most models map one-to-one onto a `desk` table and derive `sqlx::FromRow`
//! directly. Where a row has a shape the database cannot guarantee on its own
//! (a sale's target, a coupon's discount) the repository reads an internal
//! row type and converts it.

pub mod access_record;
pub mod communication;
pub mod coupon;
pub mod customer;
pub mod dispute;
pub mod membership;
pub mod notification;
pub mod payment_method;
pub mod payment_settings;
pub mod product;
pub mod sale;
pub mod seller;
pub mod session;
pub mod subscription;

pub use access_record::{AccessRecord, AccessSummary};
pub use communication::{Communication, CommunicationTemplate};
pub use coupon::{Coupon, CouponRedemption};
pub use customer::{Customer, CustomerHistory};
pub use dispute::Dispute;
pub use membership::Membership;
pub use notification::Notification;
pub use payment_method::PaymentMethod;
pub use payment_settings::PaymentSettings;
pub use product::{Product, ProductFile};
pub use sale::Sale;
pub use seller::Seller;
pub use session::{CurrentSeller, keys as session_keys};
pub use subscription::Subscription;
