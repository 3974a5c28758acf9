//! Shelfkeeper Core - domain types and business rules.
//!
//! This crate provides the types and rules shared by every Shelfkeeper component:
//! - `admin` - Seller dashboard server (JSON API + dashboard pages)
//! - `cli` - Command-line tools for migrations, sellers and billing sweeps
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Every rule that decides *whether* something may
//! happen (a coupon applies, a download is allowed, a subscription renews) lives
//! here so it can be tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, emails and status enums
//! - [`sale`] - Sale targets and amount arithmetic
//! - [`billing`] - Subscription schedules and billing-date math
//! - [`coupon`] - Coupon codes, discounts and validation
//! - [`access`] - Access checks and download-limit enforcement
//! - [`payment_method`] - Card expiry and default selection
//! - [`dispute`] - Dispute status transitions
//! - [`template`] - Placeholder rendering for customer communications
//! - [`stats`] - Dashboard aggregates

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod access;
pub mod billing;
pub mod coupon;
pub mod dispute;
pub mod payment_method;
pub mod sale;
pub mod stats;
pub mod template;
pub mod types;

pub use types::*;
