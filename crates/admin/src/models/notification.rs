//! Seller notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelfkeeper_core::{NotificationId, NotificationKind, SellerId};

/// An in-dashboard notification for the seller.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: NotificationId,
    pub seller_id: SellerId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Dashboard path the notification points at.
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
