//! Payment disputes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use shelfkeeper_core::{DisputeId, DisputeStatus, SaleId, SellerId};

/// A customer's dispute of a sale.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Dispute {
    pub id: DisputeId,
    pub seller_id: SellerId,
    pub sale_id: SaleId,
    pub reason: String,
    /// Disputed amount, at most the sale total.
    pub amount: Decimal,
    pub status: DisputeStatus,
    /// Evidence notes, appended over time.
    pub evidence: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
