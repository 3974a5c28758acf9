//! Customer access to products and memberships.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelfkeeper_core::{
    AccessRecordId, AccessType, CustomerId, MembershipId, ProductFileId, ProductId, SellerId,
};

/// One view, download or stream.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AccessRecord {
    pub id: AccessRecordId,
    pub seller_id: SellerId,
    pub customer_id: CustomerId,
    pub product_id: Option<ProductId>,
    pub membership_id: Option<MembershipId>,
    pub product_file_id: Option<ProductFileId>,
    pub access_type: AccessType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub accessed_at: DateTime<Utc>,
}

/// Access counts by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccessSummary {
    pub views: i64,
    pub downloads: i64,
    pub streams: i64,
    /// Distinct customers with any access.
    pub unique_customers: i64,
}
