//! Digital products and their downloadable files.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use shelfkeeper_core::access::AccessPolicy;
use shelfkeeper_core::{CurrencyCode, Money, ProductFileId, ProductId, ProductStatus, SellerId};

/// A one-off digital product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub status: ProductStatus,
    /// Downloads allowed per customer, `None` for unlimited.
    pub download_limit: Option<i32>,
    /// Days after purchase the product stays accessible.
    pub access_days: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[must_use]
    pub const fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            download_limit: self.download_limit,
            access_days: self.access_days,
        }
    }

    #[must_use]
    pub const fn money(&self) -> Money {
        Money::new(self.price, self.currency)
    }
}

/// A file attached to a product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductFile {
    pub id: ProductFileId,
    pub seller_id: SellerId,
    pub product_id: ProductId,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// Key in the file store. Never sent to clients.
    #[serde(skip)]
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}
