//! Session-related types for seller authentication.

use serde::{Deserialize, Serialize};

use shelfkeeper_core::{Email, SellerId};

use super::Seller;

/// Session-stored seller identity.
///
/// Minimal data stored in the session to identify the logged-in seller. The
/// `id` is the ownership key for every query made on the seller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSeller {
    pub id: SellerId,
    pub email: Email,
    pub display_name: String,
    pub store_name: String,
}

impl From<&Seller> for CurrentSeller {
    fn from(seller: &Seller) -> Self {
        Self {
            id: seller.id,
            email: seller.email.clone(),
            display_name: seller.display_name.clone(),
            store_name: seller.store_name.clone(),
        }
    }
}

/// Session keys for seller authentication data.
pub mod keys {
    /// Key for storing the current logged-in seller.
    pub const CURRENT_SELLER: &str = "current_seller";
}
