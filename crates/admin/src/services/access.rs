//! Recording customer access to products and memberships.
//!
//! Each access is checked against the customer's entitlement and the
//! product's policy before it is written. The customer row is locked while
//! the download count is read and the new record inserted, so two
//! concurrent downloads cannot both take the last one allowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use shelfkeeper_core::access::{AccessDenial, AccessGrant, AccessPolicy, Entitlement, check_access};
use shelfkeeper_core::sale::{SaleTarget, SaleTargetError};
use shelfkeeper_core::{
    AccessType, CustomerId, MembershipId, ProductFileId, ProductId, SellerId,
};

use crate::db::access_records::NewAccessRecord;
use crate::db::{
    ProductRepository, RepositoryError, access_records, customers, memberships, products, sales,
    subscriptions,
};
use crate::models::AccessRecord;
use crate::services::sales::not_found;

/// Errors recording an access.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("customer not found")]
    CustomerNotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("membership not found")]
    MembershipNotFound,

    #[error("file not found")]
    FileNotFound,

    #[error("file does not belong to the product")]
    FileMismatch,

    #[error("{0}")]
    InvalidTarget(#[from] SaleTargetError),

    #[error("access denied: {0}")]
    Denied(#[from] AccessDenial),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// An access to record.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessRequest {
    pub customer_id: CustomerId,
    /// May be left out when `product_file_id` is set.
    pub product_id: Option<ProductId>,
    pub membership_id: Option<MembershipId>,
    pub product_file_id: Option<ProductFileId>,
    pub access_type: AccessType,
}

/// Where the request came from.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A written access record and what the customer has left.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedAccess {
    pub record: AccessRecord,
    pub grant: AccessGrant,
}

/// Access service.
pub struct AccessService<'a> {
    pool: &'a PgPool,
}

impl<'a> AccessService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Check and record one access.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Denied` when the customer is not entitled or
    /// has used up their downloads, or a not-found error for anything that
    /// does not belong to `seller_id`.
    #[instrument(skip(self, client), fields(customer_id = %request.customer_id))]
    pub async fn record(
        &self,
        seller_id: SellerId,
        request: &AccessRequest,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<RecordedAccess, AccessError> {
        let file_product = match request.product_file_id {
            Some(file_id) => Some(
                ProductRepository::new(self.pool)
                    .get_file(seller_id, file_id)
                    .await
                    .map_err(|e| not_found(e, AccessError::FileNotFound))?
                    .product_id,
            ),
            None => None,
        };
        let target = resolve_target(request.product_id, request.membership_id, file_product)?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let customer = customers::get(&mut tx, seller_id, request.customer_id, true)
            .await
            .map_err(|e| not_found(e, AccessError::CustomerNotFound))?;

        let (policy, entitlement, prior_downloads) = match target {
            SaleTarget::Product(product_id) => {
                let product = products::get(&mut tx, seller_id, product_id)
                    .await
                    .map_err(|e| not_found(e, AccessError::ProductNotFound))?;
                let entitlement =
                    sales::latest_purchase_at(&mut tx, seller_id, customer.id, product_id)
                        .await?
                        .map_or(Entitlement::None, |purchased_at| Entitlement::Purchase {
                            purchased_at,
                        });
                let prior =
                    access_records::download_count(&mut tx, seller_id, customer.id, product_id)
                        .await?;
                (product.access_policy(), entitlement, prior)
            }
            SaleTarget::Membership(membership_id) => {
                memberships::get(&mut tx, seller_id, membership_id)
                    .await
                    .map_err(|e| not_found(e, AccessError::MembershipNotFound))?;
                let entitlement =
                    subscriptions::latest_for(&mut tx, seller_id, customer.id, membership_id)
                        .await?
                        .map_or(Entitlement::None, |s| Entitlement::Subscription {
                            status: s.status,
                            current_period_end: s.current_period_end,
                        });
                (AccessPolicy::default(), entitlement, 0)
            }
        };

        let grant = check_access(&policy, &entitlement, request.access_type, prior_downloads, now)
            .inspect_err(|denial| {
                tracing::info!(%denial, access_type = %request.access_type, "Access denied");
            })?;

        let record = access_records::insert(
            &mut tx,
            seller_id,
            &NewAccessRecord {
                customer_id: customer.id,
                target,
                product_file_id: request.product_file_id,
                access_type: request.access_type,
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
            },
        )
        .await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(RecordedAccess { record, grant })
    }
}

/// The single target of an access. A file pins the product it belongs to.
fn resolve_target(
    product_id: Option<ProductId>,
    membership_id: Option<MembershipId>,
    file_product: Option<ProductId>,
) -> Result<SaleTarget, AccessError> {
    match file_product {
        None => Ok(SaleTarget::from_columns(product_id, membership_id)?),
        Some(_) if membership_id.is_some() => Err(SaleTargetError::Ambiguous.into()),
        Some(owner) if product_id.is_some_and(|p| p != owner) => Err(AccessError::FileMismatch),
        Some(owner) => Ok(SaleTarget::Product(owner)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target_without_file() {
        let product = ProductId::generate();
        assert!(matches!(
            resolve_target(Some(product), None, None),
            Ok(SaleTarget::Product(p)) if p == product
        ));
        assert!(matches!(
            resolve_target(None, None, None),
            Err(AccessError::InvalidTarget(SaleTargetError::Missing))
        ));
    }

    #[test]
    fn test_resolve_target_from_file() {
        let owner = ProductId::generate();
        assert!(matches!(
            resolve_target(None, None, Some(owner)),
            Ok(SaleTarget::Product(p)) if p == owner
        ));
        assert!(matches!(
            resolve_target(Some(owner), None, Some(owner)),
            Ok(SaleTarget::Product(_))
        ));
        assert!(matches!(
            resolve_target(Some(ProductId::generate()), None, Some(owner)),
            Err(AccessError::FileMismatch)
        ));
        assert!(matches!(
            resolve_target(None, Some(MembershipId::generate()), Some(owner)),
            Err(AccessError::InvalidTarget(SaleTargetError::Ambiguous))
        ));
    }
}
