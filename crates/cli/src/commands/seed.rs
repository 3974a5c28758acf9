//! Seed a seller's catalog and customers from YAML.
//!
//! The seller is created if it does not exist. Rows that already exist
//! (duplicate customer email, coupon code, ...) are skipped, so a seed file
//! can be applied more than once.
//!
//! See `crates/cli/seed/demo.yaml` for the format.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use shelfkeeper_admin::db::customers::NewCustomer;
use shelfkeeper_admin::db::memberships::NewMembership;
use shelfkeeper_admin::db::products::NewProduct;
use shelfkeeper_admin::db::{
    CustomerRepository, MembershipRepository, PaymentSettingsRepository, ProductRepository,
    RepositoryError, SellerRepository,
};
use shelfkeeper_admin::services::auth::Registration;
use shelfkeeper_admin::services::coupons::CouponInput;
use shelfkeeper_admin::services::{AuthService, CouponError, CouponService};
use shelfkeeper_core::{BillingCycle, Email, ProductStatus, SellerId};

use super::{CommandError, connect};

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub seller: SeedSeller,
    #[serde(default)]
    pub customers: Vec<SeedCustomer>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
    #[serde(default)]
    pub memberships: Vec<SeedMembership>,
    #[serde(default)]
    pub coupons: Vec<CouponInput>,
}

#[derive(Debug, Deserialize)]
pub struct SeedSeller {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub store_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedCustomer {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub download_limit: Option<i32>,
    pub access_days: Option<i32>,
    #[serde(default = "published")]
    pub status: ProductStatus,
}

const fn published() -> ProductStatus {
    ProductStatus::Published
}

#[derive(Debug, Deserialize)]
pub struct SeedMembership {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub billing_cycle: BillingCycle,
    #[serde(default)]
    pub trial_days: i32,
}

/// What a seed run created.
#[derive(Debug, Default)]
pub struct SeedReport {
    pub customers: usize,
    pub products: usize,
    pub memberships: usize,
    pub coupons: usize,
    pub skipped: usize,
}

/// Parse a seed file.
///
/// # Errors
///
/// Returns `CommandError::Yaml` for malformed YAML and
/// `CommandError::InvalidSeed` for values that can never be inserted.
pub fn parse(content: &str) -> Result<SeedFile, CommandError> {
    let seed: SeedFile = serde_yaml::from_str(content)?;
    for customer in &seed.customers {
        Email::parse(&customer.email).map_err(|e| {
            CommandError::InvalidSeed(format!("customer {}: {e}", customer.email))
        })?;
    }
    for product in &seed.products {
        if product.price.is_sign_negative() {
            return Err(CommandError::InvalidSeed(format!(
                "product {}: price must not be negative",
                product.name
            )));
        }
    }
    Ok(seed)
}

/// Apply a seed file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the database is
/// unreachable.
pub async fn from_file(file_path: &str) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.to_owned(),
            source,
        })?;
    let seed = parse(&content)?;
    tracing::info!(path = %file_path, "Parsed seed file");

    let pool = connect().await?;
    let seller_id = ensure_seller(&pool, &seed.seller).await?;
    let currency = PaymentSettingsRepository::new(&pool).get(seller_id).await?.currency;

    let mut report = SeedReport::default();

    let customers = CustomerRepository::new(&pool);
    for customer in &seed.customers {
        let new = NewCustomer {
            email: Email::parse(&customer.email)
                .map_err(|e| CommandError::InvalidSeed(e.to_string()))?,
            name: customer.name.clone(),
            notes: None,
        };
        match customers.create(seller_id, &new).await {
            Ok(_) => report.customers += 1,
            Err(e) => skip(&mut report, "customer", &customer.email, e)?,
        }
    }

    let products = ProductRepository::new(&pool);
    for product in &seed.products {
        let new = NewProduct {
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            currency,
            download_limit: product.download_limit,
            access_days: product.access_days,
        };
        let created = products.create(seller_id, &new).await?;
        if product.status != ProductStatus::Draft {
            products.set_status(seller_id, created.id, product.status).await?;
        }
        report.products += 1;
    }

    let memberships = MembershipRepository::new(&pool);
    for membership in &seed.memberships {
        let new = NewMembership {
            name: membership.name.clone(),
            description: membership.description.clone(),
            price: membership.price,
            currency,
            billing_cycle: membership.billing_cycle,
            trial_days: membership.trial_days,
        };
        memberships.create(seller_id, &new).await?;
        report.memberships += 1;
    }

    let coupons = CouponService::new(&pool);
    for coupon in &seed.coupons {
        match coupons.create(seller_id, coupon).await {
            Ok(_) => report.coupons += 1,
            Err(CouponError::Repository(e)) => {
                let label = coupon.code.clone().unwrap_or_default();
                skip(&mut report, "coupon", &label, e)?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!("Seeding complete!");
    tracing::info!("  Customers: {}", report.customers);
    tracing::info!("  Products: {}", report.products);
    tracing::info!("  Memberships: {}", report.memberships);
    tracing::info!("  Coupons: {}", report.coupons);
    tracing::info!("  Skipped (already exist): {}", report.skipped);
    Ok(())
}

/// Log and count a conflict; pass any other error through.
fn skip(
    report: &mut SeedReport,
    kind: &str,
    label: &str,
    err: RepositoryError,
) -> Result<(), CommandError> {
    match err {
        RepositoryError::Conflict(reason) => {
            tracing::warn!(kind, label, %reason, "Skipping existing row");
            report.skipped += 1;
            Ok(())
        }
        other => Err(other.into()),
    }
}

async fn ensure_seller(pool: &sqlx::PgPool, seller: &SeedSeller) -> Result<SellerId, CommandError> {
    let email =
        Email::parse(&seller.email).map_err(|e| CommandError::InvalidSeed(e.to_string()))?;
    if let Some((existing, _)) = SellerRepository::new(pool)
        .get_by_email_with_hash(&email)
        .await?
    {
        tracing::info!(seller_id = %existing.id, "Using existing seller");
        return Ok(existing.id);
    }

    let created = AuthService::new(pool)
        .register(&Registration {
            email: &seller.email,
            password: &seller.password,
            display_name: &seller.display_name,
            store_name: &seller.store_name,
        })
        .await?;
    tracing::info!(seller_id = %created.id, "Seller created");
    Ok(created.id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_demo_seed_parses() {
        let seed = parse(include_str!("../../seed/demo.yaml")).unwrap();
        assert!(!seed.products.is_empty());
        assert!(!seed.memberships.is_empty());
        assert!(seed.coupons.iter().all(|c| c.is_active));
    }

    #[test]
    fn test_bad_customer_email_rejected() {
        let yaml = r"
seller:
  email: owner@example.com
  password: correct-horse-battery
  display_name: Owner
  store_name: Store
customers:
  - email: not-an-email
";
        assert!(matches!(parse(yaml), Err(CommandError::InvalidSeed(_))));
    }

    #[test]
    fn test_product_status_defaults_to_published() {
        let yaml = r#"
seller:
  email: owner@example.com
  password: correct-horse-battery
  display_name: Owner
  store_name: Store
products:
  - name: Guide
    price: "12.50"
"#;
        let seed = parse(yaml).unwrap();
        let product = seed.products.first().unwrap();
        assert_eq!(product.status, ProductStatus::Published);
        assert_eq!(product.price, Decimal::new(1250, 2));
    }
}
