//! Customer and payment method endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use shelfkeeper_core::payment_method::is_expired;
use shelfkeeper_core::{CustomerId, Email, PaymentMethodId, PaymentMethodKind};

use super::{optional, positive};
use crate::db::customers::{CustomerChanges, NewCustomer};
use crate::db::payment_methods::NewPaymentMethod;
use crate::db::{CustomerRepository, Page, PaymentMethodRepository};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::{Customer, CustomerHistory, PaymentMethod};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/customers", get(list).post(create))
        .route("/api/customers/{id}", get(show).patch(update).delete(remove))
        .route("/api/customers/{id}/history", get(history))
        .route(
            "/api/customers/{id}/payment-methods",
            get(list_payment_methods).post(add_payment_method),
        )
        .route(
            "/api/customers/{id}/payment-methods/{pm}/default",
            post(set_default_payment_method),
        )
        .route(
            "/api/customers/{id}/payment-methods/{pm}",
            delete(remove_payment_method),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomerList {
    pub customers: Vec<Customer>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct CustomerInput {
    pub email: String,
    pub name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub notes: Option<String>,
}

fn parse_email(raw: &str) -> Result<Email, AppError> {
    Email::parse(raw).map_err(|e| AppError::Unprocessable(e.to_string()))
}

impl TryFrom<CustomerInput> for NewCustomer {
    type Error = AppError;

    fn try_from(input: CustomerInput) -> Result<Self, Self::Error> {
        Ok(Self {
            email: parse_email(&input.email)?,
            name: optional(input.name.as_deref()),
            notes: optional(input.notes.as_deref()),
        })
    }
}

impl TryFrom<CustomerPatch> for CustomerChanges {
    type Error = AppError;

    fn try_from(patch: CustomerPatch) -> Result<Self, Self::Error> {
        Ok(Self {
            email: patch.email.as_deref().map(parse_email).transpose()?,
            name: patch.name.map(|n| n.trim().to_owned()),
            notes: patch.notes,
        })
    }
}

/// GET /api/customers?search=&limit=&offset=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(query): Query<CustomerQuery>,
    Query(page): Query<Page>,
) -> Result<Json<CustomerList>, AppError> {
    let repo = CustomerRepository::new(state.pool());
    let search = optional(query.search.as_deref());
    let (customers, total) = tokio::try_join!(
        repo.list(seller.id, search.as_deref(), page),
        repo.count(seller.id, search.as_deref()),
    )?;
    Ok(Json(CustomerList { customers, total }))
}

/// POST /api/customers
#[instrument(skip(state, seller, body), fields(seller_id = %seller.id))]
async fn create(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<CustomerInput>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let new = NewCustomer::try_from(body)?;
    let customer = CustomerRepository::new(state.pool())
        .create(seller.id, &new)
        .await?;
    tracing::info!(customer_id = %customer.id, "Customer created");
    Ok((StatusCode::CREATED, Json(customer)))
}

/// GET /api/customers/{id}
async fn show(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<Customer>, AppError> {
    Ok(Json(CustomerRepository::new(state.pool()).get(seller.id, id).await?))
}

/// PATCH /api/customers/{id}
async fn update(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    Json(body): Json<CustomerPatch>,
) -> Result<Json<Customer>, AppError> {
    let changes = CustomerChanges::try_from(body)?;
    let customer = CustomerRepository::new(state.pool())
        .update(seller.id, id, &changes)
        .await?;
    Ok(Json(customer))
}

/// DELETE /api/customers/{id}
///
/// Customers with sales or subscriptions cannot be deleted (409).
async fn remove(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<StatusCode, AppError> {
    CustomerRepository::new(state.pool()).delete(seller.id, id).await?;
    state.stats().invalidate(seller.id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/customers/{id}/history
async fn history(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<CustomerHistory>, AppError> {
    Ok(Json(
        CustomerRepository::new(state.pool()).history(seller.id, id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodInput {
    pub kind: PaymentMethodKind,
    pub label: String,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    #[serde(default)]
    pub make_default: bool,
}

impl PaymentMethodInput {
    fn validate(self) -> Result<NewPaymentMethod, AppError> {
        let label = super::required("label", &self.label)?;
        if let Some(last4) = &self.last4
            && (last4.len() != 4 || !last4.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(AppError::Unprocessable("last4 must be four digits".into()));
        }
        if let Some(month) = self.exp_month
            && !(1..=12).contains(&month)
        {
            return Err(AppError::Unprocessable("exp_month must be 1-12".into()));
        }
        positive("exp_year", self.exp_year)?;
        if self.exp_month.is_some() != self.exp_year.is_some() {
            return Err(AppError::Unprocessable(
                "exp_month and exp_year must be given together".into(),
            ));
        }
        if is_expired(self.exp_month, self.exp_year, Utc::now().date_naive()) {
            return Err(AppError::Unprocessable("payment method has expired".into()));
        }
        Ok(NewPaymentMethod {
            kind: self.kind,
            label,
            last4: self.last4,
            exp_month: self.exp_month,
            exp_year: self.exp_year,
            make_default: self.make_default,
        })
    }
}

/// GET /api/customers/{id}/payment-methods
async fn list_payment_methods(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<Vec<PaymentMethod>>, AppError> {
    // 404 rather than an empty list for someone else's customer
    CustomerRepository::new(state.pool()).get(seller.id, id).await?;
    let methods = PaymentMethodRepository::new(state.pool())
        .list_for_customer(seller.id, id)
        .await?;
    Ok(Json(methods))
}

/// POST /api/customers/{id}/payment-methods
///
/// A customer's first method becomes the default.
async fn add_payment_method(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    Json(body): Json<PaymentMethodInput>,
) -> Result<(StatusCode, Json<PaymentMethod>), AppError> {
    let new = body.validate()?;
    let method = PaymentMethodRepository::new(state.pool())
        .add(seller.id, id, &new)
        .await?;
    Ok((StatusCode::CREATED, Json(method)))
}

/// POST /api/customers/{id}/payment-methods/{pm}/default
async fn set_default_payment_method(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path((id, pm)): Path<(CustomerId, PaymentMethodId)>,
) -> Result<Json<PaymentMethod>, AppError> {
    let method = PaymentMethodRepository::new(state.pool())
        .set_default(seller.id, id, pm)
        .await?;
    Ok(Json(method))
}

#[derive(Debug, Serialize)]
pub struct RemovedPaymentMethod {
    /// The customer's default after removal, if they have any method left.
    pub default: Option<PaymentMethod>,
}

/// DELETE /api/customers/{id}/payment-methods/{pm}
///
/// Removing the default promotes a replacement.
async fn remove_payment_method(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path((id, pm)): Path<(CustomerId, PaymentMethodId)>,
) -> Result<Json<RemovedPaymentMethod>, AppError> {
    let default = PaymentMethodRepository::new(state.pool())
        .remove(seller.id, id, pm, Utc::now().date_naive())
        .await?;
    Ok(Json(RemovedPaymentMethod { default }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn card() -> PaymentMethodInput {
        PaymentMethodInput {
            kind: PaymentMethodKind::Card,
            label: "Visa ending 4242".into(),
            last4: Some("4242".into()),
            exp_month: Some(12),
            exp_year: Some(2099),
            make_default: false,
        }
    }

    #[test]
    fn test_valid_card_passes() {
        let new = card().validate().unwrap();
        assert_eq!(new.label, "Visa ending 4242");
        assert_eq!(new.last4.as_deref(), Some("4242"));
    }

    #[test]
    fn test_card_field_checks() {
        let bad_last4 = PaymentMethodInput { last4: Some("42a2".into()), ..card() };
        assert!(bad_last4.validate().is_err());

        let bad_month = PaymentMethodInput { exp_month: Some(13), ..card() };
        assert!(bad_month.validate().is_err());

        let half_expiry = PaymentMethodInput { exp_year: None, ..card() };
        assert!(half_expiry.validate().is_err());

        let expired = PaymentMethodInput { exp_year: Some(2001), ..card() };
        assert!(expired.validate().is_err());
    }

    #[test]
    fn test_customer_input_requires_valid_email() {
        let input = CustomerInput {
            email: "not-an-email".into(),
            name: None,
            notes: None,
        };
        assert!(matches!(
            NewCustomer::try_from(input),
            Err(AppError::Unprocessable(_))
        ));

        let input = CustomerInput {
            email: "ada@example.com".into(),
            name: Some("  ".into()),
            notes: Some(" vip ".into()),
        };
        let new = NewCustomer::try_from(input).unwrap();
        assert_eq!(new.name, None);
        assert_eq!(new.notes.as_deref(), Some("vip"));
    }
}
