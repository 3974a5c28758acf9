//! Customer communications: compose, record, deliver.
//!
//! Every message is recorded as `queued` before any delivery attempt. With
//! SMTP configured it is sent straight away and marked `sent` or `failed`;
//! without SMTP it stays `queued` until `flush_queued` runs against a
//! server that has a transport.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use shelfkeeper_core::template::{TemplateError, render, standard_vars, validate};
use shelfkeeper_core::{
    CommunicationStatus, CommunicationTemplateId, CustomerId, Money, SellerId,
};

use crate::db::communications::{NewCommunication, NewTemplate, TemplateChanges};
use crate::db::{CommunicationRepository, CustomerRepository, RepositoryError, SellerRepository};
use crate::models::{Communication, CommunicationTemplate, Customer, CurrentSeller, Sale};
use crate::services::email::{EmailService, OutgoingEmail};

/// Errors composing or recording a communication.
#[derive(Debug, Error)]
pub enum CommunicationError {
    #[error("customer not found")]
    CustomerNotFound,

    #[error("template not found")]
    TemplateNotFound,

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("{0} must not be blank")]
    MissingContent(&'static str),

    #[error("no SMTP transport is configured")]
    NoTransport,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// What to send to a customer: a stored template or an ad-hoc subject and body.
#[derive(Debug, Clone, Deserialize)]
pub struct ComposeRequest {
    pub customer_id: CustomerId,
    pub template_id: Option<CommunicationTemplateId>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// Result of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub sent: usize,
    pub failed: usize,
}

/// Communication service.
pub struct CommunicationService<'a> {
    pool: &'a PgPool,
    communications: CommunicationRepository<'a>,
    mailer: Option<&'a EmailService>,
}

impl<'a> CommunicationService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, mailer: Option<&'a EmailService>) -> Self {
        Self {
            pool,
            communications: CommunicationRepository::new(pool),
            mailer,
        }
    }

    /// Create a template after checking its placeholders.
    ///
    /// # Errors
    ///
    /// Returns `CommunicationError::Template` for unknown placeholders,
    /// `CommunicationError::MissingContent` for blank fields, or a
    /// repository conflict for a duplicate name.
    pub async fn create_template(
        &self,
        seller_id: SellerId,
        new: &NewTemplate,
    ) -> Result<CommunicationTemplate, CommunicationError> {
        require("name", &new.name)?;
        require("subject", &new.subject)?;
        require("body", &new.body)?;
        validate(&new.subject)?;
        validate(&new.body)?;
        Ok(self.communications.create_template(seller_id, new).await?)
    }

    /// Update a template after checking any new subject or body.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_template`], plus `TemplateNotFound`.
    pub async fn update_template(
        &self,
        seller_id: SellerId,
        id: CommunicationTemplateId,
        changes: &TemplateChanges,
    ) -> Result<CommunicationTemplate, CommunicationError> {
        if let Some(name) = &changes.name {
            require("name", name)?;
        }
        if let Some(subject) = &changes.subject {
            require("subject", subject)?;
            validate(subject)?;
        }
        if let Some(body) = &changes.body {
            require("body", body)?;
            validate(body)?;
        }
        self.communications
            .update_template(seller_id, id, changes)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => CommunicationError::TemplateNotFound,
                other => other.into(),
            })
    }

    /// Render a message for a customer, record it and try to deliver it.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer or template is missing or the
    /// template does not render. Delivery failures are recorded on the
    /// message, not returned.
    #[instrument(skip(self, seller, request), fields(seller_id = %seller.id))]
    pub async fn send(
        &self,
        seller: &CurrentSeller,
        request: &ComposeRequest,
    ) -> Result<Communication, CommunicationError> {
        let customer = CustomerRepository::new(self.pool)
            .get(seller.id, request.customer_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => CommunicationError::CustomerNotFound,
                other => other.into(),
            })?;

        let (subject_template, body_template) = match request.template_id {
            Some(template_id) => {
                let template = self
                    .communications
                    .get_template(seller.id, template_id)
                    .await
                    .map_err(|e| match e {
                        RepositoryError::NotFound => CommunicationError::TemplateNotFound,
                        other => other.into(),
                    })?;
                (template.subject, template.body)
            }
            None => {
                let subject = request.subject.clone().unwrap_or_default();
                let body = request.body.clone().unwrap_or_default();
                require("subject", &subject)?;
                require("body", &body)?;
                (subject, body)
            }
        };

        let vars = standard_vars(
            customer.name.as_deref(),
            customer.email.as_str(),
            &seller.store_name,
        );
        let new = NewCommunication {
            customer_id: customer.id,
            template_id: request.template_id,
            recipient: customer.email.to_string(),
            subject: render(&subject_template, &vars)?,
            body: render(&body_template, &vars)?,
        };

        let recorded = self.communications.insert(seller.id, &new).await?;
        Ok(self.deliver(&seller.store_name, recorded).await)
    }

    /// Try to send a recorded message and store the outcome.
    ///
    /// Without a transport the message is returned unchanged (still queued).
    pub async fn deliver(&self, store_name: &str, message: Communication) -> Communication {
        let Some(mailer) = self.mailer else {
            return message;
        };

        let outcome = mailer
            .send(&OutgoingEmail {
                to: &message.recipient,
                subject: &message.subject,
                body: &message.body,
                store_name,
            })
            .await;

        let updated = match &outcome {
            Ok(()) => {
                self.communications
                    .mark_sent(message.seller_id, message.id)
                    .await
            }
            Err(e) => {
                tracing::warn!(communication_id = %message.id, error = %e, "Email delivery failed");
                self.communications
                    .mark_failed(message.seller_id, message.id, &e.to_string())
                    .await
            }
        };

        match updated {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(
                    communication_id = %message.id,
                    error = %e,
                    "Failed to record delivery outcome"
                );
                message
            }
        }
    }

    /// Send up to `limit` queued messages, oldest first.
    ///
    /// With `seller_id` only that seller's queue is flushed; without it,
    /// every seller's.
    ///
    /// # Errors
    ///
    /// Returns `CommunicationError::NoTransport` without SMTP, or a
    /// repository error if the queue cannot be read.
    #[instrument(skip(self))]
    pub async fn flush_queued(
        &self,
        seller_id: Option<SellerId>,
        limit: i64,
    ) -> Result<FlushReport, CommunicationError> {
        if self.mailer.is_none() {
            return Err(CommunicationError::NoTransport);
        }

        let queued = self.communications.list_queued(seller_id, limit).await?;
        let sellers = SellerRepository::new(self.pool);
        let mut store_names: HashMap<SellerId, String> = HashMap::new();
        let mut report = FlushReport::default();

        for message in queued {
            let store_name = match store_names.get(&message.seller_id) {
                Some(name) => name.clone(),
                None => {
                    let name = sellers
                        .get_by_id(message.seller_id)
                        .await?
                        .map(|s| s.store_name)
                        .unwrap_or_default();
                    store_names.insert(message.seller_id, name.clone());
                    name
                }
            };

            match self.deliver(&store_name, message).await.status {
                CommunicationStatus::Sent => report.sent += 1,
                CommunicationStatus::Failed => report.failed += 1,
                CommunicationStatus::Queued => {}
            }
        }

        tracing::info!(sent = report.sent, failed = report.failed, "Flushed queued communications");
        Ok(report)
    }
}

fn require(field: &'static str, value: &str) -> Result<(), CommunicationError> {
    if value.trim().is_empty() {
        return Err(CommunicationError::MissingContent(field));
    }
    Ok(())
}

/// The receipt message for a completed sale.
#[must_use]
pub fn receipt(customer: &Customer, store_name: &str, item_name: &str, sale: &Sale) -> NewCommunication {
    let money = |amount| Money::new(amount, sale.currency).display();
    let mut body = format!(
        "Hi {},\n\nThanks for your purchase from {store_name}.\n\n{item_name}\nSubtotal: {}\n",
        customer.display_name(),
        money(sale.amounts.subtotal),
    );
    if !sale.amounts.discount.is_zero() {
        body.push_str(&format!("Discount: -{}\n", money(sale.amounts.discount)));
    }
    body.push_str(&format!("Total: {}\n\nOrder reference: {}", money(sale.amounts.total), sale.id));

    NewCommunication {
        customer_id: customer.id,
        template_id: None,
        recipient: customer.email.to_string(),
        subject: format!("Your receipt from {store_name}"),
        body,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use shelfkeeper_core::sale::{SaleAmounts, SaleTarget};
    use shelfkeeper_core::{CurrencyCode, Email, ProductId, SaleId, SaleStatus};

    use super::*;

    fn customer(name: Option<&str>) -> Customer {
        Customer {
            id: CustomerId::generate(),
            seller_id: SellerId::generate(),
            email: Email::parse("ada@example.com").unwrap(),
            name: name.map(String::from),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sale(amounts: SaleAmounts) -> Sale {
        Sale {
            id: SaleId::generate(),
            seller_id: SellerId::generate(),
            customer_id: CustomerId::generate(),
            target: SaleTarget::Product(ProductId::generate()),
            subscription_id: None,
            coupon_id: None,
            payment_method_id: None,
            amounts,
            currency: CurrencyCode::USD,
            status: SaleStatus::Completed,
            refund_reason: None,
            refunded_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_receipt_lists_discount_when_present() {
        let sale = sale(SaleAmounts::new(Decimal::new(2000, 2), Decimal::new(500, 2)));
        let message = receipt(&customer(Some("Ada")), "Pixel Press", "Brush Pack", &sale);

        assert_eq!(message.subject, "Your receipt from Pixel Press");
        assert_eq!(message.recipient, "ada@example.com");
        assert!(message.body.starts_with("Hi Ada,"));
        assert!(message.body.contains("Subtotal: $20.00"));
        assert!(message.body.contains("Discount: -$5.00"));
        assert!(message.body.contains("Total: $15.00"));
        assert!(message.body.contains(&sale.id.to_string()));
    }

    #[test]
    fn test_receipt_omits_zero_discount() {
        let sale = sale(SaleAmounts::undiscounted(Decimal::new(999, 2)));
        let message = receipt(&customer(None), "Pixel Press", "Brush Pack", &sale);
        assert!(message.body.starts_with("Hi ada@example.com,"));
        assert!(!message.body.contains("Discount"));
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(matches!(
            require("subject", "   "),
            Err(CommunicationError::MissingContent("subject"))
        ));
        assert!(require("subject", "Hello").is_ok());
    }
}
