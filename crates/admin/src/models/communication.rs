//! Customer communications and reusable templates.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelfkeeper_core::{
    CommunicationId, CommunicationStatus, CommunicationTemplateId, CustomerId, SellerId,
};

/// A reusable message with `{{ placeholder }}` fields.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommunicationTemplate {
    pub id: CommunicationTemplateId,
    pub seller_id: SellerId,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A rendered message to one customer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Communication {
    pub id: CommunicationId,
    pub seller_id: SellerId,
    pub customer_id: CustomerId,
    pub template_id: Option<CommunicationTemplateId>,
    /// Address the message was (or will be) sent to.
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: CommunicationStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
