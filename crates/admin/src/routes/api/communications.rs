//! Communication template and message endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
};
use serde::Deserialize;

use shelfkeeper_core::CommunicationTemplateId;

use crate::db::communications::{CommunicationFilter, NewTemplate, TemplateChanges};
use crate::db::{CommunicationRepository, Page};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::{Communication, CommunicationTemplate};
use crate::services::CommunicationService;
use crate::services::communications::ComposeRequest;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/communication-templates",
            get(list_templates).post(create_template),
        )
        .route(
            "/api/communication-templates/{id}",
            patch(update_template).delete(delete_template),
        )
        .route("/api/communications", get(list).post(send))
}

#[derive(Debug, Deserialize)]
pub struct TemplateInput {
    pub name: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// GET /api/communication-templates
async fn list_templates(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
) -> Result<Json<Vec<CommunicationTemplate>>, AppError> {
    let templates = CommunicationRepository::new(state.pool())
        .list_templates(seller.id)
        .await?;
    Ok(Json(templates))
}

/// POST /api/communication-templates
///
/// Subject and body may use `{{customer_name}}`, `{{customer_email}}` and
/// `{{store_name}}`.
async fn create_template(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<TemplateInput>,
) -> Result<(StatusCode, Json<CommunicationTemplate>), AppError> {
    let new = NewTemplate {
        name: body.name.trim().to_owned(),
        subject: body.subject,
        body: body.body,
    };
    let template = CommunicationService::new(state.pool(), state.mailer())
        .create_template(seller.id, &new)
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// PATCH /api/communication-templates/{id}
async fn update_template(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CommunicationTemplateId>,
    Json(body): Json<TemplatePatch>,
) -> Result<Json<CommunicationTemplate>, AppError> {
    let changes = TemplateChanges {
        name: body.name.map(|n| n.trim().to_owned()),
        subject: body.subject,
        body: body.body,
    };
    let template = CommunicationService::new(state.pool(), state.mailer())
        .update_template(seller.id, id, &changes)
        .await?;
    Ok(Json(template))
}

/// DELETE /api/communication-templates/{id}
async fn delete_template(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<CommunicationTemplateId>,
) -> Result<StatusCode, AppError> {
    CommunicationRepository::new(state.pool())
        .delete_template(seller.id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/communications?customer_id=&status=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(filter): Query<CommunicationFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Communication>>, AppError> {
    let messages = CommunicationRepository::new(state.pool())
        .list(seller.id, &filter, page)
        .await?;
    Ok(Json(messages))
}

/// Send a message to a customer from a template or an ad-hoc subject and
/// body. Without SMTP the message is recorded as queued.
///
/// POST /api/communications
async fn send(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<ComposeRequest>,
) -> Result<(StatusCode, Json<Communication>), AppError> {
    let message = CommunicationService::new(state.pool(), state.mailer())
        .send(&seller, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
