//! Public file downloads through signed links.
//!
//! A link names the seller and customer it was issued for. Each successful
//! download is recorded as an access and counts against the product's
//! download limit.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use tracing::instrument;

use shelfkeeper_core::{AccessType, ProductFileId};

use crate::db::ProductRepository;
use crate::error::AppError;
use crate::routes::client_info;
use crate::services::AccessService;
use crate::services::access::AccessRequest;
use crate::services::downloads::LinkParams;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/downloads/{file}", get(download))
}

/// GET /downloads/{file}?seller=&customer=&expires=&sig=
#[instrument(skip(state, params, headers), fields(seller_id = %params.seller, customer_id = %params.customer))]
async fn download(
    State(state): State<AppState>,
    Path(file_id): Path<ProductFileId>,
    Query(params): Query<LinkParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let now = Utc::now();
    state.signer().verify(file_id, &params, now)?;

    let file = ProductRepository::new(state.pool())
        .get_file(params.seller, file_id)
        .await?;

    // Read first so a missing blob does not use up a download
    let bytes = state.files().get(&file.storage_key).await?;

    AccessService::new(state.pool())
        .record(
            params.seller,
            &AccessRequest {
                customer_id: params.customer,
                product_id: Some(file.product_id),
                membership_id: None,
                product_file_id: Some(file.id),
                access_type: AccessType::Download,
            },
            &client_info(&headers),
            now,
        )
        .await?;

    tracing::info!(file_id = %file.id, size_bytes = bytes.len(), "File downloaded");

    let content_type = HeaderValue::from_str(&file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&file.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, no-store")),
        ],
        bytes,
    )
        .into_response())
}

/// `attachment` disposition with an ASCII fallback name.
fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    format!("attachment; filename=\"{ascii}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_is_ascii() {
        assert_eq!(
            content_disposition("guide.pdf"),
            "attachment; filename=\"guide.pdf\""
        );
        assert_eq!(
            content_disposition("café \"menu\".pdf"),
            "attachment; filename=\"caf_ menu.pdf\""
        );
    }
}
