//! Product and product file endpoints.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use shelfkeeper_core::{CurrencyCode, CustomerId, ProductFileId, ProductId, ProductStatus};

use super::{non_negative, optional, positive, required};
use crate::db::products::{NewProduct, NewProductFile, ProductChanges};
use crate::db::{CustomerRepository, Page, PaymentSettingsRepository, ProductRepository};
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::{Product, ProductFile};
use crate::services::FileStore;
use crate::services::downloads::DownloadLink;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list).post(create))
        .route("/api/products/{id}", get(show).patch(update).delete(remove))
        .route("/api/products/{id}/status", post(set_status))
        .route(
            "/api/products/{id}/files",
            get(list_files)
                .post(upload_file)
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/api/products/{id}/files/{file}", delete(delete_file))
        .route("/api/products/{id}/files/{file}/link", post(file_link))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    /// Defaults to the seller's payment settings currency.
    pub currency: Option<CurrencyCode>,
    pub download_limit: Option<i32>,
    pub access_days: Option<i32>,
}

impl ProductInput {
    fn validate(self, default_currency: CurrencyCode) -> Result<NewProduct, AppError> {
        Ok(NewProduct {
            name: required("name", &self.name)?,
            description: optional(self.description.as_deref()),
            price: non_negative("price", self.price)?,
            currency: self.currency.unwrap_or(default_currency),
            download_limit: positive("download_limit", self.download_limit)?,
            access_days: positive("access_days", self.access_days)?,
        })
    }
}

/// Partial update. `download_limit` or `access_days` sent as `null` become
/// unlimited.
#[derive(Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub download_limit: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub access_days: Option<Option<i32>>,
}

fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TryFrom<ProductPatch> for ProductChanges {
    type Error = AppError;

    fn try_from(patch: ProductPatch) -> Result<Self, Self::Error> {
        Ok(Self {
            name: patch.name.as_deref().map(|n| required("name", n)).transpose()?,
            description: patch.description,
            price: patch.price.map(|p| non_negative("price", p)).transpose()?,
            download_limit: patch
                .download_limit
                .map(|l| positive("download_limit", l))
                .transpose()?,
            access_days: patch
                .access_days
                .map(|d| positive("access_days", d))
                .transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: ProductStatus,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub customer_id: CustomerId,
}

/// GET /api/products?status=
async fn list(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Product>>, AppError> {
    let products = ProductRepository::new(state.pool())
        .list(seller.id, query.status, page)
        .await?;
    Ok(Json(products))
}

/// Create a product in draft status.
///
/// POST /api/products
#[instrument(skip(state, seller, body), fields(seller_id = %seller.id))]
async fn create(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Json(body): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let settings = PaymentSettingsRepository::new(state.pool()).get(seller.id).await?;
    let new = body.validate(settings.currency)?;
    let product = ProductRepository::new(state.pool())
        .create(seller.id, &new)
        .await?;
    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/products/{id}
async fn show(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(ProductRepository::new(state.pool()).get(seller.id, id).await?))
}

/// PATCH /api/products/{id}
async fn update(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(body): Json<ProductPatch>,
) -> Result<Json<Product>, AppError> {
    let changes = ProductChanges::try_from(body)?;
    let product = ProductRepository::new(state.pool())
        .update(seller.id, id, &changes)
        .await?;
    state.stats().invalidate(seller.id).await;
    Ok(Json(product))
}

/// POST /api/products/{id}/status
async fn set_status(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(body): Json<StatusChange>,
) -> Result<Json<Product>, AppError> {
    let product = ProductRepository::new(state.pool())
        .set_status(seller.id, id, body.status)
        .await?;
    tracing::info!(product_id = %id, status = %body.status, "Product status changed");
    Ok(Json(product))
}

/// Delete a product and its stored files.
///
/// DELETE /api/products/{id}
#[instrument(skip(state, seller), fields(seller_id = %seller.id))]
async fn remove(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<StatusCode, AppError> {
    let keys = ProductRepository::new(state.pool()).delete(seller.id, id).await?;
    state.files().delete_all(&keys).await;
    state.stats().invalidate(seller.id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/products/{id}/files
async fn list_files(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Vec<ProductFile>>, AppError> {
    let repo = ProductRepository::new(state.pool());
    repo.get(seller.id, id).await?;
    Ok(Json(repo.list_files(seller.id, id).await?))
}

/// An uploaded file read into memory.
struct Upload {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// Read the `file` field of a multipart body, refusing anything over `max_bytes`.
async fn read_upload(mut multipart: Multipart, max_bytes: u64) -> Result<Upload, AppError> {
    let bad_request = |e: axum::extract::multipart::MultipartError| {
        AppError::BadRequest(format!("invalid multipart body: {e}"))
    };

    while let Some(mut field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(sanitize_file_name)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("file field needs a filename".into()))?;
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(bad_request)? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > max_bytes {
                return Err(AppError::PayloadTooLarge(format!(
                    "files are limited to {max_bytes} bytes"
                )));
            }
        }
        if bytes.is_empty() {
            return Err(AppError::Unprocessable("file is empty".into()));
        }
        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(AppError::BadRequest("missing file field".into()))
}

/// Keep only the last path segment and drop control characters.
fn sanitize_file_name(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Upload a file to a product.
///
/// POST /api/products/{id}/files (multipart, field `file`)
#[instrument(skip(state, seller, multipart), fields(seller_id = %seller.id))]
async fn upload_file(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ProductFile>), AppError> {
    let repo = ProductRepository::new(state.pool());
    repo.get(seller.id, id).await?;

    let upload = read_upload(multipart, state.config().storage.max_upload_bytes).await?;
    let file_id = ProductFileId::generate();
    let storage_key = FileStore::key(seller.id, id, file_id);
    state.files().put(&storage_key, &upload.bytes).await?;

    let new = NewProductFile {
        id: file_id,
        file_name: upload.file_name,
        content_type: upload.content_type,
        size_bytes: i64::try_from(upload.bytes.len()).unwrap_or(i64::MAX),
        storage_key,
    };
    let file = match repo.add_file(seller.id, id, &new).await {
        Ok(file) => file,
        Err(e) => {
            // The row was never written, so nothing else points at the blob
            if let Err(cleanup) = state.files().delete(&new.storage_key).await {
                tracing::warn!(error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    tracing::info!(file_id = %file.id, size_bytes = file.size_bytes, "Product file uploaded");
    Ok((StatusCode::CREATED, Json(file)))
}

/// Fetch a file and check it belongs to the product in the path.
async fn product_file(
    state: &AppState,
    seller: &crate::models::CurrentSeller,
    product_id: ProductId,
    file_id: ProductFileId,
) -> Result<ProductFile, AppError> {
    let file = ProductRepository::new(state.pool())
        .get_file(seller.id, file_id)
        .await?;
    if file.product_id != product_id {
        return Err(AppError::NotFound("file not found".into()));
    }
    Ok(file)
}

/// DELETE /api/products/{id}/files/{file}
async fn delete_file(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path((id, file_id)): Path<(ProductId, ProductFileId)>,
) -> Result<StatusCode, AppError> {
    product_file(&state, &seller, id, file_id).await?;
    let file = ProductRepository::new(state.pool())
        .delete_file(seller.id, file_id)
        .await?;
    if let Err(e) = state.files().delete(&file.storage_key).await {
        tracing::warn!(error = %e, file_id = %file.id, "Failed to remove stored file");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Issue a signed, expiring download link for a customer.
///
/// POST /api/products/{id}/files/{file}/link
async fn file_link(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
    Path((id, file_id)): Path<(ProductId, ProductFileId)>,
    Json(body): Json<LinkRequest>,
) -> Result<Json<DownloadLink>, AppError> {
    let file = product_file(&state, &seller, id, file_id).await?;
    let customer = CustomerRepository::new(state.pool())
        .get(seller.id, body.customer_id)
        .await?;
    let link = state
        .signer()
        .link(state.base_url(), seller.id, file.id, customer.id, Utc::now());
    Ok(Json(link))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> ProductInput {
        ProductInput {
            name: " Field Guide ".into(),
            description: None,
            price: Decimal::new(1900, 2),
            currency: None,
            download_limit: Some(5),
            access_days: None,
        }
    }

    #[test]
    fn test_product_input_defaults_currency() {
        let new = input().validate(CurrencyCode::EUR).unwrap();
        assert_eq!(new.name, "Field Guide");
        assert_eq!(new.currency, CurrencyCode::EUR);

        let new = ProductInput {
            currency: Some(CurrencyCode::GBP),
            ..input()
        }
        .validate(CurrencyCode::EUR)
        .unwrap();
        assert_eq!(new.currency, CurrencyCode::GBP);
    }

    #[test]
    fn test_product_input_rejects_bad_values() {
        let negative = ProductInput {
            price: Decimal::new(-1, 0),
            ..input()
        };
        assert!(negative.validate(CurrencyCode::USD).is_err());

        let zero_limit = ProductInput {
            download_limit: Some(0),
            ..input()
        };
        assert!(zero_limit.validate(CurrencyCode::USD).is_err());
    }

    #[test]
    fn test_patch_null_clears_limit() {
        let patch: ProductPatch = serde_json::from_str(r#"{"download_limit": null}"#).unwrap();
        let changes = ProductChanges::try_from(patch).unwrap();
        assert_eq!(changes.download_limit, Some(None));
        assert_eq!(changes.access_days, None);

        let patch: ProductPatch = serde_json::from_str(r#"{"access_days": 30}"#).unwrap();
        assert_eq!(ProductChanges::try_from(patch).unwrap().access_days, Some(Some(30)));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\book.pdf"), "book.pdf");
        assert_eq!(sanitize_file_name("a\"b\n.zip"), "ab.zip");
    }
}
