//! Product and product file repository.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::{CurrencyCode, ProductFileId, ProductId, ProductStatus, SellerId};

use super::{Page, RepositoryError};
use crate::models::{Product, ProductFile};

/// Fields for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub download_limit: Option<i32>,
    pub access_days: Option<i32>,
}

/// Partial update; `None` leaves a field unchanged.
///
/// The limit fields are doubly optional: `Some(None)` clears the limit.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub download_limit: Option<Option<i32>>,
    pub access_days: Option<Option<i32>>,
}

/// Fields for attaching a stored file.
#[derive(Debug, Clone)]
pub struct NewProductFile {
    /// Chosen before the blob is written so it can appear in the storage key.
    pub id: ProductFileId,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
}

const PRODUCT_COLUMNS: &str = "id, seller_id, name, description, price, currency, status, \
                               download_limit, access_days, created_at, updated_at";

/// Repository for products.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        seller_id: SellerId,
        status: Option<ProductStatus>,
        page: Page,
    ) -> Result<Vec<Product>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM desk.products
             WHERE seller_id = $1 AND ($2::desk.product_status IS NULL OR status = $2)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(seller_id)
            .bind(status)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;
        Ok(products)
    }

    /// Get a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist for this seller.
    pub async fn get(&self, seller_id: SellerId, id: ProductId) -> Result<Product, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, seller_id, id).await
    }

    /// Create a product in draft status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a column constraint fails.
    pub async fn create(
        &self,
        seller_id: SellerId,
        new: &NewProduct,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            "INSERT INTO desk.products
                (seller_id, name, description, price, currency, download_limit, access_days)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(seller_id)
            .bind(&new.name)
            .bind(new.description.as_deref())
            .bind(new.price)
            .bind(new.currency)
            .bind(new.download_limit)
            .bind(new.access_days)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "invalid product values"))
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` or `RepositoryError::Conflict`.
    pub async fn update(
        &self,
        seller_id: SellerId,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            "UPDATE desk.products
             SET name = COALESCE($3, name),
                 description = COALESCE($4, description),
                 price = COALESCE($5, price),
                 download_limit = CASE WHEN $6 THEN $7 ELSE download_limit END,
                 access_days = CASE WHEN $8 THEN $9 ELSE access_days END,
                 updated_at = NOW()
             WHERE seller_id = $1 AND id = $2
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(seller_id)
            .bind(id)
            .bind(changes.name.as_deref())
            .bind(changes.description.as_deref())
            .bind(changes.price)
            .bind(changes.download_limit.is_some())
            .bind(changes.download_limit.flatten())
            .bind(changes.access_days.is_some())
            .bind(changes.access_days.flatten())
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "invalid product values"))?
            .ok_or(RepositoryError::NotFound)
    }

    /// Change publication status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist for this seller.
    pub async fn set_status(
        &self,
        seller_id: SellerId,
        id: ProductId,
        status: ProductStatus,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            "UPDATE desk.products SET status = $3, updated_at = NOW()
             WHERE seller_id = $1 AND id = $2
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(seller_id)
            .bind(id)
            .bind(status)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Delete a product and its file rows, returning the storage keys to remove.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the product has sales (archive it instead).
    pub async fn delete(
        &self,
        seller_id: SellerId,
        id: ProductId,
    ) -> Result<Vec<String>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT storage_key FROM desk.product_files WHERE seller_id = $1 AND product_id = $2",
        )
        .bind(seller_id)
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM desk.products WHERE seller_id = $1 AND id = $2")
            .bind(seller_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                RepositoryError::from_constraint(e, "product has sales; archive it instead")
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tx.commit().await?;
        Ok(keys)
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Record a stored file against a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist for this seller.
    pub async fn add_file(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
        file: &NewProductFile,
    ) -> Result<ProductFile, RepositoryError> {
        sqlx::query_as::<_, ProductFile>(
            r"
            INSERT INTO desk.product_files
                (id, seller_id, product_id, file_name, content_type, size_bytes, storage_key)
            SELECT $7, p.seller_id, p.id, $3, $4, $5, $6
            FROM desk.products p
            WHERE p.seller_id = $1 AND p.id = $2
            RETURNING id, seller_id, product_id, file_name, content_type, size_bytes,
                      storage_key, created_at
            ",
        )
        .bind(seller_id)
        .bind(product_id)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .bind(file.size_bytes)
        .bind(&file.storage_key)
        .bind(file.id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// List a product's files.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_files(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
    ) -> Result<Vec<ProductFile>, RepositoryError> {
        let files = sqlx::query_as::<_, ProductFile>(
            r"
            SELECT id, seller_id, product_id, file_name, content_type, size_bytes,
                   storage_key, created_at
            FROM desk.product_files
            WHERE seller_id = $1 AND product_id = $2
            ORDER BY created_at
            ",
        )
        .bind(seller_id)
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;
        Ok(files)
    }

    /// Get one file.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the file does not exist for this seller.
    pub async fn get_file(
        &self,
        seller_id: SellerId,
        file_id: ProductFileId,
    ) -> Result<ProductFile, RepositoryError> {
        sqlx::query_as::<_, ProductFile>(
            r"
            SELECT id, seller_id, product_id, file_name, content_type, size_bytes,
                   storage_key, created_at
            FROM desk.product_files
            WHERE seller_id = $1 AND id = $2
            ",
        )
        .bind(seller_id)
        .bind(file_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete one file row, returning it so the caller can remove the blob.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the file does not exist for this seller.
    pub async fn delete_file(
        &self,
        seller_id: SellerId,
        file_id: ProductFileId,
    ) -> Result<ProductFile, RepositoryError> {
        sqlx::query_as::<_, ProductFile>(
            r"
            DELETE FROM desk.product_files
            WHERE seller_id = $1 AND id = $2
            RETURNING id, seller_id, product_id, file_name, content_type, size_bytes,
                      storage_key, created_at
            ",
        )
        .bind(seller_id)
        .bind(file_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}

/// Get a product on `conn`.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the product does not exist for this seller.
pub async fn get(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: ProductId,
) -> Result<Product, RepositoryError> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM desk.products WHERE seller_id = $1 AND id = $2");
    sqlx::query_as::<_, Product>(&sql)
        .bind(seller_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}
