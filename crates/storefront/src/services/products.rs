//! Admin product writes.
//!
//! The `products` table may lag behind the form: a column can be missing
//! in a given deployment. Before every write the live column set is looked
//! up (and cached), and only fields whose column exists are sent. Under
//! [`SchemaPolicy::Strict`] a missing column fails the write instead.

use std::collections::HashSet;
use std::sync::Arc;

use bazaar_core::ProductId;
use chrono::Utc;
use moka::future::Cache;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::SchemaPolicy;
use crate::error::{AppError, ProductError, Result};
use crate::models::Product;
use crate::remote::rows::ProductColumns;
use crate::remote::{ProductRecord, RemoteDataService};
use crate::services::auth::SessionHolder;

/// Table written by this module.
pub const PRODUCTS_TABLE: &str = "products";

/// Columns assumed when the live column lookup fails.
pub const FALLBACK_COLUMNS: &[&str] = &[
    "id",
    "name",
    "description",
    "price",
    "image_url",
    "stock",
    "category",
    "created_at",
];

/// Form field → `products` column.
pub const FIELD_COLUMNS: &[(&str, &str)] = &[
    ("name", "name"),
    ("description", "description"),
    ("price", "price"),
    ("image_url", "image_url"),
    ("stock", "stock"),
    ("category", "category"),
];

const ID_COLUMN: &str = "id";

/// Product form contents as entered by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image_url: String,
    pub stock: i64,
    pub category: String,
}

impl ProductDraft {
    /// Check the draft and return the stock as stored.
    ///
    /// # Errors
    ///
    /// Returns `ProductError` for a blank name, negative price, or a stock
    /// outside `0..=u32::MAX`.
    pub fn validate(&self) -> std::result::Result<u32, ProductError> {
        if self.name.trim().is_empty() {
            return Err(ProductError::EmptyName);
        }
        if self.price < Decimal::ZERO {
            return Err(ProductError::NegativePrice);
        }
        u32::try_from(self.stock).map_err(|_| ProductError::InvalidStock)
    }
}

/// An image file to upload alongside a product write.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Creates, updates and deletes products on behalf of an admin.
pub struct ProductWriter {
    remote: Arc<dyn RemoteDataService>,
    session: Arc<SessionHolder>,
    bucket: String,
    policy: SchemaPolicy,
    columns: Cache<&'static str, Arc<HashSet<String>>>,
}

impl std::fmt::Debug for ProductWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductWriter")
            .field("bucket", &self.bucket)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ProductWriter {
    /// Create a writer uploading images into `bucket`.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteDataService>,
        session: Arc<SessionHolder>,
        bucket: impl Into<String>,
        policy: SchemaPolicy,
    ) -> Self {
        // Cached for the life of the process.
        let columns = Cache::builder().max_capacity(8).build();

        Self {
            remote,
            session,
            bucket: bucket.into(),
            policy,
            columns,
        }
    }

    /// Create a product, or update `existing` when given.
    ///
    /// # Errors
    ///
    /// See [`ProductWriter::create`] and [`ProductWriter::update`].
    pub async fn save(
        &self,
        existing: Option<&ProductId>,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<Product> {
        match existing {
            Some(id) => self.update(id, draft, image).await,
            None => self.create(draft, image).await,
        }
    }

    /// Create a product.
    ///
    /// A client-side ID is generated when the table has an `id` column.
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-admins, `AppError::Validation`
    /// for a bad draft, `AppError::Schema` under the strict policy, or the
    /// classified remote error from the upload or insert.
    #[instrument(skip(self, draft, image), fields(name = %draft.name))]
    pub async fn create(&self, draft: &ProductDraft, image: Option<ImageUpload>) -> Result<Product> {
        let (mut record, columns) = self.prepare(draft, image).await?;

        if columns.contains(ID_COLUMN) {
            record.insert(ID_COLUMN, Value::String(ProductId::generate().to_string()));
        } else {
            warn!("No 'id' column in products table, relying on the service to assign one");
        }

        let product = self.remote.insert_product(record).await?;
        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Update the product `id`. The `id` column itself is never written.
    ///
    /// # Errors
    ///
    /// Same as [`ProductWriter::create`].
    #[instrument(skip(self, draft, image), fields(product_id = %id))]
    pub async fn update(
        &self,
        id: &ProductId,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<Product> {
        let (record, _) = self.prepare(draft, image).await?;
        let product = self.remote.update_product(id, record).await?;
        info!("Product updated");
        Ok(product)
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-admins, otherwise the
    /// classified remote error.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: &ProductId) -> Result<()> {
        self.session.require_admin()?;
        self.remote.delete_product(id).await?;
        info!("Product deleted");
        Ok(())
    }

    /// Column names of the `products` table.
    ///
    /// Fetched once and cached. When the lookup fails, [`FALLBACK_COLUMNS`]
    /// is returned for this call only.
    pub async fn live_columns(&self) -> Arc<HashSet<String>> {
        if let Some(columns) = self.columns.get(PRODUCTS_TABLE).await {
            return columns;
        }

        match self.remote.table_columns(PRODUCTS_TABLE).await {
            Ok(names) => {
                debug!(columns = ?names, "Fetched products columns");
                let columns = Arc::new(names.into_iter().collect::<HashSet<_>>());
                self.columns.insert(PRODUCTS_TABLE, columns.clone()).await;
                columns
            }
            Err(e) => {
                warn!(error = %e, "Column lookup failed, using fallback column list");
                Arc::new(FALLBACK_COLUMNS.iter().map(|c| (*c).to_string()).collect())
            }
        }
    }

    /// Shared steps of create and update: authorize, validate, check the
    /// schema, upload the image, and build the column → value record.
    async fn prepare(
        &self,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<(ProductRecord, Arc<HashSet<String>>)> {
        self.session.require_admin()?;
        let stock = draft.validate()?;
        if let Some(image) = &image
            && image.file_name.trim().is_empty()
        {
            return Err(ProductError::EmptyImageName.into());
        }

        let columns = self.live_columns().await;
        let present = self.present_columns(&columns)?;

        let image_url = match image {
            Some(image) => self.upload_image(image).await?,
            None => draft.image_url.clone(),
        };

        let values = ProductColumns {
            name: draft.name.trim(),
            description: &draft.description,
            price: draft.price,
            image_url: &image_url,
            stock,
            category: &draft.category,
        }
        .to_record()?;

        let mut record = ProductRecord::default();
        for (field, column) in present {
            if let Some(value) = values.get(field) {
                record.insert(column, value.clone());
            }
        }
        Ok((record, columns))
    }

    /// Field/column pairs whose column exists, applying the schema policy
    /// to the rest.
    fn present_columns(&self, columns: &HashSet<String>) -> Result<Vec<(&'static str, &'static str)>> {
        let mut present = Vec::with_capacity(FIELD_COLUMNS.len());
        for &(field, column) in FIELD_COLUMNS {
            if columns.contains(column) {
                present.push((field, column));
                continue;
            }
            match self.policy {
                SchemaPolicy::Strict => return Err(AppError::Schema { field, column }),
                SchemaPolicy::Lenient => {
                    warn!(field, column, "Column not found in products table, skipping field");
                }
            }
        }
        Ok(present)
    }

    async fn upload_image(&self, image: ImageUpload) -> Result<String> {
        let name = format!("{}-{}", Utc::now().timestamp_millis(), safe_file_name(&image.file_name));
        let path = self
            .remote
            .upload_file(&self.bucket, &name, image.bytes, &image.content_type)
            .await?;
        Ok(self.remote.public_url(&self.bucket, &path))
    }
}

/// Storage object name for an uploaded file: ASCII letters, digits, `.`,
/// `-` and `_` are kept, anything else becomes `-`.
fn safe_file_name(file_name: &str) -> String {
    file_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
