//! Remote Data Service boundary.
//!
//! # Architecture
//!
//! - The backend owns identity, durable rows, files and the transactional
//!   order procedure; this crate never stores them locally
//! - [`RemoteDataService`] is the whole contract, so services can run against
//!   the HTTP client or an in-memory fake
//! - [`RestClient`] speaks the backend's REST dialect (`/rest/v1`, `/auth/v1`,
//!   `/storage/v1`) with `reqwest`
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_storefront::remote::{RemoteDataService, RestClient};
//!
//! let client = RestClient::new(&config.remote)?;
//! let products = client.list_products().await?;
//! ```

mod client;
pub mod rows;

pub use client::RestClient;
pub use rows::{PlaceOrderItem, PlaceOrderRequest, ProductRecord};

use async_trait::async_trait;
use bazaar_core::{OrderId, OrderStatus, ProductId, UserId};
use secrecy::SecretString;
use thiserror::Error;

use crate::models::{AuthSession, AuthTokens, Order, Product};

/// Name of the atomic order-placement procedure.
pub const PLACE_ORDER_PROCEDURE: &str = "handle_place_order";

/// Name of the column-listing procedure used by the product write path.
pub const TABLE_COLUMNS_PROCEDURE: &str = "get_table_columns";

/// Errors that can occur when talking to the Remote Data Service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error envelope.
    #[error("{message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Backend error code (e.g., `P0001` for a raised exception).
        code: Option<String>,
        /// Backend message, unmodified.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A row parsed but holds values the domain rejects.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Credentials or session rejected.
    #[error("{0}")]
    Unauthorized(String),
}

impl RemoteError {
    /// The message to surface to the initiating view, unmodified.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Api { message, .. } | Self::Unauthorized(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the error means the addressed row does not exist (or is
    /// hidden from this identity).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The contract with the Remote Data Service.
///
/// Every method is a single remote call; nothing here retries.
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    // =========================================================================
    // Authentication
    // =========================================================================

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthSession, RemoteError>;

    /// Create an account. Returns `None` when the service requires the
    /// address to be confirmed before a session is issued.
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Option<AuthSession>, RemoteError>;

    /// Resume a session from saved tokens, refreshing them if needed.
    async fn restore_session(&self, tokens: &AuthTokens) -> Result<AuthSession, RemoteError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), RemoteError>;

    /// Role column of the `users` row for this account, if any.
    async fn fetch_role(&self, user_id: UserId) -> Result<Option<String>, RemoteError>;

    // =========================================================================
    // Products
    // =========================================================================

    /// All products, newest first.
    async fn list_products(&self) -> Result<Vec<Product>, RemoteError>;

    /// One product, or `None` if it does not exist.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, RemoteError>;

    /// Insert a product row given as column → value pairs.
    async fn insert_product(&self, row: ProductRecord) -> Result<Product, RemoteError>;

    /// Update the product row `id` with the given column → value pairs.
    async fn update_product(&self, id: &ProductId, row: ProductRecord) -> Result<Product, RemoteError>;

    /// Delete a product row.
    async fn delete_product(&self, id: &ProductId) -> Result<(), RemoteError>;

    // =========================================================================
    // Orders
    // =========================================================================

    /// Orders with their items, newest first; restricted to one buyer when
    /// `user_id` is given.
    async fn list_orders(&self, user_id: Option<UserId>) -> Result<Vec<Order>, RemoteError>;

    /// Set the status of exactly one order.
    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RemoteError>;

    /// Run the atomic order procedure; returns the new order's ID.
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderId, RemoteError>;

    // =========================================================================
    // Schema and storage
    // =========================================================================

    /// Column names of a table in the public schema.
    async fn table_columns(&self, table: &str) -> Result<Vec<String>, RemoteError>;

    /// Upload a file into a bucket; returns the stored object path.
    async fn upload_file(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, RemoteError>;

    /// Public URL of a stored object.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_message_is_verbatim() {
        let err = RemoteError::Api {
            status: 400,
            code: Some("P0001".to_string()),
            message: "Insufficient stock for product Trail Bike".to_string(),
        };
        assert_eq!(err.message(), "Insufficient stock for product Trail Bike");
        assert_eq!(err.to_string(), "Insufficient stock for product Trail Bike");
    }

    #[test]
    fn test_not_found_flag() {
        assert!(RemoteError::NotFound("order 4".to_string()).is_not_found());
        assert!(!RemoteError::RateLimited(2).is_not_found());
    }
}
