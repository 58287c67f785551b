//! REST client for the Remote Data Service.
//!
//! Uses `reqwest` with the backend's REST (`/rest/v1`), auth (`/auth/v1`)
//! and storage (`/storage/v1`) endpoints. The anon key is always sent as
//! `apikey`; the bearer token is the signed-in access token when there is
//! one and the anon key otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use bazaar_core::{OrderId, OrderStatus, ProductId, UserId};
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use super::rows::{
    ErrorEnvelope, OrderRow, OrderStatusPatch, PlaceOrderArgs, ProductRow, RoleRow,
    TableColumnsArgs, TokenResponse, UploadResponse, UserRow, convert_orders,
    convert_product, convert_products, convert_user,
};
use super::{
    PLACE_ORDER_PROCEDURE, PlaceOrderRequest, ProductRecord, RemoteDataService, RemoteError,
    TABLE_COLUMNS_PROCEDURE,
};
use crate::config::RemoteConfig;
use crate::models::{AuthSession, AuthTokens, Order, Product};

/// Error code the REST layer uses when `single()` matched no rows.
const NO_ROWS_CODE: &str = "PGRST116";

/// Error code for a stored procedure that does not exist.
const MISSING_FUNCTION_CODE: &str = "PGRST202";

/// Longest body excerpt written to logs.
const LOG_BODY_LIMIT: usize = 500;

const ORDER_SELECT: &str = "*,order_items(*,products(*))";

/// Classify a non-success response.
fn classify(status: StatusCode, code: Option<String>, message: String) -> RemoteError {
    if code.as_deref() == Some(MISSING_FUNCTION_CODE) {
        return RemoteError::Api {
            status: status.as_u16(),
            code,
            message,
        };
    }
    if status == StatusCode::NOT_FOUND || code.as_deref() == Some(NO_ROWS_CODE) {
        return RemoteError::NotFound(message);
    }
    if status == StatusCode::UNAUTHORIZED {
        return RemoteError::Unauthorized(message);
    }
    RemoteError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

fn procedure_error(err: RemoteError) -> RemoteError {
    match err {
        RemoteError::NotFound(message) => RemoteError::Api {
            status: StatusCode::NOT_FOUND.as_u16(),
            code: None,
            message,
        },
        other => other,
    }
}

/// `bucket/name` with each part percent-encoded as one path segment.
fn object_path(bucket: &str, name: &str) -> String {
    format!("{}/{}", urlencoding::encode(bucket), urlencoding::encode(name))
}

// =============================================================================
// RestClient
// =============================================================================

/// HTTP implementation of [`RemoteDataService`].
///
/// Cheap to clone; clones share the HTTP pool and the signed-in token.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    http: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    access_token: RwLock<Option<SecretString>>,
}

impl RestClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Http` if the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            inner: Arc::new(RestClientInner {
                http,
                base_url: config.url.as_str().trim_end_matches('/').to_string(),
                anon_key: config.anon_key.clone(),
                access_token: RwLock::new(None),
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.inner.base_url)
    }

    fn set_access_token(&self, token: Option<SecretString>) {
        *self.inner.access_token.write() = token;
    }

    /// Start a request carrying the API key and bearer token.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self
            .inner
            .access_token
            .read()
            .as_ref()
            .map_or_else(
                || self.inner.anon_key.expose_secret().to_string(),
                |token| token.expose_secret().to_string(),
            );

        self.inner
            .http
            .request(method, self.url(path))
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(bearer)
    }

    /// Send a request and return the body of a successful response.
    async fn execute(&self, request: RequestBuilder) -> Result<String, RemoteError> {
        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        tracing::error!(
            status = %status,
            body = %body.chars().take(LOG_BODY_LIMIT).collect::<String>(),
            "Remote service returned non-success status"
        );

        let envelope: ErrorEnvelope = serde_json::from_str(&body).unwrap_or_default();
        let message = envelope
            .message()
            .unwrap_or_else(|| format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()));
        Err(classify(status, envelope.code(), message))
    }

    /// Call a stored procedure. A 404 here means the procedure itself is
    /// missing, not a row, so it stays an API error with the service's text.
    async fn call_procedure<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        self.execute_json(request).await.map_err(procedure_error)
    }

    /// Send a request and parse the JSON body.
    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(LOG_BODY_LIMIT).collect::<String>(),
                "Failed to parse remote response"
            );
            RemoteError::Parse(e)
        })
    }

    fn session_from(response: TokenResponse) -> Result<Option<AuthSession>, RemoteError> {
        let (Some(access_token), Some(refresh_token), Some(user)) =
            (response.access_token, response.refresh_token, response.user)
        else {
            return Ok(None);
        };

        Ok(Some(AuthSession {
            user: convert_user(user)?,
            tokens: AuthTokens {
                access_token: SecretString::from(access_token),
                refresh_token: SecretString::from(refresh_token),
            },
        }))
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthSession, RemoteError> {
        let request = self
            .request(Method::POST, "auth/v1/token")
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token.expose_secret() }));
        let response: TokenResponse = self.execute_json(request).await?;

        Self::session_from(response)?
            .ok_or_else(|| RemoteError::Unauthorized("Session expired, please sign in again".to_string()))
    }
}

#[async_trait]
impl RemoteDataService for RestClient {
    // =========================================================================
    // Authentication
    // =========================================================================

    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthSession, RemoteError> {
        let request = self
            .request(Method::POST, "auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password.expose_secret() }));

        // Wrong credentials come back as 400 invalid_grant
        let response: TokenResponse = self.execute_json(request).await.map_err(|e| match e {
            RemoteError::Api { status: 400, message, .. } => RemoteError::Unauthorized(message),
            other => other,
        })?;

        let session = Self::session_from(response)?
            .ok_or_else(|| RemoteError::Unauthorized("Sign-in did not return a session".to_string()))?;
        self.set_access_token(Some(session.tokens.access_token.clone()));
        Ok(session)
    }

    #[instrument(skip(self, password))]
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Option<AuthSession>, RemoteError> {
        let request = self
            .request(Method::POST, "auth/v1/signup")
            .json(&json!({ "email": email, "password": password.expose_secret() }));
        let response: TokenResponse = self.execute_json(request).await?;

        let session = Self::session_from(response)?;
        if let Some(session) = &session {
            self.set_access_token(Some(session.tokens.access_token.clone()));
        } else {
            debug!("Sign-up requires email confirmation");
        }
        Ok(session)
    }

    #[instrument(skip_all)]
    async fn restore_session(&self, tokens: &AuthTokens) -> Result<AuthSession, RemoteError> {
        let request = self
            .inner
            .http
            .get(self.url("auth/v1/user"))
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(tokens.access_token.expose_secret());

        let session = match self.execute_json::<UserRow>(request).await {
            Ok(user) => AuthSession {
                user: convert_user(user)?,
                tokens: tokens.clone(),
            },
            Err(RemoteError::Unauthorized(_) | RemoteError::Api { status: 403, .. }) => {
                debug!("Access token rejected, refreshing");
                self.refresh(&tokens.refresh_token).await?
            }
            Err(e) => return Err(e),
        };

        self.set_access_token(Some(session.tokens.access_token.clone()));
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), RemoteError> {
        let result = self.execute(self.request(Method::POST, "auth/v1/logout")).await;
        // The local token is dropped even if the service call fails
        self.set_access_token(None);
        result.map(|_| ())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_role(&self, user_id: UserId) -> Result<Option<String>, RemoteError> {
        let request = self
            .request(Method::GET, "rest/v1/users")
            .query(&[("select", "role".to_string()), ("id", format!("eq.{user_id}"))]);
        let rows: Vec<RoleRow> = self.execute_json(request).await?;
        Ok(rows.into_iter().next().and_then(|row| row.role))
    }

    // =========================================================================
    // Products
    // =========================================================================

    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, RemoteError> {
        let request = self
            .request(Method::GET, "rest/v1/products")
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let rows: Vec<ProductRow> = self.execute_json(request).await?;
        Ok(convert_products(rows))
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, RemoteError> {
        let request = self
            .request(Method::GET, "rest/v1/products")
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        let rows: Vec<ProductRow> = self.execute_json(request).await?;
        rows.into_iter().next().map(convert_product).transpose()
    }

    #[instrument(skip(self, row), fields(columns = row.len()))]
    async fn insert_product(&self, row: ProductRecord) -> Result<Product, RemoteError> {
        let request = self
            .request(Method::POST, "rest/v1/products")
            .header("Prefer", "return=representation")
            .json(&row);
        let rows: Vec<ProductRow> = self.execute_json(request).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound("inserted product was not returned".to_string()))?;
        convert_product(row)
    }

    #[instrument(skip(self, row), fields(product_id = %id, columns = row.len()))]
    async fn update_product(&self, id: &ProductId, row: ProductRecord) -> Result<Product, RemoteError> {
        let request = self
            .request(Method::PATCH, "rest/v1/products")
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&row);
        let rows: Vec<ProductRow> = self.execute_json(request).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(format!("product {id}")))?;
        convert_product(row)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn delete_product(&self, id: &ProductId) -> Result<(), RemoteError> {
        let request = self
            .request(Method::DELETE, "rest/v1/products")
            .query(&[("id", format!("eq.{id}"))]);
        self.execute(request).await.map(|_| ())
    }

    // =========================================================================
    // Orders
    // =========================================================================

    #[instrument(skip(self))]
    async fn list_orders(&self, user_id: Option<UserId>) -> Result<Vec<Order>, RemoteError> {
        let mut query = vec![
            ("select", ORDER_SELECT.to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(user_id) = user_id {
            query.push(("user_id", format!("eq.{user_id}")));
        }

        let request = self.request(Method::GET, "rest/v1/orders").query(&query);
        let rows: Vec<OrderRow> = self.execute_json(request).await?;
        Ok(convert_orders(rows))
    }

    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RemoteError> {
        let request = self
            .request(Method::PATCH, "rest/v1/orders")
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&OrderStatusPatch { status });
        let rows: Vec<serde_json::Value> = self.execute_json(request).await?;
        // Zero rows back means the order is missing or hidden by row-level policies
        if rows.is_empty() {
            return Err(RemoteError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(items = request.items.len()))]
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderId, RemoteError> {
        let http = self
            .request(Method::POST, &format!("rest/v1/rpc/{PLACE_ORDER_PROCEDURE}"))
            .json(&PlaceOrderArgs::from(request));
        let id: i64 = self.call_procedure(http).await?;
        Ok(OrderId::new(id))
    }

    // =========================================================================
    // Schema and storage
    // =========================================================================

    #[instrument(skip(self))]
    async fn table_columns(&self, table: &str) -> Result<Vec<String>, RemoteError> {
        let request = self
            .request(Method::POST, &format!("rest/v1/rpc/{TABLE_COLUMNS_PROCEDURE}"))
            .json(&TableColumnsArgs { p_table_name: table });
        self.call_procedure(request).await
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_file(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, RemoteError> {
        let request = self
            .request(Method::POST, &format!("storage/v1/object/{}", object_path(bucket, name)))
            .header("Content-Type", content_type)
            .body(bytes);
        let response: UploadResponse = self.execute_json(request).await?;
        debug!(key = %response.key, "Uploaded file");
        Ok(name.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.url(&format!("storage/v1/object/public/{}", object_path(bucket, path)))
    }
}
