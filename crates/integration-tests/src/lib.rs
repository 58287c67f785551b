//! Integration test support for Bazaar.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory flows
//! cargo test -p bazaar-integration-tests
//!
//! # Against a live backend (reads BAZAAR_REMOTE_URL / BAZAAR_ANON_KEY)
//! cargo test -p bazaar-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `checkout` - Cart to order, stock rejection, preconditions
//! - `admin_products` - Schema-aware product writes
//! - `admin_orders` - Status updates on the order board
//! - `session` - Sign-in, restore, sign-out
//! - `views` - Fetch cancellation
//! - `live` - Read-only calls against a real backend

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bazaar_core::{
    Email, OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId,
};
use bazaar_storefront::Storefront;
use bazaar_storefront::config::{SchemaPolicy, StorefrontConfig};
use bazaar_storefront::models::{AuthSession, AuthTokens, AuthUser, Order, OrderItem, Product};
use bazaar_storefront::remote::rows::{ProductRow, convert_product};
use bazaar_storefront::remote::{
    PlaceOrderRequest, ProductRecord, RemoteDataService, RemoteError,
};
use bazaar_storefront::storage::{LocalStorage, MemoryStorage};
use chrono::Utc;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// A call received by [`FakeRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SignIn(String),
    SignUp(String),
    RestoreSession,
    SignOut,
    FetchRole(UserId),
    ListProducts,
    GetProduct(ProductId),
    InsertProduct(ProductRecord),
    UpdateProduct(ProductId, ProductRecord),
    DeleteProduct(ProductId),
    ListOrders(Option<UserId>),
    UpdateOrderStatus(OrderId, OrderStatus),
    PlaceOrder(PlaceOrderRequest),
    TableColumns(String),
    UploadFile { bucket: String, name: String },
}

struct Account {
    user: AuthUser,
    password: String,
    role: Option<String>,
}

#[derive(Default)]
struct FakeState {
    accounts: Vec<Account>,
    refresh_tokens: HashMap<String, UserId>,
    products: Vec<Product>,
    orders: Vec<Order>,
    columns: Option<Vec<String>>,
    files: HashMap<String, Vec<u8>>,
    calls: Vec<Call>,
    next_order_id: i64,
    next_item_id: i64,
    next_product_id: i64,
    fail_next: Option<RemoteError>,
    latency: HashMap<ProductId, Duration>,
    order_latency: Option<Duration>,
    fail_role_lookup: bool,
    confirm_sign_ups: bool,
}

/// In-memory Remote Data Service.
///
/// Orders go through an all-or-nothing `place_order` that checks and
/// decrements stock under one lock, like the backend procedure. Every call
/// is recorded so tests can assert which calls were (not) made.
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    /// An empty backend whose `products` table has every mapped column.
    #[must_use]
    pub fn new() -> Self {
        let columns = ["id", "name", "description", "price", "image_url", "stock", "category", "created_at"]
            .map(String::from)
            .to_vec();
        Self {
            state: Mutex::new(FakeState {
                columns: Some(columns),
                next_order_id: 1,
                next_item_id: 1,
                next_product_id: 1000,
                ..FakeState::default()
            }),
        }
    }

    /// Register an account; returns its ID.
    pub fn add_account(&self, email: &str, password: &str, role: Option<&str>) -> UserId {
        let id = UserId::new(Uuid::new_v4());
        let email = Email::parse(email).expect("test email must be valid");
        self.state.lock().accounts.push(Account {
            user: AuthUser { id, email },
            password: password.to_string(),
            role: role.map(String::from),
        });
        id
    }

    /// Add a product row.
    pub fn add_product(&self, product: Product) {
        self.state.lock().products.insert(0, product);
    }

    /// Current row of a product.
    #[must_use]
    pub fn product(&self, id: &ProductId) -> Option<Product> {
        self.state.lock().products.iter().find(|p| &p.id == id).cloned()
    }

    /// Change a product's price.
    pub fn set_price(&self, id: &ProductId, price: Price) {
        if let Some(product) = self.state.lock().products.iter_mut().find(|p| &p.id == id) {
            product.price = price;
        }
    }

    /// Every stored order, newest first.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().orders.clone()
    }

    /// Replace the `products` column set; `None` makes the lookup fail.
    pub fn set_columns(&self, columns: Option<&[&str]>) {
        self.state.lock().columns = columns.map(|c| c.iter().map(|s| (*s).to_string()).collect());
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Delay `get_product` for one product.
    pub fn set_latency(&self, id: &ProductId, delay: Duration) {
        self.state.lock().latency.insert(id.clone(), delay);
    }

    /// Delay `place_order` before it runs.
    pub fn set_order_latency(&self, delay: Duration) {
        self.state.lock().order_latency = Some(delay);
    }

    /// Make role lookups fail.
    pub fn fail_role_lookup(&self, fail: bool) {
        self.state.lock().fail_role_lookup = fail;
    }

    /// Make sign-ups wait for email confirmation.
    pub fn require_confirmation(&self, required: bool) {
        self.state.lock().confirm_sign_ups = required;
    }

    /// Whether a file was uploaded under `bucket/name`.
    #[must_use]
    pub fn has_file(&self, bucket: &str, name: &str) -> bool {
        self.state.lock().files.contains_key(&format!("{bucket}/{name}"))
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Calls matching `pred`.
    #[must_use]
    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state.fail_next.take().map_or(Ok(()), Err)
    }

    fn issue_session(state: &mut FakeState, user: AuthUser) -> AuthSession {
        let refresh = format!("refresh-{}", Uuid::new_v4());
        state.refresh_tokens.insert(refresh.clone(), user.id);
        AuthSession {
            user,
            tokens: AuthTokens {
                access_token: SecretString::from(format!("access-{}", Uuid::new_v4())),
                refresh_token: SecretString::from(refresh),
            },
        }
    }
}

fn product_row(product: &Product) -> Map<String, Value> {
    let value = json!({
        "id": product.id.as_str(),
        "name": product.name,
        "description": product.description,
        "price": product.price.amount().to_string(),
        "image_url": product.image_url,
        "stock": product.stock,
        "category": product.category,
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn product_from_row(row: Map<String, Value>) -> Result<Product, RemoteError> {
    let row: ProductRow = serde_json::from_value(Value::Object(row))?;
    convert_product(row)
}

#[async_trait]
impl RemoteDataService for FakeRemote {
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthSession, RemoteError> {
        self.record(Call::SignIn(email.to_string()))?;
        let mut state = self.state.lock();
        let user = state
            .accounts
            .iter()
            .find(|a| a.user.email.as_str() == email && a.password == password.expose_secret())
            .map(|a| a.user.clone())
            .ok_or_else(|| RemoteError::Unauthorized("Invalid login credentials".to_string()))?;
        Ok(Self::issue_session(&mut state, user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Option<AuthSession>, RemoteError> {
        self.record(Call::SignUp(email.to_string()))?;
        let mut state = self.state.lock();
        if state.accounts.iter().any(|a| a.user.email.as_str() == email) {
            return Err(RemoteError::Api {
                status: 422,
                code: Some("user_already_exists".to_string()),
                message: "User already registered".to_string(),
            });
        }
        let email = Email::parse(email).map_err(|e| RemoteError::InvalidRow(e.to_string()))?;
        let user = AuthUser {
            id: UserId::new(Uuid::new_v4()),
            email,
        };
        state.accounts.push(Account {
            user: user.clone(),
            password: password.expose_secret().to_string(),
            role: Some("user".to_string()),
        });
        if state.confirm_sign_ups {
            return Ok(None);
        }
        Ok(Some(Self::issue_session(&mut state, user)))
    }

    async fn restore_session(&self, tokens: &AuthTokens) -> Result<AuthSession, RemoteError> {
        self.record(Call::RestoreSession)?;
        let mut state = self.state.lock();
        let user_id = state
            .refresh_tokens
            .remove(tokens.refresh_token.expose_secret())
            .ok_or_else(|| RemoteError::Unauthorized("Invalid Refresh Token".to_string()))?;
        let user = state
            .accounts
            .iter()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| RemoteError::Unauthorized("User not found".to_string()))?;
        Ok(Self::issue_session(&mut state, user))
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.record(Call::SignOut)
    }

    async fn fetch_role(&self, user_id: UserId) -> Result<Option<String>, RemoteError> {
        self.record(Call::FetchRole(user_id))?;
        let state = self.state.lock();
        if state.fail_role_lookup {
            return Err(RemoteError::Api {
                status: 500,
                code: None,
                message: "role lookup unavailable".to_string(),
            });
        }
        Ok(state
            .accounts
            .iter()
            .find(|a| a.user.id == user_id)
            .and_then(|a| a.role.clone()))
    }

    async fn list_products(&self) -> Result<Vec<Product>, RemoteError> {
        self.record(Call::ListProducts)?;
        Ok(self.state.lock().products.clone())
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, RemoteError> {
        self.record(Call::GetProduct(id.clone()))?;
        let delay = self.state.lock().latency.get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.product(id))
    }

    async fn insert_product(&self, row: ProductRecord) -> Result<Product, RemoteError> {
        self.record(Call::InsertProduct(row.clone()))?;
        let mut state = self.state.lock();
        let mut row = row.into_inner();
        if !row.contains_key("id") {
            state.next_product_id += 1;
            row.insert("id".to_string(), json!(state.next_product_id));
        }
        let product = product_from_row(row)?;
        state.products.insert(0, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: &ProductId, row: ProductRecord) -> Result<Product, RemoteError> {
        self.record(Call::UpdateProduct(id.clone(), row.clone()))?;
        let mut state = self.state.lock();
        let existing = state
            .products
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| RemoteError::NotFound(format!("product {id}")))?;
        let mut merged = product_row(existing);
        merged.extend(row.into_inner());
        let updated = product_from_row(merged)?;
        *existing = updated.clone();
        Ok(updated)
    }

    async fn delete_product(&self, id: &ProductId) -> Result<(), RemoteError> {
        self.record(Call::DeleteProduct(id.clone()))?;
        self.state.lock().products.retain(|p| &p.id != id);
        Ok(())
    }

    async fn list_orders(&self, user_id: Option<UserId>) -> Result<Vec<Order>, RemoteError> {
        self.record(Call::ListOrders(user_id))?;
        Ok(self
            .state
            .lock()
            .orders
            .iter()
            .filter(|o| user_id.is_none_or(|id| o.user_id == id))
            .cloned()
            .collect())
    }

    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> Result<(), RemoteError> {
        self.record(Call::UpdateOrderStatus(id, status))?;
        let mut state = self.state.lock();
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| RemoteError::NotFound(format!("order {id}")))?;
        order.status = status;
        Ok(())
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderId, RemoteError> {
        self.record(Call::PlaceOrder(request.clone()))?;
        let delay = self.state.lock().order_latency;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();

        // Check every line before touching anything.
        for item in &request.items {
            let product = state
                .products
                .iter()
                .find(|p| p.id == item.product_id)
                .ok_or_else(|| RemoteError::Api {
                    status: 400,
                    code: Some("P0001".to_string()),
                    message: format!("Product {} not found", item.product_id),
                })?;
            if !product.has_stock_for(item.quantity) {
                return Err(RemoteError::Api {
                    status: 400,
                    code: Some("P0001".to_string()),
                    message: format!("Insufficient stock for product {}", product.name),
                });
            }
        }

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let item_id = state.next_item_id;
            state.next_item_id += 1;
            if let Some(product) = state.products.iter_mut().find(|p| p.id == line.product_id) {
                product.stock -= line.quantity;
                items.push(OrderItem {
                    id: OrderItemId::new(item_id),
                    product: product.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                });
            }
        }

        let id = OrderId::new(state.next_order_id);
        state.next_order_id += 1;
        state.orders.insert(
            0,
            Order {
                id,
                user_id: request.buyer_id,
                user_email: request.buyer_email.clone(),
                items,
                total: request.total(),
                status: OrderStatus::Pending,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>, RemoteError> {
        self.record(Call::TableColumns(table.to_string()))?;
        self.state.lock().columns.clone().ok_or_else(|| RemoteError::Api {
            status: 404,
            code: Some("PGRST202".to_string()),
            message: "Could not find the function public.get_table_columns".to_string(),
        })
    }

    async fn upload_file(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, RemoteError> {
        self.record(Call::UploadFile {
            bucket: bucket.to_string(),
            name: name.to_string(),
        })?;
        self.state.lock().files.insert(format!("{bucket}/{name}"), bytes);
        Ok(name.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://fake.invalid/storage/v1/object/public/{bucket}/{path}")
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A catalog product.
#[must_use]
pub fn product(id: &str, name: &str, price: u32, stock: u32) -> Product {
    Product {
        id: ProductId::from(id),
        name: name.to_string(),
        description: format!("{name} description"),
        price: Price::from_units(price),
        image_url: format!("https://cdn.example.com/{id}.png"),
        stock,
        category: "bikes".to_string(),
    }
}

/// Configuration pointing at nothing, with the given schema policy.
#[must_use]
pub fn test_config(policy: SchemaPolicy) -> StorefrontConfig {
    let url = url::Url::parse("https://fake.invalid/").expect("static URL must parse");
    let mut config = StorefrontConfig::new(
        url,
        SecretString::from("test-anon-key".to_string()),
        PathBuf::from("unused"),
    );
    config.schema_policy = policy;
    config
}

/// A storefront wired to `remote` and in-memory storage.
#[must_use]
pub fn storefront(remote: &Arc<FakeRemote>, storage: &Arc<MemoryStorage>) -> Storefront {
    storefront_with(remote, storage, SchemaPolicy::Lenient)
}

/// Same as [`storefront`] with an explicit schema policy.
#[must_use]
pub fn storefront_with(
    remote: &Arc<FakeRemote>,
    storage: &Arc<MemoryStorage>,
    policy: SchemaPolicy,
) -> Storefront {
    let remote: Arc<dyn RemoteDataService> = remote.clone();
    let storage: Arc<dyn LocalStorage> = storage.clone();
    Storefront::new(test_config(policy), remote, storage)
}
