//! Wire rows for the Remote Data Service and their conversions.
//!
//! Rows use the backend's snake_case column names. Conversions into domain
//! models live here so that services never see raw rows.

use bazaar_core::{
    Address, Email, OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::RemoteError;
use crate::models::{AuthUser, Order, OrderItem, Product};

// =============================================================================
// Products
// =============================================================================

/// A `products` row as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRow {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Convert a product row into the catalog model.
///
/// # Errors
///
/// Returns `RemoteError::InvalidRow` for a negative price or stock.
pub fn convert_product(row: ProductRow) -> Result<Product, RemoteError> {
    let price = Price::new(row.price)
        .map_err(|e| RemoteError::InvalidRow(format!("product {}: {e}", row.id)))?;
    let stock = u32::try_from(row.stock.unwrap_or(0))
        .map_err(|_| RemoteError::InvalidRow(format!("product {}: stock out of range", row.id)))?;

    Ok(Product {
        id: row.id,
        name: row.name,
        description: row.description.unwrap_or_default(),
        price,
        image_url: row.image_url.unwrap_or_default(),
        stock,
        category: row.category.unwrap_or_default(),
    })
}

/// Convert a list of product rows, skipping rows the domain rejects.
pub fn convert_products(rows: Vec<ProductRow>) -> Vec<Product> {
    rows.into_iter()
        .filter_map(|row| match convert_product(row) {
            Ok(product) => Some(product),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable product row");
                None
            }
        })
        .collect()
}

/// Column → value pairs for a product insert or update.
///
/// Built by the product write path from [`ProductColumns`] and then
/// narrowed to the columns that exist in the live table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProductRecord(Map<String, Value>);

impl ProductRecord {
    /// Set a column.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }

    /// Whether a column is present.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Value of a column, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Present column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no columns are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The underlying JSON object.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Every writable product column with a typed value.
///
/// Serialized into a [`ProductRecord`]; the price goes out as a JSON number
/// because the backend column is numeric.
#[derive(Debug, Clone, Serialize)]
pub struct ProductColumns<'a> {
    pub name: &'a str,
    pub description: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image_url: &'a str,
    pub stock: u32,
    pub category: &'a str,
}

impl ProductColumns<'_> {
    /// Serialize into column → value pairs.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Parse` if serialization fails.
    pub fn to_record(&self) -> Result<ProductRecord, RemoteError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(ProductRecord(map)),
            other => Err(RemoteError::InvalidRow(format!(
                "product columns serialized to {other}"
            ))),
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// An `orders` row joined with `order_items(*, products(*))`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: Uuid,
    pub user_email: String,
    pub total: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub order_items: Vec<OrderItemRow>,
}

/// An `order_items` row joined with its product.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRow {
    pub id: i64,
    pub quantity: i64,
    pub price: Decimal,
    #[serde(default)]
    pub products: Option<ProductRow>,
}

/// Convert an order row with its joined items.
///
/// Items whose product has been deleted (or is hidden) are skipped with a
/// warning; the stored total is kept as-is.
///
/// # Errors
///
/// Returns `RemoteError::InvalidRow` for an unknown status, malformed email,
/// negative amount, or an out-of-range quantity.
pub fn convert_order(row: OrderRow) -> Result<Order, RemoteError> {
    let invalid = |what: String| RemoteError::InvalidRow(format!("order {}: {what}", row.id));

    let status = row.status.parse::<OrderStatus>().map_err(invalid)?;
    let user_email = Email::parse(&row.user_email).map_err(|e| invalid(e.to_string()))?;
    let total = Price::new(row.total).map_err(|e| invalid(e.to_string()))?;

    let mut items = Vec::with_capacity(row.order_items.len());
    for item in row.order_items {
        let Some(product_row) = item.products else {
            tracing::warn!(order_id = row.id, item_id = item.id, "Order item has no product");
            continue;
        };
        let quantity =
            u32::try_from(item.quantity).map_err(|_| invalid(format!("item {} quantity", item.id)))?;
        let unit_price = Price::new(item.price).map_err(|e| invalid(e.to_string()))?;
        items.push(OrderItem {
            id: OrderItemId::new(item.id),
            product: convert_product(product_row)?,
            quantity,
            unit_price,
        });
    }

    Ok(Order {
        id: OrderId::new(row.id),
        user_id: UserId::new(row.user_id),
        user_email,
        items,
        total,
        status,
        created_at: row.created_at,
    })
}

/// Convert a list of order rows, skipping rows the domain rejects.
pub fn convert_orders(rows: Vec<OrderRow>) -> Vec<Order> {
    rows.into_iter()
        .filter_map(|row| match convert_order(row) {
            Ok(order) => Some(order),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable order row");
                None
            }
        })
        .collect()
}

/// Body of a status update.
#[derive(Debug, Serialize)]
pub struct OrderStatusPatch {
    pub status: OrderStatus,
}

// =============================================================================
// Order placement
// =============================================================================

/// Input for the atomic order procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    pub buyer_id: UserId,
    pub buyer_email: Email,
    pub address: Address,
    pub items: Vec<PlaceOrderItem>,
}

impl PlaceOrderRequest {
    /// Sum of `unit_price × quantity` over all items.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(|item| item.unit_price.times(item.quantity)).sum()
    }
}

/// One cart line as sent to the order procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(rename = "price", serialize_with = "price_as_float")]
    pub unit_price: Price,
}

fn price_as_float<S: serde::Serializer>(price: &Price, serializer: S) -> Result<S::Ok, S::Error> {
    rust_decimal::serde::float::serialize(&price.amount(), serializer)
}

/// Named arguments of `handle_place_order`.
#[derive(Debug, Serialize)]
pub struct PlaceOrderArgs<'a> {
    pub p_user_id: UserId,
    pub p_user_email: &'a str,
    pub p_full_name: &'a str,
    pub p_phone: &'a str,
    pub p_address_line1: &'a str,
    pub p_address_line2: Option<&'a str>,
    pub p_city: &'a str,
    pub p_state: &'a str,
    pub p_postal_code: &'a str,
    pub p_country: &'a str,
    pub p_address_type: String,
    pub p_items: &'a [PlaceOrderItem],
}

impl<'a> From<&'a PlaceOrderRequest> for PlaceOrderArgs<'a> {
    fn from(request: &'a PlaceOrderRequest) -> Self {
        let address = &request.address;
        Self {
            p_user_id: request.buyer_id,
            p_user_email: request.buyer_email.as_str(),
            p_full_name: &address.full_name,
            p_phone: address.phone.as_str(),
            p_address_line1: &address.address_line1,
            p_address_line2: address.address_line2.as_deref(),
            p_city: &address.city,
            p_state: &address.state,
            p_postal_code: &address.postal_code,
            p_country: &address.country,
            p_address_type: address.address_type.to_string(),
            p_items: &request.items,
        }
    }
}

/// Arguments of `get_table_columns`.
#[derive(Debug, Serialize)]
pub struct TableColumnsArgs<'a> {
    pub p_table_name: &'a str,
}

// =============================================================================
// Auth and misc
// =============================================================================

/// Auth service user object.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRow {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Convert an auth user object.
///
/// # Errors
///
/// Returns `RemoteError::InvalidRow` if the account has no usable email.
pub fn convert_user(row: UserRow) -> Result<AuthUser, RemoteError> {
    let email = row
        .email
        .as_deref()
        .ok_or_else(|| RemoteError::InvalidRow(format!("user {} has no email", row.id)))
        .and_then(|e| {
            Email::parse(e).map_err(|err| RemoteError::InvalidRow(format!("user {}: {err}", row.id)))
        })?;
    Ok(AuthUser {
        id: UserId::new(row.id),
        email,
    })
}

/// Token grant / sign-up response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserRow>,
}

/// `users` role lookup row.
#[derive(Debug, Deserialize)]
pub struct RoleRow {
    #[serde(default)]
    pub role: Option<String>,
}

/// Storage upload response.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "Key")]
    pub key: String,
}

/// Error body used by the REST, auth and storage endpoints. Each endpoint
/// fills a different subset of these fields.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub error_code: Option<String>,
}

impl ErrorEnvelope {
    /// Most specific message present.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }

    /// Error code as text.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        self.error_code.clone().or_else(|| {
            self.code.as_ref().map(|code| match code {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
    }
}
