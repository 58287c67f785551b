//! Catalog products.

use bazaar_core::{Price, ProductId};
use serde::{Deserialize, Serialize};

/// A product as shown in the catalog and kept in the cart.
///
/// The cart snapshot stores whole products, so this type is also the
/// persisted format of cart entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub category: String,
}

impl Product {
    /// Whether at least `quantity` units are available.
    #[must_use]
    pub const fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}
