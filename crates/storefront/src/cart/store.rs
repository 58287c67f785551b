//! Cart state and persistence.

use std::sync::Arc;

use bazaar_core::{Price, ProductId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::Product;
use crate::models::session::keys;
use crate::storage::{LocalStorage, StorageError};

/// One cart entry. `quantity` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: Product,
    pub quantity: u32,
}

impl CartItem {
    /// Current product price × quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// The cart, mirrored to local storage after every mutation.
pub struct CartStore {
    items: Vec<CartItem>,
    storage: Arc<dyn LocalStorage>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Load the cart snapshot from storage.
    ///
    /// A missing snapshot gives an empty cart. A snapshot that cannot be
    /// read or parsed is discarded and the cart starts empty.
    #[must_use]
    pub fn load(storage: Arc<dyn LocalStorage>) -> Self {
        let items = match storage.get(keys::CART) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<CartItem>>(&raw) {
                Ok(items) => items.into_iter().filter(|item| item.quantity > 0).collect(),
                Err(e) => {
                    warn!(error = %e, "Failed to parse stored cart, discarding it");
                    if let Err(e) = storage.remove(keys::CART) {
                        warn!(error = %e, "Failed to remove corrupted cart");
                    }
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read stored cart, starting empty");
                Vec::new()
            }
        };

        debug!(entries = items.len(), "Cart loaded");
        Self { items, storage }
    }

    /// Add `quantity` units of a product, merging with an existing entry
    /// for the same product. The entry takes the given product as its
    /// current version. Adding zero units does nothing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the snapshot cannot be written; the
    /// in-memory cart is updated regardless.
    pub fn add(&mut self, product: Product, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return Ok(());
        }

        if let Some(item) = self.items.iter_mut().find(|item| item.product.id == product.id) {
            item.quantity = item.quantity.saturating_add(quantity);
            item.product = product;
        } else {
            self.items.push(CartItem { product, quantity });
        }
        self.persist()
    }

    /// Replace the stored product of every entry that appears in `products`
    /// so totals follow the latest catalog prices.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the snapshot cannot be written.
    pub fn refresh(&mut self, products: &[Product]) -> Result<()> {
        let mut changed = false;
        for item in &mut self.items {
            if let Some(latest) = products.iter().find(|p| p.id == item.product.id)
                && *latest != item.product
            {
                item.product = latest.clone();
                changed = true;
            }
        }
        if changed { self.persist() } else { Ok(()) }
    }

    /// Replace an entry's quantity. A quantity of zero removes the entry.
    /// Unknown products are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the snapshot cannot be written.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: u32) -> Result<()> {
        for item in &mut self.items {
            if &item.product.id == product_id {
                item.quantity = quantity;
            }
        }
        self.items.retain(|item| item.quantity > 0);
        self.persist()
    }

    /// Remove a product's entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the snapshot cannot be written.
    pub fn remove(&mut self, product_id: &ProductId) -> Result<()> {
        self.items.retain(|item| &item.product.id != product_id);
        self.persist()
    }

    /// Take ordered units out of the cart. Each entry loses the ordered
    /// quantity of its product and is removed when none are left. Units
    /// added after the order was prepared stay in the cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the snapshot cannot be written.
    pub fn deduct<'a>(&mut self, ordered: impl IntoIterator<Item = (&'a ProductId, u32)>) -> Result<()> {
        for (product_id, quantity) in ordered {
            if let Some(item) = self.items.iter_mut().find(|item| &item.product.id == product_id) {
                item.quantity = item.quantity.saturating_sub(quantity);
            }
        }
        self.items.retain(|item| item.quantity > 0);
        self.persist()
    }

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the snapshot cannot be written.
    pub fn clear(&mut self) -> Result<()> {
        self.items.clear();
        self.persist()
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Quantity of one product, zero if absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .find(|item| &item.product.id == product_id)
            .map_or(0, |item| item.quantity)
    }

    /// Total number of units. Saturates at `u32::MAX`.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.items
            .iter()
            .fold(0_u32, |acc, item| acc.saturating_add(item.quantity))
    }

    /// Sum of current price × quantity.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Whether the cart has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let snapshot = serde_json::to_string(&self.items).map_err(StorageError::from)?;
        self.storage.set(keys::CART, &snapshot)?;
        Ok(())
    }
}
