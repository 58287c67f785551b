//! Storefront services.
//!
//! # Services
//!
//! - `auth` - Signed-in identity, role lookup and session persistence
//! - `catalog` - Product and order reads, per-view fetch state
//! - `checkout` - Cart → order via the remote order procedure
//! - `products` - Admin product create / update / delete
//! - `orders` - Admin order status board

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod products;

pub use auth::SessionHolder;
pub use catalog::{Catalog, ViewState, ViewStatus};
pub use checkout::{AddressForm, CheckoutOrchestrator, OrderSummary};
pub use orders::OrderBoard;
pub use products::{ImageUpload, ProductDraft, ProductWriter};
