//! Domain models for the storefront client.
//!
//! These are the shapes views and services work with. Wire rows live in
//! [`crate::remote::rows`] and convert into these.

pub mod order;
pub mod product;
pub mod session;

pub use order::{Order, OrderItem};
pub use product::Product;
pub use session::{AuthSession, AuthTokens, AuthUser, Identity};
