//! Client-side cart.
//!
//! The cart is a list of `(product, quantity)` entries owned by this
//! process. It survives restarts through a JSON snapshot in local storage
//! under [`keys::CART`](crate::models::session::keys::CART) and is never
//! cleared by sign-out; only a successful order clears it.

mod store;

pub use store::{CartItem, CartStore};
