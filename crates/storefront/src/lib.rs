//! Bazaar storefront client library.
//!
//! Typed client for a small single-vendor shop: catalog browsing, a
//! persisted cart, checkout through the backend's order procedure, and the
//! admin product and order tools. Everything durable lives in the Remote
//! Data Service; this crate holds the client-side state around it.
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_storefront::{Storefront, config::StorefrontConfig, telemetry};
//!
//! let config = StorefrontConfig::from_env()?;
//! let _guard = telemetry::init(&config);
//! let storefront = Storefront::connect(config).await?;
//! let products = storefront.catalog().load_products().await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod storage;
pub mod telemetry;

pub use error::{AppError, Result};
pub use state::Storefront;
