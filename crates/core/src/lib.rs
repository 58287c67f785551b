//! Bazaar Core - Shared domain types.
//!
//! This crate provides the types used by the storefront client and its tests:
//! - typed identifiers for users, products, orders
//! - decimal prices
//! - validated contact data (`Email`, `Phone`, `Address`)
//! - order status and account role enums
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no storage. This keeps it lightweight and usable anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers and enums for the storefront domain

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
