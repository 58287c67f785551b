//! Unified error handling with Sentry integration.
//!
//! Every service returns `Result<T, AppError>`. Views show
//! [`AppError::user_message`] and call [`AppError::report`] so that
//! service-side failures reach Sentry; nothing here is fatal to the process.

use bazaar_core::{AddressError, EmailError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::storage::StorageError;

/// Message shown when row-level policies reject an operation.
pub const PERMISSION_DENIED_MESSAGE: &str = "You do not have permission to perform this action.";

/// Fragments of backend messages that indicate a policy rejection.
const PERMISSION_PATTERNS: &[&str] = &[
    "permission denied",
    "row-level security",
    "violates row-level",
    "not authorized",
];

/// Validation failures caught before any remote call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Shipping address form is incomplete or malformed.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Sign-in / sign-up email is malformed.
    #[error(transparent)]
    Email(#[from] EmailError),

    /// Product form is malformed.
    #[error(transparent)]
    Product(#[from] ProductError),

    /// Password field left empty.
    #[error("password is required")]
    EmptyPassword,
}

/// Product form validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProductError {
    /// Product name is blank.
    #[error("product name is required")]
    EmptyName,

    /// Price below zero.
    #[error("price cannot be negative")]
    NegativePrice,

    /// Stock below zero or too large.
    #[error("stock must be a whole number between 0 and {max}", max = u32::MAX)]
    InvalidStock,

    /// Uploaded image has no file name.
    #[error("image file name is required")]
    EmptyImageName,
}

/// Application-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Sign-in / sign-up / session failure, message from the auth service.
    #[error("{0}")]
    Auth(String),

    /// Row-level access denied by the service.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The action needs a signed-in identity.
    #[error("You must be signed in to do that.")]
    NotSignedIn,

    /// The requested row does not exist or is hidden.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before contacting the service.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Checkout started with nothing in the cart.
    #[error("Your cart is empty.")]
    EmptyCart,

    /// A newer fetch superseded this one or the view went away.
    #[error("Request cancelled")]
    Cancelled,

    /// A product field has no column in the live table (strict schema policy).
    #[error("Column '{column}' for field '{field}' not found in 'products' table")]
    Schema {
        field: &'static str,
        column: &'static str,
    },

    /// Any other remote failure; the message is the service's own.
    #[error(transparent)]
    Remote(RemoteError),

    /// Local storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration failure.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        Self::from_remote(err)
    }
}

impl From<AddressError> for AppError {
    fn from(err: AddressError) -> Self {
        Self::Validation(err.into())
    }
}

impl From<ProductError> for AppError {
    fn from(err: ProductError) -> Self {
        Self::Validation(err.into())
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.into())
    }
}

impl AppError {
    /// Classify a remote failure.
    ///
    /// Policy rejections are recognised by message content, missing rows
    /// become `NotFound`, everything else keeps the remote message.
    #[must_use]
    pub fn from_remote(err: RemoteError) -> Self {
        if err.is_not_found() {
            return Self::NotFound(err.message());
        }
        let message = err.message();
        if is_permission_message(&message) {
            return Self::PermissionDenied(message);
        }
        Self::Remote(err)
    }

    /// Classify a failure from a sign-in, sign-up or session call.
    #[must_use]
    pub fn from_auth(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized(message) | RemoteError::Api { message, .. } => {
                Self::Auth(message)
            }
            other => Self::from_remote(other),
        }
    }

    /// Whether this error must never be shown to the user.
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The text the initiating view displays.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied(_) => PERMISSION_DENIED_MESSAGE.to_string(),
            Self::Remote(err) => err.message(),
            Self::Storage(_) | Self::Config(_) => {
                "Something went wrong on this device. Please try again.".to_string()
            }
            Self::Cancelled => String::new(),
            _ => self.to_string(),
        }
    }

    /// Send service-side failures to Sentry and the log.
    ///
    /// Validation, auth, not-found and cancellation are expected outcomes
    /// and are not captured.
    pub fn report(&self) {
        if matches!(self, Self::Remote(_) | Self::Storage(_) | Self::Schema { .. }) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront operation failed"
            );
        }
    }
}

fn is_permission_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    PERMISSION_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a signed-in identity.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
