//! Authentication and identity types.

use bazaar_core::{Email, Role, UserId};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// A signed-in identity as seen by views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Auth service user ID.
    pub id: UserId,
    /// Sign-in email.
    pub email: Email,
    /// Role from the `users` table, `User` when unknown.
    pub role: Role,
}

impl Identity {
    /// Whether this identity may use the admin panel.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// The auth service's view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: Email,
}

/// Tokens for an authenticated session, persisted so the session can be
/// restored on the next start.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    #[serde(with = "secret_string")]
    pub access_token: SecretString,
    #[serde(with = "secret_string")]
    pub refresh_token: SecretString,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: AuthUser,
    pub tokens: AuthTokens,
}

/// Session key names in local storage.
pub mod keys {
    /// Key for the persisted auth tokens.
    pub const SESSION: &str = "session";

    /// Key for the cart snapshot.
    pub const CART: &str = "cart";
}

mod secret_string {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.expose_secret())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
        String::deserialize(deserializer).map(SecretString::from)
    }
}
