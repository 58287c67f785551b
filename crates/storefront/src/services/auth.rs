//! Session and identity holder.
//!
//! Tracks who is signed in and their role. Views read the current identity
//! with [`SessionHolder::current`] or follow changes through
//! [`SessionHolder::subscribe`]. Tokens are persisted under
//! [`keys::SESSION`] so a restart can resume the session.

use std::sync::Arc;

use bazaar_core::{Email, Role, UserId};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{self, AppError, Result, ValidationError};
use crate::models::session::keys;
use crate::models::{AuthSession, AuthTokens, Identity};
use crate::remote::RemoteDataService;
use crate::storage::{LocalStorage, StorageError};

/// Holds the signed-in identity for the lifetime of the app.
pub struct SessionHolder {
    remote: Arc<dyn RemoteDataService>,
    storage: Arc<dyn LocalStorage>,
    identity: watch::Sender<Option<Identity>>,
}

impl std::fmt::Debug for SessionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHolder")
            .field("identity", &*self.identity.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionHolder {
    /// Create a signed-out holder.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteDataService>, storage: Arc<dyn LocalStorage>) -> Self {
        Self {
            remote,
            storage,
            identity: watch::Sender::new(None),
        }
    }

    /// The signed-in identity, if any.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    /// Receive every identity change from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    /// The signed-in identity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotSignedIn` when nobody is signed in.
    pub fn require_identity(&self) -> Result<Identity> {
        self.current().ok_or(AppError::NotSignedIn)
    }

    /// The signed-in identity, which must be an admin.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotSignedIn` when nobody is signed in and
    /// `AppError::PermissionDenied` for a non-admin identity.
    pub fn require_admin(&self) -> Result<Identity> {
        let identity = self.require_identity()?;
        if identity.is_admin() {
            Ok(identity)
        } else {
            Err(AppError::PermissionDenied(format!(
                "{} is not an admin",
                identity.email
            )))
        }
    }

    /// Resume the persisted session, if there is one.
    ///
    /// Stored tokens the service no longer accepts are discarded and the
    /// holder stays signed out. Never fails.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Option<Identity> {
        let tokens = match self.storage.get(keys::SESSION) {
            Ok(Some(raw)) => match serde_json::from_str::<AuthTokens>(&raw) {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(error = %e, "Stored session is unreadable, discarding it");
                    self.forget_tokens();
                    return None;
                }
            },
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                return None;
            }
        };

        match self.remote.restore_session(&tokens).await {
            Ok(session) => Some(self.establish(session).await),
            Err(e) => {
                info!(error = %e, "Stored session rejected, staying signed out");
                self.forget_tokens();
                None
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a malformed email or empty
    /// password (no remote call is made) and `AppError::Auth` with the
    /// service's message when the credentials are rejected.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Identity> {
        let email = validate_credentials(email, password)?;

        let session = self
            .remote
            .sign_in(email.as_str(), password)
            .await
            .map_err(AppError::from_auth)?;

        error::add_breadcrumb("auth", "Signed in", None);
        Ok(self.establish(session).await)
    }

    /// Create an account.
    ///
    /// Returns `None` when the service wants the email confirmed first; the
    /// holder stays signed out in that case.
    ///
    /// # Errors
    ///
    /// Same as [`SessionHolder::sign_in`].
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &SecretString) -> Result<Option<Identity>> {
        let email = validate_credentials(email, password)?;

        let session = self
            .remote
            .sign_up(email.as_str(), password)
            .await
            .map_err(AppError::from_auth)?;

        match session {
            Some(session) => Ok(Some(self.establish(session).await)),
            None => {
                info!("Sign-up awaiting email confirmation");
                Ok(None)
            }
        }
    }

    /// Sign out. The identity and stored tokens are cleared even when the
    /// service call fails; the cart is left alone.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        if let Err(e) = self.remote.sign_out().await {
            warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
        }
        self.forget_tokens();
        self.identity.send_replace(None);
        error::clear_sentry_user();
        info!("Signed out");
    }

    /// Role of an account; `User` when the lookup fails or finds no row.
    async fn resolve_role(&self, user_id: UserId) -> Role {
        match self.remote.fetch_role(user_id).await {
            Ok(role) => Role::from_column(role.as_deref()),
            Err(e) => {
                warn!(error = %e, %user_id, "Role lookup failed, defaulting to user");
                Role::User
            }
        }
    }

    /// Save the tokens, then publish the identity. A save failure only
    /// means the session will not survive a restart.
    async fn establish(&self, session: AuthSession) -> Identity {
        let role = self.resolve_role(session.user.id).await;
        let identity = Identity {
            id: session.user.id,
            email: session.user.email,
            role,
        };

        if let Err(e) = self.save_tokens(&session.tokens) {
            warn!(error = %e, user_id = %identity.id, "Failed to persist session tokens");
        }

        debug!(user_id = %identity.id, %role, "Session established");
        error::set_sentry_user(&identity.id, Some(identity.email.as_str()));
        self.identity.send_replace(Some(identity.clone()));
        identity
    }

    fn save_tokens(&self, tokens: &AuthTokens) -> std::result::Result<(), StorageError> {
        let raw = serde_json::to_string(tokens)?;
        self.storage.set(keys::SESSION, &raw)
    }

    fn forget_tokens(&self) {
        if let Err(e) = self.storage.remove(keys::SESSION) {
            warn!(error = %e, "Failed to remove stored session");
        }
    }
}

fn validate_credentials(email: &str, password: &SecretString) -> Result<Email> {
    let email = Email::parse(email)?;
    if password.expose_secret().is_empty() {
        return Err(ValidationError::EmptyPassword.into());
    }
    Ok(email)
}
