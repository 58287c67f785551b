//! Integration tests for the session holder.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use bazaar_core::{ProductId, Role};
use bazaar_integration_tests::{Call, FakeRemote, product, storefront};
use bazaar_storefront::AppError;
use bazaar_storefront::models::session::keys;
use bazaar_storefront::services::SessionHolder;
use bazaar_storefront::storage::{LocalStorage, MemoryStorage, StorageError};
use secrecy::SecretString;

fn password() -> SecretString {
    SecretString::from("s3cret-pass".to_string())
}

#[tokio::test]
async fn test_sign_in_resolves_role_and_notifies() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_account("admin@example.com", "s3cret-pass", Some("admin"));
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));
    let mut changes = sf.session().subscribe();

    let identity = sf.session().sign_in("admin@example.com", &password()).await.unwrap();

    assert_eq!(identity.role, Role::Admin);
    assert!(changes.has_changed().unwrap());
    assert_eq!(changes.borrow_and_update().as_ref(), Some(&identity));
    assert!(sf.session().require_admin().is_ok());
}

/// Storage whose writes always fail.
struct ReadOnlyStorage;

impl LocalStorage for ReadOnlyStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Io {
            path: format!("/readonly/{key}.json").into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        })
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_sign_in_succeeds_when_tokens_cannot_be_saved() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_account("buyer@example.com", "s3cret-pass", Some("user"));
    let session = SessionHolder::new(remote.clone(), Arc::new(ReadOnlyStorage));

    let identity = session.sign_in("buyer@example.com", &password()).await.unwrap();

    assert_eq!(session.current().as_ref(), Some(&identity));
    assert!(session.require_identity().is_ok());
}

#[tokio::test]
async fn test_role_defaults_to_user() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_account("nobody@example.com", "s3cret-pass", None);
    remote.add_account("flaky@example.com", "s3cret-pass", Some("admin"));
    remote.fail_role_lookup(true);
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    let missing = sf.session().sign_in("nobody@example.com", &password()).await.unwrap();
    assert_eq!(missing.role, Role::User);

    let failed = sf.session().sign_in("flaky@example.com", &password()).await.unwrap();
    assert_eq!(failed.role, Role::User);
    assert!(matches!(
        sf.session().require_admin(),
        Err(AppError::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn test_bad_credentials_message_is_verbatim() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_account("buyer@example.com", "s3cret-pass", None);
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    let err = sf
        .session()
        .sign_in("buyer@example.com", &SecretString::from("wrong".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Auth(_)));
    assert_eq!(err.user_message(), "Invalid login credentials");
    assert!(sf.session().current().is_none());
}

#[tokio::test]
async fn test_malformed_email_makes_no_remote_call() {
    let remote = Arc::new(FakeRemote::new());
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    let err = sf.session().sign_in("not-an-email", &password()).await.unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_session_restored_on_next_start() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_account("buyer@example.com", "s3cret-pass", None);
    let storage = Arc::new(MemoryStorage::new());

    let first = storefront(&remote, &storage);
    let identity = first.session().sign_in("buyer@example.com", &password()).await.unwrap();
    assert!(storage.get(keys::SESSION).unwrap().is_some());

    let second = storefront(&remote, &storage);
    let restored = second.session().restore().await.unwrap();
    assert_eq!(restored.id, identity.id);
    assert_eq!(second.session().current(), Some(restored));
}

#[tokio::test]
async fn test_rejected_tokens_are_discarded() {
    let remote = Arc::new(FakeRemote::new());
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set(keys::SESSION, r#"{"access_token":"a","refresh_token":"stale"}"#)
        .unwrap();

    let sf = storefront(&remote, &storage);
    assert!(sf.session().restore().await.is_none());
    assert_eq!(storage.get(keys::SESSION).unwrap(), None);
    assert_eq!(remote.calls(), vec![Call::RestoreSession]);
}

#[tokio::test]
async fn test_sign_out_keeps_cart() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_product(product("bike", "Trail Bike", 100, 5));
    remote.add_account("buyer@example.com", "s3cret-pass", None);
    let storage = Arc::new(MemoryStorage::new());
    let sf = storefront(&remote, &storage);
    sf.session().sign_in("buyer@example.com", &password()).await.unwrap();
    sf.add_to_cart(remote.product(&ProductId::from("bike")).unwrap(), 3).await.unwrap();

    sf.session().sign_out().await;

    assert!(sf.session().current().is_none());
    assert_eq!(storage.get(keys::SESSION).unwrap(), None);
    assert_eq!(sf.cart().lock().await.count(), 3);
    assert!(storage.get(keys::CART).unwrap().is_some());
}

#[tokio::test]
async fn test_sign_up_awaiting_confirmation_stays_signed_out() {
    let remote = Arc::new(FakeRemote::new());
    remote.require_confirmation(true);
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    let identity = sf.session().sign_up("new@example.com", &password()).await.unwrap();

    assert!(identity.is_none());
    assert!(sf.session().current().is_none());
}

#[tokio::test]
async fn test_sign_up_signs_in() {
    let remote = Arc::new(FakeRemote::new());
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    let identity = sf.session().sign_up("new@example.com", &password()).await.unwrap().unwrap();

    assert_eq!(identity.role, Role::User);
    assert_eq!(sf.session().current(), Some(identity));
}
