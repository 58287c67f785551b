//! Integration tests for view fetch state and cancellation.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::ProductId;
use bazaar_integration_tests::{FakeRemote, product, storefront};
use bazaar_storefront::AppError;
use bazaar_storefront::services::ViewStatus;
use bazaar_storefront::storage::MemoryStorage;
use secrecy::SecretString;

#[tokio::test]
async fn test_only_latest_product_fetch_is_applied() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_product(product("slow", "Slow Bike", 100, 1));
    remote.add_product(product("fast", "Fast Bike", 200, 1));
    remote.set_latency(&ProductId::from("slow"), Duration::from_millis(200));
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    let first = {
        let sf = sf.clone();
        tokio::spawn(async move { sf.catalog().load_product(&ProductId::from("slow")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = sf.catalog().load_product(&ProductId::from("fast")).await.unwrap();
    let first = first.await.unwrap();

    assert_eq!(second.unwrap().name, "Fast Bike");
    assert!(matches!(first, Err(AppError::Cancelled)));

    // Wait past the slow fetch's delay; the view still shows B.
    tokio::time::sleep(Duration::from_millis(250)).await;
    match sf.catalog().product_detail().status() {
        ViewStatus::Loaded(Some(shown)) => assert_eq!(shown.id, ProductId::from("fast")),
        other => panic!("unexpected view state: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_product_loads_as_none() {
    let remote = Arc::new(FakeRemote::new());
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    let loaded = sf.catalog().load_product(&ProductId::from("ghost")).await.unwrap();

    assert!(loaded.is_none());
    assert_eq!(sf.catalog().product_detail().status(), ViewStatus::Loaded(None));
}

#[tokio::test]
async fn test_failed_fetch_shows_remote_message() {
    let remote = Arc::new(FakeRemote::new());
    remote.fail_next(bazaar_storefront::remote::RemoteError::Api {
        status: 503,
        code: None,
        message: "service unavailable".to_string(),
    });
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    assert!(sf.catalog().load_products().await.is_err());
    assert_eq!(
        sf.catalog().product_list().status(),
        ViewStatus::Failed("service unavailable".to_string())
    );
}

#[tokio::test]
async fn test_order_history_needs_sign_in() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_account("buyer@example.com", "pw", None);
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));

    let err = sf.catalog().load_my_orders().await.unwrap_err();
    assert!(matches!(err, AppError::NotSignedIn));

    sf.session()
        .sign_in("buyer@example.com", &SecretString::from("pw".to_string()))
        .await
        .unwrap();
    assert!(sf.catalog().load_my_orders().await.unwrap().is_empty());
}
