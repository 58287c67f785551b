//! Read-only checks against a live backend.
//!
//! Requires `BAZAAR_REMOTE_URL` and `BAZAAR_ANON_KEY` (or a `.env` file).

#![allow(clippy::unwrap_used)]

use bazaar_storefront::Storefront;
use bazaar_storefront::config::StorefrontConfig;

async fn connect() -> Storefront {
    let mut config = StorefrontConfig::from_env().unwrap();
    config.data_dir = tempfile::tempdir().unwrap().keep();
    Storefront::connect(config).await.unwrap()
}

#[tokio::test]
#[ignore = "Requires a live backend (BAZAAR_REMOTE_URL, BAZAAR_ANON_KEY)"]
async fn test_live_product_list() {
    let sf = connect().await;
    let products = sf.catalog().products().await.unwrap();
    for product in &products {
        assert!(!product.name.is_empty());
    }
}

#[tokio::test]
#[ignore = "Requires a live backend (BAZAAR_REMOTE_URL, BAZAAR_ANON_KEY)"]
async fn test_live_products_columns() {
    let sf = connect().await;
    let columns = sf.products().live_columns().await;
    assert!(columns.contains("name"));
    assert!(columns.contains("price"));
}
