//! Integration tests for the schema-aware admin product write path.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use bazaar_core::{Price, ProductId};
use bazaar_integration_tests::{Call, FakeRemote, product, storefront, storefront_with};
use bazaar_storefront::AppError;
use bazaar_storefront::config::SchemaPolicy;
use bazaar_storefront::remote::ProductRecord;
use bazaar_storefront::services::{ImageUpload, ProductDraft};
use bazaar_storefront::storage::MemoryStorage;
use bazaar_storefront::Storefront;
use rust_decimal::Decimal;
use secrecy::SecretString;

const ALL_BUT_CATEGORY: &[&str] = &["id", "name", "description", "price", "image_url", "stock", "created_at"];

fn draft() -> ProductDraft {
    ProductDraft {
        name: "Gravel Bike".to_string(),
        description: "Drop bars, wide tyres".to_string(),
        price: Decimal::new(1200, 0),
        image_url: "https://cdn.example.com/gravel.png".to_string(),
        stock: 4,
        category: "bikes".to_string(),
    }
}

async fn admin(policy: SchemaPolicy) -> (Arc<FakeRemote>, Storefront) {
    let remote = Arc::new(FakeRemote::new());
    remote.add_account("admin@example.com", "admin-pass", Some("admin"));
    let sf = storefront_with(&remote, &Arc::new(MemoryStorage::new()), policy);
    sf.session()
        .sign_in("admin@example.com", &SecretString::from("admin-pass".to_string()))
        .await
        .unwrap();
    remote.clear_calls();
    (remote, sf)
}

fn inserted(remote: &FakeRemote) -> Vec<ProductRecord> {
    remote
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::InsertProduct(record) => Some(record),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn test_create_sends_every_mapped_column_and_client_id() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;

    let created = sf.products().save(None, &draft(), None).await.unwrap();

    let record = inserted(&remote).pop().unwrap();
    for column in ["id", "name", "description", "price", "image_url", "stock", "category"] {
        assert!(record.contains(column), "missing {column}");
    }
    assert_eq!(record.get("id").and_then(|v| v.as_str()), Some(created.id.as_str()));
    assert_eq!(created.price, Price::from_units(1200));
    assert_eq!(created.stock, 4);
}

#[tokio::test]
async fn test_missing_category_column_is_dropped() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    remote.set_columns(Some(ALL_BUT_CATEGORY));

    let created = sf.products().save(None, &draft(), None).await.unwrap();

    let record = inserted(&remote).pop().unwrap();
    assert!(!record.contains("category"));
    for column in ["name", "description", "price", "image_url", "stock"] {
        assert!(record.contains(column), "missing {column}");
    }
    assert_eq!(created.name, "Gravel Bike");
    assert_eq!(created.category, "");
}

#[tokio::test]
async fn test_strict_policy_rejects_before_any_write() {
    let (remote, sf) = admin(SchemaPolicy::Strict).await;
    remote.set_columns(Some(ALL_BUT_CATEGORY));

    let err = sf.products().save(None, &draft(), None).await.unwrap_err();

    assert!(matches!(err, AppError::Schema { column: "category", .. }));
    assert!(inserted(&remote).is_empty());
}

#[tokio::test]
async fn test_no_id_column_lets_service_assign_id() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    remote.set_columns(Some(&["name", "description", "price", "image_url", "stock", "category"]));

    let created = sf.products().save(None, &draft(), None).await.unwrap();

    let record = inserted(&remote).pop().unwrap();
    assert!(!record.contains("id"));
    assert!(!created.id.as_str().is_empty());
}

#[tokio::test]
async fn test_column_lookup_failure_uses_fallback_and_retries_next_time() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    remote.set_columns(None);

    sf.products().save(None, &draft(), None).await.unwrap();
    let record = inserted(&remote).pop().unwrap();
    assert!(record.contains("category"));
    assert!(record.contains("id"));

    remote.set_columns(Some(ALL_BUT_CATEGORY));
    sf.products().save(None, &draft(), None).await.unwrap();
    let record = inserted(&remote).pop().unwrap();
    assert!(!record.contains("category"));
}

#[tokio::test]
async fn test_column_set_is_cached() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;

    sf.products().save(None, &draft(), None).await.unwrap();
    sf.products().save(None, &draft(), None).await.unwrap();

    assert_eq!(remote.count_calls(|c| matches!(c, Call::TableColumns(_))), 1);
}

// =============================================================================
// Update, delete, image
// =============================================================================

#[tokio::test]
async fn test_update_never_writes_id() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    remote.add_product(product("bike", "Trail Bike", 100, 5));
    let id = ProductId::from("bike");

    let draft = ProductDraft {
        name: "Trail Bike Pro".to_string(),
        ..draft()
    };
    let updated = sf.products().save(Some(&id), &draft, None).await.unwrap();

    let record = remote
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::UpdateProduct(target, record) => Some((target, record)),
            _ => None,
        })
        .unwrap();
    assert_eq!(record.0, id);
    assert!(!record.1.contains("id"));
    assert_eq!(updated.id, id);
    assert_eq!(updated.name, "Trail Bike Pro");
}

#[tokio::test]
async fn test_image_upload_replaces_url() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    let image = ImageUpload {
        file_name: "gravel.png".to_string(),
        bytes: vec![0x89, b'P', b'N', b'G'],
        content_type: "image/png".to_string(),
    };

    let created = sf.products().save(None, &draft(), Some(image)).await.unwrap();

    let name = remote
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::UploadFile { bucket, name } if bucket == "product-images" => Some(name),
            _ => None,
        })
        .unwrap();
    assert!(name.ends_with("-gravel.png"));
    assert!(remote.has_file("product-images", &name));
    assert!(created.image_url.ends_with(&name));
    assert!(created.image_url.contains("/storage/v1/object/public/product-images/"));
}

#[tokio::test]
async fn test_image_name_with_spaces_and_hash_is_stored_safely() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    let image = ImageUpload {
        file_name: "my photo#1.png".to_string(),
        bytes: vec![1, 2, 3],
        content_type: "image/png".to_string(),
    };

    let created = sf.products().save(None, &draft(), Some(image)).await.unwrap();

    let name = remote
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::UploadFile { name, .. } => Some(name),
            _ => None,
        })
        .unwrap();
    assert!(name.ends_with("-my-photo-1.png"));
    assert!(remote.has_file("product-images", &name));
    assert!(created.image_url.ends_with(&format!("/product-images/{name}")));
    assert!(!created.image_url.contains('#'));
    assert!(!created.image_url.contains(' '));
}

#[tokio::test]
async fn test_failed_upload_writes_no_row() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    remote.add_product(product("bike", "Trail Bike", 100, 5));
    // Prime the column cache so the injected failure hits the upload.
    sf.products().live_columns().await;
    let image = || ImageUpload {
        file_name: "gravel.png".to_string(),
        bytes: vec![1, 2, 3],
        content_type: "image/png".to_string(),
    };
    let upload_failure = || bazaar_storefront::remote::RemoteError::Api {
        status: 413,
        code: None,
        message: "The object exceeded the maximum allowed size".to_string(),
    };

    remote.fail_next(upload_failure());
    sf.products().save(None, &draft(), Some(image())).await.unwrap_err();

    remote.fail_next(upload_failure());
    sf.products()
        .save(Some(&ProductId::from("bike")), &draft(), Some(image()))
        .await
        .unwrap_err();

    assert_eq!(remote.count_calls(|c| matches!(c, Call::UploadFile { .. })), 2);
    assert_eq!(
        remote.count_calls(|c| matches!(c, Call::InsertProduct(_) | Call::UpdateProduct(..))),
        0
    );
    assert_eq!(remote.product(&ProductId::from("bike")).unwrap().name, "Trail Bike");
}

#[tokio::test]
async fn test_delete_removes_row() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    remote.add_product(product("bike", "Trail Bike", 100, 5));

    sf.products().delete(&ProductId::from("bike")).await.unwrap();

    assert!(remote.product(&ProductId::from("bike")).is_none());
}

// =============================================================================
// Authorization and validation
// =============================================================================

#[tokio::test]
async fn test_non_admin_cannot_write() {
    let remote = Arc::new(FakeRemote::new());
    remote.add_account("buyer@example.com", "pw", Some("user"));
    let sf = storefront(&remote, &Arc::new(MemoryStorage::new()));
    sf.session()
        .sign_in("buyer@example.com", &SecretString::from("pw".to_string()))
        .await
        .unwrap();
    remote.clear_calls();

    let err = sf.products().save(None, &draft(), None).await.unwrap_err();

    assert!(matches!(err, AppError::PermissionDenied(_)));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_draft_makes_no_remote_call() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    let draft = ProductDraft {
        stock: -3,
        ..draft()
    };

    let err = sf.products().save(None, &draft, None).await.unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_policy_rejection_from_service_is_generic() {
    let (remote, sf) = admin(SchemaPolicy::Lenient).await;
    // Prime the column cache so the injected failure hits the insert.
    sf.products().live_columns().await;
    remote.fail_next(bazaar_storefront::remote::RemoteError::Api {
        status: 403,
        code: Some("42501".to_string()),
        message: "new row violates row-level security policy for table \"products\"".to_string(),
    });

    let err = sf.products().save(None, &draft(), None).await.unwrap_err();

    assert!(matches!(err, AppError::PermissionDenied(_)));
    assert_eq!(
        err.user_message(),
        "You do not have permission to perform this action."
    );
}
