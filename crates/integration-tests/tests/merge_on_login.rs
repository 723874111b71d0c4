//! Integration tests for guest to authenticated transitions.

use cartsync::remote::SessionUser;
use cartsync::testing::FakeBackend;
use cartsync::{AddItem, AuthState, CartNotice, GuestCartStore, MergeOutcome};
use cartsync_core::{CartSource, ProductId, UserId, VariantSelection};
use cartsync_integration_tests::Device;

fn shopper() -> SessionUser {
    SessionUser {
        id: UserId::from("u1"),
        email: None,
    }
}

#[tokio::test]
async fn test_guest_items_land_in_authoritative_cart() {
    let device = Device::new();
    let backend = FakeBackend::signed_in();
    let mut cart = device.open(backend.clone());

    cart.add(AddItem::new(42, 1)).await.unwrap();
    cart.add(AddItem::new(7, 3).with_variant(VariantSelection::by_id("v7")))
        .await
        .unwrap();

    let report = cart.sign_in(shopper()).await.unwrap().unwrap();

    assert!(report.is_complete());
    assert_eq!(backend.cart_quantity(&ProductId::from(42)), Some(1));
    assert_eq!(backend.cart_quantity(&ProductId::from(7)), Some(3));
    assert_eq!(
        backend.add_calls().last().unwrap().variant_id.as_ref().unwrap().as_str(),
        "v7"
    );

    let snapshot = cart.snapshot();
    assert_eq!(snapshot.source, CartSource::Authoritative);
    assert_eq!(snapshot.item_count, 4);

    // The guest cart is gone from the device.
    assert!(device.store().load().is_empty());
    assert!(!device.store().path().exists());
}

#[tokio::test]
async fn test_merge_increments_existing_server_lines() {
    let device = Device::new();
    let backend = FakeBackend::signed_in();
    backend.seed_line(ProductId::from(42), 2, None);
    let mut cart = device.open(backend.clone());
    cart.add(AddItem::new(42, 1)).await.unwrap();

    cart.sign_in(shopper()).await.unwrap();

    assert_eq!(backend.lines().len(), 1);
    assert_eq!(cart.item_count(), 3);
}

#[tokio::test]
async fn test_merge_runs_once_per_sign_in() {
    let device = Device::new();
    let backend = FakeBackend::signed_in();
    let mut cart = device.open(backend.clone());
    cart.add(AddItem::new(42, 1)).await.unwrap();

    cart.sign_in(shopper()).await.unwrap();
    cart.refresh().await.unwrap();
    cart.sync_session().await.unwrap();

    assert_eq!(backend.add_calls().len(), 1);
    assert_eq!(backend.cart_quantity(&ProductId::from(42)), Some(1));
}

#[tokio::test]
async fn test_empty_guest_cart_merges_nothing() {
    let device = Device::new();
    let backend = FakeBackend::signed_in();
    let mut cart = device.open(backend.clone());

    assert!(cart.sign_in(shopper()).await.unwrap().is_none());
    assert!(cart.last_merge().is_none());
    assert!(backend.add_calls().is_empty());
}

#[tokio::test]
async fn test_partial_failure_is_reported_and_retryable() {
    let device = Device::new();
    let backend = FakeBackend::signed_in();
    backend.fail_adds_for(ProductId::from(2));
    let mut cart = device.open(backend.clone());
    let mut notices = cart.notices();
    for product in 1_i64..=3 {
        cart.add(AddItem::new(product, 1)).await.unwrap();
    }

    let report = cart.sign_in(shopper()).await.unwrap().unwrap();
    assert_eq!(report.merged(), 2);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.entries.get(1).unwrap().outcome,
        MergeOutcome::Failed {
            retryable: false,
            ..
        }
    ));
    assert_eq!(
        notices.recv().await.unwrap(),
        CartNotice::MergeFinished {
            merged: 2,
            failed: 1,
            unconfirmed: 0,
        }
    );
    // Guest cart is cleared even though one line failed.
    assert!(device.store().load().is_empty());

    backend.heal_adds();
    let retried = cart.retry_merge().await.unwrap().unwrap();
    assert!(retried.is_complete());
    assert_eq!(cart.item_count(), 3);
    assert_eq!(backend.add_calls().len(), 4);

    // Nothing left to retry.
    assert!(cart.retry_merge().await.unwrap().is_none());
}

#[tokio::test]
async fn test_sign_out_returns_to_empty_guest_cart() {
    let device = Device::new();
    let backend = FakeBackend::signed_in();
    let mut cart = device.open(backend.clone());
    cart.add(AddItem::new(42, 1)).await.unwrap();
    cart.sign_in(shopper()).await.unwrap();

    cart.sign_out();

    assert_eq!(cart.auth_state(), &AuthState::Guest);
    let snapshot = cart.snapshot();
    assert_eq!(snapshot.source, CartSource::Guest);
    assert!(snapshot.is_empty());
    // The authoritative cart is untouched.
    assert_eq!(backend.cart_quantity(&ProductId::from(42)), Some(1));
}

#[tokio::test]
async fn test_guest_cart_after_sign_out_merges_on_next_sign_in() {
    let device = Device::new();
    let backend = FakeBackend::signed_in();
    let mut cart = device.open(backend.clone());
    cart.sign_in(shopper()).await.unwrap();
    cart.sign_out();

    cart.add(AddItem::new(5, 2)).await.unwrap();
    let report = cart.sign_in(shopper()).await.unwrap().unwrap();

    assert_eq!(report.merged(), 1);
    assert_eq!(backend.cart_quantity(&ProductId::from(5)), Some(2));
}

#[tokio::test]
async fn test_expired_session_falls_back_to_guest() {
    let device = Device::new();
    let backend = FakeBackend::signed_in();
    let mut cart = device.open(backend.clone());
    cart.sign_in(shopper()).await.unwrap();
    let mut notices = cart.notices();

    backend.sign_out();
    let snapshot = cart.refresh().await.unwrap();

    assert_eq!(snapshot.source, CartSource::Guest);
    assert_eq!(notices.recv().await.unwrap(), CartNotice::SessionExpired);

    // Guest commands work again without the backend.
    let snapshot = cart.add(AddItem::new(1, 1)).await.unwrap();
    assert_eq!(snapshot.source, CartSource::Guest);
    assert_eq!(device.store().load().len(), 1);
}
