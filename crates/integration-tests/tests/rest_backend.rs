//! Integration tests for the HTTP backend client against a stub server.

use cartsync::remote::{AddLineRequest, CartBackend};
use cartsync::{AddItem, AuthState, CartError, CartFacade, RestCartClient};
use cartsync_core::{CartSource, ProductId, VariantSelection};
use cartsync_integration_tests::stub::{StubServer, invalid_product};
use cartsync_integration_tests::{Device, TIMEOUT};

const TOKEN: &str = "Zq8mR2vN7xKp4TwL9sYb3HdF6gJc1AeU";

// =============================================================================
// Client
// =============================================================================

#[tokio::test]
async fn test_anonymous_session_is_none() {
    let server = StubServer::start(TOKEN).await;
    let client = RestCartClient::new(&server.config(None)).unwrap();

    assert!(client.session_user().await.unwrap().is_none());
}

#[tokio::test]
async fn test_numeric_user_id_is_accepted() {
    let server = StubServer::start(TOKEN).await;
    let client = RestCartClient::new(&server.config(Some(TOKEN))).unwrap();

    let user = client.session_user().await.unwrap().unwrap();
    assert_eq!(user.id.as_str(), "1");
}

#[tokio::test]
async fn test_unauthorized_mutation_is_login_required() {
    let server = StubServer::start(TOKEN).await;
    let client = RestCartClient::new(&server.config(Some("wrong-token"))).unwrap();

    let err = client
        .add(&AddLineRequest {
            product_id: ProductId::from(1),
            quantity: 1,
            variant_id: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_login_required());
    assert!(server.lines().is_empty());
}

#[tokio::test]
async fn test_server_error_is_mutation_error() {
    let server = StubServer::start(TOKEN).await;
    server.fail_mutations(Some(500));
    let client = RestCartClient::new(&server.config(Some(TOKEN))).unwrap();

    let err = client.clear().await.unwrap_err();
    assert!(matches!(err, CartError::Mutation { status: 500, .. }));
    assert!(err.is_server_side());
}

#[tokio::test]
async fn test_catalog_lookups_are_cached() {
    let server = StubServer::start(TOKEN).await;
    server.add_product(42, "Dried Pineapple", "4.50");
    let client = RestCartClient::new(&server.config(None)).unwrap();

    let first = client.product(&ProductId::from(42)).await.unwrap();
    let second = client.product(&ProductId::from(42)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.name, "Dried Pineapple");
    let lookups = server
        .requests()
        .iter()
        .filter(|request| request.as_str() == "GET /products/42")
        .count();
    assert_eq!(lookups, 1);
}

// =============================================================================
// Facade over HTTP
// =============================================================================

#[tokio::test]
async fn test_guest_to_signed_in_round_trip() {
    let server = StubServer::start(TOKEN).await;
    server.add_product(42, "Dried Pineapple", "4.50");
    let device = Device::new();

    // Guest session: nothing reaches the cart endpoints.
    let guest = RestCartClient::new(&server.config(None)).unwrap();
    let mut cart = device.open(guest);
    assert_eq!(cart.sync_session().await.unwrap(), AuthState::Guest);
    let snapshot = cart.add(AddItem::new(42, 2)).await.unwrap();
    assert_eq!(snapshot.source, CartSource::Guest);
    assert_eq!(
        snapshot.subtotal.as_ref().unwrap().to_string(),
        "$9.00"
    );
    assert!(!server.requests().contains(&"POST /cart".to_owned()));
    drop(cart);

    // Same device after sign-in: the guest cart merges into the server cart.
    let client = RestCartClient::new(&server.config(Some(TOKEN))).unwrap();
    let mut cart = CartFacade::new(client, device.store(), TIMEOUT);
    assert!(cart.sync_session().await.unwrap().is_authenticated());

    let report = cart.last_merge().unwrap();
    assert!(report.is_complete());
    assert_eq!(server.lines().len(), 1);
    assert_eq!(cart.snapshot().source, CartSource::Authoritative);
    assert_eq!(cart.item_count(), 2);

    // Mutations are followed by a fetch of the canonical cart.
    let line_id = cart.snapshot().items.first().unwrap().id.clone();
    cart.update(&line_id, 5).await.unwrap();
    let requests = server.requests();
    assert_eq!(
        requests[requests.len() - 2..],
        [format!("PUT /cart/{line_id}"), "GET /cart".to_owned()]
    );
    assert_eq!(cart.item_count(), 5);

    cart.add(
        AddItem::new(7, 1).with_variant(VariantSelection::by_id("v1")),
    )
    .await
    .unwrap();
    assert_eq!(cart.snapshot().items.len(), 2);

    cart.remove(&line_id).await.unwrap();
    assert_eq!(cart.item_count(), 1);

    cart.clear().await.unwrap();
    assert!(cart.snapshot().is_empty());
    assert!(server.lines().is_empty());
}

#[tokio::test]
async fn test_cleanup_over_http() {
    let server = StubServer::start(TOKEN).await;
    let device = Device::new();
    let client = RestCartClient::new(&server.config(Some(TOKEN))).unwrap();
    let mut cart = CartFacade::new(client, device.store(), TIMEOUT);
    cart.sync_session().await.unwrap();

    cart.add(AddItem::new(1, 1)).await.unwrap();
    cart.add(AddItem::new(2, 1)).await.unwrap();
    cart.add(AddItem::new(3, 1)).await.unwrap();
    server.set_invalid(vec![invalid_product(1), invalid_product(3)]);

    let report = cart.cleanup_invalid().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.removed.len(), 2);
    assert!(server.requests().contains(&"POST /cart/bulk-delete".to_owned()));
    assert_eq!(server.lines().len(), 1);
    assert_eq!(cart.item_count(), 1);
}

#[tokio::test]
async fn test_failed_mutation_keeps_canonical_snapshot() {
    let server = StubServer::start(TOKEN).await;
    let device = Device::new();
    let client = RestCartClient::new(&server.config(Some(TOKEN))).unwrap();
    let mut cart = CartFacade::new(client, device.store(), TIMEOUT);
    cart.sync_session().await.unwrap();
    cart.add(AddItem::new(1, 1)).await.unwrap();

    server.fail_mutations(Some(409));
    let err = cart.add(AddItem::new(1, 1)).await.unwrap_err();

    assert!(matches!(err, CartError::Mutation { status: 409, .. }));
    assert_eq!(cart.item_count(), 1);
    assert_eq!(server.requests().last().unwrap(), "GET /cart");
}
