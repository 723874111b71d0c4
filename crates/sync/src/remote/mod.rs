//! Remote store adapter for the authoritative cart.
//!
//! # Architecture
//!
//! - The backend is the source of truth for authenticated carts
//! - Mutations return nothing; callers re-fetch the canonical cart afterwards
//!   instead of patching local state (prices, stock and taxes are recomputed
//!   server-side)
//! - No retries inside the adapter; retry policy belongs to the caller
//! - Catalog product snapshots are cached via `moka` (5 minute TTL by default)
//!
//! # Example
//!
//! ```rust,ignore
//! use cartsync::remote::{AddLineRequest, CartBackend, RestCartClient};
//!
//! let client = RestCartClient::new(&config.api)?;
//! client.add(&AddLineRequest { product_id: "42".into(), quantity: 1, variant_id: None }).await?;
//! let cart = client.fetch().await?;
//! ```

mod client;
pub mod types;

use std::future::Future;
use std::time::Duration;

pub use client::RestCartClient;
pub use types::*;

use cartsync_core::{LineId, ProductId, ProductSnapshot};

use crate::error::{CartError, Result};

/// Run a backend call, failing with a retryable [`CartError::Timeout`] when it
/// does not finish within `limit`. Nothing is assumed committed on timeout.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(CartError::Timeout(limit)))
}

/// Operations the cart core consumes from the backend.
///
/// Implemented over HTTP by [`RestCartClient`]; tests substitute an
/// in-memory backend.
pub trait CartBackend: Send + Sync {
    /// `GET /session-user`: the authenticated user, or `None` when anonymous.
    fn session_user(&self) -> impl Future<Output = Result<Option<SessionUser>>> + Send;

    /// `GET /cart`: the authoritative cart.
    fn fetch(&self) -> impl Future<Output = Result<RemoteCart>> + Send;

    /// `POST /cart`: add a line, or increment the existing line of that identity.
    fn add(&self, request: &AddLineRequest) -> impl Future<Output = Result<()>> + Send;

    /// `PUT /cart/{lineId}`: set an absolute quantity (>= 1).
    fn update(&self, line_id: &LineId, quantity: u32) -> impl Future<Output = Result<()>> + Send;

    /// `DELETE /cart/{lineId}`.
    fn remove(&self, line_id: &LineId) -> impl Future<Output = Result<()>> + Send;

    /// `POST /cart/bulk-delete`.
    fn bulk_remove(&self, line_ids: &[LineId]) -> impl Future<Output = Result<()>> + Send;

    /// `POST /cart/clear`.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;

    /// `GET /cart/validate`: lines that are no longer purchasable.
    fn validate(&self) -> impl Future<Output = Result<Vec<InvalidItemRef>>> + Send;

    /// `GET /products/{productId}`: display fields for a guest line.
    fn product(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<ProductSnapshot>> + Send;
}
