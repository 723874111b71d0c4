//! The single entry point UI layers use for cart commands and queries.
//!
//! [`CartFacade`] owns both backing stores and routes each command by the
//! current [`AuthState`]: guests mutate the [`LocalCart`], authenticated
//! sessions mutate the backend. Either way the facade finishes a command by
//! republishing the canonical snapshot on a `watch` channel.
//!
//! Remote mutations are never patched locally. Every mutation, successful or
//! not, is followed by a re-fetch so subscribers only ever see what the
//! backend confirmed (the "always re-fetch" policy). The one exception is an
//! unauthorized mutation: it is surfaced as [`CartError::LoginRequired`] and
//! leaves both stores untouched.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument};

use cartsync_core::{
    CartLineItem, CartSnapshot, CartSource, LineId, LineTransition, ProductId, ProductSnapshot,
    VariantSelection,
};

use crate::error::{CartError, Result, add_breadcrumb};
use crate::local::{GuestCartStore, LocalCart};
use crate::reconcile::{self, MergeReport};
use crate::remote::{AddLineRequest, CartBackend, SessionUser, bounded};
use crate::session::{AuthState, SessionTransition};
use crate::validation::{self, CleanupReport};

/// Capacity of the notice channel; slow subscribers miss the oldest notices.
const NOTICE_CAPACITY: usize = 16;

/// One-off events for the UI, distinct from the continuously published snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartNotice {
    /// A validation pass removed lines that can no longer be bought.
    ItemsRemoved { count: usize },
    /// Merge-on-login finished. `unconfirmed` lines may or may not have
    /// reached the authoritative cart and are not retried automatically.
    MergeFinished {
        merged: usize,
        failed: usize,
        unconfirmed: usize,
    },
    /// The backend rejected the session while reading the cart; the guest
    /// cart is active again.
    SessionExpired,
}

/// A product to put in the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub variant: Option<VariantSelection>,
    /// Display fields for guest lines; looked up in the catalog when absent.
    pub product: Option<ProductSnapshot>,
}

impl AddItem {
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            variant: None,
            product: None,
        }
    }

    #[must_use]
    pub fn with_variant(mut self, variant: VariantSelection) -> Self {
        self.variant = Some(variant);
        self
    }

    #[must_use]
    pub fn with_product(mut self, product: ProductSnapshot) -> Self {
        self.product = Some(product);
        self
    }
}

/// Cart command/query surface over the guest and authoritative carts.
pub struct CartFacade<B, S> {
    backend: B,
    local: LocalCart<S>,
    auth: AuthState,
    timeout: Duration,
    remote: CartSnapshot,
    last_merge: Option<MergeReport>,
    snapshots: watch::Sender<CartSnapshot>,
    notices: broadcast::Sender<CartNotice>,
}

impl<B: CartBackend, S: GuestCartStore> CartFacade<B, S> {
    /// Build a facade in the guest state and publish the persisted guest cart.
    ///
    /// `timeout` bounds every backend call made on behalf of a command.
    pub fn new(backend: B, store: S, timeout: Duration) -> Self {
        let local = LocalCart::open(store);
        let (snapshots, _) = watch::channel(local.snapshot());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            backend,
            local,
            auth: AuthState::Guest,
            timeout,
            remote: CartSnapshot::empty(CartSource::Authoritative),
            last_merge: None,
            snapshots,
            notices,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The snapshot most recently published.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receive every snapshot the facade publishes from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.snapshots.subscribe()
    }

    /// Receive UI notices.
    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<CartNotice> {
        self.notices.subscribe()
    }

    #[must_use]
    pub const fn auth_state(&self) -> &AuthState {
        &self.auth
    }

    /// Sum of line quantities of the published snapshot.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.snapshots.borrow().item_count
    }

    /// Report of the most recent merge-on-login, if any ran.
    #[must_use]
    pub const fn last_merge(&self) -> Option<&MergeReport> {
        self.last_merge.as_ref()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Resolve the session with the backend and apply the resulting transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lookup fails; the state is unchanged.
    #[instrument(skip(self))]
    pub async fn sync_session(&mut self) -> Result<AuthState> {
        match bounded(self.timeout, self.backend.session_user()).await {
            Ok(Some(user)) => {
                self.sign_in(user).await?;
            }
            Ok(None) => self.sign_out(),
            Err(e) => return Self::fail("sync_session", e),
        }
        Ok(self.auth.clone())
    }

    /// Switch to the authenticated cart of `user`.
    ///
    /// On a transition from guest, the guest cart is merged into the
    /// authoritative cart first (once; the guest cart is empty afterwards).
    ///
    /// # Errors
    ///
    /// Returns an error if the authoritative cart cannot be fetched after the
    /// switch. Per-line merge failures are not errors; see [`MergeReport`].
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn sign_in(&mut self, user: SessionUser) -> Result<Option<MergeReport>> {
        let next = AuthState::Authenticated { user };
        let transition = SessionTransition::between(&self.auth, &next);
        self.auth = next;

        let report = if transition == SessionTransition::SignedIn {
            add_breadcrumb("auth", "Signed in", None);
            let report =
                reconcile::merge_guest_cart(&self.backend, &mut self.local, self.timeout).await;
            if let Some(report) = &report {
                self.finish_merge(report);
            }
            report
        } else {
            None
        };

        self.refresh().await?;
        Ok(report)
    }

    /// Return to the guest cart.
    pub fn sign_out(&mut self) {
        if self.auth.is_authenticated() {
            info!("Signed out, guest cart active");
            add_breadcrumb("auth", "Signed out", None);
        }
        self.auth = AuthState::Guest;
        self.remote = CartSnapshot::empty(CartSource::Authoritative);
        self.publish(self.local.snapshot());
    }

    /// Replay the guest lines that failed during the last merge.
    ///
    /// Lines whose add may have been applied are left for
    /// [`resend_unconfirmed`](Self::resend_unconfirmed).
    ///
    /// # Errors
    ///
    /// Returns `LoginRequired` when not authenticated, or a fetch error.
    #[instrument(skip(self))]
    pub async fn retry_merge(&mut self) -> Result<Option<MergeReport>> {
        if !self.auth.is_authenticated() {
            return Self::fail("retry_merge", CartError::LoginRequired);
        }
        let Some(previous) = self.last_merge.as_ref().filter(|r| r.failed() > 0) else {
            return Ok(None);
        };

        let report = reconcile::retry_failed(&self.backend, previous, self.timeout).await;
        self.finish_merge(&report);
        self.refresh().await?;
        Ok(Some(report))
    }

    /// Send the unconfirmed lines of the last merge again.
    ///
    /// For use once the user has seen the re-fetched cart and confirmed the
    /// lines are missing from it.
    ///
    /// # Errors
    ///
    /// Returns `LoginRequired` when not authenticated, or a fetch error.
    #[instrument(skip(self))]
    pub async fn resend_unconfirmed(&mut self) -> Result<Option<MergeReport>> {
        if !self.auth.is_authenticated() {
            return Self::fail("resend_unconfirmed", CartError::LoginRequired);
        }
        let Some(previous) = self.last_merge.as_ref().filter(|r| r.unconfirmed() > 0) else {
            return Ok(None);
        };

        let report = reconcile::resend_unconfirmed(&self.backend, previous, self.timeout).await;
        self.finish_merge(&report);
        self.refresh().await?;
        Ok(Some(report))
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Re-read the active store and republish its snapshot.
    ///
    /// An unauthorized fetch demotes the facade to the guest cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the authoritative cart cannot be fetched; the
    /// previously published snapshot stays in place.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<CartSnapshot> {
        if !self.auth.is_authenticated() {
            let snapshot = self.local.snapshot();
            self.publish(snapshot.clone());
            return Ok(snapshot);
        }

        match bounded(self.timeout, self.backend.fetch()).await {
            Ok(cart) => {
                let snapshot = cart.into_snapshot();
                self.remote = snapshot.clone();
                self.publish(snapshot.clone());
                Ok(snapshot)
            }
            Err(CartError::LoginRequired) => {
                info!("Session rejected while fetching cart, falling back to guest cart");
                self.sign_out();
                self.notify(CartNotice::SessionExpired);
                Ok(self.local.snapshot())
            }
            Err(e) => Self::fail("refresh", e),
        }
    }

    /// Add `item.quantity` units, incrementing the line of the same identity.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity` for a zero quantity; backend errors when authenticated.
    #[instrument(skip(self, item), fields(product_id = %item.product_id, quantity = item.quantity))]
    pub async fn add(&mut self, item: AddItem) -> Result<CartSnapshot> {
        if item.quantity == 0 {
            return Self::fail("add", CartError::InvalidQuantity(0));
        }
        add_breadcrumb(
            "cart",
            "Added item",
            Some(&[("product_id", item.product_id.as_str())]),
        );

        if self.auth.is_authenticated() {
            let request = AddLineRequest {
                variant_id: item.variant.as_ref().and_then(|v| v.variant_id.clone()),
                product_id: item.product_id,
                quantity: item.quantity,
            };
            let result = bounded(self.timeout, self.backend.add(&request)).await;
            return self.finish_remote("add", result).await;
        }

        let product = match item.product {
            Some(product) => Some(product),
            None => self.lookup_product(&item.product_id).await,
        };
        let line = CartLineItem::guest(item.product_id, item.quantity, item.variant, product);
        let transition = self.local.add(line, i64::from(item.quantity));
        debug!(?transition, "Guest add");
        Ok(self.publish_local())
    }

    /// Change the quantity of an identity by a signed amount.
    ///
    /// Decrementing to zero or below removes the line; decrementing an absent
    /// line does nothing.
    ///
    /// # Errors
    ///
    /// Backend errors when authenticated.
    #[instrument(skip(self, variant), fields(product_id = %product_id))]
    pub async fn add_delta(
        &mut self,
        product_id: ProductId,
        variant: Option<VariantSelection>,
        delta: i64,
    ) -> Result<CartSnapshot> {
        if !self.auth.is_authenticated() {
            let line = CartLineItem::guest(product_id, 1, variant, None);
            let transition = self.local.add(line, delta);
            debug!(?transition, "Guest quantity change");
            return Ok(self.publish_local());
        }

        if delta == 0 {
            return Ok(self.snapshot());
        }

        let variant_id = variant.as_ref().and_then(|v| v.variant_id.clone());
        let result = if delta > 0 {
            let request = AddLineRequest {
                product_id,
                quantity: u32::try_from(delta).unwrap_or(u32::MAX),
                variant_id,
            };
            bounded(self.timeout, self.backend.add(&request)).await
        } else {
            // The backend keys lines by product and variant id.
            let existing = self
                .remote
                .items
                .iter()
                .find(|line| {
                    line.product_id == product_id && line.variant_id() == variant_id.as_ref()
                })
                .map(|line| (line.id.clone(), line.quantity));
            let Some((line_id, quantity)) = existing else {
                return Ok(self.snapshot());
            };

            let next = i64::from(quantity) + delta;
            if next <= 0 {
                bounded(self.timeout, self.backend.remove(&line_id)).await
            } else {
                let next = u32::try_from(next).unwrap_or(u32::MAX);
                bounded(self.timeout, self.backend.update(&line_id, next)).await
            }
        };
        self.finish_remote("add_delta", result).await
    }

    /// Set the absolute quantity of a line. Quantities below 1 are rejected;
    /// use [`CartFacade::remove`] to delete a line.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity`, `LineNotFound` for guests, backend errors otherwise.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update(&mut self, line_id: &LineId, quantity: i64) -> Result<CartSnapshot> {
        if quantity < 1 {
            return Self::fail("update", CartError::InvalidQuantity(quantity));
        }

        if self.auth.is_authenticated() {
            let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
            let result = bounded(self.timeout, self.backend.update(line_id, quantity)).await;
            return self.finish_remote("update", result).await;
        }

        match self.local.update(line_id, quantity) {
            LineTransition::NotFound => {
                Self::fail("update", CartError::LineNotFound(line_id.clone()))
            }
            _ => Ok(self.publish_local()),
        }
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// `LineNotFound` for guests, backend errors otherwise.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove(&mut self, line_id: &LineId) -> Result<CartSnapshot> {
        if self.auth.is_authenticated() {
            let result = bounded(self.timeout, self.backend.remove(line_id)).await;
            return self.finish_remote("remove", result).await;
        }

        match self.local.remove(line_id) {
            LineTransition::NotFound => {
                Self::fail("remove", CartError::LineNotFound(line_id.clone()))
            }
            _ => Ok(self.publish_local()),
        }
    }

    /// Remove several lines at once.
    ///
    /// # Errors
    ///
    /// Backend errors when authenticated.
    #[instrument(skip(self, line_ids), fields(count = line_ids.len()))]
    pub async fn remove_many(&mut self, line_ids: &[LineId]) -> Result<CartSnapshot> {
        if line_ids.is_empty() {
            return Ok(self.snapshot());
        }

        if self.auth.is_authenticated() {
            let result = bounded(self.timeout, self.backend.bulk_remove(line_ids)).await;
            return self.finish_remote("remove_many", result).await;
        }

        self.local.remove_many(line_ids);
        Ok(self.publish_local())
    }

    /// Empty the active cart.
    ///
    /// # Errors
    ///
    /// Backend errors when authenticated.
    #[instrument(skip(self))]
    pub async fn clear(&mut self) -> Result<CartSnapshot> {
        add_breadcrumb("cart", "Cleared cart", None);
        if self.auth.is_authenticated() {
            let result = bounded(self.timeout, self.backend.clear()).await;
            return self.finish_remote("clear", result).await;
        }

        self.local.clear();
        Ok(self.publish_local())
    }

    /// Remove lines the backend flags as no longer purchasable.
    ///
    /// Raises a single [`CartNotice::ItemsRemoved`] for the whole pass when
    /// anything was removed. Guests get an empty report.
    ///
    /// # Errors
    ///
    /// Returns an error if validation or the surrounding fetches fail.
    /// Individual removal failures are reported in [`CleanupReport::failed`].
    #[instrument(skip(self))]
    pub async fn cleanup_invalid(&mut self) -> Result<CleanupReport> {
        let refs = match validation::validate(&self.backend, &self.auth, self.timeout).await {
            Ok(refs) => refs,
            Err(e) => return Self::fail("cleanup_invalid", e),
        };
        if refs.is_empty() {
            return Ok(CleanupReport::default());
        }

        let snapshot = self.refresh().await?;
        if snapshot.source != CartSource::Authoritative {
            return Ok(CleanupReport::default());
        }

        let (line_ids, unresolved) = validation::resolve(&refs, &snapshot);
        let (removed, failed) =
            validation::remove_lines(&self.backend, &line_ids, self.timeout).await;

        if let Err(e) = self.refresh().await {
            debug!(error = %e, "Re-fetch after cleanup failed");
        }
        if !removed.is_empty() {
            self.notify(CartNotice::ItemsRemoved {
                count: removed.len(),
            });
        }

        let report = CleanupReport {
            flagged: refs.len(),
            removed,
            failed,
            unresolved,
        };
        info!(
            flagged = report.flagged,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Invalid cart items cleaned up"
        );
        Ok(report)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Complete a remote mutation: re-fetch on success or ordinary failure.
    async fn finish_remote(&mut self, operation: &str, result: Result<()>) -> Result<CartSnapshot> {
        match result {
            Ok(()) => self.refresh().await,
            Err(CartError::LoginRequired) => Self::fail(operation, CartError::LoginRequired),
            Err(e) => {
                if let Err(fetch_error) = self.refresh().await {
                    debug!(error = %fetch_error, "Re-fetch after failed mutation failed");
                }
                Self::fail(operation, e)
            }
        }
    }

    /// Display fields for a guest line; a catalog failure is not fatal.
    async fn lookup_product(&self, product_id: &ProductId) -> Option<ProductSnapshot> {
        match bounded(self.timeout, self.backend.product(product_id)).await {
            Ok(product) => Some(product),
            Err(e) => {
                debug!(
                    product_id = %product_id,
                    error = %e,
                    "Catalog lookup failed, adding without snapshot"
                );
                None
            }
        }
    }

    fn finish_merge(&mut self, report: &MergeReport) {
        self.notify(CartNotice::MergeFinished {
            merged: report.merged(),
            failed: report.failed(),
            unconfirmed: report.unconfirmed(),
        });
        self.last_merge = Some(report.clone());
    }

    fn publish_local(&self) -> CartSnapshot {
        let snapshot = self.local.snapshot();
        self.publish(snapshot.clone());
        snapshot
    }

    fn publish(&self, snapshot: CartSnapshot) {
        self.snapshots.send_replace(snapshot);
    }

    fn notify(&self, notice: CartNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn fail<T>(operation: &str, error: CartError) -> Result<T> {
        error.report(operation);
        Err(error)
    }
}
