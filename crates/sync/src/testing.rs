//! In-memory [`CartBackend`] for tests.
//!
//! Enabled for this crate's unit tests and, through the `testing` feature,
//! for the integration test crate. The fake keeps an authoritative cart with
//! the backend's add-or-increment semantics and lets tests inject failures,
//! latency and signed-out sessions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cartsync_core::{
    CartLineItem, LineId, ProductId, ProductSnapshot, UserId, VariantSelection,
};

use crate::error::{CartError, Result};
use crate::remote::{AddLineRequest, CartBackend, InvalidItemRef, RemoteCart, SessionUser};

/// Shared-state fake backend. Clones observe and drive the same state.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    user: Option<SessionUser>,
    lines: Vec<CartLineItem>,
    next_line: u64,
    products: HashMap<ProductId, ProductSnapshot>,
    invalid: Vec<InvalidItemRef>,
    calls: Vec<String>,
    add_calls: Vec<AddLineRequest>,
    failing_adds: HashSet<ProductId>,
    failing_removes: HashSet<LineId>,
    mutation_status: Option<u16>,
    fail_bulk: bool,
    delay: Option<Duration>,
    stall_after_add: Option<Duration>,
}

impl State {
    fn require_session(&self) -> Result<()> {
        if self.user.is_some() {
            Ok(())
        } else {
            Err(CartError::LoginRequired)
        }
    }

    fn injected(&self) -> Result<()> {
        self.mutation_status.map_or(Ok(()), |status| {
            Err(CartError::Mutation {
                status,
                message: "injected failure".to_string(),
            })
        })
    }

    fn position(&self, line_id: &LineId) -> Result<usize> {
        self.lines
            .iter()
            .position(|line| &line.id == line_id)
            .ok_or_else(|| not_found(line_id))
    }

    fn new_line_id(&mut self) -> LineId {
        self.next_line += 1;
        LineId::new(format!("line-{}", self.next_line))
    }

    fn commit_add(&mut self, request: &AddLineRequest) -> Result<()> {
        self.require_session()?;
        self.injected()?;
        if self.failing_adds.contains(&request.product_id) {
            return Err(CartError::Mutation {
                status: 500,
                message: "add rejected".to_string(),
            });
        }

        let existing = self.lines.iter_mut().find(|line| {
            line.product_id == request.product_id
                && line.variant_id() == request.variant_id.as_ref()
        });
        if let Some(line) = existing {
            line.quantity += request.quantity;
            return Ok(());
        }

        let id = self.new_line_id();
        let product = self.products.get(&request.product_id).cloned();
        self.lines.push(CartLineItem {
            id,
            product_id: request.product_id.clone(),
            quantity: request.quantity,
            variant: request.variant_id.clone().map(VariantSelection::by_id),
            product,
        });
        Ok(())
    }
}

fn not_found(line_id: &LineId) -> CartError {
    CartError::Mutation {
        status: 404,
        message: format!("line {line_id} not found"),
    }
}

impl FakeBackend {
    /// A backend with an authenticated session for user `u1`.
    #[must_use]
    pub fn signed_in() -> Self {
        let backend = Self::default();
        backend.sign_in();
        backend
    }

    /// A backend that rejects every cart call as unauthorized.
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self) {
        self.lock().user = Some(SessionUser {
            id: UserId::from("u1"),
            email: Some("shopper@example.com".to_string()),
        });
    }

    /// Expire the session; the server-side cart is kept.
    pub fn sign_out(&self) {
        self.lock().user = None;
    }

    /// Make `add` fail with a 500 for one product.
    pub fn fail_adds_for(&self, product_id: ProductId) {
        self.lock().failing_adds.insert(product_id);
    }

    pub fn heal_adds(&self) {
        self.lock().failing_adds.clear();
    }

    /// Make every mutation fail with `status`.
    pub fn fail_mutations_with(&self, status: u16) {
        self.lock().mutation_status = Some(status);
    }

    pub fn fail_bulk_remove(&self) {
        self.lock().fail_bulk = true;
    }

    pub fn fail_remove_for(&self, line_id: LineId) {
        self.lock().failing_removes.insert(line_id);
    }

    /// Set what the next `validate` calls return.
    pub fn set_invalid(&self, refs: Vec<InvalidItemRef>) {
        self.lock().invalid = refs;
    }

    /// Delay every call by `delay` before it takes effect.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Hold back the response of each successful `add` by `stall`, after the
    /// line has already been applied.
    pub fn stall_after_add(&self, stall: Duration) {
        self.lock().stall_after_add = Some(stall);
    }

    /// Register a catalog entry.
    pub fn add_product(&self, product_id: ProductId, snapshot: ProductSnapshot) {
        self.lock().products.insert(product_id, snapshot);
    }

    /// Put a line straight into the authoritative cart.
    pub fn seed_line(&self, product_id: ProductId, quantity: u32, variant: Option<&str>) -> LineId {
        let mut state = self.lock();
        let id = state.new_line_id();
        state.lines.push(CartLineItem {
            id: id.clone(),
            product_id,
            quantity,
            variant: variant.map(VariantSelection::by_id),
            product: None,
        });
        id
    }

    /// Every `add` request received, failed ones included.
    #[must_use]
    pub fn add_calls(&self) -> Vec<AddLineRequest> {
        self.lock().add_calls.clone()
    }

    /// Names of the backend operations called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<CartLineItem> {
        self.lock().lines.clone()
    }

    /// Total quantity of a product across its lines.
    #[must_use]
    pub fn cart_quantity(&self, product_id: &ProductId) -> Option<u32> {
        let state = self.lock();
        let lines: Vec<_> = state
            .lines
            .iter()
            .filter(|line| &line.product_id == product_id)
            .collect();
        (!lines.is_empty()).then(|| lines.iter().map(|line| line.quantity).sum())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the configured delay, then record the call and return the state.
    async fn enter(&self, call: &str) -> MutexGuard<'_, State> {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state.calls.push(call.to_string());
        state
    }
}

impl CartBackend for FakeBackend {
    async fn session_user(&self) -> Result<Option<SessionUser>> {
        Ok(self.enter("session_user").await.user.clone())
    }

    async fn fetch(&self) -> Result<RemoteCart> {
        let state = self.enter("fetch").await;
        state.require_session()?;
        Ok(RemoteCart {
            items: state.lines.clone(),
            subtotal: None,
            currency: None,
        })
    }

    async fn add(&self, request: &AddLineRequest) -> Result<()> {
        let stall = {
            let mut state = self.enter("add").await;
            state.add_calls.push(request.clone());
            state.commit_add(request)?;
            state.stall_after_add
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        Ok(())
    }

    async fn update(&self, line_id: &LineId, quantity: u32) -> Result<()> {
        let mut state = self.enter("update").await;
        state.require_session()?;
        state.injected()?;
        if quantity == 0 {
            return Err(CartError::Mutation {
                status: 400,
                message: "quantity must be at least 1".to_string(),
            });
        }
        let index = state.position(line_id)?;
        if let Some(line) = state.lines.get_mut(index) {
            line.quantity = quantity;
        }
        Ok(())
    }

    async fn remove(&self, line_id: &LineId) -> Result<()> {
        let mut state = self.enter("remove").await;
        state.require_session()?;
        state.injected()?;
        if state.failing_removes.contains(line_id) {
            return Err(CartError::Mutation {
                status: 500,
                message: "remove rejected".to_string(),
            });
        }
        let index = state.position(line_id)?;
        state.lines.remove(index);
        Ok(())
    }

    async fn bulk_remove(&self, line_ids: &[LineId]) -> Result<()> {
        let mut state = self.enter("bulk_remove").await;
        state.require_session()?;
        state.injected()?;
        if state.fail_bulk {
            return Err(CartError::Mutation {
                status: 500,
                message: "bulk delete rejected".to_string(),
            });
        }
        state.lines.retain(|line| !line_ids.contains(&line.id));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.enter("clear").await;
        state.require_session()?;
        state.injected()?;
        state.lines.clear();
        Ok(())
    }

    async fn validate(&self) -> Result<Vec<InvalidItemRef>> {
        let state = self.enter("validate").await;
        state.require_session()?;
        Ok(state.invalid.clone())
    }

    async fn product(&self, product_id: &ProductId) -> Result<ProductSnapshot> {
        let state = self.enter("product").await;
        state.products.get(product_id).cloned().ok_or_else(|| CartError::Mutation {
            status: 404,
            message: format!("product {product_id} not found"),
        })
    }
}
