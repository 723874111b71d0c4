//! Guest cart persistence.
//!
//! The guest cart lives on the device until the session authenticates. It is
//! held in memory by [`LocalCart`] and written through a narrow
//! [`GuestCartStore`] after every mutation, so the backing mechanism (file,
//! embedded key-value store, OS secure storage) can change without touching
//! the reconciliation logic.
//!
//! Nothing in this module returns an error. A missing or corrupt record loads
//! as an empty cart and a failed write is logged; the in-memory list stays
//! authoritative for the life of the process.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use tracing::debug;

use cartsync_core::{
    CartLineItem, CartSnapshot, CartSource, LineId, LineTransition, apply_add, apply_remove,
    apply_update, normalize,
};

/// Fixed record name of the persisted guest cart.
pub const GUEST_CART_KEY: &str = "guest_cart";

/// Read/write access to the persisted guest cart record.
pub trait GuestCartStore: Send + Sync {
    /// Read the persisted lines; empty when absent or corrupt.
    fn load(&self) -> Vec<CartLineItem>;

    /// Replace the persisted lines. Idempotent.
    fn save(&self, lines: &[CartLineItem]);

    /// Remove the persisted record entirely.
    fn clear(&self);
}

/// Decode a persisted payload, discarding it when corrupt.
pub(crate) fn decode_lines(raw: &str) -> Option<Vec<CartLineItem>> {
    match serde_json::from_str::<Vec<CartLineItem>>(raw) {
        Ok(lines) => Some(lines),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding corrupt guest cart payload");
            None
        }
    }
}

/// The in-memory guest cart plus its persistence.
#[derive(Debug)]
pub struct LocalCart<S> {
    store: S,
    lines: Vec<CartLineItem>,
}

impl<S: GuestCartStore> LocalCart<S> {
    /// Load the guest cart from `store`.
    ///
    /// Loaded lines are normalized, so a hand-edited record with duplicate
    /// identities or zero quantities cannot break the snapshot invariants.
    pub fn open(store: S) -> Self {
        let loaded = store.load();
        let count = loaded.len();
        let lines = normalize(loaded);
        if lines.len() != count {
            debug!(before = count, after = lines.len(), "Normalized guest cart");
            store.save(&lines);
        }
        Self { store, lines }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLineItem] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot::new(CartSource::Guest, self.lines.clone())
    }

    /// Borrow the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Add a signed quantity of `item`'s identity.
    pub fn add(&mut self, item: CartLineItem, delta: i64) -> LineTransition {
        let transition = apply_add(&mut self.lines, item, delta);
        self.persist_if(&transition);
        transition
    }

    /// Set the absolute quantity of a line.
    pub fn update(&mut self, line_id: &LineId, quantity: i64) -> LineTransition {
        let transition = apply_update(&mut self.lines, line_id, quantity);
        self.persist_if(&transition);
        transition
    }

    /// Remove a line.
    pub fn remove(&mut self, line_id: &LineId) -> LineTransition {
        let transition = apply_remove(&mut self.lines, line_id);
        self.persist_if(&transition);
        transition
    }

    /// Remove several lines; returns how many were present.
    pub fn remove_many(&mut self, line_ids: &[LineId]) -> usize {
        let before = self.lines.len();
        self.lines.retain(|line| !line_ids.contains(&line.id));
        let removed = before - self.lines.len();
        if removed > 0 {
            self.store.save(&self.lines);
        }
        removed
    }

    /// Empty the guest cart and delete its record.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.store.clear();
    }

    fn persist_if(&self, transition: &LineTransition) {
        if transition.is_mutation() {
            self.store.save(&self.lines);
        }
    }
}
