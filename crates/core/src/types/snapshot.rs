//! The cart state republished to subscribers after every command.

use serde::{Deserialize, Serialize};

use super::line::CartLineItem;
use super::price::Price;

/// Which backing store produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartSource {
    /// Device-local guest cart.
    #[default]
    Guest,
    /// Backend-held cart of an authenticated session.
    Authoritative,
}

/// A cart as last confirmed by its backing store.
///
/// Always built through [`CartSnapshot::new`] so `item_count` equals the sum
/// of line quantities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub source: CartSource,
    pub items: Vec<CartLineItem>,
    pub item_count: u32,
    pub subtotal: Option<Price>,
}

impl CartSnapshot {
    /// Build a snapshot, computing the item count and a subtotal from line prices.
    #[must_use]
    pub fn new(source: CartSource, items: Vec<CartLineItem>) -> Self {
        let item_count = items
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity));
        let subtotal = compute_subtotal(&items);
        Self {
            source,
            items,
            item_count,
            subtotal,
        }
    }

    /// Replace the computed subtotal with one reported by the backend.
    #[must_use]
    pub fn with_reported_subtotal(mut self, subtotal: Option<Price>) -> Self {
        if subtotal.is_some() {
            self.subtotal = subtotal;
        }
        self
    }

    /// An empty snapshot for the given source.
    #[must_use]
    pub fn empty(source: CartSource) -> Self {
        Self::new(source, Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Sum of line prices; `None` if any line lacks a price or currencies are mixed.
fn compute_subtotal(items: &[CartLineItem]) -> Option<Price> {
    let mut lines = items.iter();
    let first = lines.next()?.line_price()?;
    lines.try_fold(first, |acc, line| acc.checked_add(&line.line_price()?))
}
