//! Quantity state machine for cart lines.
//!
//! Each identity key is either **Absent** (no line) or **Active(q)** with
//! `q >= 1`. Transitions:
//!
//! | from      | command         | to                                   |
//! |-----------|-----------------|--------------------------------------|
//! | Absent    | add(+n), n > 0  | Active(n)                            |
//! | Absent    | add(n), n <= 0  | Absent (no-op)                       |
//! | Active(q) | add(n)          | Active(q+n), or Absent if q+n <= 0   |
//! | Active(q) | update(m), m>=1 | Active(m)                            |
//! | Active(q) | update(m), m<1  | Active(q) (rejected)                 |
//! | Active(q) | remove          | Absent                               |
//!
//! Absent is never stored; it is the absence of a line with that key.

use crate::identity::{IdentityKey, identity_key};
use crate::types::{CartLineItem, LineId};

/// What a command did to a line list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineTransition {
    /// Absent -> Active(quantity).
    Inserted { line_id: LineId, quantity: u32 },
    /// Active(from) -> Active(to).
    Changed { line_id: LineId, from: u32, to: u32 },
    /// Active -> Absent.
    Removed { line_id: LineId },
    /// Update below 1; removal must go through remove.
    Rejected { requested: i64 },
    /// The command referenced a line that does not exist.
    NotFound,
    /// Nothing to do (e.g. a decrement of an absent line).
    Unchanged,
}

impl LineTransition {
    /// Whether the line list was modified.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Inserted { .. } | Self::Changed { .. } | Self::Removed { .. }
        )
    }
}

fn clamp_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity).unwrap_or(u32::MAX)
}

/// Add `delta` units of `item`'s identity to `lines`.
///
/// `item.quantity` is ignored; `delta` is the signed change. An existing line
/// keeps its id and gains any snapshot data it was missing.
pub fn apply_add(lines: &mut Vec<CartLineItem>, item: CartLineItem, delta: i64) -> LineTransition {
    let key = identity_key(&item);
    let Some(index) = lines.iter().position(|line| identity_key(line) == key) else {
        if delta <= 0 {
            return LineTransition::Unchanged;
        }
        let quantity = clamp_quantity(delta);
        let line_id = item.id.clone();
        lines.push(CartLineItem { quantity, ..item });
        return LineTransition::Inserted { line_id, quantity };
    };

    let from = lines.get(index).map_or(0, |line| line.quantity);
    let next = i64::from(from).saturating_add(delta);
    if next <= 0 {
        let removed = lines.remove(index);
        return LineTransition::Removed {
            line_id: removed.id,
        };
    }

    let Some(line) = lines.get_mut(index) else {
        return LineTransition::NotFound;
    };
    let to = clamp_quantity(next);
    line.quantity = to;
    if line.product.is_none() {
        line.product = item.product;
    }
    if let (Some(existing), Some(incoming)) = (line.variant.as_mut(), item.variant) {
        existing.price = incoming.price.or(existing.price);
        existing.stock = incoming.stock.or(existing.stock);
    }

    if from == to {
        LineTransition::Unchanged
    } else {
        LineTransition::Changed {
            line_id: line.id.clone(),
            from,
            to,
        }
    }
}

/// Set the absolute quantity of a line. Quantities below 1 are rejected.
pub fn apply_update(lines: &mut [CartLineItem], line_id: &LineId, quantity: i64) -> LineTransition {
    if quantity < 1 {
        return LineTransition::Rejected {
            requested: quantity,
        };
    }
    let Some(line) = lines.iter_mut().find(|line| &line.id == line_id) else {
        return LineTransition::NotFound;
    };

    let from = line.quantity;
    let to = clamp_quantity(quantity);
    if from == to {
        return LineTransition::Unchanged;
    }
    line.quantity = to;
    LineTransition::Changed {
        line_id: line_id.clone(),
        from,
        to,
    }
}

/// Remove a line by id.
pub fn apply_remove(lines: &mut Vec<CartLineItem>, line_id: &LineId) -> LineTransition {
    let before = lines.len();
    lines.retain(|line| &line.id != line_id);
    if lines.len() == before {
        LineTransition::NotFound
    } else {
        LineTransition::Removed {
            line_id: line_id.clone(),
        }
    }
}

/// Restore the line-list invariants on data from outside the state machine.
///
/// Lines with quantity 0 are dropped; lines sharing an identity key are folded
/// into the first occurrence with their quantities summed.
#[must_use]
pub fn normalize(lines: Vec<CartLineItem>) -> Vec<CartLineItem> {
    let mut out: Vec<CartLineItem> = Vec::with_capacity(lines.len());
    let mut keys: Vec<IdentityKey> = Vec::with_capacity(lines.len());

    for line in lines.into_iter().filter(|line| line.quantity > 0) {
        let key = identity_key(&line);
        match keys.iter().position(|existing| existing == &key) {
            Some(index) => {
                if let Some(kept) = out.get_mut(index) {
                    kept.quantity = kept.quantity.saturating_add(line.quantity);
                }
            }
            None => {
                keys.push(key);
                out.push(line);
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::types::{CartSnapshot, CartSource, ProductId, VariantSelection};

    fn item(product: i64) -> CartLineItem {
        CartLineItem::guest(ProductId::from(product), 1, None, None)
    }

    fn red(product: i64) -> CartLineItem {
        CartLineItem::guest(
            ProductId::from(product),
            1,
            Some(VariantSelection::default().with_option("color", "red")),
            None,
        )
    }

    #[test]
    fn test_add_from_absent_inserts() {
        let mut lines = Vec::new();
        let transition = apply_add(&mut lines, item(42), 1);
        assert!(matches!(transition, LineTransition::Inserted { quantity: 1, .. }));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 1);
    }

    #[test]
    fn test_add_existing_increments() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(42), 2);
        let transition = apply_add(&mut lines, item(42), 3);
        assert!(matches!(transition, LineTransition::Changed { from: 2, to: 5, .. }));
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_add_keeps_first_line_id() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(42), 1);
        let original = lines[0].id.clone();
        apply_add(&mut lines, item(42), 1);
        assert_eq!(lines[0].id, original);
    }

    #[test]
    fn test_decrement_to_zero_removes() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(42), 3);
        let transition = apply_add(&mut lines, item(42), -3);
        assert!(matches!(transition, LineTransition::Removed { .. }));
        assert!(lines.is_empty());
    }

    #[test]
    fn test_decrement_below_zero_removes() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(42), 1);
        apply_add(&mut lines, item(42), -10);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_partial_decrement() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(42), 5);
        let transition = apply_add(&mut lines, item(42), -2);
        assert!(matches!(transition, LineTransition::Changed { from: 5, to: 3, .. }));
    }

    #[test]
    fn test_decrement_absent_is_noop() {
        let mut lines = Vec::new();
        assert_eq!(apply_add(&mut lines, item(42), -1), LineTransition::Unchanged);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_variants_are_separate_lines() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(7), 1);
        apply_add(&mut lines, red(7), 1);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_structurally_different_selections_are_separate_lines() {
        let with_option = |name: &str, value: serde_json::Value| {
            CartLineItem::guest(
                ProductId::from(7),
                1,
                Some(VariantSelection::default().with_option(name, value)),
                None,
            )
        };
        let mut lines = Vec::new();
        apply_add(&mut lines, with_option("size.eu", json!("42")), 1);
        apply_add(&mut lines, with_option("size", json!({"eu": "42"})), 1);
        apply_add(&mut lines, with_option("engraving", json!({})), 1);
        apply_add(&mut lines, item(7), 1);
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|line| line.quantity == 1));
    }

    #[test]
    fn test_update_below_one_rejected() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(42), 2);
        let id = lines[0].id.clone();
        assert_eq!(
            apply_update(&mut lines, &id, 0),
            LineTransition::Rejected { requested: 0 }
        );
        assert_eq!(lines[0].quantity, 2);
    }

    #[test]
    fn test_update_sets_absolute_quantity() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(42), 2);
        let id = lines[0].id.clone();
        apply_update(&mut lines, &id, 9);
        assert_eq!(lines[0].quantity, 9);
        assert_eq!(
            apply_update(&mut lines, &LineId::from("missing"), 1),
            LineTransition::NotFound
        );
    }

    #[test]
    fn test_add_then_remove_round_trip() {
        let mut lines = Vec::new();
        apply_add(&mut lines, item(42), 2);
        let id = lines[0].id.clone();
        assert!(apply_remove(&mut lines, &id).is_mutation());
        assert!(lines.is_empty());
        assert_eq!(apply_remove(&mut lines, &id), LineTransition::NotFound);
    }

    #[test]
    fn test_normalize_folds_duplicates_and_drops_zero() {
        let mut zero = item(3);
        zero.quantity = 0;
        let mut dup = item(1);
        dup.quantity = 4;
        let lines = normalize(vec![item(1), zero, dup, red(1)]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].quantity, 5);
    }

    #[derive(Debug, Clone)]
    enum Command {
        Add { product: i64, variant: usize, delta: i64 },
        Update { pick: usize, quantity: i64 },
        Remove { pick: usize },
    }

    /// Selections chosen to stress identity: blank, nested, dotted and empty.
    fn selections() -> Vec<Option<VariantSelection>> {
        let options = |value: serde_json::Value| {
            Some(serde_json::from_value::<VariantSelection>(json!({ "options": value })).unwrap())
        };
        vec![
            None,
            Some(VariantSelection::default()),
            Some(VariantSelection::by_id("v1")),
            options(json!({"color": "red"})),
            options(json!({"color": "red", "size": null})),
            options(json!({"size.eu": "42"})),
            options(json!({"size": {"eu": "42"}})),
            options(json!({"engraving": {}})),
            options(json!({"engraving": []})),
            options(json!({"tags": ["a", "b"]})),
            options(json!({"tags": ["b", "a"]})),
        ]
    }

    fn arb_command() -> impl Strategy<Value = Command> {
        prop_oneof![
            (1..4_i64, 0..selections().len(), -4..6_i64)
                .prop_map(|(product, variant, delta)| Command::Add { product, variant, delta }),
            (any::<usize>(), -2..8_i64)
                .prop_map(|(pick, quantity)| Command::Update { pick, quantity }),
            any::<usize>().prop_map(|pick| Command::Remove { pick }),
        ]
    }

    fn picked(lines: &[CartLineItem], pick: usize) -> LineId {
        lines
            .get(pick % lines.len().max(1))
            .map_or_else(|| LineId::from("absent"), |line| line.id.clone())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// After every command the list has unique identity keys, no line
        /// below 1, and an item count equal to the sum of quantities.
        #[test]
        fn prop_commands_preserve_line_invariants(
            commands in prop::collection::vec(arb_command(), 0..40)
        ) {
            let variants = selections();
            let mut lines: Vec<CartLineItem> = Vec::new();

            for command in commands {
                match command {
                    Command::Add { product, variant, delta } => {
                        let line = CartLineItem::guest(
                            ProductId::from(product),
                            1,
                            variants[variant].clone(),
                            None,
                        );
                        apply_add(&mut lines, line, delta);
                    }
                    Command::Update { pick, quantity } => {
                        let line_id = picked(&lines, pick);
                        apply_update(&mut lines, &line_id, quantity);
                    }
                    Command::Remove { pick } => {
                        let line_id = picked(&lines, pick);
                        apply_remove(&mut lines, &line_id);
                    }
                }

                let mut keys: Vec<IdentityKey> = lines.iter().map(identity_key).collect();
                keys.sort();
                keys.dedup();
                prop_assert_eq!(keys.len(), lines.len());
                prop_assert!(lines.iter().all(|line| line.quantity >= 1));

                let total: u32 = lines.iter().map(|line| line.quantity).sum();
                let snapshot = CartSnapshot::new(CartSource::Guest, lines.clone());
                prop_assert_eq!(snapshot.item_count, total);
            }
        }

        /// Normalizing arbitrary input yields the same invariants.
        #[test]
        fn prop_normalize_restores_invariants(
            raw in prop::collection::vec((1..4_i64, 0..11_usize, 0..5_u32), 0..20)
        ) {
            let variants = selections();
            let lines = normalize(
                raw.iter()
                    .map(|&(product, variant, quantity)| {
                        CartLineItem::guest(
                            ProductId::from(product),
                            quantity,
                            variants[variant].clone(),
                            None,
                        )
                    })
                    .collect(),
            );
            let mut keys: Vec<IdentityKey> = lines.iter().map(identity_key).collect();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), lines.len());
            prop_assert!(lines.iter().all(|line| line.quantity >= 1));
            let expected: u32 = raw.iter().map(|&(_, _, quantity)| quantity).sum();
            let total: u32 = lines.iter().map(|line| line.quantity).sum();
            prop_assert_eq!(total, expected);
        }
    }
}
