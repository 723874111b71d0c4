//! Removal of cart lines the backend no longer considers purchasable.
//!
//! Flagged items are data, not errors: a product may be deleted or a variant
//! withdrawn between two visits. Guest carts are never validated server-side.

use std::time::Duration;

use serde::Serialize;
use tracing::{instrument, warn};

use cartsync_core::{CartSnapshot, LineId};

use crate::error::Result;
use crate::remote::{CartBackend, InvalidItemRef, bounded};
use crate::session::AuthState;

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// References returned by the backend.
    pub flagged: usize,
    /// Lines removed from the authoritative cart.
    pub removed: Vec<LineId>,
    /// Lines whose removal failed, with the error text.
    pub failed: Vec<(LineId, String)>,
    /// References that matched no line of the current snapshot.
    pub unresolved: Vec<InvalidItemRef>,
}

impl CleanupReport {
    /// True only if every flagged line that exists was removed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ask the backend which lines are invalid. Guests always get an empty list.
///
/// # Errors
///
/// Propagates backend failures; `LoginRequired` if the session was rejected.
#[instrument(skip(backend, auth))]
pub async fn validate<B: CartBackend>(
    backend: &B,
    auth: &AuthState,
    timeout: Duration,
) -> Result<Vec<InvalidItemRef>> {
    if !auth.is_authenticated() {
        return Ok(Vec::new());
    }
    bounded(timeout, backend.validate()).await
}

/// Map invalid references onto line ids of `snapshot`.
///
/// A reference with a line id resolves to that line. Otherwise it resolves by
/// product and variant id; a reference without a variant id flags every line
/// of the product. Returns the resolved ids (deduplicated, snapshot order) and
/// the references that matched nothing.
#[must_use]
pub fn resolve(
    refs: &[InvalidItemRef],
    snapshot: &CartSnapshot,
) -> (Vec<LineId>, Vec<InvalidItemRef>) {
    let mut flagged: Vec<&LineId> = Vec::new();
    let mut unresolved = Vec::new();

    for item in refs {
        let before = flagged.len();
        let by_line = item.line_id.as_ref().and_then(|line_id| {
            snapshot
                .items
                .iter()
                .find(|line| &line.id == line_id)
                .map(|line| &line.id)
        });

        if let Some(line_id) = by_line {
            flagged.push(line_id);
        } else {
            flagged.extend(
                snapshot
                    .items
                    .iter()
                    .filter(|line| line.product_id == item.product_id)
                    .filter(|line| {
                        item.variant_id
                            .as_ref()
                            .is_none_or(|variant| line.variant_id() == Some(variant))
                    })
                    .map(|line| &line.id),
            );
        }

        if flagged.len() == before {
            unresolved.push(item.clone());
        }
    }

    let ids = snapshot
        .items
        .iter()
        .map(|line| &line.id)
        .filter(|id| flagged.contains(id))
        .cloned()
        .collect();
    (ids, unresolved)
}

/// Remove `line_ids` from the authoritative cart.
///
/// Several lines go out as one bulk delete; if that fails each line is
/// removed individually so one bad line cannot block the others.
pub async fn remove_lines<B: CartBackend>(
    backend: &B,
    line_ids: &[LineId],
    timeout: Duration,
) -> (Vec<LineId>, Vec<(LineId, String)>) {
    if line_ids.len() > 1 {
        match bounded(timeout, backend.bulk_remove(line_ids)).await {
            Ok(()) => return (line_ids.to_vec(), Vec::new()),
            Err(e) => warn!(error = %e, "Bulk removal failed, removing lines one by one"),
        }
    }

    let mut removed = Vec::new();
    let mut failed = Vec::new();
    for line_id in line_ids {
        match bounded(timeout, backend.remove(line_id)).await {
            Ok(()) => removed.push(line_id.clone()),
            Err(e) => {
                warn!(line_id = %line_id, error = %e, "Failed to remove invalid line");
                failed.push((line_id.clone(), e.to_string()));
            }
        }
    }
    (removed, failed)
}
