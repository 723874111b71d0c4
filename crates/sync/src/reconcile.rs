//! Merge-on-login: moving the guest cart into the authoritative cart.
//!
//! The guest lines become an explicit [`MergeQueue`]. Entries are drained one
//! at a time because the backend's add endpoint increments an existing line of
//! the same identity; two concurrent adds for one identity could lose or
//! double an increment.
//!
//! The merge is not atomic. A failed add is recorded on its entry and the
//! queue moves on; once every entry has been attempted the guest cart is
//! cleared. The resulting [`MergeReport`] keeps the failed lines, and
//! [`retry_failed`] replays exactly those, so lines that already merged are
//! never sent twice.
//!
//! An add that timed out, or whose connection broke after the request went
//! out, may have been applied by the backend. Such entries are recorded as
//! [`MergeOutcome::Unconfirmed`] and are never replayed by [`retry_failed`];
//! the caller inspects the re-fetched cart and only then decides to
//! [`resend_unconfirmed`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use cartsync_core::CartLineItem;

use crate::local::{GuestCartStore, LocalCart};
use crate::remote::{AddLineRequest, CartBackend, bounded};

/// State of one queued guest line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Not attempted yet.
    Pending,
    /// The backend accepted the add.
    Merged,
    /// The add failed; the line is not in the authoritative cart.
    Failed {
        reason: String,
        retryable: bool,
        login_required: bool,
    },
    /// The add did not complete but may have been applied.
    Unconfirmed { reason: String },
}

/// A guest line and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeEntry {
    pub line: CartLineItem,
    pub outcome: MergeOutcome,
}

/// Ordered queue of pending adds.
#[derive(Debug, Clone, Default)]
pub struct MergeQueue {
    entries: Vec<MergeEntry>,
}

impl MergeQueue {
    /// Queue every line, in guest cart order.
    #[must_use]
    pub fn from_lines(lines: &[CartLineItem]) -> Self {
        Self {
            entries: lines
                .iter()
                .cloned()
                .map(|line| MergeEntry {
                    line,
                    outcome: MergeOutcome::Pending,
                })
                .collect(),
        }
    }

    /// Queue the entries of `previous` that `replay` selects, carrying every
    /// other entry over with its outcome unchanged.
    fn replaying(previous: &MergeReport, replay: fn(&MergeOutcome) -> bool) -> Self {
        Self {
            entries: previous
                .entries
                .iter()
                .cloned()
                .map(|mut entry| {
                    if replay(&entry.outcome) {
                        entry.outcome = MergeOutcome::Pending;
                    }
                    entry
                })
                .collect(),
        }
    }

    /// Attempt every pending entry sequentially, recording each outcome.
    pub async fn drain<B: CartBackend>(&mut self, backend: &B, timeout: Duration) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|entry| entry.outcome == MergeOutcome::Pending)
        {
            let request = AddLineRequest::for_line(&entry.line);
            entry.outcome = match bounded(timeout, backend.add(&request)).await {
                Ok(()) => MergeOutcome::Merged,
                Err(e) if e.may_have_committed() => {
                    warn!(
                        product_id = %entry.line.product_id,
                        quantity = entry.line.quantity,
                        error = %e,
                        "Guest line may have merged, not replaying it"
                    );
                    MergeOutcome::Unconfirmed {
                        reason: e.to_string(),
                    }
                }
                Err(e) => {
                    warn!(
                        product_id = %entry.line.product_id,
                        quantity = entry.line.quantity,
                        error = %e,
                        "Skipping guest line that failed to merge"
                    );
                    MergeOutcome::Failed {
                        reason: e.to_string(),
                        retryable: e.is_retryable(),
                        login_required: e.is_login_required(),
                    }
                }
            };
        }
    }

    fn into_report(self, started_at: DateTime<Utc>) -> MergeReport {
        MergeReport {
            started_at,
            finished_at: Utc::now(),
            entries: self.entries,
        }
    }
}

/// Inspectable result of a merge pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<MergeEntry>,
}

impl MergeReport {
    /// Number of lines attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome != MergeOutcome::Pending)
            .count()
    }

    #[must_use]
    pub fn merged(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome == MergeOutcome::Merged)
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed_lines().count()
    }

    /// Guest lines that did not reach the authoritative cart.
    pub fn failed_lines(&self) -> impl Iterator<Item = &CartLineItem> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, MergeOutcome::Failed { .. }))
            .map(|entry| &entry.line)
    }

    /// Number of lines whose add may or may not have been applied.
    #[must_use]
    pub fn unconfirmed(&self) -> usize {
        self.unconfirmed_lines().count()
    }

    /// Guest lines that need confirmation before they are sent again.
    pub fn unconfirmed_lines(&self) -> impl Iterator<Item = &CartLineItem> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, MergeOutcome::Unconfirmed { .. }))
            .map(|entry| &entry.line)
    }

    /// Whether every line merged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.outcome == MergeOutcome::Merged)
    }
}

/// Merge the guest cart into the authoritative cart, then clear the guest cart.
///
/// Returns `None` when the guest cart is empty (nothing to merge).
#[instrument(skip_all, fields(lines = local.lines().len()))]
pub async fn merge_guest_cart<B, S>(
    backend: &B,
    local: &mut LocalCart<S>,
    timeout: Duration,
) -> Option<MergeReport>
where
    B: CartBackend,
    S: GuestCartStore,
{
    if local.is_empty() {
        return None;
    }

    let started_at = Utc::now();
    let mut queue = MergeQueue::from_lines(local.lines());
    queue.drain(backend, timeout).await;
    local.clear();

    let report = queue.into_report(started_at);
    info!(
        merged = report.merged(),
        failed = report.failed(),
        "Guest cart merged"
    );
    Some(report)
}

/// Replay the failed entries of a previous merge.
///
/// Entries that merged before, and entries whose add may have been applied,
/// are carried over unchanged and not re-sent.
#[instrument(skip_all, fields(failed = previous.failed()))]
pub async fn retry_failed<B: CartBackend>(
    backend: &B,
    previous: &MergeReport,
    timeout: Duration,
) -> MergeReport {
    let started_at = Utc::now();
    let mut queue = MergeQueue::replaying(previous, |outcome| {
        matches!(outcome, MergeOutcome::Failed { .. })
    });
    queue.drain(backend, timeout).await;
    queue.into_report(started_at)
}

/// Send the unconfirmed entries of a previous merge again.
///
/// Only call this once the caller has checked the authoritative cart: a line
/// that was in fact applied is incremented a second time.
#[instrument(skip_all, fields(unconfirmed = previous.unconfirmed()))]
pub async fn resend_unconfirmed<B: CartBackend>(
    backend: &B,
    previous: &MergeReport,
    timeout: Duration,
) -> MergeReport {
    let started_at = Utc::now();
    let mut queue = MergeQueue::replaying(previous, |outcome| {
        matches!(outcome, MergeOutcome::Unconfirmed { .. })
    });
    queue.drain(backend, timeout).await;
    queue.into_report(started_at)
}
