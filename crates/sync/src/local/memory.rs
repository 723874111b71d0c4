//! In-memory guest cart store.

use std::sync::{Arc, Mutex, PoisonError};

use cartsync_core::CartLineItem;

use super::{GuestCartStore, decode_lines};

/// A [`GuestCartStore`] that keeps the serialized record in memory.
///
/// Clones share the same record, so a test can hand one clone to the facade
/// and inspect the persisted state through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryRecord>>,
}

#[derive(Debug, Default)]
struct MemoryRecord {
    raw: Option<String>,
    writes: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary persisted payload.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        let store = Self::new();
        store.lock().raw = Some(raw.into());
        store
    }

    /// The persisted payload, if any.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.lock().raw.clone()
    }

    /// Number of `save` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRecord> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GuestCartStore for MemoryStore {
    fn load(&self) -> Vec<CartLineItem> {
        let mut record = self.lock();
        let decoded = match record.raw.as_deref() {
            Some(raw) => decode_lines(raw),
            None => return Vec::new(),
        };
        decoded.unwrap_or_else(|| {
            record.raw = None;
            Vec::new()
        })
    }

    fn save(&self, lines: &[CartLineItem]) {
        match serde_json::to_string(lines) {
            Ok(raw) => {
                let mut record = self.lock();
                record.raw = Some(raw);
                record.writes += 1;
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize guest cart"),
        }
    }

    fn clear(&self) {
        self.lock().raw = None;
    }
}
