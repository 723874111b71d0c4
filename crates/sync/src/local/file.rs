//! File-backed guest cart store.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use cartsync_core::CartLineItem;

use super::{GUEST_CART_KEY, GuestCartStore, decode_lines};

/// Persists the guest cart as one JSON array in a file.
///
/// Writes go to a sibling temp file that is then renamed over the record, so
/// a crash mid-write leaves either the old or the new cart, never half of one.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store the record at an explicit path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the record as `guest_cart.json` inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{GUEST_CART_KEY}.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| GUEST_CART_KEY.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write(&self, lines: &[CartLineItem]) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec(lines).map_err(io::Error::other)?;
        let temp = self.temp_path();
        std::fs::write(&temp, payload)?;
        std::fs::rename(&temp, &self.path)
    }

    fn discard(&self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove guest cart file");
        }
    }
}

impl GuestCartStore for JsonFileStore {
    fn load(&self) -> Vec<CartLineItem> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No guest cart on disk");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read guest cart");
                return Vec::new();
            }
        };

        decode_lines(&raw).unwrap_or_else(|| {
            self.discard();
            Vec::new()
        })
    }

    fn save(&self, lines: &[CartLineItem]) {
        if let Err(e) = self.write(lines) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist guest cart");
        }
    }

    fn clear(&self) {
        self.discard();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartsync_core::ProductId;

    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path().join("nested"));
        let line = CartLineItem::guest(ProductId::from(42), 3, None, None);
        store.save(std::slice::from_ref(&line));
        store.save(std::slice::from_ref(&line));

        assert_eq!(store.load(), vec![line]);
        assert!(store.path().ends_with("guest_cart.json"));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        std::fs::write(store.path(), b"[{\"id\": oops").unwrap();

        assert!(store.load().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        store.save(&[CartLineItem::guest(ProductId::from(1), 1, None, None)]);
        store.clear();
        store.clear();
        assert!(!store.path().exists());
        assert!(store.load().is_empty());
    }
}
