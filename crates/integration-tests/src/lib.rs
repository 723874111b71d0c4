//! Integration tests for cartsync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartsync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `guest_cart` - Guest cart behavior on a real file store
//! - `merge_on_login` - Guest to authenticated transitions
//! - `cleanup` - Removal of lines the backend flags as invalid
//! - `rest_backend` - The HTTP client against a stub backend served by axum
//!
//! Support code lives here: [`Device`] wires a facade to a temporary guest
//! cart file, and [`stub::StubServer`] serves the backend's REST contract.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

pub mod stub;

use std::time::Duration;

use tempfile::TempDir;

use cartsync::{CartBackend, CartFacade, JsonFileStore};

/// Timeout used by every facade built here.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A simulated device: a temporary directory holding the guest cart file.
pub struct Device {
    dir: TempDir,
}

impl Device {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// A store over this device's guest cart file.
    #[must_use]
    pub fn store(&self) -> JsonFileStore {
        JsonFileStore::in_dir(self.dir.path())
    }

    /// Open a facade the way an app launch would.
    pub fn open<B: CartBackend>(&self, backend: B) -> CartFacade<B, JsonFileStore> {
        CartFacade::new(backend, self.store(), TIMEOUT)
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}
