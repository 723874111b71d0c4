//! cartsync - guest/authoritative cart reconciliation and synchronization.
//!
//! This crate is the stateful half of the cart core:
//! - [`local`] - The guest cart and its device persistence
//! - [`remote`] - The backend adapter for the authoritative cart
//! - [`reconcile`] - Merge-on-login of the guest cart
//! - [`validation`] - Removal of lines that can no longer be bought
//! - [`facade`] - The single command/query surface for UI layers
//!
//! Pure types and quantity rules live in `cartsync-core`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod facade;
pub mod local;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{CartApiConfig, CartSyncConfig, ConfigError};
pub use error::{CartError, Result};
pub use facade::{AddItem, CartFacade, CartNotice};
pub use local::{GuestCartStore, JsonFileStore, LocalCart, MemoryStore};
pub use reconcile::{MergeOutcome, MergeReport};
pub use remote::{CartBackend, RestCartClient};
pub use session::AuthState;
pub use validation::CleanupReport;
