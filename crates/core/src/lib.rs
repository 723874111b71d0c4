//! cartsync core - shared cart types and rules.
//!
//! This crate provides the pure half of the cart synchronization core:
//! - [`types`] - Newtype ids, prices, line items, variant selections and snapshots
//! - [`identity`] - Canonical identity keys used to deduplicate cart lines
//! - [`quantity`] - The Absent/Active quantity state machine applied to line lists
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! persistence, no HTTP clients. Nothing in here can fail on well-typed input,
//! which is what lets the local store treat guest cart mutations as infallible.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod identity;
pub mod quantity;
pub mod types;

pub use identity::{IdentityKey, OptionValue, VariantKey, canonicalize, identity_key, matches};
pub use quantity::{LineTransition, apply_add, apply_remove, apply_update, normalize};
pub use types::*;
