//! Core types for cartsync.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod id;
pub mod line;
pub mod price;
pub mod snapshot;

pub use id::*;
pub use line::{CartLineItem, ProductSnapshot, VariantSelection};
pub use price::{CurrencyCode, Price, UnknownCurrency};
pub use snapshot::{CartSnapshot, CartSource};
