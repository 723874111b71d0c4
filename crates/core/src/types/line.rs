//! Cart line items and their denormalized product/variant data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::id::{LineId, ProductId, VariantId};
use super::price::Price;

/// A single line in a cart snapshot.
///
/// `quantity` is at least 1 for every line that exists in a snapshot; the
/// quantity rules in [`crate::quantity`] remove a line rather than store zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    /// Backend-assigned for authoritative lines, `local-…` for guest lines.
    pub id: LineId,
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSnapshot>,
}

impl CartLineItem {
    /// Create a guest line with a freshly generated local id.
    #[must_use]
    pub fn guest(
        product_id: ProductId,
        quantity: u32,
        variant: Option<VariantSelection>,
        product: Option<ProductSnapshot>,
    ) -> Self {
        Self {
            id: LineId::local(),
            product_id,
            quantity,
            variant,
            product,
        }
    }

    /// The backend variant id of the selection, if any.
    #[must_use]
    pub fn variant_id(&self) -> Option<&VariantId> {
        self.variant.as_ref().and_then(|v| v.variant_id.as_ref())
    }

    /// Unit price: the variant snapshot wins over the product snapshot.
    #[must_use]
    pub fn unit_price(&self) -> Option<Price> {
        self.variant
            .as_ref()
            .and_then(|v| v.price)
            .or_else(|| self.product.as_ref().and_then(|p| p.price))
    }

    /// Unit price multiplied by quantity.
    #[must_use]
    pub fn line_price(&self) -> Option<Price> {
        self.unit_price().map(|p| p.times(self.quantity))
    }
}

/// A chosen variant of a product.
///
/// Only `variant_id` and `options` participate in line identity. `price` and
/// `stock` are a snapshot taken when the selection was made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    /// Structured selection, e.g. `{"color": "red", "size": {"eu": 42}}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

impl VariantSelection {
    /// Selection identified only by the backend variant id.
    #[must_use]
    pub fn by_id(variant_id: impl Into<VariantId>) -> Self {
        Self {
            variant_id: Some(variant_id.into()),
            ..Self::default()
        }
    }

    /// Add an option, builder style.
    #[must_use]
    pub fn with_option(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Whether the selection carries nothing that affects identity.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.variant_id.is_none() && self.options.is_empty()
    }
}

/// Display fields captured when a guest line is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
}
