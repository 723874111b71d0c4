//! Request and response bodies of the cart backend.
//!
//! Field names follow the backend's camelCase JSON.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cartsync_core::{
    CartLineItem, CartSnapshot, CartSource, CurrencyCode, LineId, Price, ProductId,
    ProductSnapshot, UserId, VariantId, normalize,
};

/// `GET /cart` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCart {
    #[serde(default)]
    pub items: Vec<CartLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl RemoteCart {
    /// Convert to a published snapshot.
    ///
    /// The backend is trusted for content but not for invariants: lines are
    /// normalized so a zero-quantity or duplicated line never reaches the UI.
    #[must_use]
    pub fn into_snapshot(self) -> CartSnapshot {
        let currency = self
            .currency
            .as_deref()
            .and_then(|code| code.parse::<CurrencyCode>().ok())
            .unwrap_or_default();
        let reported = self.subtotal.map(|amount| Price::new(amount, currency));
        CartSnapshot::new(CartSource::Authoritative, normalize(self.items))
            .with_reported_subtotal(reported)
    }
}

/// `POST /cart` body: add or increment a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
}

impl AddLineRequest {
    /// The add that re-creates `line` on the backend.
    #[must_use]
    pub fn for_line(line: &CartLineItem) -> Self {
        Self {
            product_id: line.product_id.clone(),
            quantity: line.quantity,
            variant_id: line.variant_id().cloned(),
        }
    }
}

/// `PUT /cart/{lineId}` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineRequest {
    pub quantity: u32,
}

/// `POST /cart/bulk-delete` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    pub line_ids: Vec<LineId>,
}

/// A cart line the backend no longer considers purchasable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidItemRef {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_id: Option<LineId>,
}

/// `GET /cart/validate` response; accepted bare or wrapped.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ValidateResponse {
    Wrapped {
        #[serde(rename = "invalidItems")]
        invalid_items: Vec<InvalidItemRef>,
    },
    Bare(Vec<InvalidItemRef>),
}

impl ValidateResponse {
    pub(crate) fn into_items(self) -> Vec<InvalidItemRef> {
        match self {
            Self::Wrapped { invalid_items } => invalid_items,
            Self::Bare(items) => items,
        }
    }
}

/// `GET /session-user` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// `GET /products/{productId}` response of the catalog read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl From<CatalogProduct> for ProductSnapshot {
    fn from(product: CatalogProduct) -> Self {
        let currency = product
            .currency
            .as_deref()
            .and_then(|code| code.parse::<CurrencyCode>().ok())
            .unwrap_or_default();
        Self {
            name: product.name,
            image_url: product.image,
            price: product.price.map(|amount| Price::new(amount, currency)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_add_request_wire_shape() {
        let body = AddLineRequest {
            product_id: ProductId::from(42),
            quantity: 1,
            variant_id: None,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"productId":"42","quantity":1}"#
        );
    }

    #[test]
    fn test_bulk_delete_wire_shape() {
        let body = BulkDeleteRequest {
            line_ids: vec![LineId::from("a"), LineId::from("b")],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"lineIds":["a","b"]}"#
        );
    }

    #[test]
    fn test_validate_response_accepts_both_shapes() {
        let bare: ValidateResponse =
            serde_json::from_str(r#"[{"productId":7,"variantId":"v1"}]"#).unwrap();
        let wrapped: ValidateResponse =
            serde_json::from_str(r#"{"invalidItems":[{"productId":"7","lineId":"l1"}]}"#).unwrap();
        assert_eq!(bare.into_items()[0].variant_id, Some(VariantId::from("v1")));
        assert_eq!(wrapped.into_items()[0].line_id, Some(LineId::from("l1")));
    }

    #[test]
    fn test_remote_cart_snapshot_prefers_reported_subtotal() {
        let cart: RemoteCart = serde_json::from_str(
            r#"{"items":[{"id":"l1","productId":1,"quantity":2},{"id":"l2","productId":2,"quantity":1}],"subtotal":"12.50","currency":"EUR"}"#,
        )
        .unwrap();
        let snapshot = cart.into_snapshot();
        assert_eq!(snapshot.source, CartSource::Authoritative);
        assert_eq!(snapshot.item_count, 3);
        assert_eq!(snapshot.subtotal.unwrap().display(), "€12.50");
    }

    #[test]
    fn test_catalog_product_to_snapshot() {
        let product: CatalogProduct =
            serde_json::from_str(r#"{"id":42,"name":"Mango","price":"3.00","currency":"USD"}"#)
                .unwrap();
        let snapshot = ProductSnapshot::from(product);
        assert_eq!(snapshot.name, "Mango");
        assert_eq!(snapshot.price.unwrap().display(), "$3.00");
    }
}
