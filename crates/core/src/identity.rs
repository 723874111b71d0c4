//! Line identity resolution.
//!
//! Two cart lines are the same line when they reference the same product and
//! the same variant selection. Variant selections are arbitrary nested JSON
//! objects, so equality is decided on a canonical key rather than on the raw
//! value:
//!
//! - the key keeps the nesting of the selection, so an option named
//!   `size.eu` never equals `size` holding an object with an `eu` field,
//! - object fields are kept sorted, so field order never matters,
//! - `null` object fields are dropped (an unset field and a missing field are
//!   equal), while empty objects and arrays are values in their own right,
//! - the denormalized `price`/`stock` snapshot is ignored,
//! - a selection with no variant id and no options is the same as no selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{CartLineItem, ProductId, VariantId, VariantSelection};

/// Canonical form of one option value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    /// A JSON scalar in its serialized form, so `"500"` and `500` differ.
    Scalar(String),
    Map(BTreeMap<String, OptionValue>),
    List(Vec<OptionValue>),
}

impl OptionValue {
    /// Canonicalize a JSON value. Returns `None` for `null`.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Object(map) => Some(Self::Map(canonical_map(map))),
            // Positions matter in a list, so a null element stays a value.
            serde_json::Value::Array(items) => Some(Self::List(
                items
                    .iter()
                    .map(|item| {
                        Self::from_json(item).unwrap_or_else(|| Self::Scalar("null".to_string()))
                    })
                    .collect(),
            )),
            scalar => Some(Self::Scalar(scalar.to_string())),
        }
    }
}

fn canonical_map<'a>(
    fields: impl IntoIterator<Item = (&'a String, &'a serde_json::Value)>,
) -> BTreeMap<String, OptionValue> {
    fields
        .into_iter()
        .filter_map(|(name, value)| OptionValue::from_json(value).map(|v| (name.clone(), v)))
        .collect()
}

/// Canonical, order-independent form of a [`VariantSelection`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    variant_id: Option<VariantId>,
    options: BTreeMap<String, OptionValue>,
}

impl VariantKey {
    /// The backend variant id, if the selection named one.
    #[must_use]
    pub const fn variant_id(&self) -> Option<&VariantId> {
        self.variant_id.as_ref()
    }

    /// Canonical options by name.
    #[must_use]
    pub const fn options(&self) -> &BTreeMap<String, OptionValue> {
        &self.options
    }
}

/// Identity of a cart line: product plus canonical variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub product_id: ProductId,
    pub variant: Option<VariantKey>,
}

impl IdentityKey {
    #[must_use]
    pub fn new(product_id: ProductId, variant: Option<&VariantSelection>) -> Self {
        Self {
            product_id,
            variant: canonicalize(variant),
        }
    }
}

/// Produce the canonical key of a variant selection.
///
/// Returns `None` for a missing selection and for a blank one.
#[must_use]
pub fn canonicalize(selection: Option<&VariantSelection>) -> Option<VariantKey> {
    let selection = selection?;
    let options = canonical_map(&selection.options);

    if selection.variant_id.is_none() && options.is_empty() {
        return None;
    }

    Some(VariantKey {
        variant_id: selection.variant_id.clone(),
        options,
    })
}

/// Identity key of a line.
#[must_use]
pub fn identity_key(line: &CartLineItem) -> IdentityKey {
    IdentityKey::new(line.product_id.clone(), line.variant.as_ref())
}

/// Whether two lines share an identity key.
#[must_use]
pub fn matches(a: &CartLineItem, b: &CartLineItem) -> bool {
    a.product_id == b.product_id
        && canonicalize(a.variant.as_ref()) == canonicalize(b.variant.as_ref())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::types::{CurrencyCode, Price};

    fn line(product: i64, variant: Option<VariantSelection>) -> CartLineItem {
        CartLineItem::guest(ProductId::from(product), 1, variant, None)
    }

    fn selection(options: serde_json::Value) -> VariantSelection {
        serde_json::from_value(json!({ "options": options })).unwrap()
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a: VariantSelection = serde_json::from_str(
            r##"{"options":{"color":{"name":"red","hex":"#f00"},"size":"M"}}"##,
        )
        .unwrap();
        let b: VariantSelection = serde_json::from_str(
            r##"{"options":{"size":"M","color":{"hex":"#f00","name":"red"}}}"##,
        )
        .unwrap();
        assert_eq!(canonicalize(Some(&a)), canonicalize(Some(&b)));
        assert!(matches(&line(7, Some(a)), &line(7, Some(b))));
    }

    #[test]
    fn test_different_options_are_distinct() {
        let red = line(7, Some(selection(json!({"color": "red"}))));
        let blue = line(7, Some(selection(json!({"color": "blue"}))));
        assert!(!matches(&red, &blue));
    }

    #[test]
    fn test_missing_variant_is_distinct_identity() {
        let plain = line(7, None);
        let red = line(7, Some(selection(json!({"color": "red"}))));
        assert!(!matches(&plain, &red));
        assert!(matches(&plain, &line(7, None)));
    }

    #[test]
    fn test_blank_selection_equals_no_selection() {
        assert_eq!(canonicalize(Some(&VariantSelection::default())), None);
        assert!(matches(&line(1, Some(VariantSelection::default())), &line(1, None)));
    }

    #[test]
    fn test_null_leaves_are_ignored() {
        let a = selection(json!({"color": "red", "size": null}));
        let b = selection(json!({"color": "red"}));
        assert_eq!(canonicalize(Some(&a)), canonicalize(Some(&b)));
    }

    #[test]
    fn test_snapshot_fields_do_not_affect_identity() {
        let a = VariantSelection {
            price: Some(Price::new(Decimal::from(5), CurrencyCode::USD)),
            stock: Some(3),
            ..VariantSelection::by_id("v1")
        };
        let b = VariantSelection {
            price: Some(Price::new(Decimal::from(9), CurrencyCode::USD)),
            stock: Some(0),
            ..VariantSelection::by_id("v1")
        };
        assert_eq!(canonicalize(Some(&a)), canonicalize(Some(&b)));
    }

    #[test]
    fn test_string_and_number_values_differ() {
        let a = selection(json!({"weight": "500"}));
        let b = selection(json!({"weight": 500}));
        assert_ne!(canonicalize(Some(&a)), canonicalize(Some(&b)));
    }

    #[test]
    fn test_dotted_option_name_is_not_a_nested_path() {
        let dotted = selection(json!({"size.eu": "42"}));
        let nested = selection(json!({"size": {"eu": "42"}}));
        assert_ne!(canonicalize(Some(&dotted)), canonicalize(Some(&nested)));
        assert!(!matches(&line(7, Some(dotted)), &line(7, Some(nested))));
    }

    #[test]
    fn test_list_index_is_not_an_option_name() {
        let listed = selection(json!({"tags": ["a"]}));
        let named = selection(json!({"tags[0]": "a"}));
        assert_ne!(canonicalize(Some(&listed)), canonicalize(Some(&named)));
    }

    #[test]
    fn test_empty_containers_are_values() {
        let empty_object = selection(json!({"engraving": {}}));
        let empty_list = selection(json!({"engraving": []}));
        let key = canonicalize(Some(&empty_object)).unwrap();
        assert_eq!(
            key.options().get("engraving"),
            Some(&OptionValue::Map(BTreeMap::new()))
        );
        assert_ne!(canonicalize(Some(&empty_list)), Some(key));
        assert!(!matches(&line(7, Some(empty_object)), &line(7, None)));
    }

    #[test]
    fn test_null_list_elements_keep_their_position() {
        let a = selection(json!({"parts": [null, "x"]}));
        let b = selection(json!({"parts": ["x"]}));
        assert_ne!(canonicalize(Some(&a)), canonicalize(Some(&b)));
    }

    #[test]
    fn test_different_products_never_match() {
        assert!(!matches(&line(1, None), &line(2, None)));
        assert_ne!(identity_key(&line(1, None)), identity_key(&line(2, None)));
    }
}
