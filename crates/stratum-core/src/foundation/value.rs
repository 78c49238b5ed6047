//! Attribute values and the merge rules shared by every layer.
//!
//! Values are plain JSON documents. Mappings merge recursively; scalars and
//! sequences are replaced wholesale.

use serde_json::{Map, Value};

/// A configuration value: scalar, ordered sequence or mapping.
pub type AttributeValue = Value;

/// A mapping from attribute name to value.
pub type AttributeMap = Map<String, Value>;

/// Returns whether `value` counts as set by its own emptiness convention.
///
/// `null`, `false`, zero, the empty string, the empty sequence and the empty
/// mapping are falsy; everything else is truthy.
pub fn is_truthy(value: &AttributeValue) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_none_or(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Recursively merges `overlay` into `target`.
///
/// For every key of `overlay`: when both sides hold mappings they are merged
/// recursively, otherwise the overlay value replaces the target value.
pub fn deep_merge(target: &mut AttributeMap, overlay: &AttributeMap) {
    for (key, incoming) in overlay {
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                deep_merge(existing, nested);
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

/// Applies `overlay` on top of `working`: deep merge when both are mappings,
/// wholesale replacement otherwise.
pub fn apply_override(working: &mut AttributeValue, overlay: &AttributeValue) {
    match (working, overlay) {
        (Value::Object(target), Value::Object(nested)) => deep_merge(target, nested),
        (slot, _) => *slot = overlay.clone(),
    }
}
