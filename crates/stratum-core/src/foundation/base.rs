//! The static base layer.

use serde::Serialize;
use serde_json::Value;

use super::error::{OverlayError, OverlayResult};
use super::value::{AttributeMap, AttributeValue};

/// Static, lowest-precedence configuration layer.
///
/// Supplied once at construction and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseConfig {
    attributes: AttributeMap,
}

impl BaseConfig {
    /// Creates a base layer from an attribute map.
    pub fn new(attributes: AttributeMap) -> Self {
        Self { attributes }
    }

    /// Creates a base layer from any serializable settings struct.
    ///
    /// The value must serialize to a mapping; its top-level keys become
    /// attribute names.
    pub fn from_serializable<T: Serialize>(settings: &T) -> OverlayResult<Self> {
        match serde_json::to_value(settings) {
            Ok(Value::Object(attributes)) => Ok(Self { attributes }),
            Ok(other) => Err(OverlayError::Decode {
                name: "<base>".to_string(),
                reason: format!("base settings must be a mapping, got {other}"),
            }),
            Err(e) => Err(OverlayError::Decode {
                name: "<base>".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Looks up a single attribute.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Returns every base attribute.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl From<AttributeMap> for BaseConfig {
    fn from(attributes: AttributeMap) -> Self {
        Self::new(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Settings {
        debug: bool,
        timeout_ms: u64,
    }

    #[test]
    fn test_from_serializable() {
        let base = BaseConfig::from_serializable(&Settings {
            debug: false,
            timeout_ms: 300,
        })
        .unwrap();
        assert_eq!(base.get("debug"), Some(&json!(false)));
        assert_eq!(base.get("timeout_ms"), Some(&json!(300)));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_from_serializable_rejects_scalars() {
        let result = BaseConfig::from_serializable(&42);
        assert!(matches!(result, Err(OverlayError::Decode { .. })));
    }
}
