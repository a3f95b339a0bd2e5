//! Expiry Rows

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// Value of the `source` attribute on every row this crate writes
pub const SOURCE_TAG: &str = "neptuneStreams";

/// Kind of graph element a TTL applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Vertex,
    Edge,
}

impl ElementType {
    /// Map a stream property type (`vp`, `ep`) to its element
    pub fn from_property_type(property_type: &str) -> Option<Self> {
        match property_type {
            "vp" => Some(ElementType::Vertex),
            "ep" => Some(ElementType::Edge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Vertex => "vertex",
            ElementType::Edge => "edge",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the expiry table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryEntry {
    #[serde(rename = "ObjectId")]
    pub object_id: String,
    #[serde(rename = "ObjectType")]
    pub object_type: ElementType,
    /// Expiry as a numeric epoch timestamp
    #[serde(rename = "TTL")]
    pub ttl: Number,
    pub source: String,
}

impl ExpiryEntry {
    pub fn new(object_id: impl Into<String>, object_type: ElementType, ttl: Number) -> Self {
        Self {
            object_id: object_id.into(),
            object_type,
            ttl,
            source: SOURCE_TAG.to_string(),
        }
    }

    /// Interpret a property value as a TTL.
    ///
    /// JSON numbers pass through; strings are accepted when they hold a
    /// decimal number. Anything else is `None`.
    pub fn ttl_from_value(value: &Value) -> Option<Number> {
        match value {
            Value::Number(n) => Some(n.clone()),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Some(Number::from(i))
                } else if let Ok(u) = s.parse::<u64>() {
                    Some(Number::from(u))
                } else {
                    s.parse::<f64>().ok().and_then(Number::from_f64)
                }
            }
            _ => None,
        }
    }

    /// Table key; a later write with the same key replaces the row
    pub fn key(&self) -> (&str, ElementType) {
        (&self.object_id, self.object_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_type_mapping() {
        assert_eq!(
            ElementType::from_property_type("vp"),
            Some(ElementType::Vertex)
        );
        assert_eq!(
            ElementType::from_property_type("ep"),
            Some(ElementType::Edge)
        );
        assert_eq!(ElementType::from_property_type("vl"), None);
        assert_eq!(ElementType::from_property_type("e"), None);
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = ExpiryEntry::new("v1", ElementType::Vertex, Number::from(1700000000));
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "ObjectId": "v1",
                "ObjectType": "vertex",
                "TTL": 1700000000,
                "source": "neptuneStreams"
            })
        );
    }

    #[test]
    fn test_ttl_from_value() {
        assert_eq!(
            ExpiryEntry::ttl_from_value(&json!(1700000000)),
            Some(Number::from(1700000000))
        );
        assert_eq!(
            ExpiryEntry::ttl_from_value(&json!(" 1700000000 ")),
            Some(Number::from(1700000000))
        );
        assert_eq!(
            ExpiryEntry::ttl_from_value(&json!("1.5"))
                .and_then(|n| n.as_f64()),
            Some(1.5)
        );
        assert_eq!(ExpiryEntry::ttl_from_value(&json!("tomorrow")), None);
        assert_eq!(ExpiryEntry::ttl_from_value(&Value::Null), None);
        assert_eq!(ExpiryEntry::ttl_from_value(&json!({"v": 1})), None);
    }

    #[test]
    fn test_entry_key() {
        let entry = ExpiryEntry::new("e1", ElementType::Edge, Number::from_f64(10.9).unwrap());
        assert_eq!(entry.key(), ("e1", ElementType::Edge));
    }
}
