//! Nested configuration values.
//!
//! Everything the daemon stores or merges is either a scalar string or an
//! ordered mapping of further values. Sequences are rejected at the edge so
//! the merge and render code can match exhaustively.

use indexmap::IndexMap;
use thiserror::Error;

/// Ordered mapping of keys to nested values.
pub type Map = IndexMap<String, Value>;

/// A scalar or a mapping of mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Leaf text. JSON numbers, booleans and `null` land here as text.
    Scalar(String),
    /// Nested keys in document order.
    Mapping(Map),
}

/// Errors raised when converting foreign documents into [`Value`].
#[derive(Error, Debug)]
pub enum ValueError {
    #[error("Sequences are not supported (at '{path}')")]
    Sequence { path: String },

    #[error("Expected a mapping at the top level")]
    NotMapping,

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Value {
    /// Empty mapping.
    pub fn mapping() -> Self {
        Value::Mapping(Map::new())
    }

    /// Scalar holding `s`.
    pub fn scalar(s: impl Into<String>) -> Self {
        Value::Scalar(s.into())
    }

    pub fn as_mapping(&self) -> Option<&Map> {
        match self {
            Value::Mapping(map) => Some(map),
            Value::Scalar(_) => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Mapping(map) => Some(map),
            Value::Scalar(_) => None,
        }
    }

    /// Text of a scalar, `None` for a mapping.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::Mapping(_) => None,
        }
    }

    /// Turns a scalar into an empty mapping and returns the mapping.
    pub fn make_mapping(&mut self) -> &mut Map {
        match self {
            Value::Mapping(map) => map,
            Value::Scalar(_) => {
                *self = Value::mapping();
                self.make_mapping()
            }
        }
    }

    /// Follows a `/`-separated path of mapping keys.
    ///
    /// An empty path returns `self`. Missing keys and attempts to descend
    /// into a scalar both yield `None`.
    pub fn traverse(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('/').try_fold(self, |current, segment| match current {
            Value::Mapping(map) => map.get(segment),
            Value::Scalar(_) => None,
        })
    }

    /// Converts a JSON document, rejecting arrays anywhere in the tree.
    pub fn from_json(json: serde_json::Value) -> Result<Self, ValueError> {
        from_json_at(json, "")
    }

    /// Parses JSON text and converts it.
    pub fn from_json_str(text: &str) -> Result<Self, ValueError> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json(json)
    }

    /// Renders back into JSON, keeping key order.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Scalar(s) => serde_json::Value::String(s.clone()),
            Value::Mapping(map) => serde_json::Value::Object(map_to_json(map)),
        }
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Mapping(map)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

fn from_json_at(json: serde_json::Value, path: &str) -> Result<Value, ValueError> {
    match json {
        serde_json::Value::Null => Ok(Value::Scalar(String::new())),
        serde_json::Value::Bool(b) => Ok(Value::Scalar(b.to_string())),
        serde_json::Value::Number(n) => Ok(Value::Scalar(n.to_string())),
        serde_json::Value::String(s) => Ok(Value::Scalar(s)),
        serde_json::Value::Array(_) => Err(ValueError::Sequence {
            path: path.to_string(),
        }),
        serde_json::Value::Object(obj) => {
            let mut map = Map::with_capacity(obj.len());
            for (key, child) in obj {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}/{}", path, key)
                };
                let value = from_json_at(child, &child_path)?;
                map.insert(key, value);
            }
            Ok(Value::Mapping(map))
        }
    }
}

/// Converts a top-level JSON object into a [`Map`].
pub fn map_from_json(json: serde_json::Value) -> Result<Map, ValueError> {
    match Value::from_json(json)? {
        Value::Mapping(map) => Ok(map),
        Value::Scalar(_) => Err(ValueError::NotMapping),
    }
}

/// Converts a [`Map`] into a JSON object, keeping key order.
pub fn map_to_json(map: &Map) -> serde_json::Map<String, serde_json::Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

/// Deep merge `overlay` into `base`.
///
/// Merge semantics:
/// - Mapping onto mapping: merge by key (recursive)
/// - Anything else: overlay wins (scalar replaces mapping and vice versa)
/// - Keys only present in the overlay are appended in overlay order
pub fn deep_merge(base: &mut Map, overlay: &Map) {
    for (key, overlay_value) in overlay {
        match (base.get_mut(key), overlay_value) {
            (Some(Value::Mapping(base_map)), Value::Mapping(overlay_map)) => {
                deep_merge(base_map, overlay_map);
            }
            (Some(slot), _) => {
                *slot = overlay_value.clone();
            }
            (None, _) => {
                base.insert(key.clone(), overlay_value.clone());
            }
        }
    }
}
