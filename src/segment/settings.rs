//! # Segment-local storage: the settings blob and temporary variables.
//!
//! [`Settings`] is the opaque key/value blob a segment owns exclusively and
//! ships, serialized, inside every trigger event. The segment never interprets
//! it; only the external handler (and the editing surface outside this crate)
//! know what the keys mean. Replacement is wholesale — there is no merge.
//!
//! [`TempVar`] is one capability registration pushed into a segment
//! out-of-band via the registry (see
//! [`SegmentRegistry`](crate::SegmentRegistry)).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque settings blob, stored as a JSON object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    map: Map<String, Value>,
}

impl Settings {
    /// Creates an empty blob.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a blob from a JSON value. Non-object values yield an empty blob.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self { map },
            _ => Self::default(),
        }
    }

    /// Reads one key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Writes one key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.map.insert(key.into(), value);
    }

    /// Wholesale replacement: clear, then copy. No merge semantics.
    pub fn replace(&mut self, other: Settings) {
        self.map = other.map;
    }

    /// Serialized form carried in trigger payloads.
    pub fn to_json(&self) -> String {
        Value::Object(self.map.clone()).to_string()
    }

    /// True if the blob holds no keys.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// One temporary variable registered against a live segment instance.
///
/// Registered, cleared, and assigned exclusively through the registry's
/// out-of-band operations; the segment itself only stores them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempVar {
    /// Stable key the capability provider addresses this variable by.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Help text for editing surfaces.
    pub help: String,
    /// Last assigned value, if any.
    pub value: Option<String>,
}

impl TempVar {
    /// Creates an unset variable.
    pub fn new(key: impl Into<String>, name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            help: help.into(),
            value: None,
        }
    }
}
