//! # Property descriptors and the synchronous response slot.
//!
//! A segment has no idea what its settings blob means; the external handler
//! does. [`PropertyDescriptor`] is the handler's typed description of the
//! editable fields, and [`PropertySlot`] is the response cell a
//! properties-request event carries so that a synchronous listener can hand a
//! descriptor back to the requesting thread before `publish()` returns.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Kind of a single editable property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    Text,
    List,
}

/// One editable field in a segment's settings blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyField {
    /// Key in the settings blob this field maps to.
    pub key: String,
    /// Human-readable label.
    pub label: String,
    /// Field kind.
    pub kind: PropertyKind,
}

impl PropertyField {
    /// Creates a field description.
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
        }
    }
}

/// Typed description of a segment's editable properties.
///
/// Produced by whatever answers the properties-request channel; consumed by
/// editing surfaces outside this crate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Ordered list of editable fields.
    pub fields: Vec<PropertyField>,
}

impl PropertyDescriptor {
    /// Creates a descriptor from a list of fields.
    pub fn new(fields: Vec<PropertyField>) -> Self {
        Self { fields }
    }
}

/// Response slot carried inside a properties-request event.
///
/// Cloneable so it can ride a broadcast channel; all clones share one cell.
/// Only listeners invoked synchronously during `publish()` can populate the
/// slot in time for the requester's immediate read-back.
#[derive(Clone, Debug, Default)]
pub struct PropertySlot {
    cell: Arc<Mutex<Option<PropertyDescriptor>>>,
}

impl PropertySlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the slot. The first writer wins; returns `false` if a
    /// descriptor was already present.
    pub fn fill(&self, descriptor: PropertyDescriptor) -> bool {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if cell.is_some() {
            return false;
        }
        *cell = Some(descriptor);
        true
    }

    /// Takes the descriptor out of the slot, leaving it empty.
    pub fn take(&self) -> Option<PropertyDescriptor> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// True if a descriptor is currently present.
    pub fn is_filled(&self) -> bool {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
