//! # Segment registry: thread-safe roster of live instances.
//!
//! [`SegmentRegistry`] is an explicit, injectable service (no process-wide
//! static): it owns the membership list of currently-live segments and the two
//! monotonic id spaces — instance ids and correlation ids — so that a test can
//! hold its own isolated registry.
//!
//! ## Invariant
//! Membership exactly equals the set of constructed-and-not-yet-dropped
//! segments. A segment is registered *before* its new-instance broadcast fires
//! and stays registered until *after* its deleted-instance broadcast fires, so
//! any listener invoked during either broadcast can still resolve the id.
//!
//! ## Rules
//! - One mutex guards membership changes and id-based lookups; a
//!   scan-and-mutate runs under a single lock hold, so out-of-band operations
//!   never observe a half-added or half-removed entry.
//! - Lookups are linear scans. Ids are unique in practice, but the scan
//!   tolerates duplicates rather than assuming uniqueness.
//! - An id that no longer resolves is a normal outcome: every out-of-band
//!   operation on it is a silent no-op, not an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::instance::SegmentState;
use super::settings::TempVar;

/// Process- or test-scoped roster of live segments.
///
/// Cloned `Arc`s of this registry are handed to every segment built against
/// it; out-of-band callers (capability providers reacting to lifecycle
/// broadcasts) address segments through it by instance id.
pub struct SegmentRegistry {
    entries: Mutex<Vec<Arc<SegmentState>>>,
    instance_seq: AtomicU64,
    call_seq: AtomicU64,
}

impl SegmentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            instance_seq: AtomicU64::new(0),
            call_seq: AtomicU64::new(0),
        })
    }

    /// Allocates the next instance id (starts at 1, never reused).
    pub(crate) fn next_instance_id(&self) -> u64 {
        self.instance_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Allocates the next correlation id (starts at 1, never reused).
    ///
    /// One allocation per call attempt, shared across all instances: no two
    /// concurrently outstanding calls anywhere can share an id.
    pub(crate) fn next_call_id(&self) -> u64 {
        self.call_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Adds a segment to the roster.
    pub(crate) fn register(&self, state: Arc<SegmentState>) {
        self.lock_entries().push(state);
    }

    /// Removes a segment by identity (not by id).
    pub(crate) fn unregister(&self, state: &Arc<SegmentState>) {
        self.lock_entries().retain(|e| !Arc::ptr_eq(e, state));
    }

    /// True if a live segment has this instance id.
    pub fn contains(&self, instance_id: u64) -> bool {
        self.lock_entries()
            .iter()
            .any(|e| e.instance_id == instance_id)
    }

    /// Number of live segments.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// True if no segment is live.
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Applies `f` to every entry with the given id under one lock hold.
    pub(crate) fn for_each_matching(&self, instance_id: u64, mut f: impl FnMut(&SegmentState)) {
        let entries = self.lock_entries();
        for entry in entries.iter().filter(|e| e.instance_id == instance_id) {
            f(entry);
        }
    }

    /// Registers a temp variable against the segment with this id.
    ///
    /// Replaces an existing variable with the same key. Silent no-op if the id
    /// does not resolve (segment already destroyed, or never existed).
    pub fn register_temp_var(
        &self,
        instance_id: u64,
        key: impl Into<String>,
        name: impl Into<String>,
        help: impl Into<String>,
    ) {
        let var = TempVar::new(key, name, help);
        self.for_each_matching(instance_id, |state| {
            let mut vars = state.lock_temp_vars();
            if let Some(existing) = vars.iter_mut().find(|v| v.key == var.key) {
                *existing = var.clone();
            } else {
                vars.push(var.clone());
            }
        });
    }

    /// Clears every temp variable of the segment with this id. Silent no-op on
    /// an unresolved id.
    pub fn deregister_all_temp_vars(&self, instance_id: u64) {
        self.for_each_matching(instance_id, |state| {
            state.lock_temp_vars().clear();
        });
    }

    /// Assigns a value to one temp variable of the segment with this id.
    /// Silent no-op on an unresolved id or an unknown key.
    pub fn set_temp_var_value(
        &self,
        instance_id: u64,
        key: &str,
        value: impl Into<String>,
    ) {
        let value = value.into();
        self.for_each_matching(instance_id, |state| {
            let mut vars = state.lock_temp_vars();
            if let Some(var) = vars.iter_mut().find(|v| v.key == key) {
                var.value = Some(value.clone());
            }
        });
    }

    /// Snapshot of the temp variables of the segment with this id, or `None`
    /// if the id does not resolve.
    pub fn temp_vars(&self, instance_id: u64) -> Option<Vec<TempVar>> {
        let mut snapshot = None;
        self.for_each_matching(instance_id, |state| {
            snapshot.get_or_insert_with(|| state.lock_temp_vars().clone());
        });
        snapshot
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<Arc<SegmentState>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
