//! # Correlated call state: one in-flight call per segment.
//!
//! [`CallState`] is the completion cell shared between exactly two actors:
//! the invoking task (begins the call, waits) and the completion-listener task
//! (delivers replies). Atomics with acquire/release ordering carry the result
//! across; a [`Notify`] wakes the waiter without busy-polling.
//!
//! ## Protocol
//! ```text
//! invoke():                      completion listener:
//!   begin(correlation_id)
//!   publish trigger ─────────────► handler ... reply
//!   wait(timeout, cancel)          deliver(payload)
//!     ├─ notified + complete ◄────── id matches: store result, set complete, notify
//!     ├─ deadline hit  → false       id missing/result missing: warn, discard
//!     └─ cancelled     → false       id stale: discard silently
//! ```
//!
//! ## Rules
//! - One call outstanding per segment at a time; concurrent `begin`/`wait`
//!   pairs on the same state would corrupt correlation tracking and are not
//!   guarded against.
//! - Correlation ids never repeat, so a reply to an already-resolved or
//!   timed-out call can only be discarded, never mismatched.
//! - A late reply that still carries the current pending id (the call timed
//!   out, no new call started) marks the cell complete; the next `begin`
//!   resets it, so the stale result never leaks into a later call.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::events::CompletionPayload;

/// Completion cell for the single in-flight correlated call of one segment.
pub(crate) struct CallState {
    /// Correlation token of the in-flight call; 0 = no call ever started.
    pending: AtomicU64,
    /// Set once a matching reply has been delivered.
    complete: AtomicBool,
    /// The delivered result; meaningless unless `complete` is set.
    result: AtomicBool,
    /// Wakes the waiter when `complete` flips.
    notify: Notify,
}

impl CallState {
    pub(crate) fn new() -> Self {
        Self {
            pending: AtomicU64::new(0),
            complete: AtomicBool::new(false),
            result: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Starts a new call attempt: stores the fresh correlation id and resets
    /// the completion cell.
    pub(crate) fn begin(&self, correlation_id: u64) {
        self.result.store(false, Ordering::Relaxed);
        self.complete.store(false, Ordering::Release);
        self.pending.store(correlation_id, Ordering::Release);
    }

    /// Delivers a completion payload from the listener task.
    ///
    /// Malformed payloads are logged and discarded; stale ids are discarded
    /// silently — that filter is what makes late replies harmless.
    pub(crate) fn deliver(&self, completion: &CompletionPayload) {
        let Some(id) = completion.correlation_id else {
            warn!("completion event missing \"correlation_id\" field");
            return;
        };
        let Some(result) = completion.result else {
            warn!(correlation_id = id, "completion event missing \"result\" field");
            return;
        };
        if id != self.pending.load(Ordering::Acquire) {
            // Stale or foreign reply; expected under normal timeout operation.
            return;
        }
        self.result.store(result, Ordering::Relaxed);
        self.complete.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Waits for the in-flight call to resolve.
    ///
    /// Returns the delivered result on completion, `false` when `timeout`
    /// elapses or `cancel` fires first. A late reply is not waited for.
    pub(crate) async fn wait(&self, timeout: Duration, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking the flag so a delivery between
            // the check and the await cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);

            if self.complete.load(Ordering::Acquire) {
                return self.result.load(Ordering::Relaxed);
            }

            tokio::select! {
                () = &mut notified => {}
                () = time::sleep_until(deadline) => return false,
                () = cancel.cancelled() => return false,
            }
        }
    }
}
