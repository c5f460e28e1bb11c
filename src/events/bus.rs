//! # Event bus: broadcast channel with named-channel filtering.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that stamps
//! every published event with a monotonic sequence number and fans it out to
//! two kinds of consumers:
//!
//! ```text
//! Publishers (many):                     Consumers:
//!   segment A  ──┐
//!   segment B  ──┼──► Bus ──┬──► async receivers (broadcast, channel-filtered)
//!   runner  X  ──┘          └──► sync listeners (invoked inline on publish)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks and never awaits.
//! - **Broadcast semantics**: zero, one, or many receivers per event; an event
//!   with no receivers is simply dropped.
//! - **Lag handling**: slow async receivers observe `Lagged(n)`, log a warning,
//!   and continue with the newest events.
//! - **Sync listeners** run on the publishing thread, after the async send,
//!   with the listener lock released — a listener may publish or unregister
//!   itself from its own callback without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use tokio::sync::broadcast;
use tracing::warn;

use super::event::{Event, Payload};

/// Broadcast bus for channel-addressed events.
///
/// Cheap to clone; all clones share the same channel, sequence counter, and
/// synchronous listener registry.
#[derive(Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    listeners: Arc<Listeners>,
    seq: Arc<AtomicU64>,
    capacity: usize,
}

impl Bus {
    /// Creates a new bus with the given broadcast capacity (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self {
            tx,
            listeners: Arc::new(Listeners::default()),
            seq: Arc::new(AtomicU64::new(0)),
            capacity,
        }
    }

    /// Publishes a payload on the named channel.
    ///
    /// Stamps the event with the next sequence number and the current time,
    /// broadcasts it to async receivers, then invokes synchronous listeners
    /// inline. Returns the number of async receivers that got the event.
    pub fn publish(&self, channel: impl Into<Arc<str>>, payload: Payload) -> usize {
        let event = Event {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            at: SystemTime::now(),
            channel: channel.into(),
            payload,
        };

        // Async receivers first, so they never wait on sync listeners.
        let count = self.tx.send(event.clone()).unwrap_or(0);
        self.listeners.notify(&event);
        count
    }

    /// Creates a receiver observing every subsequent event.
    pub fn subscribe(&self) -> ChannelReceiver {
        ChannelReceiver::new(self.tx.subscribe(), None)
    }

    /// Creates a receiver observing only events on the named channel.
    ///
    /// The subscription exists as soon as this returns; events published
    /// afterwards are guaranteed to be visible to the receiver.
    pub fn subscribe_channel(&self, channel: impl Into<Arc<str>>) -> ChannelReceiver {
        ChannelReceiver::new(self.tx.subscribe(), Some(channel.into()))
    }

    /// Registers a synchronous listener, invoked inline on every publish.
    pub fn add_listener(&self, listener: Arc<dyn BusListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Removes a previously registered synchronous listener.
    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    /// Number of currently registered synchronous listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Broadcast ring buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Clone for Bus {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            listeners: Arc::clone(&self.listeners),
            seq: Arc::clone(&self.seq),
            capacity: self.capacity,
        }
    }
}

/// Synchronous bus listener, invoked on the publishing thread.
///
/// Callbacks must not block: they run inside every `publish()` on the bus.
/// They are the only consumers that can populate the response slot of a
/// properties request before the requester reads it back, and the only ones
/// guaranteed to observe a deleted-instance event while the instance is still
/// registered.
pub trait BusListener: Send + Sync + 'static {
    /// Called once per published event.
    fn on_event(&self, event: &Event);
}

/// Handle identifying a registered synchronous listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    entries: RwLock<Vec<(ListenerId, Arc<dyn BusListener>)>>,
    next: AtomicU64,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

impl Listeners {
    fn add(&self, listener: Arc<dyn BusListener>) -> ListenerId {
        let id = ListenerId(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn remove(&self, id: ListenerId) {
        // Drop the removed Arc outside the lock: its destructor may publish.
        let removed: Vec<_> = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let mut kept = Vec::with_capacity(entries.len());
            let mut gone = Vec::new();
            for entry in entries.drain(..) {
                if entry.0 == id {
                    gone.push(entry);
                } else {
                    kept.push(entry);
                }
            }
            *entries = kept;
            gone
        };
        drop(removed);
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, event: &Event) {
        // Snapshot under the read lock, call with the lock released, so a
        // listener may publish or unregister from within its callback.
        let snapshot: Vec<Arc<dyn BusListener>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener.on_event(event);
        }
    }
}

/// Synchronous listener that only fires for one channel.
///
/// Convenience wrapper pairing a channel name with a closure.
pub struct FilterListener<F> {
    channel: Arc<str>,
    f: F,
}

impl<F> FilterListener<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    /// Creates a listener that invokes `f` for events on `channel` only.
    pub fn new(channel: impl Into<Arc<str>>, f: F) -> Self {
        Self {
            channel: channel.into(),
            f,
        }
    }
}

impl<F> BusListener for FilterListener<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event) {
        if event.channel == self.channel {
            (self.f)(event);
        }
    }
}

/// Async receiver for bus events, optionally filtered to one channel.
pub struct ChannelReceiver {
    rx: broadcast::Receiver<Event>,
    channel: Option<Arc<str>>,
}

impl ChannelReceiver {
    fn new(rx: broadcast::Receiver<Event>, channel: Option<Arc<str>>) -> Self {
        Self { rx, channel }
    }

    fn matches(&self, event: &Event) -> bool {
        match &self.channel {
            Some(channel) => event.channel == *channel,
            None => true,
        }
    }

    /// Receives the next matching event.
    ///
    /// Returns `None` when the bus is gone. Lag is logged and skipped over.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus receiver lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receives the next matching event without blocking, if one is queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus receiver lagged, events dropped");
                }
                Err(
                    broadcast::error::TryRecvError::Empty
                    | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::CompletionPayload;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn completion(id: u64) -> Payload {
        Payload::Completion(CompletionPayload::reply(id, true))
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();

        let count = bus.publish("a", completion(1));
        assert_eq!(count, 1);

        let ev = rx.recv().await.unwrap();
        assert!(ev.is_on("a"));
        assert_eq!(ev.as_completion().unwrap().correlation_id, Some(1));
    }

    #[tokio::test]
    async fn no_receivers_is_fine() {
        let bus = Bus::new(16);
        assert_eq!(bus.publish("a", completion(1)), 0);
    }

    #[tokio::test]
    async fn channel_filter_skips_other_channels() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe_channel("wanted");

        bus.publish("other", completion(1));
        bus.publish("wanted", completion(2));

        let ev = rx.recv().await.unwrap();
        assert!(ev.is_on("wanted"));
        assert_eq!(ev.as_completion().unwrap().correlation_id, Some(2));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn seq_is_monotonic_across_clones() {
        let bus = Bus::new(16);
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        bus.publish("a", completion(1));
        clone.publish("a", completion(2));
        bus.publish("a", completion(3));

        let mut prev = None;
        for _ in 0..3 {
            let ev = rx.recv().await.unwrap();
            if let Some(p) = prev {
                assert!(ev.seq > p, "seq must increase: {} then {}", p, ev.seq);
            }
            prev = Some(ev.seq);
        }
    }

    #[tokio::test]
    async fn sync_listener_runs_inline() {
        let bus = Bus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in = Arc::clone(&seen);

        bus.add_listener(Arc::new(FilterListener::new("a", move |_ev: &Event| {
            seen_in.fetch_add(1, Ordering::SeqCst);
        })));

        bus.publish("a", completion(1));
        bus.publish("b", completion(2));

        // No await needed: listeners run during publish.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn removed_listener_stops_firing() {
        let bus = Bus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in = Arc::clone(&seen);

        let id = bus.add_listener(Arc::new(FilterListener::new("a", move |_ev: &Event| {
            seen_in.fetch_add(1, Ordering::SeqCst);
        })));
        bus.publish("a", completion(1));
        bus.remove_listener(id);
        bus.publish("a", completion(2));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn listener_may_unregister_itself_from_callback() {
        struct OneShot {
            bus: Bus,
            my_id: Mutex<Option<ListenerId>>,
            fired: AtomicUsize,
        }

        impl BusListener for OneShot {
            fn on_event(&self, _event: &Event) {
                self.fired.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *self.my_id.lock().unwrap() {
                    self.bus.remove_listener(id);
                }
            }
        }

        let bus = Bus::new(16);
        let listener = Arc::new(OneShot {
            bus: bus.clone(),
            my_id: Mutex::new(None),
            fired: AtomicUsize::new(0),
        });
        let id = bus.add_listener(Arc::clone(&listener) as Arc<dyn BusListener>);
        *listener.my_id.lock().unwrap() = Some(id);

        // Must not deadlock, and the second publish must not fire it again.
        bus.publish("a", completion(1));
        bus.publish("a", completion(2));
        assert_eq!(listener.fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_may_publish_from_callback() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe_channel("echo");

        let bus_in = bus.clone();
        bus.add_listener(Arc::new(FilterListener::new("ping", move |_ev: &Event| {
            bus_in.publish("echo", completion(99));
        })));

        bus.publish("ping", completion(1));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.as_completion().unwrap().correlation_id, Some(99));
    }
}
