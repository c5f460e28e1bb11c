//! # ScriptSegment: a macro segment that delegates evaluation over the bus.
//!
//! One [`ScriptSegment`] stands in for a condition or action node whose actual
//! logic lives in a decoupled external handler. Evaluating the segment
//! ([`invoke`](ScriptSegment::invoke)) publishes a trigger event and blocks —
//! bounded by the segment's timeout and an external cancellation token — until
//! a completion event with the matching correlation id arrives.
//!
//! ## Lifecycle
//! ```text
//! builder().build()
//!   ├─► validate timeout + channel names
//!   ├─► allocate instance id (registry counter)
//!   ├─► subscribe completion channel        (before registration: no trigger
//!   ├─► register with the registry           can race ahead of visibility)
//!   ├─► spawn completion-listener task
//!   └─► publish InstanceCreated from a detached task
//!
//! drop()
//!   ├─► publish InstanceDeleted synchronously (instance still registered:
//!   │     sync listeners can release resources keyed by the id)
//!   ├─► unregister
//!   └─► stop the completion listener
//! ```
//!
//! The created/deleted asymmetry is deliberate: a creation listener that
//! itself constructs or mutates segments must not deadlock against or
//! re-enter the constructor, while deletion listeners need a deterministic
//! last look at the id before it goes invalid.
//!
//! ## Concurrency
//! At most one `invoke()` per segment at a time; issuing two concurrently
//! corrupts correlation tracking for this segment and is not guarded
//! against. Distinct segments may invoke freely in parallel —
//! correlation ids are globally unique, so completions cannot cross wires
//! even when two segments share a completion channel name.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Channels;
use crate::error::SegmentError;
use crate::events::{Bus, ChannelReceiver, Payload, PropertiesRequest, TriggerPayload};
use crate::properties::{PropertyDescriptor, PropertySlot};
use crate::segment::call::CallState;
use crate::segment::registry::SegmentRegistry;
use crate::segment::settings::{Settings, TempVar};

/// Shared per-instance state; the registry holds the same `Arc` the public
/// handle owns, which is what lets out-of-band callers mutate a live segment.
pub(crate) struct SegmentState {
    /// Stable, never-reused identity of this instance.
    pub(crate) instance_id: u64,
    settings: Mutex<Settings>,
    temp_vars: Mutex<Vec<TempVar>>,
    timeout: Mutex<Duration>,
    pub(crate) call: CallState,
}

impl SegmentState {
    pub(crate) fn new(instance_id: u64, settings: Settings, timeout: Duration) -> Self {
        Self {
            instance_id,
            settings: Mutex::new(settings),
            temp_vars: Mutex::new(Vec::new()),
            timeout: Mutex::new(timeout),
            call: CallState::new(),
        }
    }

    pub(crate) fn lock_settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_temp_vars(&self) -> MutexGuard<'_, Vec<TempVar>> {
        self.temp_vars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timeout(&self) -> MutexGuard<'_, Duration> {
        self.timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`ScriptSegment`]; obtained via [`ScriptSegment::builder`].
pub struct ScriptSegmentBuilder {
    bus: Bus,
    registry: Arc<SegmentRegistry>,
    channels: Channels,
    timeout: Duration,
    defaults: Settings,
}

impl ScriptSegmentBuilder {
    /// Sets the bound on how long one correlated call may block.
    /// Must be positive; validated by [`build`](Self::build).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Seeds the settings blob from a JSON value (objects only; anything else
    /// yields an empty blob).
    pub fn default_settings(mut self, value: serde_json::Value) -> Self {
        self.defaults = Settings::from_value(value);
        self
    }

    /// Validates the configuration and brings the segment live: registered,
    /// listening on its completion channel, and announced.
    pub fn build(self) -> Result<ScriptSegment, SegmentError> {
        if self.timeout.is_zero() {
            return Err(SegmentError::ZeroTimeout);
        }
        self.channels.validate()?;
        Ok(ScriptSegment::attach(
            self.bus,
            self.registry,
            self.channels,
            self.timeout,
            self.defaults,
        ))
    }
}

/// One condition/action delegate, live on the bus for its whole lifetime.
pub struct ScriptSegment {
    state: Arc<SegmentState>,
    channels: Channels,
    bus: Bus,
    registry: Arc<SegmentRegistry>,
    listener_stop: CancellationToken,
}

impl fmt::Debug for ScriptSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptSegment")
            .field("instance_id", &self.state.instance_id)
            .finish_non_exhaustive()
    }
}

impl ScriptSegment {
    /// Starts building a segment bound to the given bus, registry, and
    /// channel set. The default timeout is [`Config::default`](crate::Config)'s.
    pub fn builder(
        bus: Bus,
        registry: Arc<SegmentRegistry>,
        channels: Channels,
    ) -> ScriptSegmentBuilder {
        ScriptSegmentBuilder {
            bus,
            registry,
            channels,
            timeout: crate::Config::default().timeout,
            defaults: Settings::new(),
        }
    }

    fn attach(
        bus: Bus,
        registry: Arc<SegmentRegistry>,
        channels: Channels,
        timeout: Duration,
        settings: Settings,
    ) -> Self {
        let instance_id = registry.next_instance_id();
        let state = Arc::new(SegmentState::new(instance_id, settings, timeout));

        // Subscribe before registering: once the segment is discoverable, a
        // trigger answered instantly must already have a listening receiver.
        let rx = bus.subscribe_channel(Arc::clone(&channels.completion));
        registry.register(Arc::clone(&state));

        let listener_stop = CancellationToken::new();
        Self::spawn_completion_listener(rx, Arc::clone(&state), listener_stop.clone());
        Self::announce_created(&bus, &channels, instance_id);

        Self {
            state,
            channels,
            bus,
            registry,
            listener_stop,
        }
    }

    /// Listener task, one per segment, alive until the segment drops.
    fn spawn_completion_listener(
        mut rx: ChannelReceiver,
        state: Arc<SegmentState>,
        stop: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => {
                            if let Payload::Completion(completion) = &event.payload {
                                state.call.deliver(completion);
                            }
                        }
                        None => break,
                    }
                }
            }
        });
    }

    /// Publishes `InstanceCreated` from a detached task, off the constructor's
    /// call stack, so a listener constructing or mutating segments cannot
    /// deadlock against or re-enter the caller.
    fn announce_created(bus: &Bus, channels: &Channels, instance_id: u64) {
        let bus = bus.clone();
        let channel = Arc::clone(&channels.new_instance);
        tokio::spawn(async move {
            bus.publish(channel, Payload::InstanceCreated { instance_id });
        });
    }

    /// Stable identity of this instance; distinct even across clones.
    pub fn instance_id(&self) -> u64 {
        self.state.instance_id
    }

    /// Current per-call timeout.
    pub fn timeout(&self) -> Duration {
        *self.state.lock_timeout()
    }

    /// Replaces the per-call timeout. Zero durations are ignored; the bound
    /// must stay positive.
    pub fn set_timeout(&self, timeout: Duration) {
        if timeout.is_zero() {
            return;
        }
        *self.state.lock_timeout() = timeout;
    }

    /// Snapshot of the settings blob.
    pub fn settings(&self) -> Settings {
        self.state.lock_settings().clone()
    }

    /// Wholesale-replaces the settings blob (clear, then copy). Partial
    /// updates are not possible through this path.
    pub fn apply_settings(&self, new_settings: Settings) {
        self.state.lock_settings().replace(new_settings);
    }

    /// Issues one correlated call: publishes a trigger event and waits for the
    /// matching completion.
    ///
    /// Returns the handler's result if a completion carrying the fresh
    /// correlation id arrives before the timeout elapses and before `cancel`
    /// fires; `false` otherwise. A never-answered trigger resolving by timeout
    /// is a normal outcome, not an error.
    pub async fn invoke(&self, cancel: &CancellationToken) -> bool {
        let correlation_id = self.registry.next_call_id();
        self.state.call.begin(correlation_id);

        let settings = self.state.lock_settings().to_json();
        self.bus.publish(
            Arc::clone(&self.channels.trigger),
            Payload::Trigger(TriggerPayload {
                completion_channel: Arc::clone(&self.channels.completion),
                correlation_id,
                instance_id: self.state.instance_id,
                settings,
            }),
        );

        let timeout = self.timeout();
        self.state.call.wait(timeout, cancel).await
    }

    /// Publishes a properties request and reads the response slot back
    /// immediately. Only a synchronous listener can have populated the slot by
    /// then; `None` means no provider answered.
    pub fn request_properties(&self) -> Option<PropertyDescriptor> {
        let slot = PropertySlot::new();
        self.bus.publish(
            Arc::clone(&self.channels.properties),
            Payload::PropertiesRequest(PropertiesRequest {
                instance_id: self.state.instance_id,
                reply: slot.clone(),
            }),
        );
        slot.take()
    }
}

impl Clone for ScriptSegment {
    /// Cloning is copy-construction: the clone gets a fresh instance id, a
    /// deep copy of the settings blob, the same timeout, empty temp variables,
    /// its own completion subscription, and its own lifecycle broadcasts.
    fn clone(&self) -> Self {
        let settings = self.state.lock_settings().clone();
        let timeout = self.timeout();
        Self::attach(
            self.bus.clone(),
            Arc::clone(&self.registry),
            self.channels.clone(),
            timeout,
            settings,
        )
    }
}

impl Drop for ScriptSegment {
    fn drop(&mut self) {
        // Synchronous on purpose: listeners must get a deterministic last look
        // at the id while the registry entry is still resolvable.
        self.bus.publish(
            Arc::clone(&self.channels.deleted_instance),
            Payload::InstanceDeleted {
                instance_id: self.state.instance_id,
            },
        );
        self.registry.unregister(&self.state);
        self.listener_stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CompletionPayload, Event, FilterListener};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::{self, Duration, Instant};
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Bus, Arc<SegmentRegistry>) {
        (Bus::new(64), SegmentRegistry::new())
    }

    fn segment(bus: &Bus, registry: &Arc<SegmentRegistry>, timeout: Duration) -> ScriptSegment {
        ScriptSegment::builder(bus.clone(), Arc::clone(registry), Channels::prefixed("t"))
            .timeout(timeout)
            .build()
            .unwrap()
    }

    /// Runs `invoke` on a spawned task and hands back the trigger it emitted.
    async fn invoke_and_catch_trigger(
        bus: &Bus,
        seg: Arc<ScriptSegment>,
        cancel: CancellationToken,
    ) -> (TriggerPayload, tokio::task::JoinHandle<bool>) {
        let mut triggers = bus.subscribe_channel("t.trigger");
        let handle = tokio::spawn(async move { seg.invoke(&cancel).await });
        let trigger = triggers.recv().await.unwrap().as_trigger().unwrap().clone();
        (trigger, handle)
    }

    #[tokio::test]
    async fn build_rejects_zero_timeout() {
        let (bus, registry) = setup();
        let err = ScriptSegment::builder(bus, registry, Channels::prefixed("t"))
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err.as_label(), "segment_zero_timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn completion_before_timeout_returns_result_early() {
        let (bus, registry) = setup();
        let seg = Arc::new(segment(&bus, &registry, Duration::from_millis(300)));

        let handler_bus = bus.clone();
        let mut triggers = bus.subscribe_channel("t.trigger");
        tokio::spawn(async move {
            let trigger = triggers.recv().await.unwrap().as_trigger().unwrap().clone();
            time::sleep(Duration::from_millis(100)).await;
            handler_bus.publish(
                trigger.completion_channel,
                Payload::Completion(CompletionPayload::reply(trigger.correlation_id, true)),
            );
        });

        let started = Instant::now();
        assert!(seg.invoke(&CancellationToken::new()).await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(300), "returned at {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn no_completion_times_out() {
        let (bus, registry) = setup();
        let seg = segment(&bus, &registry, Duration::from_millis(300));

        let started = Instant::now();
        assert!(!seg.invoke(&CancellationToken::new()).await);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_beats_a_later_completion() {
        let (bus, registry) = setup();
        let seg = Arc::new(segment(&bus, &registry, Duration::from_millis(300)));

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let handler_bus = bus.clone();
        let mut triggers = bus.subscribe_channel("t.trigger");
        tokio::spawn(async move {
            let trigger = triggers.recv().await.unwrap().as_trigger().unwrap().clone();
            time::sleep(Duration::from_millis(200)).await;
            // Arrives after cancellation; must be discarded without effect.
            handler_bus.publish(
                trigger.completion_channel,
                Payload::Completion(CompletionPayload::reply(trigger.correlation_id, true)),
            );
        });

        let started = Instant::now();
        assert!(!seg.invoke(&cancel).await);
        assert!(started.elapsed() < Duration::from_millis(150));

        // The late completion must not bleed into a fresh call either.
        let started = Instant::now();
        assert!(!seg.invoke(&CancellationToken::new()).await);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_from_previous_call_is_ignored() {
        let (bus, registry) = setup();
        let seg = Arc::new(segment(&bus, &registry, Duration::from_millis(100)));

        // First call: never answered, times out; remember its id.
        let (first, handle) =
            invoke_and_catch_trigger(&bus, Arc::clone(&seg), CancellationToken::new()).await;
        assert!(!handle.await.unwrap());

        // Second call: reply with the *old* id, then with the right one.
        let (second, handle) =
            invoke_and_catch_trigger(&bus, Arc::clone(&seg), CancellationToken::new()).await;
        assert!(second.correlation_id > first.correlation_id);
        bus.publish(
            Arc::clone(&second.completion_channel),
            Payload::Completion(CompletionPayload::reply(first.correlation_id, true)),
        );
        bus.publish(
            second.completion_channel,
            Payload::Completion(CompletionPayload::reply(second.correlation_id, false)),
        );
        // The stale `true` lost; the current call's `false` won.
        assert!(!handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn segments_sharing_channel_names_do_not_cross_wires() {
        let (bus, registry) = setup();
        let a = Arc::new(segment(&bus, &registry, Duration::from_millis(200)));
        let b = Arc::new(segment(&bus, &registry, Duration::from_millis(200)));

        let mut triggers = bus.subscribe_channel("t.trigger");
        let cancel = CancellationToken::new();
        let ha = {
            let a = Arc::clone(&a);
            let c = cancel.clone();
            tokio::spawn(async move { a.invoke(&c).await })
        };
        let ta = triggers.recv().await.unwrap().as_trigger().unwrap().clone();
        let hb = {
            let b = Arc::clone(&b);
            let c = cancel.clone();
            tokio::spawn(async move { b.invoke(&c).await })
        };
        let tb = triggers.recv().await.unwrap().as_trigger().unwrap().clone();
        assert_eq!(ta.instance_id, a.instance_id());
        assert_eq!(tb.instance_id, b.instance_id());

        // Answer only b; a must still time out even though both segments
        // listen on the same completion channel name.
        bus.publish(
            tb.completion_channel,
            Payload::Completion(CompletionPayload::reply(tb.correlation_id, true)),
        );
        assert!(hb.await.unwrap());
        assert!(!ha.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_completions_leave_the_call_to_time_out() {
        let (bus, registry) = setup();
        let seg = Arc::new(segment(&bus, &registry, Duration::from_millis(100)));

        let (trigger, handle) =
            invoke_and_catch_trigger(&bus, Arc::clone(&seg), CancellationToken::new()).await;
        bus.publish(
            Arc::clone(&trigger.completion_channel),
            Payload::Completion(CompletionPayload {
                correlation_id: None,
                result: Some(true),
            }),
        );
        bus.publish(
            trigger.completion_channel,
            Payload::Completion(CompletionPayload {
                correlation_id: Some(trigger.correlation_id),
                result: None,
            }),
        );
        assert!(!handle.await.unwrap());
    }

    #[tokio::test]
    async fn correlation_ids_increase_across_calls_and_instances() {
        let (bus, registry) = setup();
        let a = Arc::new(segment(&bus, &registry, Duration::from_millis(10)));
        let b = Arc::new(segment(&bus, &registry, Duration::from_millis(10)));

        let mut prev = 0;
        for seg in [&a, &b, &a, &b, &a] {
            let (trigger, handle) =
                invoke_and_catch_trigger(&bus, Arc::clone(seg), CancellationToken::new()).await;
            assert!(
                trigger.correlation_id > prev,
                "ids must never repeat: {} after {}",
                trigger.correlation_id,
                prev
            );
            prev = trigger.correlation_id;
            bus.publish(
                trigger.completion_channel,
                Payload::Completion(CompletionPayload::reply(trigger.correlation_id, true)),
            );
            assert!(handle.await.unwrap());
        }
    }

    #[tokio::test]
    async fn registry_membership_follows_lifecycle() {
        let (bus, registry) = setup();
        let a = segment(&bus, &registry, Duration::from_millis(10));
        let b = segment(&bus, &registry, Duration::from_millis(10));
        let c = segment(&bus, &registry, Duration::from_millis(10));
        assert_eq!(registry.len(), 3);

        let (a_id, b_id) = (a.instance_id(), b.instance_id());
        drop(b);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a_id));
        assert!(!registry.contains(b_id));
        assert!(registry.contains(c.instance_id()));

        drop(a);
        drop(c);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn clone_gets_fresh_id_and_independent_settings() {
        let (bus, registry) = setup();
        let original = ScriptSegment::builder(bus, registry, Channels::prefixed("t"))
            .timeout(Duration::from_millis(40))
            .default_settings(json!({"path": "a.py"}))
            .build()
            .unwrap();
        let copy = original.clone();

        assert_ne!(original.instance_id(), copy.instance_id());
        assert_eq!(copy.timeout(), Duration::from_millis(40));
        assert_eq!(copy.settings().get("path"), Some(&json!("a.py")));

        copy.apply_settings(Settings::from_value(json!({"path": "b.py"})));
        assert_eq!(original.settings().get("path"), Some(&json!("a.py")));
    }

    #[tokio::test]
    async fn creation_is_announced_off_the_constructor_stack() {
        let (bus, registry) = setup();
        let mut created = bus.subscribe_channel("t.new_instance");
        let seg = segment(&bus, &registry, Duration::from_millis(10));

        let event = created.recv().await.unwrap();
        match event.payload {
            Payload::InstanceCreated { instance_id } => {
                assert_eq!(instance_id, seg.instance_id());
            }
            other => panic!("expected InstanceCreated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deletion_is_announced_while_still_registered() {
        let (bus, registry) = setup();
        let seg = segment(&bus, &registry, Duration::from_millis(10));
        let id = seg.instance_id();

        let observed = Arc::new(AtomicBool::new(false));
        let observed_in = Arc::clone(&observed);
        let registry_in = Arc::clone(&registry);
        bus.add_listener(Arc::new(FilterListener::new(
            "t.deleted_instance",
            move |event: &Event| {
                if let Payload::InstanceDeleted { instance_id } = event.payload {
                    // The dying instance must still resolve by id here.
                    assert!(registry_in.contains(instance_id));
                    observed_in.store(true, Ordering::SeqCst);
                }
            },
        )));

        drop(seg);
        assert!(observed.load(Ordering::SeqCst));
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn temp_var_op_after_drop_is_noop() {
        let (bus, registry) = setup();
        let seg = segment(&bus, &registry, Duration::from_millis(10));
        let id = seg.instance_id();
        drop(seg);

        registry.register_temp_var(id, "k", "K", "");
        assert!(registry.temp_vars(id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn trigger_carries_the_serialized_settings() {
        let (bus, registry) = setup();
        let seg = ScriptSegment::builder(bus.clone(), registry, Channels::prefixed("t"))
            .timeout(Duration::from_millis(20))
            .default_settings(json!({"n": 1}))
            .build()
            .unwrap();
        let seg = Arc::new(seg);

        let (trigger, handle) =
            invoke_and_catch_trigger(&bus, Arc::clone(&seg), CancellationToken::new()).await;
        let parsed: serde_json::Value = serde_json::from_str(&trigger.settings).unwrap();
        assert_eq!(parsed["n"], json!(1));
        let _ = handle.await;
    }

    #[tokio::test]
    async fn set_timeout_ignores_zero() {
        let (bus, registry) = setup();
        let seg = segment(&bus, &registry, Duration::from_millis(250));
        seg.set_timeout(Duration::ZERO);
        assert_eq!(seg.timeout(), Duration::from_millis(250));
        seg.set_timeout(Duration::from_secs(1));
        assert_eq!(seg.timeout(), Duration::from_secs(1));
    }
}
