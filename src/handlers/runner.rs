//! # HandlerRunner: wires one handler to a trigger channel.
//!
//! The runner owns a dedicated worker task that consumes the trigger channel
//! in FIFO order, evaluates each trigger through its [`TriggerHandler`], and
//! replies on the completion channel *carried by the trigger* — never on a
//! channel of its own choosing — echoing the carried correlation id.
//!
//! ## Architecture
//! ```text
//! Bus ──► worker task ──► handler.on_trigger()
//!            │                 ├─ Ok(result) ──► publish Completion{id, result}
//!            │                 ├─ Err(e)     ──► warn, no reply (call times out)
//!            │                 └─ panic      ──► caught, warn, no reply
//!            └─ stop token cancelled ──► exit
//! ```
//!
//! ## Rules
//! - Triggers are processed sequentially per runner; run several runners on
//!   the same channel for parallel evaluation.
//! - A panicking handler never kills the worker: panics are caught and the
//!   runner moves on to the next trigger.
//! - Replying late or never is tolerated by the segment side by design.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{Bus, CompletionPayload, Event, FilterListener, ListenerId, Payload, TriggerPayload};
use crate::handlers::handler::{HandlerRef, TriggerHandler};
use crate::properties::PropertyDescriptor;

/// Worker that answers triggers on one channel with one handler.
pub struct HandlerRunner {
    stop: CancellationToken,
    worker: JoinHandle<()>,
}

impl HandlerRunner {
    /// Spawns the worker task and starts answering triggers.
    pub fn spawn(bus: Bus, trigger_channel: impl Into<Arc<str>>, handler: HandlerRef) -> Self {
        let stop = CancellationToken::new();
        let mut rx = bus.subscribe_channel(trigger_channel);
        let token = stop.clone();

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if let Payload::Trigger(trigger) = &event.payload {
                            Self::answer(&bus, handler.as_ref(), trigger).await;
                        }
                    }
                }
            }
        });

        Self { stop, worker }
    }

    async fn answer(bus: &Bus, handler: &dyn TriggerHandler, trigger: &TriggerPayload) {
        let fut = handler.on_trigger(trigger);
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(result)) => {
                debug!(
                    handler = handler.name(),
                    correlation_id = trigger.correlation_id,
                    result,
                    "trigger answered"
                );
                bus.publish(
                    Arc::clone(&trigger.completion_channel),
                    Payload::Completion(CompletionPayload::reply(trigger.correlation_id, result)),
                );
            }
            Ok(Err(err)) => {
                warn!(
                    handler = handler.name(),
                    correlation_id = trigger.correlation_id,
                    error = err.as_message(),
                    "handler failed; leaving the call to time out"
                );
            }
            Err(_panic) => {
                warn!(
                    handler = handler.name(),
                    correlation_id = trigger.correlation_id,
                    "handler panicked; leaving the call to time out"
                );
            }
        }
    }

    /// Graceful shutdown: stop the worker and await its exit.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        let _ = (&mut self.worker).await;
    }
}

impl Drop for HandlerRunner {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Synchronous answerer for property requests.
///
/// Installs a [`FilterListener`] on the properties channel that fills each
/// request's response slot from `f` — synchronously, on the requesting
/// thread, which is the only way the requester's immediate read-back can see
/// it. The listener is removed when the provider is dropped.
pub struct PropertiesProvider {
    bus: Bus,
    id: ListenerId,
}

impl PropertiesProvider {
    /// Registers the provider on the given properties channel.
    pub fn install<F>(bus: &Bus, properties_channel: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(u64) -> PropertyDescriptor + Send + Sync + 'static,
    {
        let listener = FilterListener::new(properties_channel, move |event: &Event| {
            if let Payload::PropertiesRequest(request) = &event.payload {
                request.reply.fill(f(request.instance_id));
            }
        });
        let id = bus.add_listener(Arc::new(listener));
        Self {
            bus: bus.clone(),
            id,
        }
    }
}

impl Drop for PropertiesProvider {
    fn drop(&mut self) {
        self.bus.remove_listener(self.id);
    }
}
