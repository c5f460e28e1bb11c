//! # Channel-addressed events exchanged between segments and handlers.
//!
//! Every event carries the name of the channel it was published on plus one
//! typed [`Payload`]. Channels are plain strings, but payloads are structured:
//! a trigger is always a [`TriggerPayload`], a completion always a
//! [`CompletionPayload`], and so on. The single loosely-typed spot is the
//! completion payload, whose fields are optional because it is assembled by an
//! external handler that may omit them; the completion listener logs and
//! discards such replies.
//!
//! ## Ordering guarantees
//! Each event gets a per-bus sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore publish order when events are observed
//! out of order.

use std::sync::Arc;
use std::time::SystemTime;

use crate::properties::PropertySlot;

/// One event on the bus: channel name plus typed payload.
///
/// Cheap to clone; the broadcast channel clones it once per receiver.
#[derive(Clone, Debug)]
pub struct Event {
    /// Per-bus monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (for logs).
    pub at: SystemTime,
    /// Name of the channel this event was published on.
    pub channel: Arc<str>,
    /// Typed payload.
    pub payload: Payload,
}

impl Event {
    /// True if this event was published on the given channel.
    #[inline]
    pub fn is_on(&self, channel: &str) -> bool {
        &*self.channel == channel
    }

    /// Returns the trigger payload, if this is a trigger event.
    pub fn as_trigger(&self) -> Option<&TriggerPayload> {
        match &self.payload {
            Payload::Trigger(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the completion payload, if this is a completion event.
    pub fn as_completion(&self) -> Option<&CompletionPayload> {
        match &self.payload {
            Payload::Completion(c) => Some(c),
            _ => None,
        }
    }
}

/// Typed payload variants, one per channel role.
#[derive(Clone, Debug)]
pub enum Payload {
    /// One call attempt leaving a segment.
    Trigger(TriggerPayload),
    /// A handler's reply to a trigger.
    Completion(CompletionPayload),
    /// Request for a property descriptor, answered synchronously via the slot.
    PropertiesRequest(PropertiesRequest),
    /// A segment finished construction and is visible in the registry.
    InstanceCreated {
        /// Id of the new instance.
        instance_id: u64,
    },
    /// A segment is about to be destroyed; it is still visible in the registry
    /// while this event is delivered to synchronous listeners.
    InstanceDeleted {
        /// Id of the instance being destroyed.
        instance_id: u64,
    },
}

/// Payload of a trigger event.
///
/// Zero, one, or many handlers may react; the segment does not know which.
/// A handler that answers must reply on exactly `completion_channel`, echoing
/// `correlation_id`.
#[derive(Clone, Debug)]
pub struct TriggerPayload {
    /// Channel the handler must reply on.
    pub completion_channel: Arc<str>,
    /// Correlation token pairing this trigger with its eventual completion.
    /// Globally unique across all instances and call attempts.
    pub correlation_id: u64,
    /// Id of the invoking instance, for out-of-band registry operations.
    pub instance_id: u64,
    /// The segment's settings blob, serialized as JSON.
    pub settings: String,
}

/// Payload of a completion event.
///
/// Both fields are required by the protocol but optional in the type: the
/// reply is assembled by an external handler which may omit them. The
/// completion listener warns and discards a reply with a missing field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompletionPayload {
    /// The correlation id echoed from the trigger.
    pub correlation_id: Option<u64>,
    /// Evaluation result.
    pub result: Option<bool>,
}

impl CompletionPayload {
    /// Creates a well-formed reply carrying both required fields.
    pub fn reply(correlation_id: u64, result: bool) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            result: Some(result),
        }
    }
}

/// Payload of a properties-request event.
#[derive(Clone, Debug)]
pub struct PropertiesRequest {
    /// Id of the requesting instance.
    pub instance_id: u64,
    /// Response slot; only synchronous listeners can populate it in time.
    pub reply: PropertySlot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_carries_both_fields() {
        let c = CompletionPayload::reply(7, true);
        assert_eq!(c.correlation_id, Some(7));
        assert_eq!(c.result, Some(true));
    }

    #[test]
    fn default_completion_is_malformed() {
        let c = CompletionPayload::default();
        assert!(c.correlation_id.is_none());
        assert!(c.result.is_none());
    }
}
