//! Bus events: typed payloads and the broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to channel-addressed events flowing between segments,
//! external handlers, and lifecycle listeners.
//!
//! ## Contents
//! - [`Event`], [`Payload`] and the per-channel payload types
//! - [`Bus`] broadcast wrapper with channel-filtered receivers and
//!   synchronous listeners
//!
//! ## Quick reference
//! - **Publishers**: `ScriptSegment` (trigger, properties-request, lifecycle),
//!   `HandlerRunner` (completion).
//! - **Consumers**: the per-segment completion listener, `HandlerRunner`
//!   (trigger channel), and any lifecycle listener (async or synchronous).

mod bus;
mod event;

pub use bus::{Bus, BusListener, ChannelReceiver, FilterListener, ListenerId};
pub use event::{CompletionPayload, Event, Payload, PropertiesRequest, TriggerPayload};
