//! # scriptrelay
//!
//! **Scriptrelay** lets an automation-macro segment (a condition or action
//! node) delegate its actual evaluation to a decoupled external handler that
//! communicates only through a broadcast event bus, while the calling task
//! observes a synchronous, timeout-bounded, cancellable call/response
//! contract.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌───────────────┐    ┌───────────────┐    ┌───────────────┐
//!     │ ScriptSegment │    │ ScriptSegment │    │ ScriptSegment │
//!     │ (instance #1) │    │ (instance #2) │    │ (instance #N) │
//!     └──────┬────────┘    └──────┬────────┘    └──────┬────────┘
//!            │ trigger            │ trigger            │ trigger
//!            ▼                    ▼                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      Bus (broadcast channel)                      │
//! │  - channel-addressed, typed payloads                              │
//! │  - async receivers (channel-filtered)                             │
//! │  - sync listeners (invoked inline on publish)                     │
//! └──────┬──────────────────────────────┬─────────────────────────────┘
//!        │ trigger                      │ completion (by channel name,
//!        ▼                              ▼  matched by correlation id)
//! ┌──────────────────┐        ┌────────────────────────┐
//! │  HandlerRunner   │        │  completion listener   │
//! │  (external side) │───────►│  (one per segment)     │
//! └──────────────────┘ reply  └────────────────────────┘
//!
//! Out-of-band, from any thread:
//!   SegmentRegistry ── find by instance id ──► temp-var registration,
//!                                              settings/timeout mutation
//! ```
//!
//! ### One correlated call
//! ```text
//! segment.invoke(cancel)
//!   ├─► allocate correlation id (global counter, never reused)
//!   ├─► publish Trigger{ completion_channel, correlation_id,
//!   │                    instance_id, settings }
//!   ├─► wait, bounded:
//!   │     ├─ matching completion  ─► return its result
//!   │     ├─ timeout elapsed      ─► return false
//!   │     └─ cancel fired         ─► return false
//!   └─► stale/duplicate/late replies: discarded by the id filter
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types                                |
//! |-----------------|----------------------------------------------------------|------------------------------------------|
//! | **Segments**    | Delegating condition/action instances with lifecycle.    | [`ScriptSegment`], [`Channels`]          |
//! | **Registry**    | Thread-safe roster, out-of-band addressing by id.        | [`SegmentRegistry`], [`TempVar`]         |
//! | **Bus**         | Broadcast with typed payloads and sync listeners.        | [`Bus`], [`Event`], [`Payload`]          |
//! | **Handlers**    | The answering side of the protocol.                      | [`TriggerHandler`], [`HandlerRunner`]    |
//! | **Properties**  | Synchronous descriptor exchange for editing surfaces.    | [`PropertyDescriptor`], [`PropertySlot`] |
//! | **Errors**      | Build-time and handler-side failures.                    | [`SegmentError`], [`HandlerError`]       |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use scriptrelay::{
//!     Bus, Channels, HandlerError, HandlerFn, HandlerRunner, ScriptSegment,
//!     SegmentRegistry, TriggerPayload,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = Bus::new(64);
//!     let registry = SegmentRegistry::new();
//!
//!     // The external side: answers every trigger on "demo.trigger".
//!     let handler = HandlerFn::arc("always-true", |_t: TriggerPayload| async {
//!         Ok::<_, HandlerError>(true)
//!     });
//!     let _runner = HandlerRunner::spawn(bus.clone(), "demo.trigger", handler);
//!
//!     // The segment side: one delegating condition.
//!     let segment = ScriptSegment::builder(bus, registry, Channels::prefixed("demo"))
//!         .timeout(Duration::from_millis(500))
//!         .build()?;
//!
//!     assert!(segment.invoke(&CancellationToken::new()).await);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod handlers;
mod properties;
mod segment;

// ---- Public re-exports ----

pub use config::{Channels, Config};
pub use error::{HandlerError, SegmentError};
pub use events::{
    Bus, BusListener, ChannelReceiver, CompletionPayload, Event, FilterListener, ListenerId,
    Payload, PropertiesRequest, TriggerPayload,
};
pub use handlers::{HandlerFn, HandlerRef, HandlerRunner, PropertiesProvider, TriggerHandler};
pub use properties::{PropertyDescriptor, PropertyField, PropertyKind, PropertySlot};
pub use segment::{ScriptSegment, ScriptSegmentBuilder, SegmentRegistry, Settings, TempVar};
