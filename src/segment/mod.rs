//! Segment core: the correlated call protocol and the instance registry.
//!
//! Internal modules:
//! - [`call`]: per-instance completion cell and the bounded wait;
//! - [`instance`]: the public [`ScriptSegment`] handle and its lifecycle;
//! - [`registry`]: thread-safe roster of live instances and out-of-band ops;
//! - [`settings`]: the opaque settings blob and temp-variable storage.

mod call;
mod instance;
mod registry;
mod settings;

pub use instance::{ScriptSegment, ScriptSegmentBuilder};
pub use registry::SegmentRegistry;
pub use settings::{Settings, TempVar};
