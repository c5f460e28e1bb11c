//! # Channel naming and runtime configuration.
//!
//! [`Channels`] bundles the five bus channel names a segment is bound to at
//! construction; [`Config`] centralizes runtime defaults.
//!
//! ## Channel roles
//! | Role               | Direction                    | Carried payload                         |
//! |--------------------|------------------------------|-----------------------------------------|
//! | `properties`       | segment → handler            | instance id + response slot             |
//! | `trigger`          | segment → handler            | completion channel, correlation id, ... |
//! | `completion`       | handler → segment            | correlation id, result                  |
//! | `new_instance`     | segment → any listener       | instance id                             |
//! | `deleted_instance` | segment → any listener       | instance id                             |
//!
//! ## Sentinel values
//! - `Config::bus_capacity` is clamped to a minimum of 1 by the bus.
//! - A zero `Config::timeout` is rejected at segment build time.

use std::sync::Arc;
use std::time::Duration;

use crate::error::SegmentError;

/// The five channel names a segment publishes and listens on.
///
/// Names are fixed at construction. Two segment *types* may legitimately share
/// channel names (e.g. a condition and its clone); correlation ids are globally
/// unique, so shared completion channels cannot cause cross-talk.
#[derive(Clone, Debug)]
pub struct Channels {
    /// Properties-request channel (segment publishes, provider answers inline).
    pub properties: Arc<str>,
    /// Trigger channel (segment publishes one event per call attempt).
    pub trigger: Arc<str>,
    /// Completion channel (handlers reply here, echoing the correlation id).
    pub completion: Arc<str>,
    /// Lifecycle channel announcing freshly constructed instances.
    pub new_instance: Arc<str>,
    /// Lifecycle channel announcing instances about to be destroyed.
    pub deleted_instance: Arc<str>,
}

impl Channels {
    /// Creates a channel set from five explicit names.
    pub fn new(
        properties: impl Into<Arc<str>>,
        trigger: impl Into<Arc<str>>,
        completion: impl Into<Arc<str>>,
        new_instance: impl Into<Arc<str>>,
        deleted_instance: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            properties: properties.into(),
            trigger: trigger.into(),
            completion: completion.into(),
            new_instance: new_instance.into(),
            deleted_instance: deleted_instance.into(),
        }
    }

    /// Derives the five names from a common prefix.
    ///
    /// ## Example
    /// ```
    /// use scriptrelay::Channels;
    ///
    /// let ch = Channels::prefixed("my_plugin.condition");
    /// assert_eq!(&*ch.trigger, "my_plugin.condition.trigger");
    /// assert_eq!(&*ch.completion, "my_plugin.condition.completion");
    /// ```
    pub fn prefixed(prefix: &str) -> Self {
        Self::new(
            format!("{prefix}.properties"),
            format!("{prefix}.trigger"),
            format!("{prefix}.completion"),
            format!("{prefix}.new_instance"),
            format!("{prefix}.deleted_instance"),
        )
    }

    /// Rejects empty channel names.
    pub(crate) fn validate(&self) -> Result<(), SegmentError> {
        for (role, name) in [
            ("properties", &self.properties),
            ("trigger", &self.trigger),
            ("completion", &self.completion),
            ("new_instance", &self.new_instance),
            ("deleted_instance", &self.deleted_instance),
        ] {
            if name.is_empty() {
                return Err(SegmentError::EmptyChannel { role });
            }
        }
        Ok(())
    }
}

/// Global configuration defaults for the relay runtime.
///
/// ## Field semantics
/// - `bus_capacity`: broadcast ring buffer size shared by all receivers
///   (min 1; clamped by the bus)
/// - `timeout`: default bound on how long a correlated call may block;
///   must be positive when handed to a segment builder
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` events observe
    /// `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Default per-call timeout applied by [`ScriptSegment::builder`](crate::ScriptSegment::builder)
    /// unless overridden.
    pub timeout: Duration,
}

impl Config {
    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024` (good baseline)
    /// - `timeout = 5s` (generous bound for out-of-process handlers)
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_derives_all_five_names() {
        let ch = Channels::prefixed("x");
        assert_eq!(&*ch.properties, "x.properties");
        assert_eq!(&*ch.trigger, "x.trigger");
        assert_eq!(&*ch.completion, "x.completion");
        assert_eq!(&*ch.new_instance, "x.new_instance");
        assert_eq!(&*ch.deleted_instance, "x.deleted_instance");
    }

    #[test]
    fn validate_rejects_empty_names() {
        let ch = Channels::new("p", "", "c", "n", "d");
        let err = ch.validate().unwrap_err();
        assert_eq!(err.as_label(), "segment_empty_channel");

        assert!(Channels::prefixed("ok").validate().is_ok());
    }

    #[test]
    fn capacity_clamped_to_one() {
        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
