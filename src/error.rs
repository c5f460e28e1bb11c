//! Error types used by the scriptrelay runtime and trigger handlers.
//!
//! This module defines two error enums:
//!
//! - [`SegmentError`] — construction-time misconfiguration of a segment.
//! - [`HandlerError`] — failures raised by external trigger handlers.
//!
//! Nothing in this crate is fatal at runtime: a timed-out, cancelled, or
//! unanswered call simply resolves to `false` at the `invoke()` call site.
//! Both enums provide `as_label` / `as_message` helpers for logs and metrics.

use thiserror::Error;

/// # Errors produced while building a [`ScriptSegment`](crate::ScriptSegment).
///
/// These represent misconfiguration caught before a segment goes live,
/// such as a zero timeout or an unnamed bus channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SegmentError {
    /// The configured call timeout was zero; a correlated call must be bounded
    /// by a positive duration.
    #[error("call timeout must be positive")]
    ZeroTimeout,

    /// One of the five channel names was empty.
    #[error("{role} channel name must not be empty")]
    EmptyChannel {
        /// Which channel role was unnamed (e.g. "trigger", "completion").
        role: &'static str,
    },
}

impl SegmentError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use scriptrelay::SegmentError;
    ///
    /// let err = SegmentError::ZeroTimeout;
    /// assert_eq!(err.as_label(), "segment_zero_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SegmentError::ZeroTimeout => "segment_zero_timeout",
            SegmentError::EmptyChannel { .. } => "segment_empty_channel",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SegmentError::ZeroTimeout => "timeout must be positive".to_string(),
            SegmentError::EmptyChannel { role } => {
                format!("empty channel name for role: {role}")
            }
        }
    }
}

/// # Errors produced by external trigger handlers.
///
/// Returned from [`TriggerHandler::on_trigger`](crate::TriggerHandler::on_trigger).
/// A failed handler does **not** fail the calling segment directly: the runner
/// logs the error and sends no completion, so the call resolves by timeout.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Handler could not evaluate the trigger.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler was shut down while a trigger was in flight.
    #[error("handler cancelled")]
    Canceled,
}

impl HandlerError {
    /// Creates a [`HandlerError::Fail`] from any displayable error.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        HandlerError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use scriptrelay::HandlerError;
    ///
    /// let err = HandlerError::fail("boom");
    /// assert_eq!(err.as_label(), "handler_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Canceled => "handler_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            HandlerError::Fail { error } => format!("error: {error}"),
            HandlerError::Canceled => "handler cancelled".to_string(),
        }
    }
}
