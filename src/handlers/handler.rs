//! # Trigger handler abstraction and function-backed implementation.
//!
//! This module defines the [`TriggerHandler`] trait (async, one evaluation per
//! trigger) and a convenient closure-backed implementation [`HandlerFn`]. The
//! common handle type is [`HandlerRef`], an `Arc<dyn TriggerHandler>` suitable
//! for handing to a [`HandlerRunner`](crate::HandlerRunner).
//!
//! A handler receives the full [`TriggerPayload`] — including the serialized
//! settings blob it alone knows how to interpret — and returns the boolean the
//! invoking segment will see.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::TriggerPayload;

/// Shared handle to a trigger handler.
pub type HandlerRef = Arc<dyn TriggerHandler>;

/// # Evaluates triggers on behalf of segments.
///
/// `Ok(result)` is sent back on the trigger's completion channel, echoing its
/// correlation id. `Err` is logged and **not** answered: the call resolves by
/// timeout on the segment side, which the protocol treats as a normal outcome.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use scriptrelay::{HandlerError, TriggerHandler, TriggerPayload};
///
/// struct NonEmptySettings;
///
/// #[async_trait]
/// impl TriggerHandler for NonEmptySettings {
///     fn name(&self) -> &str { "non-empty-settings" }
///
///     async fn on_trigger(&self, trigger: &TriggerPayload) -> Result<bool, HandlerError> {
///         Ok(trigger.settings != "{}")
///     }
/// }
/// ```
#[async_trait]
pub trait TriggerHandler: Send + Sync + 'static {
    /// Short, stable handler name for logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose — override
    /// it when possible.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Evaluates one trigger.
    async fn on_trigger(&self, trigger: &TriggerPayload) -> Result<bool, HandlerError>;
}

/// Function-backed handler implementation.
///
/// Wraps a closure that creates a new future per trigger.
///
/// ## Example
/// ```
/// use scriptrelay::{HandlerError, HandlerFn, HandlerRef, TriggerPayload};
///
/// let h: HandlerRef = HandlerFn::arc("always-true", |_t: TriggerPayload| async {
///     Ok::<_, HandlerError>(true)
/// });
/// assert_eq!(h.name(), "always-true");
/// ```
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> TriggerHandler for HandlerFn<F>
where
    F: Fn(TriggerPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_trigger(&self, trigger: &TriggerPayload) -> Result<bool, HandlerError> {
        (self.f)(trigger.clone()).await
    }
}
