//! # Handler-side surface: answering triggers and property requests.
//!
//! A segment only publishes triggers; something else has to evaluate them.
//! This module provides that other side:
//! - [`TriggerHandler`] - trait for implementing the evaluation logic
//! - [`HandlerFn`] - function-backed handler implementation
//! - [`HandlerRef`] - shared reference to a handler (`Arc<dyn TriggerHandler>`)
//! - [`HandlerRunner`] - worker that wires a handler to a trigger channel
//! - [`PropertiesProvider`] - synchronous answerer for property requests

mod handler;
mod runner;

pub use handler::{HandlerFn, HandlerRef, TriggerHandler};
pub use runner::{HandlerRunner, PropertiesProvider};
