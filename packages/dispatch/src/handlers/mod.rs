//! Local handler registration and execution.
//!
//! - [`registry`]: per-event-type handlers and pipeline behaviors, by `TypeId`
//! - [`orchestrator`]: sequential and concurrent `HandlerOrchestrator`s

pub mod orchestrator;
pub mod registry;

pub use orchestrator::{ConcurrentOrchestrator, SequentialOrchestrator};
pub use registry::HandlerRegistry;
