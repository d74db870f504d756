//! Distribution-mode routing.
//!
//! - [`cache`]: memoized per-event-type decisions
//! - [`traits_registry`]: out-of-band `MessageTraits` per event type
//! - [`resolver`]: filter -> traits -> default resolution

pub mod cache;
pub mod resolver;
pub mod traits_registry;

pub use cache::RoutingCache;
pub use resolver::{RoutingDecision, RoutingResolver};
pub use traits_registry::MessageTraitsRegistry;
