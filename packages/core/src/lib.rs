//! Herald core: the event model, distribution modes, message traits, and
//! the collaborator contracts consumed by the dispatcher.

pub mod envelope;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use envelope::Envelope;
pub use error::{combine_hybrid, DispatchError, DispatchResult, TransportError};
pub use event::{downcast_event, downcast_ref, Event, EventKey};
pub use traits::{
    EnvelopeBuilder, ErasedHandler, EventHandler, HandlerOrchestrator, HandlerSet, OutboxStorage,
    RoutingFilter, TransportDispatcher, TypedHandler,
};
pub use types::{DispatchStrategy, DistributionMode, MessageTraits, MessageType};
