//! Herald dispatch: routing, pipeline behaviors, the transactional outbox,
//! and the `EventDispatcher` façade.

pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod outbox;
pub mod pipeline;
pub mod routing;
pub mod telemetry;
pub mod transport;

pub use config::{DispatcherConfig, OutboxOptions};
pub use dispatcher::{DispatcherTable, EventDispatcher, EventDispatcherBuilder};
pub use handlers::{ConcurrentOrchestrator, HandlerRegistry, SequentialOrchestrator};
pub use outbox::{InMemoryOutboxStorage, OutboxManager, OutboxPoller, OutboxTask};
pub use pipeline::{
    ConcurrencyLimitBehavior, Next, PipelineBehavior, PipelineExecutor, TimeoutBehavior,
    TracingBehavior,
};
pub use routing::{MessageTraitsRegistry, RoutingCache, RoutingResolver};
pub use telemetry::{init_tracing, LogFormat};
pub use transport::{DefaultEnvelopeBuilder, NullTransport};
