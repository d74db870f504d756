use std::sync::Arc;

use herald_core::{
    EnvelopeBuilder, Event, EventHandler, HandlerOrchestrator, MessageTraits, OutboxStorage,
    RoutingFilter, TransportDispatcher,
};

use super::{DispatcherTable, EventDispatcher};
use crate::config::DispatcherConfig;
use crate::handlers::{HandlerRegistry, SequentialOrchestrator};
use crate::outbox::{InMemoryOutboxStorage, OutboxManager};
use crate::pipeline::{PipelineBehavior, PipelineExecutor};
use crate::routing::{MessageTraitsRegistry, RoutingResolver};
use crate::transport::{DefaultEnvelopeBuilder, NullTransport};

/// Assembles an [`EventDispatcher`] from its collaborators.
///
/// Anything not supplied falls back to an in-process default: in-memory
/// outbox storage, sequential handler execution, the default envelope
/// builder, and a transport that discards envelopes.
pub struct EventDispatcherBuilder {
    config: DispatcherConfig,
    storage: Option<Arc<dyn OutboxStorage>>,
    orchestrator: Option<Arc<dyn HandlerOrchestrator>>,
    envelopes: Option<Arc<dyn EnvelopeBuilder>>,
    transport: Option<Arc<dyn TransportDispatcher>>,
    filters: Vec<Arc<dyn RoutingFilter>>,
    traits: Arc<MessageTraitsRegistry>,
    registry: Arc<HandlerRegistry>,
    table: DispatcherTable,
}

impl EventDispatcherBuilder {
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            storage: None,
            orchestrator: None,
            envelopes: None,
            transport: None,
            filters: Vec::new(),
            traits: Arc::new(MessageTraitsRegistry::new()),
            registry: Arc::new(HandlerRegistry::new()),
            table: DispatcherTable::new(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn OutboxStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn orchestrator(mut self, orchestrator: Arc<dyn HandlerOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    #[must_use]
    pub fn envelope_builder(mut self, envelopes: Arc<dyn EnvelopeBuilder>) -> Self {
        self.envelopes = Some(envelopes);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn TransportDispatcher>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: impl RoutingFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Register message traits for `E`, making it replayable.
    #[must_use]
    pub fn traits<E: Event>(self, traits: MessageTraits) -> Self {
        self.traits.register::<E>(traits);
        self.table.register::<E>();
        self
    }

    /// Register a local handler for `E`, making it replayable.
    #[must_use]
    pub fn handler<E, H>(self, handler: H) -> Self
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.registry.register_handler::<E, H>(handler);
        self.table.register::<E>();
        self
    }

    /// Append a pipeline behavior for `E`, making it replayable.
    #[must_use]
    pub fn behavior<E, B>(self, behavior: B) -> Self
    where
        E: Event,
        B: PipelineBehavior<E>,
    {
        self.registry.register_behavior::<E, B>(behavior);
        self.table.register::<E>();
        self
    }

    /// Make `E` replayable without registering handlers or traits, e.g. for
    /// external-only events.
    #[must_use]
    pub fn event<E: Event>(self) -> Self {
        self.table.register::<E>();
        self
    }

    #[must_use]
    pub fn build(self) -> EventDispatcher {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryOutboxStorage::new()));
        let orchestrator = self
            .orchestrator
            .unwrap_or_else(|| Arc::new(SequentialOrchestrator));
        let envelopes = self
            .envelopes
            .unwrap_or_else(|| Arc::new(DefaultEnvelopeBuilder::new()));
        let transport = self.transport.unwrap_or_else(|| Arc::new(NullTransport));

        let outbox = Arc::new(OutboxManager::new(
            storage,
            orchestrator,
            envelopes,
            transport,
            self.config.outbox.clone(),
        ));
        let resolver = RoutingResolver::new(
            self.filters,
            Arc::clone(&self.traits),
            self.config.default_mode,
        );

        EventDispatcher {
            config: self.config,
            resolver,
            traits: self.traits,
            registry: self.registry,
            table: self.table,
            pipeline: PipelineExecutor::new(Arc::clone(&outbox)),
            outbox,
        }
    }
}

impl Default for EventDispatcherBuilder {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}
