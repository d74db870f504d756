//! The dispatcher façade: resolves routing, runs the pipeline, and replays
//! stored events.

pub mod builder;
pub mod table;

use std::sync::Arc;

use herald_core::{DispatchError, DispatchResult, DistributionMode, Event, EventKey};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::config::DispatcherConfig;
use crate::handlers::HandlerRegistry;
use crate::outbox::OutboxManager;
use crate::pipeline::{DispatchPlan, PipelineExecutor};
use crate::routing::{MessageTraitsRegistry, RoutingResolver};

pub use builder::EventDispatcherBuilder;
pub use table::{BoxedFuture, DispatcherTable, ReplayFn};

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

/// Entry point for publishing events.
///
/// Typed dispatch (`dispatch::<E>`) resolves the distribution mode, runs the
/// behaviors registered for `E`, and hands the event to the outbox. Stored
/// events come back through the replay table and
/// [`dispatch_from_outbox`](Self::dispatch_from_outbox), which skips the
/// write-ahead step.
///
/// Built with [`EventDispatcherBuilder`]; shared as `Arc<EventDispatcher>`.
pub struct EventDispatcher {
    config: DispatcherConfig,
    resolver: RoutingResolver,
    traits: Arc<MessageTraitsRegistry>,
    registry: Arc<HandlerRegistry>,
    table: DispatcherTable,
    outbox: Arc<OutboxManager>,
    pipeline: PipelineExecutor,
}

impl EventDispatcher {
    #[must_use]
    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::new(DispatcherConfig::default())
    }

    /// Dispatch an owned event.
    ///
    /// # Errors
    ///
    /// See [`dispatch_shared`](Self::dispatch_shared).
    pub async fn dispatch<E: Event>(&self, event: E, cancel: &CancellationToken) -> DispatchResult {
        self.dispatch_shared(Arc::new(event), cancel).await
    }

    /// Dispatch a shared event through routing, the behavior chain for `E`,
    /// and the outbox (or straight to the channels when the outbox is
    /// disabled).
    ///
    /// `E` becomes replayable on first dispatch, so stored events of a type
    /// routed only by a filter or the default mode can still be drained.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Cancelled` if `cancel` fires
    /// - `DispatchError::Storage` if the write-ahead store fails
    /// - a behavior's own error when it short-circuits
    /// - the distribution failure, when the outbox is disabled or the event
    ///   type is fail-fast
    pub async fn dispatch_shared<E: Event>(
        &self,
        event: Arc<E>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let key = EventKey::of::<E>();
        if !self.table.contains(key.name) {
            self.table.register::<E>();
        }
        let mode = self.resolver.resolve(key, &*event);
        let span = info_span!(
            "dispatch",
            event_type = key.name,
            event_id = %event.event_id(),
            mode = %mode,
        );

        let plan = DispatchPlan {
            mode,
            traits: self.traits.get::<E>(),
            skip_outbox: !self.config.outbox.enabled,
        };
        let handlers = self.registry.handlers::<E>();
        let behaviors = self.registry.behaviors::<E>();

        self.pipeline
            .run(event, handlers, &behaviors, plan, cancel)
            .instrument(span)
            .await
    }

    /// Dispatch an event whose concrete type is only known at runtime.
    ///
    /// The event goes to its local handlers through the replay table, with
    /// no routing, behaviors, or outbox store.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnregisteredEventType` if no handler or event
    /// registration exists for the runtime type, otherwise the local
    /// handlers' failure.
    pub async fn dispatch_dyn(
        &self,
        event: Arc<dyn Event>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let Some(replay) = self.table.get(event.type_name()) else {
            return Err(DispatchError::UnregisteredEventType {
                event_type: event.type_name().to_string(),
            });
        };
        replay(event, self, DistributionMode::LocalOnly, cancel.clone()).await
    }

    /// Re-dispatch a stored event with the mode recorded when it was stored.
    /// Behaviors are not re-run and nothing is written to the outbox.
    ///
    /// # Errors
    ///
    /// Returns the distribution failure for `mode`.
    pub async fn dispatch_from_outbox<E: Event>(
        &self,
        event: Arc<E>,
        mode: DistributionMode,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let handlers = self.registry.handlers::<E>();
        let traits = self.traits.get::<E>();
        self.outbox
            .dispatch_by_mode(event, &handlers, mode, traits, cancel)
            .await
    }

    /// Replay one batch of pending outbox events.
    ///
    /// # Errors
    ///
    /// See [`OutboxManager::process_pending`].
    pub async fn process_pending(&self, cancel: &CancellationToken) -> DispatchResult {
        self.outbox.process_pending(&self.table, self, cancel).await
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &RoutingResolver {
        &self.resolver
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn table(&self) -> &DispatcherTable {
        &self.table
    }

    #[must_use]
    pub fn outbox(&self) -> &OutboxManager {
        &self.outbox
    }
}
