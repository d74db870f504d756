use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use herald_core::traits::TypedHandler;
use herald_core::{ErasedHandler, Event, EventHandler, EventKey, HandlerSet};

use crate::pipeline::PipelineBehavior;

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Registry of local handlers and pipeline behaviors per event type.
///
/// Provides two lookup mechanisms:
/// - **Handlers** are stored type-erased, so they can be resolved by runtime
///   key during outbox replay as well as by static type.
/// - **Behaviors** are typed per event (`PipelineBehavior<E>`) and stored as
///   `Box<dyn Any>` keyed by `TypeId`, downcast on lookup.
///
/// Both preserve registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<TypeId, Vec<Arc<dyn ErasedHandler>>>,
    behaviors: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local handler for events of type `E`.
    pub fn register_handler<E, H>(&self, handler: H)
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(TypedHandler::<E, H>::erased(handler));
    }

    /// Register a pipeline behavior for events of type `E`.
    pub fn register_behavior<E, B>(&self, behavior: B)
    where
        E: Event,
        B: PipelineBehavior<E>,
    {
        self.register_shared_behavior::<E>(Arc::new(behavior));
    }

    /// Register an already shared behavior, e.g. one instance used for
    /// several event types.
    pub fn register_shared_behavior<E: Event>(&self, behavior: Arc<dyn PipelineBehavior<E>>) {
        let mut entry = self
            .behaviors
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<Arc<dyn PipelineBehavior<E>>>::new()));
        if let Some(chain) = entry
            .value_mut()
            .downcast_mut::<Vec<Arc<dyn PipelineBehavior<E>>>>()
        {
            chain.push(behavior);
        }
    }

    /// Handlers for `E`, in registration order.
    #[must_use]
    pub fn handlers<E: Event>(&self) -> HandlerSet {
        self.handlers_by_key(EventKey::of::<E>())
    }

    /// Handlers for a runtime event type, in registration order.
    #[must_use]
    pub fn handlers_by_key(&self, key: EventKey) -> HandlerSet {
        self.handlers
            .get(&key.type_id)
            .map(|entry| HandlerSet::from(entry.value().as_slice()))
            .unwrap_or_else(|| HandlerSet::from(Vec::new()))
    }

    /// Behaviors for `E`, in registration order.
    #[must_use]
    pub fn behaviors<E: Event>(&self) -> Vec<Arc<dyn PipelineBehavior<E>>> {
        self.behaviors
            .get(&TypeId::of::<E>())
            .and_then(|entry| {
                entry
                    .value()
                    .downcast_ref::<Vec<Arc<dyn PipelineBehavior<E>>>>()
                    .cloned()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
