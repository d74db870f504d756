//! Collaborator contracts consumed by the dispatcher.
//!
//! Concrete storage backends, transports, and serializers live outside this
//! workspace; only their contracts are defined here.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;
use crate::error::{DispatchError, DispatchResult, TransportError};
use crate::event::{downcast_ref, Event};
use crate::types::{DistributionMode, MessageTraits};

/// Ordered, shared list of type-erased handlers for one event type.
pub type HandlerSet = Arc<[Arc<dyn ErasedHandler>]>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Local handler for events of type `E`.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    async fn handle(&self, event: &E, cancel: &CancellationToken) -> DispatchResult;

    /// Name used in logs and handler failure reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased handler invoked by a `HandlerOrchestrator`.
#[async_trait]
pub trait ErasedHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &dyn Event, cancel: &CancellationToken) -> DispatchResult;
}

/// Adapts an `EventHandler<E>` to `ErasedHandler` by downcasting on entry.
pub struct TypedHandler<E, H> {
    inner: H,
    _event: PhantomData<fn(E)>,
}

impl<E, H> TypedHandler<E, H>
where
    E: Event,
    H: EventHandler<E>,
{
    #[must_use]
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            _event: PhantomData,
        }
    }

    /// Wrap `inner` as a shareable erased handler.
    #[must_use]
    pub fn erased(inner: H) -> Arc<dyn ErasedHandler> {
        Arc::new(Self::new(inner))
    }
}

#[async_trait]
impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: Event,
    H: EventHandler<E>,
{
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn handle(&self, event: &dyn Event, cancel: &CancellationToken) -> DispatchResult {
        let Some(typed) = downcast_ref::<E>(event) else {
            return Err(DispatchError::TypeMismatch {
                expected: std::any::type_name::<E>(),
                actual: event.type_name(),
                event_id: event.event_id(),
            });
        };
        self.inner.handle(typed, cancel).await
    }
}

/// Runs the local handlers of one dispatch and aggregates their outcomes.
#[async_trait]
pub trait HandlerOrchestrator: Send + Sync {
    async fn run(
        &self,
        handlers: &[Arc<dyn ErasedHandler>],
        event: &dyn Event,
        cancel: &CancellationToken,
    ) -> DispatchResult;
}

// ---------------------------------------------------------------------------
// External transport
// ---------------------------------------------------------------------------

/// Builds the transport envelope for an event.
pub trait EnvelopeBuilder: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the event cannot be wrapped (e.g. serialization).
    fn build(&self, event: Arc<dyn Event>) -> anyhow::Result<Envelope>;
}

/// Hands envelopes to an external message transport.
#[async_trait]
pub trait TransportDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        envelope: Envelope,
        traits: &MessageTraits,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Pluggable rule that may override the distribution mode of an event.
///
/// Filters run in ascending `order`; the first `Some` decision wins. A
/// panicking filter is not caught: routing is deterministic infrastructure.
pub trait RoutingFilter: Send + Sync {
    fn order(&self) -> i32;

    fn decide(&self, event: &dyn Event) -> Option<DistributionMode>;
}

// ---------------------------------------------------------------------------
// Outbox storage
// ---------------------------------------------------------------------------

/// Durable outbox backend.
///
/// Items are keyed by `Event::event_id`. Implementations own the item
/// lifecycle: `add` creates a pending item, `mark_processed` and
/// `mark_failed` mutate it, nothing here deletes it.
///
/// Used as `Arc<dyn OutboxStorage>`.
#[async_trait]
pub trait OutboxStorage: Send + Sync {
    /// Record an event and its distribution mode before any dispatch.
    async fn add(&self, event: Arc<dyn Event>, mode: DistributionMode) -> anyhow::Result<()>;

    /// Mark an event as successfully delivered.
    async fn mark_processed(&self, event: &dyn Event) -> anyhow::Result<()>;

    /// Record a failed attempt, incrementing the attempt count.
    ///
    /// `next_attempt_at_ms` is absolute millis since epoch; `None` means the
    /// event is eligible immediately (or never, when dead-lettered).
    async fn mark_failed(
        &self,
        event: &dyn Event,
        reason: &str,
        dead_letter: bool,
        next_attempt_at_ms: Option<u64>,
    ) -> anyhow::Result<()>;

    /// Events that are neither processed nor dead-lettered and whose next
    /// attempt time has passed, oldest first, at most `limit` of them.
    async fn pending_events(&self, limit: Option<usize>) -> anyhow::Result<Vec<Arc<dyn Event>>>;

    /// Distribution mode recorded by `add`, if the event is known.
    async fn distribution_mode(&self, event: &dyn Event)
        -> anyhow::Result<Option<DistributionMode>>;

    /// Number of failed attempts recorded so far, if the event is known.
    async fn attempt_count(&self, event: &dyn Event) -> anyhow::Result<Option<u32>>;
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[derive(Debug)]
    struct UserRegistered(Uuid);

    impl Event for UserRegistered {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    #[derive(Debug)]
    struct UserDeleted(Uuid);

    impl Event for UserDeleted {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    struct RejectingHandler;

    #[async_trait]
    impl EventHandler<UserRegistered> for RejectingHandler {
        async fn handle(&self, event: &UserRegistered, _cancel: &CancellationToken) -> DispatchResult {
            Err(DispatchError::Handler {
                handler: "rejecting",
                reason: format!("refused {}", event.0),
            })
        }

        fn name(&self) -> &'static str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn typed_handler_receives_concrete_event() {
        let handler = TypedHandler::<UserRegistered, _>::erased(RejectingHandler);
        let id = Uuid::new_v4();
        let event = UserRegistered(id);

        let err = handler
            .handle(&event, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handler { reason, .. } if reason.contains(&id.to_string())));
        assert_eq!(handler.name(), "rejecting");
    }

    #[tokio::test]
    async fn typed_handler_rejects_other_event_types() {
        let handler = TypedHandler::<UserRegistered, _>::erased(RejectingHandler);
        let event = UserDeleted(Uuid::new_v4());

        let err = handler
            .handle(&event, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TypeMismatch { .. }));
    }
}
