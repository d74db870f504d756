//! Event model: the `Event` trait, runtime type identity, and downcasting.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::DispatchError;

// ---------------------------------------------------------------------------
// AsAnyEvent (blanket helper)
// ---------------------------------------------------------------------------

/// Object-safe access to `Any` for every event type.
///
/// Implemented for all `'static + Send + Sync` types, so event authors never
/// implement it by hand. Call these through `dyn Event`, never through an
/// `Arc` or reference wrapper, or the blanket impl resolves to the wrapper.
pub trait AsAnyEvent: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyEvent for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A domain event routed through the dispatcher.
///
/// Events are identified by their runtime type (for routing, handler lookup,
/// and outbox replay) and by a per-instance id (for outbox bookkeeping).
/// The id must be stable for the lifetime of the event: the outbox keys
/// attempt counts and processed flags on it.
pub trait Event: AsAnyEvent + fmt::Debug {
    /// Unique identifier of this event instance.
    fn event_id(&self) -> Uuid;

    /// Stable name of the concrete event type.
    ///
    /// The outbox replay table is keyed by this default value; overriding it
    /// makes stored events of the type unreplayable.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Runtime type identity of the concrete event, also through `dyn Event`.
    fn event_key(&self) -> EventKey {
        EventKey {
            type_id: TypeId::of::<Self>(),
            name: std::any::type_name::<Self>(),
        }
    }
}

/// Borrow the concrete event behind a trait object if it is an `E`.
#[must_use]
pub fn downcast_ref<E: Event>(event: &dyn Event) -> Option<&E> {
    event.as_any().downcast_ref::<E>()
}

/// Recover the concrete `Arc<E>` from a type-erased event.
///
/// # Errors
///
/// Returns `DispatchError::TypeMismatch` if the event is not an `E`.
pub fn downcast_event<E: Event>(event: Arc<dyn Event>) -> Result<Arc<E>, DispatchError> {
    let event_id = event.event_id();
    let actual = event.type_name();
    AsAnyEvent::into_any_arc(event)
        .downcast::<E>()
        .map_err(|_| DispatchError::TypeMismatch {
            expected: std::any::type_name::<E>(),
            actual,
            event_id,
        })
}

// ---------------------------------------------------------------------------
// EventKey
// ---------------------------------------------------------------------------

/// Runtime type identity of an event: `TypeId` for in-process lookups plus
/// the type name for logs, metrics, and replay.
///
/// Equality and hashing use the `TypeId` only.
#[derive(Debug, Clone, Copy)]
pub struct EventKey {
    pub type_id: TypeId,
    pub name: &'static str,
}

impl EventKey {
    /// Key of the statically known event type `E`.
    #[must_use]
    pub fn of<E: Event>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EventKey {}

impl std::hash::Hash for EventKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct OrderPlaced {
        id: Uuid,
    }

    impl Event for OrderPlaced {
        fn event_id(&self) -> Uuid {
            self.id
        }
    }

    #[derive(Debug)]
    struct OrderShipped {
        id: Uuid,
    }

    impl Event for OrderShipped {
        fn event_id(&self) -> Uuid {
            self.id
        }
    }

    #[test]
    fn event_key_matches_static_key() {
        let event: Arc<dyn Event> = Arc::new(OrderPlaced { id: Uuid::new_v4() });
        assert_eq!(event.event_key(), EventKey::of::<OrderPlaced>());
        assert_ne!(event.event_key(), EventKey::of::<OrderShipped>());
    }

    #[test]
    fn type_name_is_concrete_type() {
        let event: Arc<dyn Event> = Arc::new(OrderPlaced { id: Uuid::new_v4() });
        assert!(event.type_name().ends_with("OrderPlaced"));
        assert_eq!(event.event_key().to_string(), event.type_name());
    }

    #[test]
    fn downcast_ref_recovers_concrete_event() {
        let id = Uuid::new_v4();
        let event: Arc<dyn Event> = Arc::new(OrderPlaced { id });
        assert_eq!(downcast_ref::<OrderPlaced>(event.as_ref()).map(|e| e.id), Some(id));
        assert!(downcast_ref::<OrderShipped>(event.as_ref()).is_none());
    }

    #[test]
    fn downcast_event_recovers_arc() {
        let id = Uuid::new_v4();
        let event: Arc<dyn Event> = Arc::new(OrderPlaced { id });
        let typed = downcast_event::<OrderPlaced>(event).unwrap();
        assert_eq!(typed.id, id);
    }

    #[test]
    fn downcast_event_wrong_type_is_mismatch() {
        let id = Uuid::new_v4();
        let event: Arc<dyn Event> = Arc::new(OrderPlaced { id });
        let err = downcast_event::<OrderShipped>(event).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::TypeMismatch { event_id, .. } if event_id == id
        ));
    }
}
