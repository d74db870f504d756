use std::any::TypeId;

use dashmap::DashMap;
use herald_core::{Event, EventKey, MessageTraits};

/// Registry of per-event-type [`MessageTraits`], populated at startup.
#[derive(Debug, Default)]
pub struct MessageTraitsRegistry {
    by_type: DashMap<TypeId, MessageTraits>,
}

impl MessageTraitsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the traits of event type `E`.
    pub fn register<E: Event>(&self, traits: MessageTraits) {
        self.by_type.insert(EventKey::of::<E>().type_id, traits);
    }

    #[must_use]
    pub fn get<E: Event>(&self) -> Option<MessageTraits> {
        self.get_by_key(EventKey::of::<E>())
    }

    /// Lookup by runtime key, for type-erased callers.
    #[must_use]
    pub fn get_by_key(&self, key: EventKey) -> Option<MessageTraits> {
        self.by_type.get(&key.type_id).map(|entry| *entry.value())
    }
}

#[cfg(test)]
mod tests {
    use herald_core::DistributionMode;
    use uuid::Uuid;

    use super::*;

    #[derive(Debug)]
    struct InvoiceIssued(Uuid);

    impl Event for InvoiceIssued {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    #[derive(Debug)]
    struct InvoicePaid(Uuid);

    impl Event for InvoicePaid {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    #[test]
    fn register_and_get_by_type() {
        let registry = MessageTraitsRegistry::new();
        registry.register::<InvoiceIssued>(MessageTraits::new(DistributionMode::Hybrid));

        let traits = registry.get::<InvoiceIssued>().unwrap();
        assert_eq!(traits.distribution_mode, DistributionMode::Hybrid);
        assert!(registry.get::<InvoicePaid>().is_none());
    }

    #[test]
    fn get_by_key_matches_runtime_type() {
        let registry = MessageTraitsRegistry::new();
        registry.register::<InvoicePaid>(MessageTraits::new(DistributionMode::ExternalOnly).with_fail_fast(true));

        let event = InvoicePaid(Uuid::new_v4());
        let traits = registry.get_by_key(event.event_key()).unwrap();
        assert!(traits.fail_fast);
    }
}
