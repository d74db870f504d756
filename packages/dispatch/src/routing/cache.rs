//! Per-event-type memoized routing decisions backed by [`DashMap`].

use std::any::TypeId;

use dashmap::DashMap;
use herald_core::DistributionMode;

/// Concurrent map from event `TypeId` to its resolved distribution mode.
///
/// Reads are lock-free per shard. Two dispatches of the same new type may
/// both resolve and insert; decisions are idempotent so the last write wins.
#[derive(Debug, Default)]
pub struct RoutingCache {
    entries: DashMap<TypeId, DistributionMode>,
}

impl RoutingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, type_id: TypeId) -> Option<DistributionMode> {
        self.entries.get(&type_id).map(|entry| *entry.value())
    }

    pub fn insert(&self, type_id: TypeId, mode: DistributionMode) {
        self.entries.insert(type_id, mode);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every decision, e.g. after filters or traits change.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
