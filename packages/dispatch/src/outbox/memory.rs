//! In-memory [`OutboxStorage`] implementation backed by [`DashMap`].
//!
//! Keeps every item for the lifetime of the process, including processed and
//! dead-lettered ones, so tests and operators can inspect the full history.
//! Not durable: a restart loses everything pending.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use herald_core::{DistributionMode, Event, OutboxStorage};
use tracing::debug;
use uuid::Uuid;

use super::retry::now_millis;

/// One recorded event and its delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct OutboxItem {
    pub event: Arc<dyn Event>,
    pub mode: DistributionMode,
    pub processed: bool,
    pub attempt_count: u32,
    pub dead_lettered: bool,
    pub next_attempt_at_ms: Option<u64>,
    pub last_failure: Option<String>,
    pub created_at_ms: u64,
    sequence: u64,
}

impl OutboxItem {
    /// Eligible for `pending_events` at `now_ms`.
    #[must_use]
    pub fn is_pending(&self, now_ms: u64) -> bool {
        !self.processed
            && !self.dead_lettered
            && !matches!(self.next_attempt_at_ms, Some(at) if at > now_ms)
    }
}

/// In-memory outbox keyed by event id.
///
/// Pending events are returned in insertion order. Adding an event id that
/// is already present keeps the existing item and its bookkeeping.
pub struct InMemoryOutboxStorage {
    items: DashMap<Uuid, OutboxItem>,
    next_sequence: AtomicU64,
}

impl InMemoryOutboxStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Snapshot of the item recorded for `event_id`.
    #[must_use]
    pub fn item(&self, event_id: Uuid) -> Option<OutboxItem> {
        self.items.get(&event_id).map(|entry| entry.value().clone())
    }

    /// Snapshots of all dead-lettered items, oldest first.
    #[must_use]
    pub fn dead_lettered(&self) -> Vec<OutboxItem> {
        self.sorted(|item| item.dead_lettered)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn sorted(&self, keep: impl Fn(&OutboxItem) -> bool) -> Vec<OutboxItem> {
        let mut items: Vec<OutboxItem> = self
            .items
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by_key(|item| item.sequence);
        items
    }
}

impl Default for InMemoryOutboxStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboxStorage for InMemoryOutboxStorage {
    async fn add(&self, event: Arc<dyn Event>, mode: DistributionMode) -> anyhow::Result<()> {
        let event_id = event.event_id();
        let mut inserted = false;
        self.items.entry(event_id).or_insert_with(|| {
            inserted = true;
            OutboxItem {
                event,
                mode,
                processed: false,
                attempt_count: 0,
                dead_lettered: false,
                next_attempt_at_ms: None,
                last_failure: None,
                created_at_ms: now_millis(),
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            }
        });
        if !inserted {
            debug!(%event_id, "event already in outbox, keeping existing item");
        }
        Ok(())
    }

    async fn mark_processed(&self, event: &dyn Event) -> anyhow::Result<()> {
        let event_id = event.event_id();
        let mut item = self
            .items
            .get_mut(&event_id)
            .ok_or_else(|| anyhow!("event {event_id} is not in the outbox"))?;
        item.processed = true;
        item.next_attempt_at_ms = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        event: &dyn Event,
        reason: &str,
        dead_letter: bool,
        next_attempt_at_ms: Option<u64>,
    ) -> anyhow::Result<()> {
        let event_id = event.event_id();
        let mut item = self
            .items
            .get_mut(&event_id)
            .ok_or_else(|| anyhow!("event {event_id} is not in the outbox"))?;
        item.attempt_count = item.attempt_count.saturating_add(1);
        item.dead_lettered |= dead_letter;
        item.next_attempt_at_ms = next_attempt_at_ms;
        item.last_failure = Some(reason.to_string());
        Ok(())
    }

    async fn pending_events(&self, limit: Option<usize>) -> anyhow::Result<Vec<Arc<dyn Event>>> {
        let now_ms = now_millis();
        let pending = self
            .sorted(|item| item.is_pending(now_ms))
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|item| item.event)
            .collect();
        Ok(pending)
    }

    async fn distribution_mode(
        &self,
        event: &dyn Event,
    ) -> anyhow::Result<Option<DistributionMode>> {
        Ok(self.items.get(&event.event_id()).map(|item| item.mode))
    }

    async fn attempt_count(&self, event: &dyn Event) -> anyhow::Result<Option<u32>> {
        Ok(self
            .items
            .get(&event.event_id())
            .map(|item| item.attempt_count))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct InvoiceIssued(Uuid);

    impl Event for InvoiceIssued {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    fn invoice() -> Arc<dyn Event> {
        Arc::new(InvoiceIssued(Uuid::new_v4()))
    }

    fn ids(events: &[Arc<dyn Event>]) -> Vec<Uuid> {
        events.iter().map(|e| e.event_id()).collect()
    }

    #[tokio::test]
    async fn pending_in_insertion_order_with_limit() {
        let storage = InMemoryOutboxStorage::new();
        let events: Vec<_> = (0..5).map(|_| invoice()).collect();
        for event in &events {
            storage.add(event.clone(), DistributionMode::LocalOnly).await.unwrap();
        }

        let all = storage.pending_events(None).await.unwrap();
        assert_eq!(ids(&all), ids(&events));

        let first_two = storage.pending_events(Some(2)).await.unwrap();
        assert_eq!(ids(&first_two), ids(&events[..2]));
    }

    #[tokio::test]
    async fn processed_and_dead_lettered_are_not_pending() {
        let storage = InMemoryOutboxStorage::new();
        let done = invoice();
        let dead = invoice();
        let open = invoice();
        for event in [&done, &dead, &open] {
            storage.add(event.clone(), DistributionMode::Hybrid).await.unwrap();
        }

        storage.mark_processed(done.as_ref()).await.unwrap();
        storage.mark_failed(dead.as_ref(), "broker down", true, None).await.unwrap();

        let pending = storage.pending_events(None).await.unwrap();
        assert_eq!(ids(&pending), vec![open.event_id()]);
        assert_eq!(storage.dead_lettered().len(), 1);
        assert_eq!(storage.len(), 3);
    }

    #[tokio::test]
    async fn scheduled_retry_waits_for_its_time() {
        let storage = InMemoryOutboxStorage::new();
        let later = invoice();
        let due = invoice();
        storage.add(later.clone(), DistributionMode::LocalOnly).await.unwrap();
        storage.add(due.clone(), DistributionMode::LocalOnly).await.unwrap();

        let future = now_millis() + 60_000;
        storage.mark_failed(later.as_ref(), "timeout", false, Some(future)).await.unwrap();
        storage.mark_failed(due.as_ref(), "timeout", false, Some(1)).await.unwrap();

        let pending = storage.pending_events(None).await.unwrap();
        assert_eq!(ids(&pending), vec![due.event_id()]);
    }

    #[tokio::test]
    async fn mark_failed_counts_attempts_and_keeps_reason() {
        let storage = InMemoryOutboxStorage::new();
        let event = invoice();
        storage.add(event.clone(), DistributionMode::ExternalOnly).await.unwrap();

        storage.mark_failed(event.as_ref(), "first", false, None).await.unwrap();
        storage.mark_failed(event.as_ref(), "second", false, None).await.unwrap();

        assert_eq!(storage.attempt_count(event.as_ref()).await.unwrap(), Some(2));
        let item = storage.item(event.event_id()).unwrap();
        assert_eq!(item.last_failure.as_deref(), Some("second"));
        assert_eq!(item.mode, DistributionMode::ExternalOnly);
    }

    #[tokio::test]
    async fn re_adding_keeps_existing_item() {
        let storage = InMemoryOutboxStorage::new();
        let event = invoice();
        storage.add(event.clone(), DistributionMode::LocalOnly).await.unwrap();
        storage.mark_failed(event.as_ref(), "boom", false, None).await.unwrap();

        storage.add(event.clone(), DistributionMode::Hybrid).await.unwrap();

        assert_eq!(
            storage.distribution_mode(event.as_ref()).await.unwrap(),
            Some(DistributionMode::LocalOnly)
        );
        assert_eq!(storage.attempt_count(event.as_ref()).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn unknown_events() {
        let storage = InMemoryOutboxStorage::new();
        let stranger = invoice();

        assert!(storage.mark_processed(stranger.as_ref()).await.is_err());
        assert!(storage.mark_failed(stranger.as_ref(), "x", false, None).await.is_err());
        assert_eq!(storage.distribution_mode(stranger.as_ref()).await.unwrap(), None);
        assert_eq!(storage.attempt_count(stranger.as_ref()).await.unwrap(), None);
    }
}
