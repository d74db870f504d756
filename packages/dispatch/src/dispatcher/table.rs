//! Replay table: event type name to a monomorphized re-dispatch function.
//!
//! Outbox storage hands back `Arc<dyn Event>`. To re-enter the typed dispatch
//! path, each registered event type contributes a plain `fn` pointer
//! instantiated for that type, which downcasts and calls
//! `EventDispatcher::dispatch_from_outbox::<E>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use herald_core::{downcast_event, DispatchResult, DistributionMode, Event};
use tokio_util::sync::CancellationToken;

use super::EventDispatcher;

/// Boxed dispatch future borrowing the dispatcher.
pub type BoxedFuture<'a> = Pin<Box<dyn Future<Output = DispatchResult> + Send + 'a>>;

/// Re-dispatch a type-erased event with a given mode.
pub type ReplayFn = for<'a> fn(
    Arc<dyn Event>,
    &'a EventDispatcher,
    DistributionMode,
    CancellationToken,
) -> BoxedFuture<'a>;

/// Replay functions keyed by `Event::type_name`.
#[derive(Default)]
pub struct DispatcherTable {
    entries: DashMap<&'static str, ReplayFn>,
}

impl DispatcherTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the replay function for `E`. Registering twice is a no-op.
    pub fn register<E: Event>(&self) {
        self.entries
            .insert(std::any::type_name::<E>(), replay_entry::<E> as ReplayFn);
    }

    #[must_use]
    pub fn get(&self, event_type: &str) -> Option<ReplayFn> {
        self.entries.get(event_type).map(|entry| *entry.value())
    }

    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.entries.contains_key(event_type)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn replay_entry<E: Event>(
    event: Arc<dyn Event>,
    dispatcher: &EventDispatcher,
    mode: DistributionMode,
    cancel: CancellationToken,
) -> BoxedFuture<'_> {
    Box::pin(async move {
        let event = downcast_event::<E>(event)?;
        dispatcher.dispatch_from_outbox(event, mode, &cancel).await
    })
}
