//! Load shedding for dispatches.

use std::sync::Arc;

use async_trait::async_trait;
use herald_core::{DispatchError, DispatchResult, Event};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{Next, PipelineBehavior};

/// Rejects dispatches with `DispatchError::Overloaded` while `max_concurrent`
/// dispatches are already in flight, instead of queueing them.
///
/// Clones share the same limit, so one instance can guard several event
/// types.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimitBehavior {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimitBehavior {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl<E: Event> PipelineBehavior<E> for ConcurrencyLimitBehavior {
    async fn handle(
        &self,
        _event: &E,
        _cancel: &CancellationToken,
        next: Next<'_, E>,
    ) -> DispatchResult {
        let Ok(_permit) = self.semaphore.try_acquire() else {
            return Err(DispatchError::Overloaded);
        };
        next.run().await
    }
}
