//! Deadline for the remainder of a dispatch.

use std::time::Duration;

use async_trait::async_trait;
use herald_core::{DispatchError, DispatchResult, Event};
use tokio_util::sync::CancellationToken;

use crate::pipeline::{Next, PipelineBehavior};

/// Fails the dispatch with `DispatchError::Timeout` when the rest of the
/// chain does not finish within `timeout`.
///
/// The rest of the chain is dropped at the deadline; hybrid branches still
/// running are aborted.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutBehavior {
    timeout: Duration,
}

impl TimeoutBehavior {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl<E: Event> PipelineBehavior<E> for TimeoutBehavior {
    async fn handle(
        &self,
        _event: &E,
        _cancel: &CancellationToken,
        next: Next<'_, E>,
    ) -> DispatchResult {
        match tokio::time::timeout(self.timeout, next.run()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(DispatchError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
