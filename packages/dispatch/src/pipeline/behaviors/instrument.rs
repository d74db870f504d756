//! Per-dispatch duration and outcome logging.

use std::time::Instant;

use async_trait::async_trait;
use herald_core::{DispatchResult, Event};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::{Next, PipelineBehavior};

/// Logs every dispatch it wraps with its duration and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBehavior;

#[async_trait]
impl<E: Event> PipelineBehavior<E> for TracingBehavior {
    async fn handle(
        &self,
        event: &E,
        _cancel: &CancellationToken,
        next: Next<'_, E>,
    ) -> DispatchResult {
        let start = Instant::now();
        let result = next.run().await;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => info!(
                event_type = event.type_name(),
                event_id = %event.event_id(),
                duration_ms,
                outcome = "ok",
                "dispatch complete"
            ),
            Err(err) => warn!(
                event_type = event.type_name(),
                event_id = %event.event_id(),
                duration_ms,
                outcome = "error",
                error = %err,
                "dispatch failed"
            ),
        }
        result
    }
}
