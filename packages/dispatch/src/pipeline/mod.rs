//! Per-event-type behavior chain wrapped around distribution.
//!
//! Behaviors run in registration order. Each one receives the event and a
//! [`Next`] continuation; calling [`Next::run`] invokes the remaining chain
//! and, at its end, the distribution step (outbox store plus channels, or
//! channels only when the outbox is disabled). A behavior that returns
//! without calling `next` short-circuits the dispatch.

pub mod behaviors;
pub mod executor;

use std::sync::Arc;

use async_trait::async_trait;
use herald_core::{DispatchError, DispatchResult, Event};
use tokio_util::sync::CancellationToken;

pub use behaviors::{ConcurrencyLimitBehavior, TimeoutBehavior, TracingBehavior};
pub use executor::{DispatchPlan, DispatchStep, PipelineExecutor};

// ---------------------------------------------------------------------------
// PipelineBehavior
// ---------------------------------------------------------------------------

/// Cross-cutting step wrapped around the dispatch of events of type `E`.
#[async_trait]
pub trait PipelineBehavior<E: Event>: Send + Sync + 'static {
    async fn handle(
        &self,
        event: &E,
        cancel: &CancellationToken,
        next: Next<'_, E>,
    ) -> DispatchResult;
}

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

/// Continuation handed to a behavior: the rest of the chain plus the
/// distribution step.
pub struct Next<'a, E: Event> {
    behaviors: &'a [Arc<dyn PipelineBehavior<E>>],
    terminal: &'a DispatchStep<'a>,
    event: &'a Arc<E>,
    cancel: &'a CancellationToken,
}

impl<'a, E: Event> Next<'a, E> {
    pub(crate) fn new(
        behaviors: &'a [Arc<dyn PipelineBehavior<E>>],
        terminal: &'a DispatchStep<'a>,
        event: &'a Arc<E>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            behaviors,
            terminal,
            event,
            cancel,
        }
    }

    /// Number of behaviors still ahead of the distribution step.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.behaviors.len()
    }

    /// Run the rest of the chain.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Cancelled` if cancellation was requested before
    /// the next step started, otherwise whatever the chain returns.
    pub async fn run(self) -> DispatchResult {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        match self.behaviors.split_first() {
            Some((head, rest)) => {
                let next = Next::new(rest, self.terminal, self.event, self.cancel);
                head.handle(&**self.event, self.cancel, next).await
            }
            None => {
                let event: Arc<E> = Arc::clone(self.event);
                self.terminal.execute(event, self.cancel).await
            }
        }
    }
}
