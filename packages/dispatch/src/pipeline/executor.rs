use std::sync::Arc;

use herald_core::{DispatchResult, DistributionMode, Event, HandlerSet, MessageTraits};
use tokio_util::sync::CancellationToken;

use super::{Next, PipelineBehavior};
use crate::outbox::OutboxManager;

/// Routing outcome and outbox policy for one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPlan {
    pub mode: DistributionMode,
    pub traits: Option<MessageTraits>,
    /// Run the channels directly instead of storing first.
    pub skip_outbox: bool,
}

// ---------------------------------------------------------------------------
// DispatchStep
// ---------------------------------------------------------------------------

/// Terminal step of the chain: outbox store-and-dispatch, or direct
/// distribution when the outbox is skipped.
pub struct DispatchStep<'a> {
    outbox: &'a OutboxManager,
    handlers: HandlerSet,
    plan: DispatchPlan,
}

impl DispatchStep<'_> {
    pub(crate) async fn execute(
        &self,
        event: Arc<dyn Event>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let DispatchPlan {
            mode,
            traits,
            skip_outbox,
        } = self.plan;
        if skip_outbox {
            self.outbox
                .dispatch_by_mode(event, &self.handlers, mode, traits, cancel)
                .await
        } else {
            self.outbox
                .store_and_dispatch(event, &self.handlers, mode, traits, cancel)
                .await
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

/// Runs an event through its behavior chain and then the dispatch step.
pub struct PipelineExecutor {
    outbox: Arc<OutboxManager>,
}

impl PipelineExecutor {
    #[must_use]
    pub fn new(outbox: Arc<OutboxManager>) -> Self {
        Self { outbox }
    }

    /// Run `behaviors` in order around the dispatch step for `event`.
    ///
    /// # Errors
    ///
    /// Returns whatever the chain returns: a behavior's own error when it
    /// short-circuits, `DispatchError::Cancelled`, or the dispatch step's
    /// result.
    pub async fn run<E: Event>(
        &self,
        event: Arc<E>,
        handlers: HandlerSet,
        behaviors: &[Arc<dyn PipelineBehavior<E>>],
        plan: DispatchPlan,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let terminal = DispatchStep {
            outbox: &self.outbox,
            handlers,
            plan,
        };
        Next::new(behaviors, &terminal, &event, cancel).run().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
