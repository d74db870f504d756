//! Built-in pipeline behaviors.
//!
//! - [`TimeoutBehavior`]: bounds the rest of the chain with a deadline
//! - [`ConcurrencyLimitBehavior`]: sheds load above a concurrency limit
//! - [`TracingBehavior`]: logs duration and outcome of each dispatch

pub mod concurrency;
pub mod instrument;
pub mod timeout;

pub use concurrency::ConcurrencyLimitBehavior;
pub use instrument::TracingBehavior;
pub use timeout::TimeoutBehavior;

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal chain runner for behavior tests: a single local handler that
    //! sleeps, behind an outbox-less dispatch step.

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use herald_core::traits::TypedHandler;
    use herald_core::{DispatchResult, DistributionMode, Event, EventHandler, HandlerSet};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::config::OutboxOptions;
    use crate::handlers::SequentialOrchestrator;
    use crate::outbox::{InMemoryOutboxStorage, OutboxManager};
    use crate::pipeline::{DispatchPlan, PipelineBehavior, PipelineExecutor};
    use crate::transport::{DefaultEnvelopeBuilder, NullTransport};

    #[derive(Debug)]
    pub struct Probe(pub Uuid);

    impl Event for Probe {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    struct Sleeper {
        delay: Duration,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl EventHandler<Probe> for Sleeper {
        async fn handle(&self, _event: &Probe, _cancel: &CancellationToken) -> DispatchResult {
            tokio::time::sleep(self.delay).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub struct Harness {
        executor: PipelineExecutor,
        handlers: HandlerSet,
        pub calls: Arc<AtomicU32>,
    }

    impl Harness {
        pub fn new(handler_delay: Duration) -> Self {
            let outbox = OutboxManager::new(
                Arc::new(InMemoryOutboxStorage::new()),
                Arc::new(SequentialOrchestrator),
                Arc::new(DefaultEnvelopeBuilder::new()),
                Arc::new(NullTransport),
                OutboxOptions::default(),
            );
            let calls = Arc::new(AtomicU32::new(0));
            let handlers: HandlerSet = vec![TypedHandler::<Probe, _>::erased(Sleeper {
                delay: handler_delay,
                calls: calls.clone(),
            })]
            .into();
            Self {
                executor: PipelineExecutor::new(Arc::new(outbox)),
                handlers,
                calls,
            }
        }

        pub async fn run(&self, behavior: Arc<dyn PipelineBehavior<Probe>>) -> DispatchResult {
            let plan = DispatchPlan {
                mode: DistributionMode::LocalOnly,
                traits: None,
                skip_outbox: true,
            };
            self.executor
                .run(
                    Arc::new(Probe(Uuid::new_v4())),
                    self.handlers.clone(),
                    &[behavior],
                    plan,
                    &CancellationToken::new(),
                )
                .await
        }
    }
}
