//! Built-in `HandlerOrchestrator`s.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use herald_core::{DispatchError, DispatchResult, ErasedHandler, Event, HandlerOrchestrator};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Runs handlers one after another in registration order.
///
/// A failing handler does not stop the ones after it; all failures are
/// aggregated. Cancellation is checked before each handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialOrchestrator;

#[async_trait]
impl HandlerOrchestrator for SequentialOrchestrator {
    async fn run(
        &self,
        handlers: &[Arc<dyn ErasedHandler>],
        event: &dyn Event,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let mut errors = Vec::new();
        for handler in handlers {
            if cancel.is_cancelled() {
                errors.push(DispatchError::Cancelled);
                break;
            }
            if let Err(err) = handler.handle(event, cancel).await {
                log_failure(handler.as_ref(), event, &err);
                errors.push(err);
            }
        }
        DispatchError::aggregate(errors)
    }
}

/// Runs all handlers concurrently on the current task and waits for every
/// one of them.
///
/// Failures are aggregated in registration order. Cancellation abandons the
/// handlers still running.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcurrentOrchestrator;

#[async_trait]
impl HandlerOrchestrator for ConcurrentOrchestrator {
    async fn run(
        &self,
        handlers: &[Arc<dyn ErasedHandler>],
        event: &dyn Event,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let all = join_all(handlers.iter().map(|handler| handler.handle(event, cancel)));
        let results = tokio::select! {
            biased;
            results = all => results,
            () = cancel.cancelled() => return Err(DispatchError::Cancelled),
        };

        let mut errors = Vec::new();
        for (handler, result) in handlers.iter().zip(results) {
            if let Err(err) = result {
                log_failure(handler.as_ref(), event, &err);
                errors.push(err);
            }
        }
        DispatchError::aggregate(errors)
    }
}

fn log_failure(handler: &dyn ErasedHandler, event: &dyn Event, err: &DispatchError) {
    warn!(
        handler = handler.name(),
        event_type = event.type_name(),
        event_id = %event.event_id(),
        error = %err,
        "local handler failed"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use herald_core::traits::TypedHandler;
    use herald_core::EventHandler;
    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::*;

    #[derive(Debug)]
    struct StockReserved(Uuid);

    impl Event for StockReserved {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    /// Appends its name to a shared log after an optional delay, then fails
    /// if configured to.
    struct Step {
        name: &'static str,
        delay_ms: u64,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EventHandler<StockReserved> for Step {
        async fn handle(&self, _event: &StockReserved, _cancel: &CancellationToken) -> DispatchResult {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.log.lock().push(self.name);
            if self.fail {
                Err(DispatchError::Handler {
                    handler: self.name,
                    reason: "out of stock".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn steps(
        specs: &[(&'static str, u64, bool)],
    ) -> (Vec<Arc<dyn ErasedHandler>>, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = specs
            .iter()
            .map(|&(name, delay_ms, fail)| {
                TypedHandler::<StockReserved, _>::erased(Step {
                    name,
                    delay_ms,
                    fail,
                    log: log.clone(),
                })
            })
            .collect();
        (handlers, log)
    }

    fn event() -> StockReserved {
        StockReserved(Uuid::new_v4())
    }

    #[tokio::test]
    async fn sequential_runs_in_order_and_continues_past_failures() {
        let (handlers, log) = steps(&[("a", 5, false), ("b", 0, true), ("c", 0, false)]);

        let err = SequentialOrchestrator
            .run(&handlers, &event(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert!(matches!(err, DispatchError::Handler { handler: "b", .. }));
    }

    #[tokio::test]
    async fn sequential_aggregates_multiple_failures() {
        let (handlers, _) = steps(&[("a", 0, true), ("b", 0, true)]);

        let err = SequentialOrchestrator
            .run(&handlers, &event(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Aggregate(ref errors) if errors.len() == 2));
    }

    #[tokio::test]
    async fn sequential_stops_when_cancelled() {
        let (handlers, log) = steps(&[("a", 0, false)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = SequentialOrchestrator
            .run(&handlers, &event(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn no_handlers_is_success() {
        assert!(SequentialOrchestrator
            .run(&[], &event(), &CancellationToken::new())
            .await
            .is_ok());
        assert!(ConcurrentOrchestrator
            .run(&[], &event(), &CancellationToken::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn concurrent_overlaps_handlers() {
        let (handlers, log) = steps(&[("slow", 40, false), ("fast", 0, false)]);

        ConcurrentOrchestrator
            .run(&handlers, &event(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn concurrent_reports_failures_in_registration_order() {
        let (handlers, _) = steps(&[("first", 20, true), ("ok", 0, false), ("second", 0, true)]);

        let err = ConcurrentOrchestrator
            .run(&handlers, &event(), &CancellationToken::new())
            .await
            .unwrap_err();

        let DispatchError::Aggregate(errors) = err else {
            panic!("expected aggregate, got {err:?}");
        };
        let names: Vec<_> = errors
            .iter()
            .map(|e| match e {
                DispatchError::Handler { handler, .. } => *handler,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn concurrent_cancellation_abandons_running_handlers() {
        let (handlers, log) = steps(&[("stuck", 10_000, false)]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = ConcurrentOrchestrator
            .run(&handlers, &event(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(log.lock().is_empty());
    }
}
