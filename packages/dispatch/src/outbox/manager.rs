//! Write-ahead outbox: store, distribute, record failures, replay pending.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use herald_core::{
    combine_hybrid, DispatchError, DispatchResult, DispatchStrategy, DistributionMode,
    EnvelopeBuilder, Event, HandlerOrchestrator, HandlerSet, MessageTraits, OutboxStorage,
    TransportDispatcher,
};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::retry::{now_millis, plan_retry};
use crate::config::OutboxOptions;
use crate::dispatcher::{DispatcherTable, EventDispatcher};
use crate::telemetry::{self, Branch};

// ---------------------------------------------------------------------------
// OutboxManager
// ---------------------------------------------------------------------------

/// Records events before distributing them and replays what was not
/// delivered.
///
/// Distribution channels:
/// - **local**: the registered handlers, run by the `HandlerOrchestrator`
/// - **external**: an envelope built by the `EnvelopeBuilder`, handed to the
///   `TransportDispatcher`
/// - **hybrid**: both, started concurrently and awaited together
///
/// Failures are recorded against the event with exponential backoff until
/// the retry budget is exhausted, after which the event is dead-lettered.
///
/// At most one `process_pending` drain runs at a time per manager.
pub struct OutboxManager {
    storage: Arc<dyn OutboxStorage>,
    orchestrator: Arc<dyn HandlerOrchestrator>,
    envelopes: Arc<dyn EnvelopeBuilder>,
    transport: Arc<dyn TransportDispatcher>,
    options: OutboxOptions,
    drain: Mutex<()>,
}

impl OutboxManager {
    #[must_use]
    pub fn new(
        storage: Arc<dyn OutboxStorage>,
        orchestrator: Arc<dyn HandlerOrchestrator>,
        envelopes: Arc<dyn EnvelopeBuilder>,
        transport: Arc<dyn TransportDispatcher>,
        options: OutboxOptions,
    ) -> Self {
        Self {
            storage,
            orchestrator,
            envelopes,
            transport,
            options,
            drain: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn options(&self) -> &OutboxOptions {
        &self.options
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn OutboxStorage> {
        &self.storage
    }

    /// Record `event` with its mode, then deliver it according to the
    /// configured strategy.
    ///
    /// With `Immediate`, the event is distributed right away: success marks
    /// it processed, failure is recorded for retry. The failure is returned
    /// when `traits.fail_fast` is set and swallowed otherwise (a background
    /// drain will retry it). `Deferred` and `Batched` only store.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Storage` if the event cannot be stored (nothing is
    ///   distributed then) or its outcome cannot be recorded
    /// - `DispatchError::Cancelled` if `cancel` fires; never recorded as an
    ///   attempt
    /// - the distribution failure itself, when fail-fast
    pub async fn store_and_dispatch(
        &self,
        event: Arc<dyn Event>,
        handlers: &HandlerSet,
        mode: DistributionMode,
        traits: Option<MessageTraits>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        self.storage
            .add(Arc::clone(&event), mode)
            .await
            .map_err(DispatchError::Storage)?;

        if self.options.strategy != DispatchStrategy::Immediate {
            debug!(
                event_type = event.type_name(),
                event_id = %event.event_id(),
                strategy = ?self.options.strategy,
                "event stored for later delivery"
            );
            return Ok(());
        }

        let fail_fast = traits.as_ref().is_some_and(|t| t.fail_fast);
        match self
            .dispatch_by_mode(Arc::clone(&event), handlers, mode, traits, cancel)
            .await
        {
            Ok(()) => self
                .storage
                .mark_processed(event.as_ref())
                .await
                .map_err(DispatchError::Storage),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                self.handle_dispatch_failure(event.as_ref(), &err.to_string())
                    .await?;
                if fail_fast {
                    Err(err)
                } else {
                    warn!(
                        event_type = event.type_name(),
                        event_id = %event.event_id(),
                        error = %err,
                        "immediate dispatch failed, left in outbox for retry"
                    );
                    Ok(())
                }
            }
        }
    }

    /// Distribute `event` through the channels of `mode`, without touching
    /// the outbox.
    ///
    /// Hybrid runs both channels as concurrent tasks. Cancelling (or dropping
    /// the returned future) aborts whichever branch is still running.
    ///
    /// # Errors
    ///
    /// Returns the channel failure; for hybrid, a `DispatchError::Hybrid`
    /// carrying each failed branch's error.
    pub async fn dispatch_by_mode(
        &self,
        event: Arc<dyn Event>,
        handlers: &HandlerSet,
        mode: DistributionMode,
        traits: Option<MessageTraits>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let traits = traits.unwrap_or_else(|| MessageTraits::new(mode));
        match mode {
            DistributionMode::LocalOnly => {
                let local = run_local(
                    Arc::clone(&self.orchestrator),
                    HandlerSet::clone(handlers),
                    event,
                    mode,
                    cancel.clone(),
                );
                until_cancelled(local, cancel).await
            }
            DistributionMode::ExternalOnly => {
                let external = run_external(
                    Arc::clone(&self.envelopes),
                    Arc::clone(&self.transport),
                    event,
                    traits,
                    mode,
                    cancel.clone(),
                );
                until_cancelled(external, cancel).await
            }
            DistributionMode::Hybrid => self.run_hybrid(event, handlers, traits, cancel).await,
        }
    }

    async fn run_hybrid(
        &self,
        event: Arc<dyn Event>,
        handlers: &HandlerSet,
        traits: MessageTraits,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let mode = DistributionMode::Hybrid;
        let local = tokio::spawn(run_local(
            Arc::clone(&self.orchestrator),
            HandlerSet::clone(handlers),
            Arc::clone(&event),
            mode,
            cancel.clone(),
        ));
        let external = tokio::spawn(run_external(
            Arc::clone(&self.envelopes),
            Arc::clone(&self.transport),
            event,
            traits,
            mode,
            cancel.clone(),
        ));
        let _local_guard = AbortOnDrop(local.abort_handle());
        let _external_guard = AbortOnDrop(external.abort_handle());

        tokio::select! {
            biased;
            (local, external) = async { tokio::join!(local, external) } => {
                combine_hybrid(
                    flatten_join(local, Branch::Local),
                    flatten_join(external, Branch::External),
                )
            }
            () = cancel.cancelled() => Err(DispatchError::Cancelled),
        }
    }

    /// Record a failed attempt for `event`: bump its attempt count and either
    /// schedule the next attempt with exponential backoff or dead-letter it.
    ///
    /// Not cancellable: once a failure happened it is always recorded.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Storage` if the outbox cannot be read or
    /// updated.
    pub async fn handle_dispatch_failure(&self, event: &dyn Event, reason: &str) -> DispatchResult {
        let attempt_count = self
            .storage
            .attempt_count(event)
            .await
            .map_err(DispatchError::Storage)?
            .unwrap_or(0);
        let decision = plan_retry(&self.options, attempt_count, now_millis());

        self.storage
            .mark_failed(event, reason, decision.dead_letter, decision.next_attempt_at_ms)
            .await
            .map_err(DispatchError::Storage)?;

        if decision.dead_letter {
            telemetry::record_dead_lettered(event.type_name());
            error!(
                event_type = event.type_name(),
                event_id = %event.event_id(),
                attempt = decision.attempt_number,
                reason,
                "event dead-lettered after exhausting retries"
            );
        } else {
            warn!(
                event_type = event.type_name(),
                event_id = %event.event_id(),
                attempt = decision.attempt_number,
                next_attempt_at_ms = decision.next_attempt_at_ms,
                reason,
                "dispatch attempt failed, retry scheduled"
            );
        }
        Ok(())
    }

    /// Replay up to `batch_size` pending events through their registered
    /// replay functions, in the order storage returns them.
    ///
    /// Each event is delivered with the mode recorded when it was stored.
    /// Successes are marked processed; failures are recorded for retry and
    /// collected. An event type with no replay function is a configuration
    /// error and is dead-lettered at once.
    ///
    /// Concurrent calls (a poller tick racing an explicit drain) queue behind
    /// each other, so an event is never replayed twice for one failure.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Cancelled` if `cancel` fires while waiting for
    ///   another drain
    /// - `DispatchError::Storage` if the pending list cannot be read
    /// - `DispatchError::Batch` listing every event failure of this run
    pub async fn process_pending(
        &self,
        table: &DispatcherTable,
        dispatcher: &EventDispatcher,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let _drain = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DispatchError::Cancelled),
            guard = self.drain.lock() => guard,
        };

        let pending = self
            .storage
            .pending_events(self.options.batch_size)
            .await
            .map_err(DispatchError::Storage)?;
        let total = pending.len();
        if total > 0 {
            debug!(count = total, "processing pending outbox events");
        }

        let mut errors = Vec::new();
        for event in pending {
            if cancel.is_cancelled() {
                errors.push(DispatchError::Cancelled);
                break;
            }
            if let Err(err) = self.replay_one(table, dispatcher, event, cancel).await {
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Batch { total, errors })
        }
    }

    async fn replay_one(
        &self,
        table: &DispatcherTable,
        dispatcher: &EventDispatcher,
        event: Arc<dyn Event>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let event_type = event.type_name();

        let Some(replay) = table.get(event_type) else {
            let err = DispatchError::UnregisteredEventType {
                event_type: event_type.to_string(),
            };
            self.storage
                .mark_failed(event.as_ref(), &err.to_string(), true, None)
                .await
                .map_err(DispatchError::Storage)?;
            telemetry::record_dead_lettered(event_type);
            telemetry::record_outbox_processed(event_type, false);
            error!(
                event_type,
                event_id = %event.event_id(),
                "no replay function registered, event dead-lettered"
            );
            return Err(err);
        };

        let mode = match self
            .storage
            .distribution_mode(event.as_ref())
            .await
            .map_err(DispatchError::Storage)?
        {
            Some(mode) => mode,
            None => {
                warn!(
                    event_type,
                    event_id = %event.event_id(),
                    "stored distribution mode missing, replaying locally"
                );
                DistributionMode::LocalOnly
            }
        };

        match replay(Arc::clone(&event), dispatcher, mode, cancel.clone()).await {
            Ok(()) => {
                self.storage
                    .mark_processed(event.as_ref())
                    .await
                    .map_err(DispatchError::Storage)?;
                telemetry::record_outbox_processed(event_type, true);
                Ok(())
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                telemetry::record_outbox_processed(event_type, false);
                if let Err(record_err) = self
                    .handle_dispatch_failure(event.as_ref(), &err.to_string())
                    .await
                {
                    error!(
                        event_type,
                        event_id = %event.event_id(),
                        error = %record_err,
                        "failed to record outbox failure"
                    );
                }
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)]
async fn run_local(
    orchestrator: Arc<dyn HandlerOrchestrator>,
    handlers: HandlerSet,
    event: Arc<dyn Event>,
    mode: DistributionMode,
    cancel: CancellationToken,
) -> DispatchResult {
    let start = Instant::now();
    let result = orchestrator.run(&handlers, event.as_ref(), &cancel).await;
    telemetry::record_branch(
        event.type_name(),
        mode,
        Branch::Local,
        start.elapsed(),
        result.is_ok(),
    );
    result
}

#[allow(clippy::needless_pass_by_value)]
async fn run_external(
    envelopes: Arc<dyn EnvelopeBuilder>,
    transport: Arc<dyn TransportDispatcher>,
    event: Arc<dyn Event>,
    traits: MessageTraits,
    mode: DistributionMode,
    cancel: CancellationToken,
) -> DispatchResult {
    let start = Instant::now();
    let event_type = event.type_name();
    let result = match envelopes.build(event) {
        Ok(envelope) => transport
            .dispatch(envelope, &traits, &cancel)
            .await
            .map_err(DispatchError::from),
        Err(err) => Err(DispatchError::Envelope(err)),
    };
    telemetry::record_branch(
        event_type,
        mode,
        Branch::External,
        start.elapsed(),
        result.is_ok(),
    );
    result
}

async fn until_cancelled<F>(branch: F, cancel: &CancellationToken) -> DispatchResult
where
    F: Future<Output = DispatchResult>,
{
    tokio::select! {
        biased;
        result = branch => result,
        () = cancel.cancelled() => Err(DispatchError::Cancelled),
    }
}

fn flatten_join(joined: Result<DispatchResult, JoinError>, branch: Branch) -> DispatchResult {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_cancelled() => Err(DispatchError::Cancelled),
        Err(err) => Err(DispatchError::Internal(anyhow::anyhow!(
            "{} branch panicked: {err}",
            branch.as_str()
        ))),
    }
}

/// Aborts a spawned branch when the hybrid dispatch is cancelled or dropped.
/// Aborting a finished task is a no-op.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
