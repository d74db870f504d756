//! Background draining of the outbox.
//!
//! `BackgroundWorker<R>` owns a spawned task that feeds `R` tasks from an mpsc
//! channel and calls `on_tick` on a fixed interval. `OutboxPoller` is the
//! runnable that calls `EventDispatcher::process_pending` on every tick or
//! on demand.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::EventDispatcher;

const CHANNEL_CAPACITY: usize = 64;
/// Floor for the tick interval; `tokio::time::interval` rejects zero.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// BackgroundRunnable
// ---------------------------------------------------------------------------

/// Task handler driven by a `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    async fn run(&mut self, task: Self::Task);

    /// Called on every tick of the worker interval.
    async fn on_tick(&mut self) {}

    /// Called once after the loop exits.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Handle to a spawned worker loop.
///
/// The loop ends when [`stop`](Self::stop) is called, when the worker's
/// cancellation token fires, or when every sender is gone.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawn the loop. The first tick fires one `tick_interval` after start.
    /// A zero interval is raised to one millisecond.
    #[must_use]
    pub fn start(runnable: R, tick_interval: Duration, cancel: CancellationToken) -> Self {
        let tick_interval = if tick_interval.is_zero() {
            warn!(
                floor_ms = MIN_TICK_INTERVAL.as_millis(),
                "zero worker tick interval, using the floor"
            );
            MIN_TICK_INTERVAL
        } else {
            tick_interval
        };

        let (tx, rx) = mpsc::channel::<R::Task>(CHANNEL_CAPACITY);
        let handle = tokio::spawn(drive(runnable, rx, tick_interval, cancel.clone()));

        Self {
            tx: Some(tx),
            cancel,
            handle: Some(handle),
        }
    }

    /// Queue a task for the worker, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns an error once the worker has stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        let Some(tx) = &self.tx else {
            anyhow::bail!("outbox worker not running");
        };
        if tx.send(task).await.is_err() {
            anyhow::bail!("outbox worker loop has exited");
        }
        Ok(())
    }

    /// Cancel the loop, including any in-flight task, and wait for it to
    /// finish its shutdown hook.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "outbox worker task ended abnormally");
            }
        }
    }
}

/// Worker loop: tasks and ticks until cancelled or every sender is gone,
/// then the shutdown hook.
async fn drive<R: BackgroundRunnable>(
    mut runnable: R,
    mut rx: mpsc::Receiver<R::Task>,
    tick_interval: Duration,
    stop: CancellationToken,
) {
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            task = rx.recv() => {
                let Some(task) = task else { break };
                runnable.run(task).await;
            }
            _ = ticker.tick() => runnable.on_tick().await,
        }
    }

    runnable.shutdown().await;
}

// ---------------------------------------------------------------------------
// OutboxPoller
// ---------------------------------------------------------------------------

/// On-demand work for an `OutboxPoller`.
#[derive(Debug)]
pub enum OutboxTask {
    /// Drain one batch now instead of waiting for the next tick.
    Drain,
}

/// Runnable that drains pending outbox events through a dispatcher.
pub struct OutboxPoller {
    dispatcher: Arc<EventDispatcher>,
    cancel: CancellationToken,
    drains: u64,
}

impl OutboxPoller {
    #[must_use]
    pub fn new(dispatcher: Arc<EventDispatcher>, cancel: CancellationToken) -> Self {
        Self {
            dispatcher,
            cancel,
            drains: 0,
        }
    }

    /// Spawn a worker draining `dispatcher` every `poll_interval` from its
    /// configuration.
    #[must_use]
    pub fn spawn(
        dispatcher: Arc<EventDispatcher>,
        cancel: CancellationToken,
    ) -> BackgroundWorker<Self> {
        let interval = dispatcher.config().poll_interval;
        BackgroundWorker::start(Self::new(dispatcher, cancel.clone()), interval, cancel)
    }

    async fn drain(&mut self) {
        self.drains += 1;
        match self.dispatcher.process_pending(&self.cancel).await {
            Ok(()) => debug!(drain = self.drains, "outbox drain complete"),
            Err(err) if err.is_cancelled() => debug!("outbox drain cancelled"),
            Err(err) => warn!(drain = self.drains, error = %err, "outbox drain had failures"),
        }
    }
}

#[async_trait]
impl BackgroundRunnable for OutboxPoller {
    type Task = OutboxTask;

    async fn run(&mut self, task: OutboxTask) {
        match task {
            OutboxTask::Drain => self.drain().await,
        }
    }

    async fn on_tick(&mut self) {
        self.drain().await;
    }

    async fn shutdown(&mut self) {
        info!(drains = self.drains, "outbox poller stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
