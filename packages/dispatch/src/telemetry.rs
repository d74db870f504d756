//! Structured logging setup and dispatch metrics.
//!
//! Metrics go through the `metrics` facade; nothing is recorded unless the
//! host process installs a recorder/exporter.

use std::time::Duration;

use herald_core::DistributionMode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Histogram of per-branch dispatch duration, in seconds.
pub const DISPATCH_DURATION: &str = "herald.dispatch.duration_seconds";
/// Counter of per-branch dispatches, tagged with `outcome`.
pub const DISPATCH_TOTAL: &str = "herald.dispatch.total";
/// Counter of events replayed from the outbox, tagged with `outcome`.
pub const OUTBOX_PROCESSED_TOTAL: &str = "herald.outbox.processed.total";
/// Counter of events moved to the dead-letter state.
pub const OUTBOX_DEAD_LETTERED_TOTAL: &str = "herald.outbox.dead_lettered.total";

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Install a global `tracing` subscriber.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Calling this more than
/// once (e.g. from several tests) is harmless: later calls are ignored.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

// ---------------------------------------------------------------------------
// Metric helpers
// ---------------------------------------------------------------------------

/// Which distribution channel a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Branch {
    Local,
    External,
}

impl Branch {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::External => "external",
        }
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

pub(crate) fn record_branch(
    event_type: &'static str,
    mode: DistributionMode,
    branch: Branch,
    elapsed: Duration,
    success: bool,
) {
    metrics::histogram!(
        DISPATCH_DURATION,
        "event_type" => event_type,
        "mode" => mode.as_str(),
        "branch" => branch.as_str()
    )
    .record(elapsed.as_secs_f64());
    metrics::counter!(
        DISPATCH_TOTAL,
        "event_type" => event_type,
        "mode" => mode.as_str(),
        "branch" => branch.as_str(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

pub(crate) fn record_outbox_processed(event_type: &'static str, success: bool) {
    metrics::counter!(
        OUTBOX_PROCESSED_TOTAL,
        "event_type" => event_type,
        "outcome" => outcome(success)
    )
    .increment(1);
}

pub(crate) fn record_dead_lettered(event_type: &'static str) {
    metrics::counter!(OUTBOX_DEAD_LETTERED_TOTAL, "event_type" => event_type).increment(1);
}
