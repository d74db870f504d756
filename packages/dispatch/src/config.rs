use std::time::Duration;

use herald_core::{DispatchStrategy, DistributionMode};

/// Dispatcher-level configuration.
///
/// Controls the fallback routing decision, outbox reliability settings, and
/// the background poller cadence.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Mode used when neither a routing filter nor registered traits decide.
    pub default_mode: DistributionMode,
    pub outbox: OutboxOptions,
    /// Interval between background `process_pending` runs.
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_mode: DistributionMode::LocalOnly,
            outbox: OutboxOptions::default(),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Outbox reliability settings: write-ahead toggle, dispatch strategy, and
/// the retry/backoff/dead-letter budget.
#[derive(Debug, Clone)]
pub struct OutboxOptions {
    /// When false, generic dispatch skips the write-ahead store and runs the
    /// distribution channels directly.
    pub enabled: bool,
    pub strategy: DispatchStrategy,
    /// Attempt number at which an event is dead-lettered.
    pub max_retry_attempts: u32,
    /// Base delay before the first retry. Zero schedules retries immediately.
    pub initial_retry_delay: Duration,
    /// Multiplier applied per recorded attempt.
    pub backoff_factor: f64,
    /// Maximum number of pending events fetched per `process_pending` run.
    /// `None` drains everything pending.
    pub batch_size: Option<usize>,
}

impl Default for OutboxOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: DispatchStrategy::Immediate,
            max_retry_attempts: 5,
            initial_retry_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            batch_size: Some(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.default_mode, DistributionMode::LocalOnly);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn outbox_options_defaults() {
        let options = OutboxOptions::default();
        assert!(options.enabled);
        assert_eq!(options.strategy, DispatchStrategy::Immediate);
        assert_eq!(options.max_retry_attempts, 5);
        assert_eq!(options.initial_retry_delay, Duration::from_secs(1));
        assert!((options.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(options.batch_size, Some(100));
    }
}
