//! Retry scheduling: exponential backoff and the dead-letter threshold.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::OutboxOptions;

/// Outcome of recording one failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Attempt number of the failure being recorded (previous count + 1).
    pub attempt_number: u32,
    /// The event has exhausted its budget and will not be retried.
    pub dead_letter: bool,
    /// Absolute millis since epoch before which the event is not retried.
    /// `None` when retrying immediately or when dead-lettered.
    pub next_attempt_at_ms: Option<u64>,
}

/// Decide how to record a failure for an event that already has
/// `attempt_count` recorded failures.
///
/// The attempt number is `attempt_count + 1`; reaching `max_retry_attempts`
/// dead-letters the event. Otherwise, with a non-zero initial delay, the next
/// attempt is scheduled `initial * factor^attempt_count` after `now_ms`.
#[must_use]
pub fn plan_retry(options: &OutboxOptions, attempt_count: u32, now_ms: u64) -> RetryDecision {
    let attempt_number = attempt_count.saturating_add(1);
    let dead_letter = attempt_number >= options.max_retry_attempts;

    let next_attempt_at_ms = if dead_letter || options.initial_retry_delay.is_zero() {
        None
    } else {
        let delay = backoff_delay(options, attempt_count);
        Some(now_ms.saturating_add(duration_millis(delay)))
    };

    RetryDecision {
        attempt_number,
        dead_letter,
        next_attempt_at_ms,
    }
}

/// Backoff delay after `attempt_count` recorded failures, saturating at
/// `u64::MAX` milliseconds.
#[must_use]
pub fn backoff_delay(options: &OutboxOptions, attempt_count: u32) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let initial_ms = duration_millis(options.initial_retry_delay) as f64;
    let exponent = i32::try_from(attempt_count).unwrap_or(i32::MAX);
    let delay_ms = initial_ms * options.backoff_factor.powi(exponent);

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let millis = if delay_ms.is_nan() || delay_ms <= 0.0 {
        0
    } else if delay_ms >= u64::MAX as f64 {
        u64::MAX
    } else {
        delay_ms as u64
    };
    Duration::from_millis(millis)
}

/// Current wall-clock time in millis since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_millis)
        .unwrap_or(0)
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
