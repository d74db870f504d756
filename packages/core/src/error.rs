//! Error taxonomy for dispatch and delivery.

use uuid::Uuid;

/// Outcome of a dispatch step. `Ok(())` is success; the error carries every
/// failure detail that contributed.
pub type DispatchResult = Result<(), DispatchError>;

/// Errors surfaced by routing, pipeline execution, and outbox delivery.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No replay function is registered for the runtime event type.
    #[error("no dispatcher registered for event type {event_type}")]
    UnregisteredEventType { event_type: String },

    /// A type-erased event did not have the expected concrete type.
    #[error("event {event_id} is a {actual}, expected {expected}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
        event_id: Uuid,
    },

    /// The outbox storage collaborator failed.
    #[error("outbox storage error: {0}")]
    Storage(#[source] anyhow::Error),

    /// The envelope builder could not produce an envelope.
    #[error("envelope build failed: {0}")]
    Envelope(#[source] anyhow::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A local handler reported a failure.
    #[error("handler {handler} failed: {reason}")]
    Handler {
        handler: &'static str,
        reason: String,
    },

    /// A pipeline behavior short-circuited the chain.
    #[error("rejected by pipeline: {0}")]
    Rejected(String),

    /// Several independent failures, e.g. from multiple local handlers.
    #[error("{} failures: [{}]", .0.len(), join(.0))]
    Aggregate(Vec<DispatchError>),

    /// At least one branch of a hybrid dispatch failed. Both branches'
    /// errors are kept.
    #[error("hybrid dispatch failed (local: {}, external: {})", describe(.local), describe(.external))]
    Hybrid {
        local: Option<Box<DispatchError>>,
        external: Option<Box<DispatchError>>,
    },

    /// Some events of an outbox drain failed.
    #[error("{} of {total} outbox events failed: [{}]", .errors.len(), join(.errors))]
    Batch {
        total: usize,
        errors: Vec<DispatchError>,
    },

    #[error("dispatch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("dispatcher overloaded, try again later")]
    Overloaded,

    #[error("dispatch cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DispatchError {
    /// Whether this error (or any error it aggregates) is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Aggregate(errors) | Self::Batch { errors, .. } => {
                errors.iter().any(DispatchError::is_cancelled)
            }
            Self::Hybrid { local, external } => local
                .iter()
                .chain(external.iter())
                .any(|e| e.is_cancelled()),
            _ => false,
        }
    }

    /// Collapse a list of failures: none is success, one is returned as-is,
    /// several become `Aggregate`.
    ///
    /// # Errors
    ///
    /// Returns the single error or an `Aggregate` when `errors` is non-empty.
    pub fn aggregate(mut errors: Vec<DispatchError>) -> DispatchResult {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }
}

/// Combine the outcomes of the two hybrid branches.
///
/// Success only when both succeed. Otherwise the failure keeps the error of
/// each failed branch in its own slot.
///
/// # Errors
///
/// Returns `DispatchError::Hybrid` when either branch failed.
pub fn combine_hybrid(local: DispatchResult, external: DispatchResult) -> DispatchResult {
    match (local, external) {
        (Ok(()), Ok(())) => Ok(()),
        (local, external) => Err(DispatchError::Hybrid {
            local: local.err().map(Box::new),
            external: external.err().map(Box::new),
        }),
    }
}

fn describe(branch: &Option<Box<DispatchError>>) -> String {
    match branch {
        Some(err) => err.to_string(),
        None => "ok".to_string(),
    }
}

fn join(errors: &[DispatchError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures raised by a `TransportDispatcher`.
///
/// These are the only errors the outbox manager treats as "thrown": they
/// are caught at its boundary, recorded, and re-raised only for fail-fast
/// event types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("transport rejected message {message_id}: {reason}")]
    Rejected { message_id: Uuid, reason: String },
    #[error("transport error: {0}")]
    Other(#[from] anyhow::Error),
}
