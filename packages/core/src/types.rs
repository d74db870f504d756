use std::fmt;

use serde::{Deserialize, Serialize};

/// Which channel(s) process a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistributionMode {
    /// In-process handlers only.
    #[default]
    LocalOnly,
    /// External transport only.
    ExternalOnly,
    /// Local handlers and the external transport, concurrently.
    Hybrid,
}

impl DistributionMode {
    /// Stable lowercase label used in logs and metric tags.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalOnly => "local_only",
            Self::ExternalOnly => "external_only",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a stored event is handed to execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DispatchStrategy {
    /// Dispatch right after the write-ahead store.
    #[default]
    Immediate,
    /// Leave the event pending for a later `process_pending` call.
    Deferred,
    /// Accumulate for a later flush. No flush trigger exists yet, so this
    /// behaves exactly like `Deferred`.
    Batched,
}

/// Classification of a message for transports that distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    DomainEvent,
    IntegrationEvent,
    Notification,
}

/// Per-event-type metadata, registered out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageTraits {
    /// Routing decision used when no filter decides.
    pub distribution_mode: DistributionMode,
    /// Propagate immediate-dispatch failures to the caller instead of
    /// absorbing them into the retry machinery.
    pub fail_fast: bool,
    pub message_type: MessageType,
}

impl MessageTraits {
    #[must_use]
    pub fn new(distribution_mode: DistributionMode) -> Self {
        Self {
            distribution_mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    #[must_use]
    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }
}
