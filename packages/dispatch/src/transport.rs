//! Default external-channel collaborators.
//!
//! Real transports (brokers, HTTP relays) live outside this crate and plug in
//! through `TransportDispatcher`; these defaults keep a dispatcher usable
//! without one.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use herald_core::{
    Envelope, EnvelopeBuilder, Event, MessageTraits, TransportDispatcher, TransportError,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::outbox::retry::now_millis;

/// Header carrying the stable event type name.
pub const EVENT_TYPE_HEADER: &str = "herald-event-type";

// ---------------------------------------------------------------------------
// DefaultEnvelopeBuilder
// ---------------------------------------------------------------------------

/// Wraps events in an [`Envelope`] stamped with the current time, the event
/// type header, and any static headers configured here.
#[derive(Debug, Clone, Default)]
pub struct DefaultEnvelopeBuilder {
    headers: BTreeMap<String, String>,
}

impl DefaultEnvelopeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header copied onto every envelope.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

impl EnvelopeBuilder for DefaultEnvelopeBuilder {
    fn build(&self, event: Arc<dyn Event>) -> anyhow::Result<Envelope> {
        let mut envelope = Envelope::new(event, now_millis());
        envelope
            .headers
            .insert(EVENT_TYPE_HEADER.to_string(), envelope.event_type.to_string());
        envelope
            .headers
            .extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(envelope)
    }
}

// ---------------------------------------------------------------------------
// NullTransport
// ---------------------------------------------------------------------------

/// No-op `TransportDispatcher`: accepts and discards every envelope.
///
/// This is the default when no external transport is configured, so
/// external and hybrid dispatch succeed without leaving the process.
pub struct NullTransport;

#[async_trait]
impl TransportDispatcher for NullTransport {
    async fn dispatch(
        &self,
        envelope: Envelope,
        traits: &MessageTraits,
        _cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        debug!(
            message_id = %envelope.message_id,
            event_type = envelope.event_type,
            message_type = ?traits.message_type,
            "discarding envelope, no transport configured"
        );
        Ok(())
    }
}
