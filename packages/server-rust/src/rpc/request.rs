//! Construction of outbound request events.

use conduit_core::{headers, Cri, Event, Metadata, ServiceIdentifier};
use uuid::Uuid;

use crate::error::RpcError;

/// One addressed, correlated request, built eagerly but sent lazily.
///
/// Building an `RpcRequest` performs no I/O; the network write happens when
/// the caller awaits the single-value future or first polls the multi-value
/// stream. Nothing is sent for a handle that is dropped unused.
#[derive(Debug)]
pub struct RpcRequest {
    correlation_id: String,
    event: Event,
}

impl RpcRequest {
    /// Builds the request event for `function` on `service`, encoding `args`
    /// as a JSON array and stamping the correlation and reply-to headers.
    ///
    /// # Errors
    ///
    /// Fails when the service identifier does not form a valid CRI or the
    /// arguments cannot be encoded.
    pub fn new(
        service: &ServiceIdentifier,
        function: &str,
        args: &[serde_json::Value],
        reply_to: &Cri,
    ) -> Result<Self, RpcError> {
        let destination = service.cri()?.with_path(function);
        let correlation_id = Uuid::new_v4().to_string();

        let mut metadata = Metadata::new();
        metadata.put(headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON);
        metadata.put(headers::REPLY_TO, reply_to.to_string());
        metadata.put(headers::CORRELATION_ID, correlation_id.clone());

        let data = serde_json::to_vec(args)
            .map_err(|e| RpcError::BadArguments(format!("arguments not encodable: {e}")))?;

        Ok(Self {
            correlation_id,
            event: Event::with_metadata(destination, metadata, data),
        })
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Consumes the request, yielding the event to hand to the bus.
    #[must_use]
    pub fn into_event(self) -> Event {
        self.event
    }
}
