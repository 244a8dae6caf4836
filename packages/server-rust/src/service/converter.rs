//! Return-value conversion: turning a handler's result into the reply event.
//!
//! Converters form the same first-match-wins chain as argument resolvers.

use conduit_core::{headers, Event, Metadata, ReturnKind};

use crate::error::RpcError;

/// One strategy for encoding a return value into a reply event.
///
/// Implementations must be thread safe.
pub trait ReturnValueConverter: Send + Sync {
    /// Whether this converter can encode for the given inbound metadata and
    /// declared return shape.
    fn supports(&self, inbound: &Metadata, returns: ReturnKind) -> bool;

    /// Builds the reply event: addressed at the inbound `reply-to`, carrying
    /// the inbound correlation id and the encoded value.
    ///
    /// # Errors
    ///
    /// Fails when the value cannot be encoded or the inbound metadata has no
    /// usable reply address.
    fn convert(
        &self,
        inbound: &Metadata,
        returns: ReturnKind,
        value: serde_json::Value,
    ) -> Result<Event, RpcError>;
}

// ---------------------------------------------------------------------------
// ReturnValueConverterComposite
// ---------------------------------------------------------------------------

/// Delegates to the first registered converter whose `supports` is true.
#[derive(Default)]
pub struct ReturnValueConverterComposite {
    converters: Vec<Box<dyn ReturnValueConverter>>,
}

impl ReturnValueConverterComposite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_converter(mut self, converter: impl ReturnValueConverter + 'static) -> Self {
        self.converters.push(Box::new(converter));
        self
    }

    /// Converts via the first supporting member.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::UnsupportedContent`] when no member supports the
    /// reply, or the selected member's own failure.
    pub fn convert(
        &self,
        inbound: &Metadata,
        returns: ReturnKind,
        value: serde_json::Value,
    ) -> Result<Event, RpcError> {
        let converter = self
            .converters
            .iter()
            .find(|c| c.supports(inbound, returns))
            .ok_or_else(|| {
                RpcError::UnsupportedContent(format!(
                    "no return value converter for content-type {:?}",
                    inbound.get(headers::CONTENT_TYPE)
                ))
            })?;
        converter.convert(inbound, returns, value)
    }
}

// ---------------------------------------------------------------------------
// JsonReturnValueConverter
// ---------------------------------------------------------------------------

/// Default converter: serializes the return value as JSON.
///
/// A `Unit` return encodes as the literal JSON `null` payload: an explicit
/// "completed with no value" marker, distinct from an absent (zero-length)
/// payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReturnValueConverter;

impl ReturnValueConverter for JsonReturnValueConverter {
    fn supports(&self, inbound: &Metadata, _returns: ReturnKind) -> bool {
        inbound.is_json_content()
    }

    fn convert(
        &self,
        inbound: &Metadata,
        returns: ReturnKind,
        value: serde_json::Value,
    ) -> Result<Event, RpcError> {
        let value = match returns {
            ReturnKind::Unit => serde_json::Value::Null,
            ReturnKind::Value | ReturnKind::Stream => value,
        };
        let data = serde_json::to_vec(&value)
            .map_err(|e| RpcError::UnsupportedContent(format!("return value not encodable: {e}")))?;

        let reply_headers: Metadata = [(headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON)]
            .into_iter()
            .collect();
        Event::reply_to(inbound, reply_headers, data)
            .map_err(|e| RpcError::BadArguments(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound_metadata() -> Metadata {
        [
            (headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON),
            (headers::REPLY_TO, "stream://abc@rpc.replies"),
            (headers::CORRELATION_ID, "cid-9"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn converts_value_to_addressed_reply() {
        let reply = JsonReturnValueConverter
            .convert(&inbound_metadata(), ReturnKind::Value, serde_json::json!(5))
            .unwrap();

        assert_eq!(reply.cri().to_string(), "stream://abc@rpc.replies");
        assert_eq!(reply.metadata().get(headers::CORRELATION_ID), Some("cid-9"));
        assert_eq!(
            reply.metadata().get(headers::CONTENT_TYPE),
            Some(headers::CONTENT_TYPE_JSON)
        );
        assert_eq!(reply.data().as_ref(), b"5");
    }

    #[test]
    fn unit_return_is_explicit_null_marker() {
        let reply = JsonReturnValueConverter
            .convert(
                &inbound_metadata(),
                ReturnKind::Unit,
                serde_json::json!("ignored"),
            )
            .unwrap();
        // "null", not an empty payload: completed-with-no-value vs absent
        assert_eq!(reply.data().as_ref(), b"null");
    }

    #[test]
    fn missing_reply_to_fails() {
        let inbound: Metadata = [(headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON)]
            .into_iter()
            .collect();
        let err = JsonReturnValueConverter
            .convert(&inbound, ReturnKind::Value, serde_json::json!(1))
            .unwrap_err();
        assert!(matches!(err, RpcError::BadArguments(_)));
    }

    #[test]
    fn composite_without_match_reports_unsupported_content() {
        let composite = ReturnValueConverterComposite::new();
        let err = composite
            .convert(&inbound_metadata(), ReturnKind::Value, serde_json::json!(1))
            .unwrap_err();
        assert!(matches!(err, RpcError::UnsupportedContent(_)));
    }

    #[test]
    fn json_converter_requires_json_inbound_content() {
        let inbound: Metadata = [(headers::REPLY_TO, "stream://abc@rpc.replies")]
            .into_iter()
            .collect();
        assert!(!JsonReturnValueConverter.supports(&inbound, ReturnKind::Value));
    }
}
