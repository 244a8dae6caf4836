//! Reply handling on the caller side: one handler per in-flight call.
//!
//! A handler is selected by the declared return shape. Single-value handlers
//! complete exactly once and have their pending-call entry removed on the
//! first reply; multi-value handlers stay registered until the terminal
//! control marker or an error reply arrives.

use conduit_core::{headers, Event};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::RpcError;
use crate::service::exception::ExceptionConverterComposite;

// ---------------------------------------------------------------------------
// RpcResponseConverter
// ---------------------------------------------------------------------------

/// Decodes one reply event into a value or an error.
#[derive(Clone)]
pub struct RpcResponseConverter {
    exceptions: Arc<ExceptionConverterComposite>,
}

impl RpcResponseConverter {
    #[must_use]
    pub fn new(exceptions: Arc<ExceptionConverterComposite>) -> Self {
        Self { exceptions }
    }

    /// Error replies (error header present) decode through the exception
    /// chain; success replies decode their JSON payload. An empty payload is
    /// "absent", distinct from the explicit `null` void marker.
    ///
    /// # Errors
    ///
    /// Returns the marshalled remote error, or
    /// [`RpcError::UnsupportedContent`] when the payload encoding is not
    /// understood.
    pub fn convert(&self, event: &Event) -> Result<serde_json::Value, RpcError> {
        if event.metadata().contains(headers::ERROR) {
            return Err(self.exceptions.to_error(event));
        }
        if !event.metadata().is_json_content() {
            return Err(RpcError::UnsupportedContent(format!(
                "reply content-type {:?} is not supported",
                event.metadata().get(headers::CONTENT_TYPE)
            )));
        }
        if event.data().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(event.data())
            .map_err(|e| RpcError::UnsupportedContent(format!("reply payload is not JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// RpcReturnValueHandler
// ---------------------------------------------------------------------------

/// Per-call reply handling strategy.
pub trait RpcReturnValueHandler: Send + Sync {
    /// Applies one inbound reply. Returns `true` when the pending-call entry
    /// must be removed (the call is terminally resolved).
    fn process_response(&mut self, event: Event) -> bool;

    /// Terminates the call with a local error (transport failure, timeout).
    fn process_error(&mut self, error: RpcError);

    /// Terminates the call with a cancellation error. Best-effort: no
    /// cancellation message is sent to the remote side.
    fn cancel(&mut self, message: &str);

    fn is_multi_value(&self) -> bool;
}

// ---------------------------------------------------------------------------
// SingleValueHandler
// ---------------------------------------------------------------------------

/// Completes a oneshot exactly once, with the converted value or the
/// converted error. A second reply for the same correlation id finds the
/// pending entry already removed and is discarded by the router.
pub struct SingleValueHandler {
    converter: RpcResponseConverter,
    tx: Option<oneshot::Sender<Result<serde_json::Value, RpcError>>>,
}

impl SingleValueHandler {
    #[must_use]
    pub fn new(
        converter: RpcResponseConverter,
    ) -> (Self, oneshot::Receiver<Result<serde_json::Value, RpcError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                converter,
                tx: Some(tx),
            },
            rx,
        )
    }

    fn complete(&mut self, result: Result<serde_json::Value, RpcError>) {
        if let Some(tx) = self.tx.take() {
            // The caller may have gone away; completion is then a no-op.
            let _ = tx.send(result);
        }
    }
}

impl RpcReturnValueHandler for SingleValueHandler {
    fn process_response(&mut self, event: Event) -> bool {
        let result = self.converter.convert(&event);
        self.complete(result);
        true
    }

    fn process_error(&mut self, error: RpcError) {
        self.complete(Err(error));
    }

    fn cancel(&mut self, message: &str) {
        self.complete(Err(RpcError::Cancelled(message.to_string())));
    }

    fn is_multi_value(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// MultiValueHandler
// ---------------------------------------------------------------------------

/// Pushes each reply element, in arrival order, into an unbounded channel.
///
/// Replies are push-based from the remote side; this core imposes no flow
/// control beyond what the bus provides, hence the unbounded channel.
pub struct MultiValueHandler {
    converter: RpcResponseConverter,
    tx: mpsc::UnboundedSender<Result<serde_json::Value, RpcError>>,
}

impl MultiValueHandler {
    #[must_use]
    pub fn new(
        converter: RpcResponseConverter,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<Result<serde_json::Value, RpcError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { converter, tx }, rx)
    }
}

impl RpcReturnValueHandler for MultiValueHandler {
    fn process_response(&mut self, event: Event) -> bool {
        // Terminal marker: close the stream by letting the entry (and with
        // it this sender) drop.
        if event.metadata().get(headers::CONTROL) == Some(headers::CONTROL_COMPLETE) {
            return true;
        }
        match self.converter.convert(&event) {
            Ok(value) => {
                let _ = self.tx.send(Ok(value));
                false
            }
            Err(error) => {
                // An error reply terminates the stream with that error.
                let _ = self.tx.send(Err(error));
                true
            }
        }
    }

    fn process_error(&mut self, error: RpcError) {
        let _ = self.tx.send(Err(error));
    }

    fn cancel(&mut self, message: &str) {
        self.process_error(RpcError::Cancelled(message.to_string()));
    }

    fn is_multi_value(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use conduit_core::{Cri, Metadata};

    use super::*;
    use crate::service::exception::JsonExceptionConverter;

    fn converter() -> RpcResponseConverter {
        RpcResponseConverter::new(Arc::new(
            ExceptionConverterComposite::new().with_converter(JsonExceptionConverter::new(false)),
        ))
    }

    fn reply(payload: &str) -> Event {
        let metadata: Metadata = [
            (headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON),
            (headers::CORRELATION_ID, "cid-1"),
        ]
        .into_iter()
        .collect();
        Event::with_metadata(
            Cri::parse("stream://abc@rpc.replies").unwrap(),
            metadata,
            payload.to_string(),
        )
    }

    fn terminal_reply() -> Event {
        let metadata: Metadata = [
            (headers::CORRELATION_ID, "cid-1"),
            (headers::CONTROL, headers::CONTROL_COMPLETE),
        ]
        .into_iter()
        .collect();
        Event::with_metadata(Cri::parse("stream://abc@rpc.replies").unwrap(), metadata, "")
    }

    #[test]
    fn single_value_completes_once_and_requests_removal() {
        let (mut handler, mut rx) = SingleValueHandler::new(converter());

        assert!(handler.process_response(reply("42")));
        assert_eq!(rx.try_recv().unwrap().unwrap(), serde_json::json!(42));

        // A second response has no observable effect.
        assert!(handler.process_response(reply("43")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn single_value_cancel_yields_cancelled_error() {
        let (mut handler, mut rx) = SingleValueHandler::new(converter());
        handler.cancel("caller went away");
        assert_eq!(
            rx.try_recv().unwrap().unwrap_err(),
            RpcError::Cancelled("caller went away".to_string())
        );
    }

    #[test]
    fn multi_value_emits_in_arrival_order_until_terminal() {
        let (mut handler, mut rx) = MultiValueHandler::new(converter());

        assert!(!handler.process_response(reply("1")));
        assert!(!handler.process_response(reply("2")));
        assert!(handler.process_response(terminal_reply()));

        assert_eq!(rx.try_recv().unwrap().unwrap(), serde_json::json!(1));
        assert_eq!(rx.try_recv().unwrap().unwrap(), serde_json::json!(2));
        drop(handler); // entry removal drops the sender
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn multi_value_error_reply_terminates_the_stream() {
        let (mut handler, mut rx) = MultiValueHandler::new(converter());

        let mut error_reply = reply("{\"exceptionName\":\"Boom\",\"exceptionClass\":\"org.acme.Boom\",\"errorMessage\":\"bad\"}");
        error_reply.metadata_mut().put(headers::ERROR, "bad");

        assert!(!handler.process_response(reply("1")));
        assert!(handler.process_response(error_reply));

        assert!(rx.try_recv().unwrap().is_ok());
        assert!(rx.try_recv().unwrap().is_err());
    }

    #[test]
    fn empty_success_payload_is_absent_value() {
        let conv = converter();
        let mut event = reply("");
        event.metadata_mut().put(headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON);
        assert_eq!(conv.convert(&event).unwrap(), serde_json::Value::Null);
    }
}
