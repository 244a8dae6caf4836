//! STOMP frame ↔ `Event` adaptation.
//!
//! Frame-level parsing belongs to the transport; this module only maps an
//! already-parsed frame into the event model and back. The mapping is pure
//! and stateless; the only validation is what CRI parsing already performs.

use bytes::Bytes;
use conduit_core::{Cri, Event, Metadata};

use crate::gateway::GatewayError;

/// STOMP frame commands this gateway exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Error,
}

/// Header carrying the frame's destination.
pub const DESTINATION_HEADER: &str = "destination";

/// A parsed STOMP frame as handed over by the socket layer.
#[derive(Debug, Clone)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Metadata,
    pub body: Bytes,
}

impl StompFrame {
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.headers.get(DESTINATION_HEADER)
    }
}

/// Adapts an inbound frame into an [`Event`]: the destination header parses
/// into the CRI, all frame headers become metadata, the body is the payload.
///
/// # Errors
///
/// Returns [`GatewayError::MissingDestination`] when the frame has no
/// destination, or the CRI parse failure for a malformed one.
pub fn frame_to_event(frame: &StompFrame) -> Result<Event, GatewayError> {
    let destination = frame
        .destination()
        .ok_or(GatewayError::MissingDestination)?;
    let cri = Cri::parse(destination)?;
    Ok(Event::with_metadata(
        cri,
        frame.headers.clone(),
        frame.body.clone(),
    ))
}

/// Adapts an outbound reply [`Event`] into a MESSAGE frame: the CRI literal
/// becomes the destination header, event metadata becomes frame headers.
#[must_use]
pub fn event_to_frame(event: &Event) -> StompFrame {
    let mut headers = event.metadata().clone();
    headers.put(DESTINATION_HEADER, event.cri().to_string());
    StompFrame {
        command: StompCommand::Message,
        headers,
        body: event.data().clone(),
    }
}
