//! Protocol gateway adapters: external frames in, events out, and back.

pub mod http;
pub mod stomp;

use conduit_core::CriError;

pub use stomp::{event_to_frame, frame_to_event, StompCommand, StompFrame};

/// Errors adapting an external protocol frame or request into an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The frame carried no destination header.
    #[error("frame has no destination header")]
    MissingDestination,
    /// The request path did not resolve to a non-blank resource.
    #[error("request path does not resolve to a service: {0}")]
    InvalidPath(String),
    /// The derived address literal did not parse.
    #[error(transparent)]
    Address(#[from] CriError),
}
