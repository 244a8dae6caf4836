//! Exception marshalling across the process boundary.
//!
//! Outbound, a failure becomes an error reply: error header + JSON
//! [`ExceptionWrapper`] body, with a stack trace only when debug is enabled.
//! Inbound, the wrapper is decoded back through a closed registry of known
//! error kinds; anything unknown becomes [`RpcError::Remote`] carrying the
//! original class name, message, and stack trace as data. The original
//! identity is never silently downgraded to a bare string, and no dynamic
//! instantiation is ever attempted.

use std::backtrace::Backtrace;

use conduit_core::{headers, Event, ExceptionWrapper, Metadata, ReplyError};

use crate::error::{RpcError, ERROR_CLASS_PREFIX};
use crate::service::handler::InvocationFault;

// ---------------------------------------------------------------------------
// Fault
// ---------------------------------------------------------------------------

/// A failure in the shape the wire wrapper expects, independent of whether
/// it originated as an [`RpcError`] or a service [`InvocationFault`].
#[derive(Debug, Clone)]
pub struct Fault {
    pub name: String,
    pub class: String,
    pub message: String,
    pub stack_trace: Option<Vec<String>>,
}

impl From<&RpcError> for Fault {
    fn from(error: &RpcError) -> Self {
        let stack_trace = match error {
            RpcError::Remote { stack_trace, .. } => stack_trace.clone(),
            _ => None,
        };
        Self {
            name: error.kind_name().to_string(),
            class: error.class_name(),
            message: error.message(),
            stack_trace,
        }
    }
}

impl From<&InvocationFault> for Fault {
    fn from(fault: &InvocationFault) -> Self {
        Self {
            name: fault.short_kind().to_string(),
            class: fault.kind.clone(),
            message: fault.message.clone(),
            stack_trace: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExceptionConverter
// ---------------------------------------------------------------------------

/// Two-way conversion between faults and error reply events.
///
/// Implementations must be thread safe.
pub trait ExceptionConverter: Send + Sync {
    /// Whether this converter handles replies shaped like `metadata`.
    fn supports(&self, metadata: &Metadata) -> bool;

    /// Builds the error reply event for an inbound request's metadata.
    ///
    /// # Errors
    ///
    /// Fails only when the inbound metadata carries no usable reply address;
    /// encoding itself always succeeds.
    fn to_event(&self, inbound: &Metadata, fault: &Fault) -> Result<Event, ReplyError>;

    /// Reconstructs the error carried by an error reply event.
    fn to_error(&self, event: &Event) -> RpcError;
}

// ---------------------------------------------------------------------------
// ExceptionConverterComposite
// ---------------------------------------------------------------------------

/// Delegates to the first registered converter whose `supports` is true.
/// The chain is expected to end in a catch-all member.
#[derive(Default)]
pub struct ExceptionConverterComposite {
    converters: Vec<Box<dyn ExceptionConverter>>,
}

impl ExceptionConverterComposite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_converter(mut self, converter: impl ExceptionConverter + 'static) -> Self {
        self.converters.push(Box::new(converter));
        self
    }

    fn select(&self, metadata: &Metadata) -> Option<&dyn ExceptionConverter> {
        self.converters
            .iter()
            .find(|c| c.supports(metadata))
            .map(AsRef::as_ref)
    }

    /// Builds the error reply via the first supporting member.
    ///
    /// # Errors
    ///
    /// Fails when the inbound metadata has no reply address or, unusually
    /// for this chain, no member supports it.
    pub fn to_event(&self, inbound: &Metadata, fault: &Fault) -> Result<Event, ReplyError> {
        match self.select(inbound) {
            Some(converter) => converter.to_event(inbound, fault),
            None => Err(ReplyError::MissingReplyTo),
        }
    }

    /// Reconstructs the error via the first supporting member; falls back to
    /// the raw error header when nothing matches.
    #[must_use]
    pub fn to_error(&self, event: &Event) -> RpcError {
        match self.select(event.metadata()) {
            Some(converter) => converter.to_error(event),
            None => remote_from_header(event.metadata()),
        }
    }
}

fn remote_from_header(metadata: &Metadata) -> RpcError {
    RpcError::Remote {
        exception_name: "Remote".to_string(),
        exception_class: format!("{ERROR_CLASS_PREFIX}Remote"),
        message: metadata.get(headers::ERROR).unwrap_or_default().to_string(),
        stack_trace: None,
    }
}

// ---------------------------------------------------------------------------
// JsonExceptionConverter
// ---------------------------------------------------------------------------

/// Default catch-all converter using the JSON wrapper wire format.
#[derive(Debug, Clone, Copy)]
pub struct JsonExceptionConverter {
    debug: bool,
}

impl JsonExceptionConverter {
    /// `debug` controls whether stack traces are included in error replies.
    #[must_use]
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl ExceptionConverter for JsonExceptionConverter {
    fn supports(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn to_event(&self, inbound: &Metadata, fault: &Fault) -> Result<Event, ReplyError> {
        let mut wrapper = ExceptionWrapper::new(&fault.name, &fault.class, &fault.message);
        if self.debug {
            let stack_trace = fault.stack_trace.clone().unwrap_or_else(|| {
                Backtrace::force_capture()
                    .to_string()
                    .lines()
                    .map(str::to_string)
                    .collect()
            });
            wrapper = wrapper.with_stack_trace(stack_trace);
        }
        // Wrapper fields are plain strings; if encoding still fails the error
        // header alone carries the message.
        let data = serde_json::to_vec(&wrapper).unwrap_or_default();

        let reply_headers: Metadata = [
            (headers::ERROR, fault.message.as_str()),
            (headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON),
        ]
        .into_iter()
        .collect();
        Event::reply_to(inbound, reply_headers, data)
    }

    fn to_error(&self, event: &Event) -> RpcError {
        if !event.metadata().is_json_content() {
            return remote_from_header(event.metadata());
        }
        let Ok(wrapper) = serde_json::from_slice::<ExceptionWrapper>(event.data()) else {
            tracing::error!("could not deserialize exception wrapper from error reply");
            return remote_from_header(event.metadata());
        };

        let message = wrapper.error_message.clone();
        match wrapper
            .exception_class
            .strip_prefix(ERROR_CLASS_PREFIX)
            .unwrap_or("")
        {
            "UnsupportedContent" => RpcError::UnsupportedContent(message),
            "BadArguments" => RpcError::BadArguments(message),
            "NotFound" => RpcError::NotFound(message),
            "Authentication" => RpcError::Authentication(message),
            "Cancelled" => RpcError::Cancelled(message),
            _ => RpcError::Remote {
                exception_name: wrapper.exception_name,
                exception_class: wrapper.exception_class,
                message,
                stack_trace: wrapper.stack_trace,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
