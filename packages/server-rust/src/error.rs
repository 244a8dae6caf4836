//! The RPC error taxonomy shared by the dispatch core and the call core.

use std::time::Duration;

use conduit_core::CriError;

/// Namespace prefix for error kinds raised by this layer itself, used as the
/// `exceptionClass` on the wire so the receiving side can reconstruct them.
pub(crate) const ERROR_CLASS_PREFIX: &str = "conduit.rpc.";

/// Everything that can fail on a call path, kept as distinct kinds so a
/// caller can tell "never replied" from "explicitly failed" from "cancelled
/// by caller". None of these are swallowed; they surface to whoever
/// originated the call or dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Malformed or unsupported address; fails at parse time, never
    /// dispatched.
    #[error(transparent)]
    Address(#[from] CriError),

    /// No resolver/converter in the pipeline supports the event or return
    /// type. A programming/configuration error, surfaced per call.
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    /// The payload could not be decoded into the declared parameters.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// No service instance or function matched the addressed resource.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The caller cancelled the in-flight call. Best-effort: the remote side
    /// is not notified and may still complete.
    #[error("call cancelled: {0}")]
    Cancelled(String),

    /// No reply arrived within the caller's timeout. The remote side is not
    /// notified, same as [`RpcError::Cancelled`].
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// An error marshalled across the process boundary whose kind is not one
    /// of the locally known ones. The original identity is preserved as
    /// data, never downgraded to a bare string.
    #[error("{message}")]
    Remote {
        exception_name: String,
        exception_class: String,
        message: String,
        stack_trace: Option<Vec<String>>,
    },

    /// The underlying bus could not accept or deliver an event.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl RpcError {
    /// Short kind name used as the wire `exceptionName`.
    #[must_use]
    pub fn kind_name(&self) -> &str {
        match self {
            RpcError::Address(_) => "Address",
            RpcError::UnsupportedContent(_) => "UnsupportedContent",
            RpcError::BadArguments(_) => "BadArguments",
            RpcError::NotFound(_) => "NotFound",
            RpcError::Authentication(_) => "Authentication",
            RpcError::Cancelled(_) => "Cancelled",
            RpcError::Timeout(_) => "Timeout",
            RpcError::Remote { exception_name, .. } => exception_name,
            RpcError::Transport(_) => "Transport",
        }
    }

    /// The bare message, without the kind prefix `Display` adds. This is
    /// what travels in the wire wrapper so decoding reconstructs the
    /// original kind/message pair exactly.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            RpcError::Address(e) => e.to_string(),
            RpcError::UnsupportedContent(m)
            | RpcError::BadArguments(m)
            | RpcError::NotFound(m)
            | RpcError::Authentication(m)
            | RpcError::Cancelled(m)
            | RpcError::Transport(m) => m.clone(),
            RpcError::Timeout(d) => format!("no reply within {d:?}"),
            RpcError::Remote { message, .. } => message.clone(),
        }
    }

    /// Namespaced kind used as the wire `exceptionClass`.
    #[must_use]
    pub fn class_name(&self) -> String {
        match self {
            RpcError::Remote {
                exception_class, ..
            } => exception_class.clone(),
            other => format!("{ERROR_CLASS_PREFIX}{}", other.kind_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_name_is_namespaced_for_local_kinds() {
        let error = RpcError::NotFound("org.acme.Missing".to_string());
        assert_eq!(error.class_name(), "conduit.rpc.NotFound");
        assert_eq!(error.kind_name(), "NotFound");
    }

    #[test]
    fn remote_keeps_original_identity() {
        let error = RpcError::Remote {
            exception_name: "IllegalStateException".to_string(),
            exception_class: "java.lang.IllegalStateException".to_string(),
            message: "boom".to_string(),
            stack_trace: None,
        };
        assert_eq!(error.kind_name(), "IllegalStateException");
        assert_eq!(error.class_name(), "java.lang.IllegalStateException");
        assert_eq!(error.to_string(), "boom");
    }
}
