//! The handler seam a published service implements.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// What one function invocation produced.
pub enum InvocationResult {
    /// A single value (or `null` for unit-returning functions).
    Value(serde_json::Value),
    /// Zero or more values followed by stream completion. An `Err` element
    /// terminates the reply stream with that fault.
    Stream(BoxStream<'static, Result<serde_json::Value, InvocationFault>>),
}

impl std::fmt::Debug for InvocationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationResult::Value(value) => f.debug_tuple("Value").field(value).finish(),
            InvocationResult::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A failure raised by service code, carrying its identity across the
/// process boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvocationFault {
    /// Namespaced fault kind, e.g. `org.acme.InsufficientFunds`. The short
    /// name on the wire is the last `.`-separated segment.
    pub kind: String,
    pub message: String,
}

impl InvocationFault {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The last segment of the namespaced kind.
    #[must_use]
    pub fn short_kind(&self) -> &str {
        self.kind.rsplit('.').next().unwrap_or(&self.kind)
    }
}

/// Implemented by a published service instance. The dispatcher calls this
/// with resolved, positional JSON arguments; both quick synchronous work and
/// long-running async work are awaited off the bus consumer loop.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn invoke(
        &self,
        function: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<InvocationResult, InvocationFault>;
}
