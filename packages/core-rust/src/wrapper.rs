//! Wire form of an error crossing the process boundary.

use serde::{Deserialize, Serialize};

/// JSON body of an error reply.
///
/// Wraps whatever failed during service invocation so the full error
/// identity travels to the caller: a short kind name, the namespaced kind,
/// the message, and (only when the service runs with debug enabled) a stack
/// trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionWrapper {
    /// Short kind name, e.g. `Timeout`.
    pub exception_name: String,
    /// Namespaced kind, e.g. `conduit.rpc.Timeout`.
    pub exception_class: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack_trace: Option<Vec<String>>,
}

impl ExceptionWrapper {
    #[must_use]
    pub fn new(
        exception_name: impl Into<String>,
        exception_class: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            exception_name: exception_name.into(),
            exception_class: exception_class.into(),
            error_message: error_message.into(),
            stack_trace: None,
        }
    }

    #[must_use]
    pub fn with_stack_trace(mut self, stack_trace: Vec<String>) -> Self {
        self.stack_trace = Some(stack_trace);
        self
    }
}
