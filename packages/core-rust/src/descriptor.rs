//! Service descriptors: explicit parameter/return metadata for published
//! functions.
//!
//! Descriptors are built once at registration time and treated as immutable
//! data; the dispatch core never inspects types at runtime. The resolver and
//! converter pipelines read them to decode arguments positionally and to
//! pick single- vs multi-value reply handling.

use crate::cri::ServiceIdentifier;

/// Where one declared parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSpec {
    /// Decoded positionally from the request payload.
    Payload,
    /// Injected from the caller's authenticated session, never from the
    /// payload.
    Participant,
}

/// Shape of a function's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Completes with no value; encoded as an explicit void marker so the
    /// caller can distinguish "completed" from "absent".
    Unit,
    /// Completes exactly once with a single value.
    Value,
    /// Emits zero or more values followed by a terminal signal.
    Stream,
}

/// Static description of one published function's shape.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    name: String,
    parameters: Vec<ParameterSpec>,
    returns: ReturnKind,
}

impl FunctionDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterSpec>, returns: ReturnKind) -> Self {
        Self {
            name: name.into(),
            parameters,
            returns,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    #[must_use]
    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    /// Number of parameters sourced from the payload (excludes injected ones).
    #[must_use]
    pub fn payload_arity(&self) -> usize {
        self.parameters
            .iter()
            .filter(|p| matches!(p, ParameterSpec::Payload))
            .count()
    }
}

/// All published functions of one service, keyed for dispatch.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    identifier: ServiceIdentifier,
    functions: Vec<FunctionDescriptor>,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn new(identifier: ServiceIdentifier) -> Self {
        Self {
            identifier,
            functions: Vec::new(),
        }
    }

    /// Adds a function to the descriptor. Later registrations with the same
    /// name shadow earlier ones at lookup (first match wins).
    #[must_use]
    pub fn with_function(mut self, function: FunctionDescriptor) -> Self {
        self.functions.push(function);
        self
    }

    #[must_use]
    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.identifier
    }

    #[must_use]
    pub fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.iter().find(|f| f.name() == name)
    }
}
