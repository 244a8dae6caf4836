//! Argument resolution: turning an inbound event's payload into the
//! positional argument list a handler expects.
//!
//! Resolvers form a first-match-wins chain; registration order is part of
//! the contract, so the composite keeps an append-only list.

use conduit_core::{Event, FunctionDescriptor, ParameterSpec, Participant};

use crate::error::RpcError;

/// One strategy for decoding arguments from an event.
///
/// Implementations must be thread safe.
pub trait ArgumentResolver: Send + Sync {
    /// Whether this resolver can handle the given event.
    fn supports(&self, event: &Event) -> bool;

    /// Decodes the event into the ordered argument values for `function`.
    /// Participant-typed parameters are injected from the caller's session
    /// identity, never from the payload.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::BadArguments`] when the payload cannot be decoded
    /// into the declared parameters.
    fn resolve(
        &self,
        event: &Event,
        function: &FunctionDescriptor,
        participant: Option<&Participant>,
    ) -> Result<Vec<serde_json::Value>, RpcError>;
}

// ---------------------------------------------------------------------------
// ArgumentResolverComposite
// ---------------------------------------------------------------------------

/// Delegates to the first registered resolver whose `supports` is true.
#[derive(Default)]
pub struct ArgumentResolverComposite {
    resolvers: Vec<Box<dyn ArgumentResolver>>,
}

impl ArgumentResolverComposite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ArgumentResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Resolves via the first supporting member.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::UnsupportedContent`] when no member supports the
    /// event, or the selected member's own failure.
    pub fn resolve(
        &self,
        event: &Event,
        function: &FunctionDescriptor,
        participant: Option<&Participant>,
    ) -> Result<Vec<serde_json::Value>, RpcError> {
        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.supports(event))
            .ok_or_else(|| {
                RpcError::UnsupportedContent(format!(
                    "no argument resolver for content-type {:?}",
                    event.metadata().get(conduit_core::headers::CONTENT_TYPE)
                ))
            })?;
        resolver.resolve(event, function, participant)
    }

    #[must_use]
    pub fn supports(&self, event: &Event) -> bool {
        self.resolvers.iter().any(|r| r.supports(event))
    }
}

// ---------------------------------------------------------------------------
// JsonArgumentResolver
// ---------------------------------------------------------------------------

/// Default resolver: decodes a JSON array payload positionally into the
/// function's payload parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonArgumentResolver;

impl ArgumentResolver for JsonArgumentResolver {
    fn supports(&self, event: &Event) -> bool {
        event.metadata().is_json_content()
    }

    fn resolve(
        &self,
        event: &Event,
        function: &FunctionDescriptor,
        participant: Option<&Participant>,
    ) -> Result<Vec<serde_json::Value>, RpcError> {
        let payload_args: Vec<serde_json::Value> = if event.data().is_empty() {
            Vec::new()
        } else {
            serde_json::from_slice(event.data())
                .map_err(|e| RpcError::BadArguments(format!("payload is not a JSON array: {e}")))?
        };

        if payload_args.len() != function.payload_arity() {
            return Err(RpcError::BadArguments(format!(
                "function {} expects {} payload argument(s), got {}",
                function.name(),
                function.payload_arity(),
                payload_args.len()
            )));
        }

        let mut payload_args = payload_args.into_iter();
        let mut resolved = Vec::with_capacity(function.parameters().len());
        for parameter in function.parameters() {
            match parameter {
                ParameterSpec::Payload => {
                    let Some(value) = payload_args.next() else {
                        return Err(RpcError::BadArguments(format!(
                            "function {} is missing a payload argument",
                            function.name()
                        )));
                    };
                    resolved.push(value);
                }
                ParameterSpec::Participant => {
                    let participant = participant.ok_or_else(|| {
                        RpcError::BadArguments(format!(
                            "function {} requires a session participant",
                            function.name()
                        ))
                    })?;
                    let value = serde_json::to_value(participant).map_err(|e| {
                        RpcError::BadArguments(format!("participant not serializable: {e}"))
                    })?;
                    resolved.push(value);
                }
            }
        }
        Ok(resolved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
