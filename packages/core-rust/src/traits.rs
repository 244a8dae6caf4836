//! Collaborator interfaces consumed by the dispatch and call cores.
//!
//! The cluster/transport substrate is out of scope here; these traits are
//! the seams it plugs into. Implementations must be safe for concurrent use.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::cri::Cri;
use crate::event::Event;
use crate::participant::Participant;

/// Stream of inbound events for one listened CRI.
pub type EventStream = BoxStream<'static, Event>;

/// The pub/sub substrate the RPC layer rides on.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Sends an event through the bus.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport rejects or cannot deliver the
    /// event. Callers treat this as a per-event failure; the bus does not
    /// retry.
    async fn send(&self, event: Event) -> anyhow::Result<()>;

    /// Subscribes to events addressed at the given CRI.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription cannot be established.
    async fn listen(&self, cri: &Cri) -> anyhow::Result<EventStream>;
}

/// Failed authentication, distinct from authorization denials (which are
/// boolean) and from transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("authentication failed: {0}")]
pub struct AuthenticationError(pub String);

/// Verifies credentials and produces the authenticated [`Participant`].
/// Provided by the security substrate; consumed by gateways.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &HashMap<String, String>,
    ) -> Result<Participant, AuthenticationError>;
}
