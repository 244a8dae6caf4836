//! The `Event` envelope and its `Metadata` headers.
//!
//! An `Event` is the sole unit exchanged between the dispatch core, the RPC
//! call core, and the transport: a CRI address, ordered string headers, and
//! an opaque binary payload. Payloads are immutable once an event is handed
//! to a core; metadata may still be amended by gateway adapters up to the
//! point the event is sent.

use bytes::Bytes;
use indexmap::IndexMap;

use crate::cri::{Cri, CriError};

// ---------------------------------------------------------------------------
// Well-known headers
// ---------------------------------------------------------------------------

/// Wire-visible header names and values carried in [`Metadata`].
pub mod headers {
    /// Identifies the payload encoding. Default is [`CONTENT_TYPE_JSON`].
    pub const CONTENT_TYPE: &str = "content-type";
    /// The JSON content type used by the default resolver/converter chain.
    pub const CONTENT_TYPE_JSON: &str = "application/json";
    /// Present on failure replies; carries the human-readable message.
    pub const ERROR: &str = "error";
    /// Links a request event to its reply event(s). Mandatory on requests.
    pub const CORRELATION_ID: &str = "correlation-id";
    /// CRI the service sends its reply to. Mandatory on requests.
    pub const REPLY_TO: &str = "reply-to";
    /// Authenticated participant identity (JSON), stamped by a gateway after
    /// authentication. Never taken from the caller's own payload.
    pub const SENDER: &str = "sender";
    /// Carries in-band control signals for multi-value replies.
    pub const CONTROL: &str = "control";
    /// [`CONTROL`] value marking the terminal event of a reply stream.
    pub const CONTROL_COMPLETE: &str = "complete";
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Ordered string headers attached to an [`Event`].
///
/// Keys are case-sensitive; iteration order is insertion order; `get`/`put`
/// are O(1) expected. Mutable because gateway adapters strip and add headers
/// (e.g. removing an inbound `Authorization` header) before handoff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: IndexMap<String, String>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        // shift_remove preserves the insertion order of the remaining entries
        self.entries.shift_remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when the content-type header identifies a JSON payload.
    #[must_use]
    pub fn is_json_content(&self) -> bool {
        self.get(headers::CONTENT_TYPE)
            .is_some_and(|v| v == headers::CONTENT_TYPE_JSON)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// The envelope exchanged between cores and the transport.
#[derive(Debug, Clone)]
pub struct Event {
    cri: Cri,
    metadata: Metadata,
    data: Bytes,
}

impl Event {
    /// Creates an event with empty metadata.
    #[must_use]
    pub fn new(cri: Cri, data: impl Into<Bytes>) -> Self {
        Self::with_metadata(cri, Metadata::new(), data)
    }

    #[must_use]
    pub fn with_metadata(cri: Cri, metadata: Metadata, data: impl Into<Bytes>) -> Self {
        Self {
            cri,
            metadata,
            data: data.into(),
        }
    }

    /// Creates an event by parsing a CRI literal.
    ///
    /// # Errors
    ///
    /// Returns a [`CriError`] if the literal is malformed.
    pub fn parse(cri_literal: &str, data: impl Into<Bytes>) -> Result<Self, CriError> {
        Ok(Self::new(Cri::parse(cri_literal)?, data))
    }

    #[must_use]
    pub fn cri(&self) -> &Cri {
        &self.cri
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable header access, used by adapters prior to handoff.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Builds a reply event addressed at the inbound `reply-to` header,
    /// carrying the inbound `correlation-id` and the given headers.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::MissingReplyTo`] when the inbound metadata has
    /// no reply address, or [`ReplyError::Address`] when it is malformed.
    pub fn reply_to(
        inbound: &Metadata,
        reply_headers: Metadata,
        data: impl Into<Bytes>,
    ) -> Result<Self, ReplyError> {
        let reply_to = inbound
            .get(headers::REPLY_TO)
            .ok_or(ReplyError::MissingReplyTo)?;
        let cri = Cri::parse(reply_to)?;
        let mut metadata = reply_headers;
        if let Some(correlation_id) = inbound.get(headers::CORRELATION_ID) {
            metadata.put(headers::CORRELATION_ID, correlation_id);
        }
        Ok(Self::with_metadata(cri, metadata, data))
    }
}

/// Errors building a reply [`Event`] from inbound request metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    #[error("inbound metadata has no reply-to header")]
    MissingReplyTo,
    #[error(transparent)]
    Address(#[from] CriError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
