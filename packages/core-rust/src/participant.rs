//! Authenticated participant identity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key identifying what kind of party a participant is.
pub const PARTICIPANT_TYPE_KEY: &str = "type";

/// Well-known values for [`PARTICIPANT_TYPE_KEY`].
pub mod participant_type {
    pub const DEVICE: &str = "device";
    pub const USER: &str = "user";
    pub const CLI: &str = "cli";
    pub const NODE: &str = "node";
}

/// Opaque identity attached to a session after successful authentication.
/// Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Participant {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, participant_type: &str) -> Self {
        self.metadata
            .insert(PARTICIPANT_TYPE_KEY.to_string(), participant_type.to_string());
        self
    }

    #[must_use]
    pub fn participant_type(&self) -> Option<&str> {
        self.metadata.get(PARTICIPANT_TYPE_KEY).map(String::as_str)
    }
}
