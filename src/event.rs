//! Event: the JSON messages carried over the chat socket.
//!
//! ARCHITECTURE
//! ============
//! Clients send loosely-shaped JSON objects: a chat message, a delete
//! instruction, or a chat message whose content is a moderator command.
//! Decoding is permissive about which fields are present and strict about
//! field types: a string where an integer belongs is a malformed event.
//!
//! Outbound events are a closed set (chat, delete, mod announcement) and
//! serialize to the exact wire shapes clients render.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum chat content length, counted in characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Value of the `type` field that marks a delete instruction.
pub const DELETE_TYPE: &str = "delete";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

// =============================================================================
// AUTHOR
// =============================================================================

/// Identity attached to a chat message by the sending client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub username: String,
    #[serde(default, alias = "avatarURL")]
    pub avatar: String,
}

// =============================================================================
// INBOUND
// =============================================================================

/// Raw inbound event. Every field is optional at this layer; classification
/// happens in the relay engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<i64>,
    pub content: Option<String>,
    pub author: Option<Author>,
}

impl InboundEvent {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns `EventError::InvalidJson` if the text is not a JSON object with
    /// correctly typed fields.
    pub fn decode(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.kind.as_deref() == Some(DELETE_TYPE)
    }

    /// Content with surrounding whitespace removed, empty when absent.
    #[must_use]
    pub fn trimmed_content(&self) -> &str {
        self.content.as_deref().map_or("", str::trim)
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// A chat message as broadcast and retained in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub id: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteKind {
    Delete,
}

/// Instruction telling clients to drop a message from their view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEvent {
    #[serde(rename = "type")]
    pub kind: DeleteKind,
    pub id: i64,
}

impl DeleteEvent {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self { kind: DeleteKind::Delete, id }
    }
}

/// Moderator-only announcement of a moderation action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModEvent {
    #[serde(rename = "adminOnly")]
    pub admin_only: bool,
    pub content: String,
    pub id: i64,
}

impl ModEvent {
    #[must_use]
    pub fn new(id: i64, content: impl Into<String>) -> Self {
        Self { admin_only: true, content: content.into(), id }
    }
}

/// Anything the relay writes to a client socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Delete(DeleteEvent),
    Mod(ModEvent),
    Chat(ChatEvent),
}

impl OutboundEvent {
    #[must_use]
    pub fn is_mod(&self) -> bool {
        matches!(self, Self::Mod(_))
    }

    /// Identifier of the message this event carries or targets.
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::Delete(e) => e.id,
            Self::Mod(e) => e.id,
            Self::Chat(e) => e.id,
        }
    }

    /// Serialize to the JSON text written on the socket.
    ///
    /// # Errors
    ///
    /// Returns a serialization error from `serde_json`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
