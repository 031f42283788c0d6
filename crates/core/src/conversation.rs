//! Conversation message types
//!
//! History is an alternating sequence of user and assistant messages owned by
//! the agent's LLM service, not by the call state. A system prompt is
//! prepended at request time and never stored.

use serde::{Deserialize, Serialize};

/// Marker appended to an assistant message whose playback was cut short, so
/// the next prompt reflects that the caller did not hear the full response.
pub const CUT_OFF_MARKER: &str = "…";

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Assistant message for a response that was interrupted mid-stream.
    pub fn assistant_cut_off(partial: &str) -> Self {
        Self::assistant(format!("{partial}{CUT_OFF_MARKER}"))
    }
}
