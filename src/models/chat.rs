//! Chat Models
//!
//! Conversation turns between the user and a persona.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSender {
    User,
    Agent,
}

impl MessageSender {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Agent => "AGENT",
        }
    }

    /// Parse from a database string representation.
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Self::User),
            "AGENT" => Some(Self::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One message in a (user, persona) conversation. Append-only, strictly
/// ordered by creation time; content is stored encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub future_profile_id: Uuid,
    pub user_id: Uuid,
    pub sender: MessageSender,
    pub content: String,
    pub created_at: String,
}
