//! Letter Models
//!
//! The user's letter to their future self and the per-persona replies the
//! letter-processing job produces.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a letter.
///
/// A letter leaves `Pending` exactly once, moved by the letter-processing
/// job; both other states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LetterStatus {
    Pending,
    RepliesReady,
    Failed,
}

impl LetterStatus {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::RepliesReady => "REPLIES_READY",
            Self::Failed => "FAILED",
        }
    }

    /// Parse from a database string representation.
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "REPLIES_READY" => Some(Self::RepliesReady),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for LetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conversation state of a letter reply.
///
/// Flips to `Completed` when the first USER turn for the reply's persona is
/// accepted; opening the conversation consumes the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatStatus {
    NotStarted,
    Completed,
}

impl ChatStatus {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Parse from a database string representation.
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "NOT_STARTED" => Some(Self::NotStarted),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A letter from the user to their future self. One per user; content is
/// immutable after submission and stored encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Letter {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub status: LetterStatus,
    pub created_at: String,
}

/// A generated reply from one persona to the user's letter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterReply {
    pub id: Uuid,
    pub letter_id: Uuid,
    pub future_profile_id: Uuid,
    pub content: String,
    pub chat_status: ChatStatus,
    pub created_at: String,
}

/// Inbox view of a reply: id, persona, and whether its conversation opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxReply {
    pub reply_id: Uuid,
    pub future_profile_id: Uuid,
    pub from_profile_name: String,
    pub chat_status: ChatStatus,
}

/// Inbox view for the user's latest letter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inbox {
    pub letter_id: Uuid,
    pub letter_content_snippet: String,
    pub replies: Vec<InboxReply>,
}

/// Full reading view of one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterReplyView {
    pub reply_id: Uuid,
    pub future_profile_id: Uuid,
    pub from_profile_name: String,
    pub content: String,
    pub chat_status: ChatStatus,
}
