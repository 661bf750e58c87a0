//! Vector Memory Models
//!
//! Retrievable text excerpts with embeddings, derived from letters, replies
//! and conversations.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Source kind of a memory chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryDocType {
    Letter,
    LetterReply,
    Chat,
}

impl MemoryDocType {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::LetterReply => "letter_reply",
            Self::Chat => "chat",
        }
    }

    /// Parse from a database string representation.
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "letter" => Some(Self::Letter),
            "letter_reply" => Some(Self::LetterReply),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryDocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored excerpt with its embedding vector. Scoped to a user and
/// optionally to one persona; excerpt text is stored encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryChunk {
    pub id: Uuid,
    pub user_id: Uuid,
    pub future_profile_id: Option<Uuid>,
    pub doc_type: MemoryDocType,
    pub text_chunk: String,
    pub embedding: Vec<f32>,
    pub created_at: String,
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: MemoryChunk,
    pub similarity: f32,
}

/// Serialize an embedding vector to little-endian f32 bytes for BLOB storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian f32 bytes back into an embedding vector.
/// Trailing partial values are ignored.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
