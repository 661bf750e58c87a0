//! Vector Memory Store
//!
//! Writes letters, replies and chat turns into the `vector_memory` table and
//! retrieves the most relevant excerpts for a query.
//!
//! ## Retrieval flow
//!
//! 1. Embed the query
//! 2. Load candidate chunks (user-wide, plus persona-scoped when a scope is
//!    given)
//! 3. Rank by cosine similarity, descending
//! 4. Truncate to `limit`
//!
//! Retrieval never mutates anything, and zero candidates is an empty result,
//! not an error.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::chat::ChatMessage;
use crate::models::letter::{Letter, LetterReply};
use crate::models::memory::{MemoryChunk, MemoryDocType, ScoredChunk};
use crate::services::memory::embedding::{cosine_similarity, EmbeddingProvider};
use crate::storage::Database;
use crate::utils::error::{AppError, AppResult};

/// Store for long-term generation context.
#[derive(Clone)]
pub struct VectorMemoryStore {
    db: Database,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorMemoryStore {
    /// Create a store over the given database and embedding provider.
    pub fn new(db: Database, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { db, embedder }
    }

    /// Index a submitted letter as a user-wide memory.
    pub async fn add_letter(&self, letter: &Letter) -> AppResult<()> {
        self.add_chunk(
            letter.user_id,
            None,
            MemoryDocType::Letter,
            &letter.content,
        )
        .await
    }

    /// Index a persona's letter reply as a persona-scoped memory.
    pub async fn add_letter_reply(&self, user_id: Uuid, reply: &LetterReply) -> AppResult<()> {
        self.add_chunk(
            user_id,
            Some(reply.future_profile_id),
            MemoryDocType::LetterReply,
            &reply.content,
        )
        .await
    }

    /// Index one chat turn as a persona-scoped memory.
    pub async fn add_chat_message(&self, message: &ChatMessage) -> AppResult<()> {
        let excerpt = format!("{}: {}", message.sender, message.content);
        self.add_chunk(
            message.user_id,
            Some(message.future_profile_id),
            MemoryDocType::Chat,
            &excerpt,
        )
        .await
    }

    async fn add_chunk(
        &self,
        user_id: Uuid,
        future_profile_id: Option<Uuid>,
        doc_type: MemoryDocType,
        text: &str,
    ) -> AppResult<()> {
        let vectors = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .map_err(|e| AppError::generation(format!("Embedding failed: {}", e)))?;
        let embedding = vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::generation("Embedding provider returned no vector"))?;

        let chunk = MemoryChunk {
            id: Uuid::new_v4(),
            user_id,
            future_profile_id,
            doc_type,
            text_chunk: text.to_string(),
            embedding,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };
        self.db.insert_memory_chunk(&chunk)?;

        debug!(
            user_id = %user_id,
            doc_type = %doc_type,
            "Indexed memory chunk"
        );
        Ok(())
    }

    /// Retrieve the `limit` most relevant chunks for a query, most relevant
    /// first. With a persona scope, candidates are the user's unscoped
    /// chunks plus that persona's chunks.
    pub async fn retrieve(
        &self,
        user_id: Uuid,
        persona_scope: Option<Uuid>,
        query: &str,
        limit: usize,
    ) -> AppResult<Vec<ScoredChunk>> {
        let candidates = self.db.list_memory_chunks(user_id, persona_scope)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| AppError::generation(format!("Query embedding failed: {}", e)))?;
        let query_embedding = vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::generation("Embedding provider returned no vector"))?;

        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .map(|chunk| {
                let similarity = cosine_similarity(&query_embedding, &chunk.embedding);
                ScoredChunk { chunk, similarity }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        debug!(
            user_id = %user_id,
            results = scored.len(),
            "Memory retrieval complete"
        );
        Ok(scored)
    }

    /// Format retrieved chunks into the prompt's memory block.
    pub fn format_context(chunks: &[ScoredChunk]) -> String {
        chunks
            .iter()
            .map(|scored| format!("[{}] {}", scored.chunk.doc_type, scored.chunk.text_chunk))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::letter::LetterStatus;
    use crate::models::user::User;
    use crate::services::memory::embedding::{EmbeddingError, EmbeddingResult};
    use crate::storage::FieldCipher;
    use async_trait::async_trait;

    /// Deterministic embedder: maps known keywords onto fixed axes.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    vec![
                        if lower.contains("career") { 1.0 } else { 0.0 },
                        if lower.contains("family") { 1.0 } else { 0.0 },
                        if lower.contains("health") { 1.0 } else { 0.0 },
                    ]
                })
                .collect())
        }
    }

    /// Embedder that always fails, for error-path tests.
    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, _texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
            Err(EmbeddingError::NetworkError {
                message: "unreachable".into(),
            })
        }
    }

    fn test_store(embedder: Arc<dyn EmbeddingProvider>) -> (VectorMemoryStore, Uuid) {
        let cipher = FieldCipher::from_hex_key(
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        )
        .unwrap();
        let db = Database::new_in_memory(cipher).unwrap();
        let user = User {
            id: Uuid::new_v4(),
            status: "ACTIVE".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        db.insert_user(&user).unwrap();
        (VectorMemoryStore::new(db, embedder), user.id)
    }

    fn letter(user_id: Uuid, content: &str) -> Letter {
        Letter {
            id: Uuid::new_v4(),
            user_id,
            content: content.into(),
            status: LetterStatus::Pending,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_similarity() {
        let (store, user_id) = test_store(Arc::new(KeywordEmbedder));

        store
            .add_letter(&letter(user_id, "worried about my career"))
            .await
            .unwrap();
        store
            .add_letter(&letter(user_id, "thinking about family"))
            .await
            .unwrap();

        let results = store
            .retrieve(user_id, None, "career question", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.text_chunk.contains("career"));
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_retrieve_respects_limit_and_empty() {
        let (store, user_id) = test_store(Arc::new(KeywordEmbedder));

        // Empty memory is an empty result, not an error.
        let results = store.retrieve(user_id, None, "career", 5).await.unwrap();
        assert!(results.is_empty());

        for i in 0..4 {
            store
                .add_letter(&letter(user_id, &format!("career note {}", i)))
                .await
                .unwrap();
        }
        let results = store.retrieve(user_id, None, "career", 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_empty_memory_skips_embedding() {
        // With no candidates the query is never embedded, so a broken
        // embedder still yields an empty result.
        let (store, user_id) = test_store(Arc::new(BrokenEmbedder));
        let results = store.retrieve(user_id, None, "anything", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_add_letter_surfaces_embedding_failure() {
        let (store, user_id) = test_store(Arc::new(BrokenEmbedder));
        let err = store
            .add_letter(&letter(user_id, "career"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }

    #[test]
    fn test_format_context() {
        let chunk = MemoryChunk {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            future_profile_id: None,
            doc_type: MemoryDocType::Letter,
            text_chunk: "I feel stuck".into(),
            embedding: vec![1.0],
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let formatted = VectorMemoryStore::format_context(&[ScoredChunk {
            chunk,
            similarity: 0.9,
        }]);
        assert_eq!(formatted, "[letter] I feel stuck");
    }
}
