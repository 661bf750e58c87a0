//! Chat Service
//!
//! The turn-limited conversation with a persona. Each accepted USER turn
//! costs one unit of a hard per-pair budget; the first accepted turn
//! consumes the persona's letter reply by flipping its chat status.
//!
//! Concurrent submissions for the same (user, persona) pair serialize on an
//! in-process pair lock, so the cap and the single-flip invariant hold even
//! when the caller issues overlapping requests. The persisted effects of
//! one accepted turn (reply flip, USER turn, AGENT turn) commit in a single
//! transaction, so a failed generation call persists nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::chat::{ChatMessage, MessageSender};
use crate::services::llm::{prompts, LlmProvider, ModelTier};
use crate::services::memory::VectorMemoryStore;
use crate::storage::Database;
use crate::utils::error::{AppError, AppResult, MESSAGE_LIMIT_EXCEEDED};

/// How many retrieved memory chunks feed the chat prompt.
const MEMORY_LIMIT: usize = 5;

/// How many recent turns the working-memory window carries.
const HISTORY_WINDOW: usize = 10;

/// Conversation service with the hard USER-turn cap.
pub struct ChatService {
    db: Database,
    llm: Arc<dyn LlmProvider>,
    memory: VectorMemoryStore,
    max_user_turns: u32,
    pair_locks: Mutex<HashMap<(Uuid, Uuid), Arc<tokio::sync::Mutex<()>>>>,
}

impl ChatService {
    /// Create a chat service with injected dependencies.
    pub fn new(
        db: Database,
        llm: Arc<dyn LlmProvider>,
        memory: VectorMemoryStore,
        max_user_turns: u32,
    ) -> Self {
        Self {
            db,
            llm,
            memory,
            max_user_turns,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock serializing submissions for one (user, persona) pair.
    fn pair_lock(&self, user_id: Uuid, future_profile_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .pair_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            locks
                .entry((user_id, future_profile_id))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Submit one USER turn and get the generated AGENT turn back.
    ///
    /// Rejects with `MESSAGE_LIMIT_EXCEEDED` before persisting anything
    /// once the pair's USER-turn budget is spent.
    pub async fn send_message(
        &self,
        user_id: Uuid,
        future_profile_id: Uuid,
        content: &str,
    ) -> AppResult<ChatMessage> {
        let lock = self.pair_lock(user_id, future_profile_id);
        let _guard = lock.lock().await;

        let user_turns = self.db.count_user_turns(user_id, future_profile_id)?;
        if user_turns >= self.max_user_turns {
            warn!(
                user_id = %user_id,
                future_profile_id = %future_profile_id,
                user_turns,
                "Turn limit reached, rejecting message"
            );
            return Err(AppError::Rejected(MESSAGE_LIMIT_EXCEEDED));
        }

        let current_profile = self
            .db
            .get_current_profile(user_id)?
            .ok_or_else(|| AppError::not_found("Profile data incomplete"))?;
        let persona = self
            .db
            .get_future_profile(future_profile_id)?
            .ok_or_else(|| AppError::not_found("Future profile not found"))?;

        let history = self.db.list_chat_messages(user_id, future_profile_id)?;
        let window_start = history.len().saturating_sub(HISTORY_WINDOW);
        let history_block = history[window_start..]
            .iter()
            .map(|msg| format!("{}: {}", msg.sender, msg.content))
            .collect::<Vec<_>>()
            .join("\n");

        let retrieved = self
            .memory
            .retrieve(user_id, Some(future_profile_id), content, MEMORY_LIMIT)
            .await?;
        let memory_block = VectorMemoryStore::format_context(&retrieved);

        let (system, user) = prompts::chat_prompt(
            &persona,
            &current_profile,
            &memory_block,
            &history_block,
            content,
        );
        let reply_text = self
            .llm
            .complete(ModelTier::Fast, &system, &user)
            .await
            .map_err(|e| AppError::generation(e.to_string()))?;

        let user_msg = ChatMessage {
            id: Uuid::new_v4(),
            future_profile_id,
            user_id,
            sender: MessageSender::User,
            content: content.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };
        let agent_msg = ChatMessage {
            id: Uuid::new_v4(),
            future_profile_id,
            user_id,
            sender: MessageSender::Agent,
            content: reply_text,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };

        // The first accepted turn opens the conversation and consumes the
        // persona's letter reply.
        self.db
            .append_exchange(&user_msg, &agent_msg, user_turns == 0)?;

        info!(
            user_id = %user_id,
            future_profile_id = %future_profile_id,
            turn = user_turns + 1,
            "Chat exchange persisted"
        );

        // Indexing feeds future retrieval; the exchange is already
        // committed, so failures only degrade later context.
        for msg in [&user_msg, &agent_msg] {
            if let Err(e) = self.memory.add_chat_message(msg).await {
                warn!(message_id = %msg.id, "Could not index chat turn: {}", e);
            }
        }

        Ok(agent_msg)
    }

    /// Full conversation history for a pair, oldest first.
    pub fn history(&self, user_id: Uuid, future_profile_id: Uuid) -> AppResult<Vec<ChatMessage>> {
        self.db.list_chat_messages(user_id, future_profile_id)
    }
}
