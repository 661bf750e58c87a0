//! Letter Service
//!
//! Letter intake and reading. Submission enforces the one-letter-per-user
//! rule before anything is persisted or enqueued, indexes the letter into
//! vector memory, and hands the heavy work to the letter-processing job.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::job::{JobMessage, JobTask};
use crate::models::letter::{Inbox, Letter, LetterReplyView, LetterStatus};
use crate::services::jobs::JobQueue;
use crate::services::memory::VectorMemoryStore;
use crate::storage::Database;
use crate::utils::error::{AppError, AppResult, FORBIDDEN, LETTER_ALREADY_SUBMITTED};

/// Longest letter excerpt shown in the inbox view.
const SNIPPET_CHARS: usize = 100;

/// Letter intake, polling and reading.
pub struct LetterService {
    db: Database,
    memory: VectorMemoryStore,
    queue: Arc<JobQueue>,
}

impl LetterService {
    /// Create a letter service with injected dependencies.
    pub fn new(db: Database, memory: VectorMemoryStore, queue: Arc<JobQueue>) -> Self {
        Self { db, memory, queue }
    }

    /// Submit the user's letter and enqueue the processing job.
    ///
    /// Rejects with `LETTER_ALREADY_SUBMITTED` before any write or enqueue
    /// when the user already has a letter.
    pub async fn submit_letter(&self, user_id: Uuid, content: &str) -> AppResult<Letter> {
        if self.db.letter_exists_for_user(user_id)? {
            warn!(user_id = %user_id, "Duplicate letter submission rejected");
            return Err(AppError::Rejected(LETTER_ALREADY_SUBMITTED));
        }

        let letter = Letter {
            id: Uuid::new_v4(),
            user_id,
            content: content.to_string(),
            status: LetterStatus::Pending,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };
        self.db.insert_letter(&letter)?;

        // The letter is foundational memory for every later conversation.
        // If indexing fails the submission is rolled back so the user can
        // retry cleanly.
        if let Err(e) = self.memory.add_letter(&letter).await {
            error!(letter_id = %letter.id, "Letter indexing failed, rolling back: {}", e);
            if let Err(delete_err) = self.db.delete_letter(letter.id) {
                error!(letter_id = %letter.id, "Rollback failed: {}", delete_err);
            }
            return Err(e);
        }

        // A broken queue must not undo an accepted submission; the job can
        // be re-driven later.
        let job = JobMessage::new(JobTask::ProcessLetter {
            letter_id: letter.id,
            user_id,
        });
        if let Err(e) = self.queue.enqueue(job) {
            error!(letter_id = %letter.id, "Could not enqueue letter job: {}", e);
        } else {
            info!(letter_id = %letter.id, user_id = %user_id, "Letter submitted, job enqueued");
        }

        Ok(letter)
    }

    /// Status of the user's letter, for waiting-page polling.
    pub fn letter_status(&self, user_id: Uuid) -> AppResult<LetterStatus> {
        let letter = self
            .db
            .latest_letter_for_user(user_id)?
            .ok_or_else(|| AppError::not_found("LETTER_NOT_FOUND"))?;
        Ok(letter.status)
    }

    /// Inbox view of the latest letter: a content snippet plus the replies
    /// with persona names.
    pub fn inbox(&self, user_id: Uuid) -> AppResult<Inbox> {
        let letter = self
            .db
            .latest_letter_for_user(user_id)?
            .ok_or_else(|| AppError::not_found("LETTER_NOT_FOUND"))?;

        let replies = self.db.list_inbox_replies(letter.id)?;

        let mut snippet: String = letter.content.chars().take(SNIPPET_CHARS).collect();
        if letter.content.chars().count() > SNIPPET_CHARS {
            snippet.push_str("...");
        }

        Ok(Inbox {
            letter_id: letter.id,
            letter_content_snippet: snippet,
            replies,
        })
    }

    /// Read one reply in full, with an ownership check.
    pub fn read_reply(&self, user_id: Uuid, reply_id: Uuid) -> AppResult<LetterReplyView> {
        let (reply, profile_name, owner_id) = self
            .db
            .get_reply_view(reply_id)?
            .ok_or_else(|| AppError::not_found("REPLY_NOT_FOUND"))?;

        if owner_id != user_id {
            warn!(reply_id = %reply_id, user_id = %user_id, "Reply access denied");
            return Err(AppError::Rejected(FORBIDDEN));
        }

        Ok(LetterReplyView {
            reply_id: reply.id,
            future_profile_id: reply.future_profile_id,
            from_profile_name: profile_name,
            content: reply.content,
            chat_status: reply.chat_status,
        })
    }
}
