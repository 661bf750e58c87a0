//! Letter Processing Job
//!
//! Generates one reply per persona for a submitted letter, then commits the
//! replies and the REPLIES_READY transition in a single transaction. The
//! reply set is all-or-nothing: a generation failure for any persona leaves
//! the letter PENDING for the retry path.

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::letter::{ChatStatus, LetterReply};
use crate::services::jobs::executor::{JobError, JobExecutor};
use crate::services::llm::{prompts, ModelTier};

/// Run the letter job body. Classified errors bubble to the executor.
pub(crate) async fn run(
    executor: &JobExecutor,
    letter_id: Uuid,
    user_id: Uuid,
) -> Result<(), JobError> {
    let db = executor.db();

    let letter = db
        .get_letter(letter_id)
        .map_err(JobError::from_storage)?
        .ok_or_else(|| JobError::Fatal(format!("Letter {} not found", letter_id)))?;

    if letter.status.is_terminal() {
        info!(letter_id = %letter_id, status = %letter.status, "Letter already terminal, skipping");
        return Ok(());
    }

    let current_profile = db
        .get_current_profile(user_id)
        .map_err(JobError::from_storage)?
        .ok_or_else(|| JobError::Fatal(format!("Current profile missing for user {}", user_id)))?;

    let personas = db
        .list_future_profiles(user_id)
        .map_err(JobError::from_storage)?;
    if personas.is_empty() {
        return Err(JobError::Fatal(format!(
            "No future profiles for user {}",
            user_id
        )));
    }

    let mut replies = Vec::with_capacity(personas.len());
    for persona in &personas {
        let (system, user) = prompts::letter_reply_prompt(persona, &current_profile, &letter.content);
        let content = executor
            .llm()
            .complete(ModelTier::Standard, &system, &user)
            .await
            .map_err(JobError::from_llm)?;

        replies.push(LetterReply {
            id: Uuid::new_v4(),
            letter_id,
            future_profile_id: persona.id,
            content,
            chat_status: ChatStatus::NotStarted,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        });
    }

    let committed = db
        .complete_letter_with_replies(letter_id, &replies)
        .map_err(JobError::from_storage)?;
    if !committed {
        info!(letter_id = %letter_id, "Letter reached a terminal state concurrently, replies discarded");
        return Ok(());
    }

    info!(
        letter_id = %letter_id,
        replies = replies.len(),
        "Letter processed, replies ready"
    );

    // Replies feed persona-scoped memory. Indexing is best-effort: the
    // terminal state is already committed, so a failure here must not fail
    // the job.
    for reply in &replies {
        if let Err(e) = executor.memory().add_letter_reply(user_id, reply).await {
            warn!(
                reply_id = %reply.id,
                "Could not index reply into vector memory: {}",
                e
            );
        }
    }

    Ok(())
}
