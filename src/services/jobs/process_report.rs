//! Report Generation Job
//!
//! Gathers the user's profile, letter and chat history, invokes the
//! standard-tier generator, validates that the output can be repaired into
//! a WOOP record, and stores the raw output with the READY transition.
//!
//! The stored content is the raw generator text: readers re-extract at read
//! time and fall back to a fixed record if the stored blob degraded.

use tracing::info;
use uuid::Uuid;

use crate::services::jobs::executor::{JobError, JobExecutor};
use crate::services::llm::{prompts, ModelTier};
use crate::services::woop;

/// Run the report job body. Classified errors bubble to the executor.
pub(crate) async fn run(
    executor: &JobExecutor,
    report_id: Uuid,
    user_id: Uuid,
    letter_id: Option<Uuid>,
    future_profile_id: Option<Uuid>,
) -> Result<(), JobError> {
    let db = executor.db();

    let report = db
        .get_report(report_id)
        .map_err(JobError::from_storage)?
        .ok_or_else(|| JobError::Fatal(format!("Report {} not found", report_id)))?;

    if report.status.is_terminal() {
        info!(report_id = %report_id, status = %report.status, "Report already terminal, skipping");
        return Ok(());
    }

    let current_profile = db
        .get_current_profile(user_id)
        .map_err(JobError::from_storage)?
        .ok_or_else(|| JobError::Fatal(format!("Current profile missing for user {}", user_id)))?;

    // A pinned letter id must exist; otherwise the user's latest letter.
    let letter = match letter_id {
        Some(id) => db
            .get_letter(id)
            .map_err(JobError::from_storage)?
            .ok_or_else(|| JobError::Fatal(format!("Letter {} not found", id)))?,
        None => db
            .latest_letter_for_user(user_id)
            .map_err(JobError::from_storage)?
            .ok_or_else(|| JobError::Fatal(format!("No letter found for user {}", user_id)))?,
    };

    // A persona scope narrows the history to one conversation; otherwise
    // every conversation the user had.
    let history = match future_profile_id {
        Some(persona_id) => db
            .list_chat_messages(user_id, persona_id)
            .map_err(JobError::from_storage)?,
        None => db
            .list_chat_messages_for_user(user_id)
            .map_err(JobError::from_storage)?,
    };
    if history.is_empty() {
        return Err(JobError::Fatal(match future_profile_id {
            Some(persona_id) => format!("No chat history for future profile {}", persona_id),
            None => format!("No chat history for user {}", user_id),
        }));
    }

    let history_block = history
        .iter()
        .map(|msg| format!("{}: {}", msg.sender, msg.content))
        .collect::<Vec<_>>()
        .join("\n");

    let (system, user) = prompts::report_prompt(&current_profile, &letter.content, &history_block);
    let raw = executor
        .llm()
        .complete(ModelTier::Standard, &system, &user)
        .await
        .map_err(JobError::from_llm)?;

    // Malformed structured output is a generation-quality failure: retry,
    // do not persist.
    woop::extract_woop(&raw)
        .map_err(|e| JobError::Transient(format!("Report output failed extraction: {}", e)))?;

    let committed = db
        .complete_report(report_id, &raw)
        .map_err(JobError::from_storage)?;
    if !committed {
        info!(report_id = %report_id, "Report reached a terminal state concurrently, output discarded");
        return Ok(());
    }

    info!(report_id = %report_id, "Report generated and stored");
    Ok(())
}
