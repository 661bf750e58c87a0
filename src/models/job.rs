//! Job Models
//!
//! Messages exchanged with the task queue. The wire shape matches the broker
//! payload: a `task` discriminator plus entity ids, with optional fields
//! narrowing report scope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The work a job message requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum JobTask {
    /// Generate one reply per persona for a submitted letter.
    ProcessLetter { letter_id: Uuid, user_id: Uuid },
    /// Generate the WOOP summary report.
    ///
    /// `letter_id` pins a specific letter (default: the user's latest);
    /// `future_profile_id` restricts the chat history to one persona
    /// (default: all conversations).
    GenerateReport {
        report_id: Uuid,
        user_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        letter_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        future_profile_id: Option<Uuid>,
    },
}

/// A queued job: the task plus its delivery attempt counter.
///
/// `attempt` counts completed retries. The first delivery carries 0; each
/// retry re-enqueues the message with the counter incremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    #[serde(flatten)]
    pub task: JobTask,
    #[serde(default)]
    pub attempt: u32,
}

impl JobMessage {
    /// Wrap a task as a first-delivery message.
    pub fn new(task: JobTask) -> Self {
        Self { task, attempt: 0 }
    }

    /// The same task with the attempt counter incremented, for re-enqueue.
    pub fn next_attempt(&self) -> Self {
        Self {
            task: self.task.clone(),
            attempt: self.attempt + 1,
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match &self.task {
            JobTask::ProcessLetter { letter_id, .. } => {
                format!("process_letter letter={} attempt={}", letter_id, self.attempt)
            }
            JobTask::GenerateReport { report_id, .. } => {
                format!("generate_report report={} attempt={}", report_id, self.attempt)
            }
        }
    }
}
