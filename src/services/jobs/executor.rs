//! Job Executor
//!
//! Runs one queued job to a decision: success, scheduled retry, or terminal
//! failure. Failure classification drives the lifecycle:
//!
//! - Fatal (required entity missing, or a provider error that would repeat
//!   identically): commit FAILED immediately, never retry.
//! - Transient (timeout, transport failure, rate limit, malformed
//!   structured output): re-enqueue with exponential backoff until the
//!   retry budget is spent, then commit FAILED.
//!
//! Every path either leaves exactly one terminal transition behind or
//! schedules a retry with no status change, so an entity never stays stuck
//! in a transient state after the executor is done with it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::models::job::{JobMessage, JobTask};
use crate::models::settings::RetryConfig;
use crate::services::jobs::{process_letter, process_report};
use crate::services::llm::{LlmError, LlmProvider};
use crate::services::memory::VectorMemoryStore;
use crate::storage::Database;
use crate::utils::error::AppError;

/// The executor's decision for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job finished (including safe no-ops on redelivery).
    Completed,
    /// A transient failure; the message should be re-enqueued after `delay`.
    Retry { delay: Duration },
    /// A terminal failure; FAILED has been committed.
    Failed,
}

/// Internal failure classification for job bodies.
#[derive(Debug)]
pub(crate) enum JobError {
    /// Do not retry: missing/inconsistent data or a deterministic failure.
    Fatal(String),
    /// Retry with backoff if budget remains.
    Transient(String),
}

impl JobError {
    /// Classify a generation failure: retryable provider errors are
    /// transient, everything else (bad key, bad request) repeats and is
    /// fatal.
    pub(crate) fn from_llm(err: LlmError) -> Self {
        if err.is_retryable() {
            Self::Transient(err.to_string())
        } else {
            Self::Fatal(err.to_string())
        }
    }

    /// Storage access failures are treated as transient: the data may be
    /// reachable on the next delivery.
    pub(crate) fn from_storage(err: AppError) -> Self {
        Self::Transient(err.to_string())
    }
}

/// Executes queued generation jobs against the storage and provider
/// contracts. One instance is shared by every worker.
pub struct JobExecutor {
    db: Database,
    llm: Arc<dyn LlmProvider>,
    memory: VectorMemoryStore,
    retry: RetryConfig,
}

impl JobExecutor {
    /// Create an executor with injected dependencies.
    pub fn new(
        db: Database,
        llm: Arc<dyn LlmProvider>,
        memory: VectorMemoryStore,
        retry: RetryConfig,
    ) -> Self {
        Self {
            db,
            llm,
            memory,
            retry,
        }
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn llm(&self) -> &dyn LlmProvider {
        self.llm.as_ref()
    }

    pub(crate) fn memory(&self) -> &VectorMemoryStore {
        &self.memory
    }

    /// Run one delivered job to a decision.
    ///
    /// The worker blocks on this call; the generation contract underneath
    /// may be async but is never cancelled from here.
    pub async fn execute(&self, job: &JobMessage) -> JobOutcome {
        info!(job = %job.describe(), "Job received");

        let result = match &job.task {
            JobTask::ProcessLetter { letter_id, user_id } => {
                process_letter::run(self, *letter_id, *user_id).await
            }
            JobTask::GenerateReport {
                report_id,
                user_id,
                letter_id,
                future_profile_id,
            } => {
                process_report::run(self, *report_id, *user_id, *letter_id, *future_profile_id)
                    .await
            }
        };

        match result {
            Ok(()) => {
                info!(job = %job.describe(), "Job completed");
                JobOutcome::Completed
            }
            Err(JobError::Fatal(message)) => {
                error!(job = %job.describe(), "Job failed fatally, not retrying: {}", message);
                self.commit_failed(job);
                JobOutcome::Failed
            }
            Err(JobError::Transient(message)) => {
                if job.attempt < self.retry.max_retries {
                    let delay = self.retry.delay_for_attempt(job.attempt);
                    warn!(
                        job = %job.describe(),
                        delay_secs = delay.as_secs(),
                        "Transient job failure, scheduling retry: {}",
                        message
                    );
                    JobOutcome::Retry { delay }
                } else {
                    error!(
                        job = %job.describe(),
                        max_retries = self.retry.max_retries,
                        "Retry budget exhausted, failing job: {}",
                        message
                    );
                    self.commit_failed(job);
                    JobOutcome::Failed
                }
            }
        }
    }

    /// Commit the terminal FAILED state for the job's target entity.
    ///
    /// A `false` transition result means the entity already reached a
    /// terminal state (redelivery); that is a safe no-op.
    fn commit_failed(&self, job: &JobMessage) {
        let transition = match &job.task {
            JobTask::ProcessLetter { letter_id, .. } => self.db.mark_letter_failed(*letter_id),
            JobTask::GenerateReport { report_id, .. } => self.db.mark_report_failed(*report_id),
        };

        match transition {
            Ok(true) => {}
            Ok(false) => {
                info!(job = %job.describe(), "Entity already terminal, FAILED commit skipped")
            }
            Err(e) => {
                error!(job = %job.describe(), "Could not commit FAILED state: {}", e)
            }
        }
    }
}
