//! Report Service
//!
//! Report triggering, polling and reading. Triggering deduplicates against
//! an in-flight report; reading repairs the stored raw generator output
//! into the WOOP shape and masks unrepairable content with the fixed
//! fallback record instead of erroring.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::job::{JobMessage, JobTask};
use crate::models::report::{Report, ReportStatus, ReportView};
use crate::services::jobs::JobQueue;
use crate::services::llm::prompts::fallback_report;
use crate::services::woop;
use crate::storage::Database;
use crate::utils::error::{AppError, AppResult};

/// Report triggering, polling and reading.
pub struct ReportService {
    db: Database,
    queue: Arc<JobQueue>,
}

impl ReportService {
    /// Create a report service with injected dependencies.
    pub fn new(db: Database, queue: Arc<JobQueue>) -> Self {
        Self { db, queue }
    }

    /// Trigger report generation for a user.
    ///
    /// If the latest report is still GENERATING, that report is returned
    /// and no second job is enqueued. The optional ids narrow what the job
    /// reads: a specific letter, or one persona's conversation.
    pub fn request_report(
        &self,
        user_id: Uuid,
        letter_id: Option<Uuid>,
        future_profile_id: Option<Uuid>,
    ) -> AppResult<Report> {
        if let Some(existing) = self.db.latest_report_for_user(user_id)? {
            if existing.status == ReportStatus::Generating {
                warn!(
                    user_id = %user_id,
                    report_id = %existing.id,
                    "Report already generating, returning in-flight report"
                );
                return Ok(existing);
            }
        }

        let report = Report {
            id: Uuid::new_v4(),
            user_id,
            content: None,
            status: ReportStatus::Generating,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };
        self.db.insert_report(&report)?;

        let job = JobMessage::new(JobTask::GenerateReport {
            report_id: report.id,
            user_id,
            letter_id,
            future_profile_id,
        });
        if let Err(e) = self.queue.enqueue(job) {
            error!(report_id = %report.id, "Could not enqueue report job: {}", e);
        } else {
            info!(report_id = %report.id, user_id = %user_id, "Report job enqueued");
        }

        Ok(report)
    }

    /// Status of the user's latest report, for waiting-page polling.
    pub fn report_status(&self, user_id: Uuid) -> AppResult<ReportStatus> {
        let report = self
            .db
            .latest_report_for_user(user_id)?
            .ok_or_else(|| AppError::not_found("REPORT_NOT_FOUND"))?;
        Ok(report.status)
    }

    /// The user's latest READY report with repaired WOOP content.
    ///
    /// Extraction failure here is a display concern, not an error: the
    /// reader gets the fixed fallback record.
    pub fn latest_report(&self, user_id: Uuid) -> AppResult<ReportView> {
        let report = self
            .db
            .latest_ready_report(user_id)?
            .ok_or_else(|| AppError::not_found("REPORT_NOT_READY"))?;

        let raw = report.content.as_deref().unwrap_or("");
        let content = match woop::extract_woop(raw) {
            Ok(woop) => woop,
            Err(e) => {
                error!(
                    report_id = %report.id,
                    "Stored report content failed extraction, serving fallback: {}",
                    e
                );
                fallback_report()
            }
        };

        Ok(ReportView {
            report_id: report.id,
            status: report.status,
            content,
            created_at: report.created_at,
        })
    }
}
