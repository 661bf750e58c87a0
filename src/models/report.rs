//! Report Models
//!
//! The synthesized career-insight report and its four-field WOOP content.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a report.
///
/// A report leaves `Generating` exactly once per submission, moved by the
/// report job; both other states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Generating,
    Ready,
    Failed,
}

impl ReportStatus {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "GENERATING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }

    /// Parse from a database string representation.
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "GENERATING" => Some(Self::Generating),
            "READY" => Some(Self::Ready),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Generating)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A generated report row. `content` holds the raw generator output (which
/// should contain a WOOP JSON object, possibly wrapped in markdown); readers
/// extract and repair it at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: Option<String>,
    pub status: ReportStatus,
    pub created_at: String,
}

/// The four-field WOOP summary presented to the user.
///
/// All fields are plain strings by the time a reader sees them; the
/// extractor flattens list-valued `obstacle`/`plan` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WoopReport {
    pub wish: String,
    pub outcome: String,
    pub obstacle: String,
    pub plan: String,
}

/// Reading view of a ready report, with repaired WOOP content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportView {
    pub report_id: Uuid,
    pub status: ReportStatus,
    pub content: WoopReport,
    pub created_at: String,
}
