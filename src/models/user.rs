//! User Models
//!
//! The user anchor row and the questionnaire-derived current profile that
//! generation jobs read for personality context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user. Exists mainly to anchor cascades; authentication and
/// session resolution happen in the HTTP adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Onboarding state string, e.g. "ONBOARDING" or "ACTIVE"
    pub status: String,
    pub created_at: String,
}

/// Questionnaire results describing who the user is today.
///
/// One row per user. The three payloads are stored as JSON and passed
/// verbatim into generation prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Demographics answers
    pub demo_data: Option<serde_json::Value>,
    /// Portrait Values Questionnaire answers
    pub vals_data: Option<serde_json::Value>,
    /// Big Five Inventory answers
    pub bfi_data: Option<serde_json::Value>,
    pub created_at: String,
}

/// A user-authored future-self identity that generation jobs role-play.
///
/// The narrative fields are free text and stored encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FutureProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub profile_name: String,
    pub future_values: Option<String>,
    pub future_vision: Option<String>,
    pub future_obstacles: Option<String>,
    pub profile_description: Option<String>,
    pub created_at: String,
}
