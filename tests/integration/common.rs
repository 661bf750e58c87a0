//! Shared test fixtures: deterministic provider fakes and a seeded engine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use futureself_engine::models::settings::{AppConfig, RetryConfig};
use futureself_engine::models::user::{CurrentProfile, FutureProfile, User};
use futureself_engine::services::llm::{LlmError, LlmProvider, LlmResult, ModelTier};
use futureself_engine::services::memory::{EmbeddingProvider, EmbeddingResult};
use futureself_engine::AppState;

/// A generation fake: scripted responses first, then a default reply.
pub struct FakeLlm {
    script: Mutex<VecDeque<LlmResult<String>>>,
    default: LlmResult<String>,
    calls: AtomicU32,
}

impl FakeLlm {
    /// Always succeed with a generic reply.
    pub fn always_ok() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Ok("generated text".to_string()),
            calls: AtomicU32::new(0),
        }
    }

    /// Always fail with a retryable network error.
    pub fn always_failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Err(LlmError::NetworkError {
                message: "upstream unreachable".to_string(),
            }),
            calls: AtomicU32::new(0),
        }
    }

    /// Play the given results in order, then fall back to the default.
    pub fn scripted(results: Vec<LlmResult<String>>, default: LlmResult<String>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            default,
            calls: AtomicU32::new(0),
        }
    }

    /// Number of completed generation calls.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn complete(&self, _tier: ModelTier, _system: &str, _user: &str) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = {
            let mut script = self.script.lock().unwrap();
            script.pop_front()
        };
        scripted.unwrap_or_else(|| self.default.clone())
    }
}

/// A deterministic embedder: projects text onto fixed keyword axes.
pub struct FakeEmbedder;

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn dimension(&self) -> usize {
        4
    }

    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                vec![
                    if lower.contains("career") { 1.0 } else { 0.1 },
                    if lower.contains("family") { 1.0 } else { 0.1 },
                    if lower.contains("letter") { 1.0 } else { 0.1 },
                    1.0,
                ]
            })
            .collect())
    }
}

/// Current wall-clock timestamp in the storage format.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Build an engine over an in-memory database with one worker and
/// zero-delay retries (the backoff arithmetic is asserted separately).
pub fn build_state(llm: Arc<FakeLlm>) -> AppState {
    build_state_with_retry(
        llm,
        RetryConfig {
            max_retries: 3,
            base_delay_secs: 0,
        },
    )
}

/// Build an engine with an explicit retry policy.
pub fn build_state_with_retry(llm: Arc<FakeLlm>, retry: RetryConfig) -> AppState {
    let config = AppConfig {
        database_path: ":memory:".to_string(),
        workers: 1,
        retry,
        ..AppConfig::default()
    };
    AppState::new(config, llm, Arc::new(FakeEmbedder)).expect("engine should assemble")
}

/// Seed a user with a current profile and `persona_count` future profiles.
pub fn seed_user(state: &AppState, persona_count: usize) -> (Uuid, Vec<Uuid>) {
    let db = state.database();

    let user = User {
        id: Uuid::new_v4(),
        status: "ACTIVE".to_string(),
        created_at: now(),
    };
    db.insert_user(&user).expect("user insert");

    db.upsert_current_profile(&CurrentProfile {
        id: Uuid::new_v4(),
        user_id: user.id,
        demo_data: Some(serde_json::json!({"age": 27, "occupation": "designer"})),
        vals_data: Some(serde_json::json!({"self_direction": 5})),
        bfi_data: Some(serde_json::json!({"openness": 4})),
        created_at: now(),
    })
    .expect("profile insert");

    let personas = (0..persona_count)
        .map(|i| {
            let persona = FutureProfile {
                id: Uuid::new_v4(),
                user_id: user.id,
                profile_name: format!("Future Self {}", i + 1),
                future_values: Some("autonomy".to_string()),
                future_vision: Some("a settled creative life".to_string()),
                future_obstacles: Some("burnout".to_string()),
                profile_description: Some("calm and direct".to_string()),
                created_at: now(),
            };
            db.insert_future_profile(&persona).expect("persona insert");
            persona.id
        })
        .collect();

    (user.id, personas)
}

/// Poll until `condition` holds or `timeout` elapses; panics on timeout.
pub fn wait_for(description: &str, timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for: {}", description);
}

/// A WOOP payload wrapped the way a chatty model would wrap it.
pub fn wrapped_woop_output() -> String {
    "Here is your report:\n```json\n{\"wish\":\"lead a design team\",\"outcome\":\"creative independence\",\"obstacle\":[\"self-doubt\",\"burnout\"],\"plan\":\"ship one side project\"}\n```"
        .to_string()
}
