//! Retry executor: backoff schedule, retry exhaustion, terminal FAILED,
//! and no status change while retries remain.

use std::sync::Arc;
use std::time::Duration;

use futureself_engine::models::job::{JobMessage, JobTask};
use futureself_engine::models::letter::LetterStatus;
use futureself_engine::models::report::ReportStatus;
use futureself_engine::models::settings::RetryConfig;
use futureself_engine::services::jobs::JobOutcome;

use crate::common::{build_state, build_state_with_retry, seed_user, wait_for, FakeLlm};

#[tokio::test]
async fn backoff_schedule_doubles_from_base() {
    // Production policy: base 60, max 3 retries. Drive the executor by
    // hand so no timer actually runs.
    let llm = Arc::new(FakeLlm::always_failing());
    let state = build_state_with_retry(
        Arc::clone(&llm),
        RetryConfig {
            max_retries: 3,
            base_delay_secs: 60,
        },
    );
    let (user_id, _personas) = seed_user(&state, 1);
    // No workers: the submitted job sits in the queue; we execute manually.
    let letter = state
        .letters()
        .submit_letter(user_id, "dear future me")
        .await
        .unwrap();

    let job = JobMessage::new(JobTask::ProcessLetter {
        letter_id: letter.id,
        user_id,
    });

    // Three transient failures schedule 60, 120, 240 second delays and
    // leave the letter PENDING.
    let mut job = job;
    for expected_secs in [60u64, 120, 240] {
        let outcome = state.executor().execute(&job).await;
        assert_eq!(
            outcome,
            JobOutcome::Retry {
                delay: Duration::from_secs(expected_secs)
            }
        );
        assert_eq!(
            state.letters().letter_status(user_id).unwrap(),
            LetterStatus::Pending
        );
        job = job.next_attempt();
    }

    // The fourth failure exhausts the budget: terminal FAILED, no retry.
    let outcome = state.executor().execute(&job).await;
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(
        state.letters().letter_status(user_id).unwrap(),
        LetterStatus::Failed
    );
    assert_eq!(llm.calls(), 4);

    // A further delivery of the exhausted job is a no-op.
    let outcome = state.executor().execute(&job).await;
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(llm.calls(), 4);
}

#[tokio::test]
async fn failing_job_reaches_failed_through_the_pool() {
    // Zero-delay retries: the full retry loop runs through the queue and
    // worker pool in real time.
    let llm = Arc::new(FakeLlm::always_failing());
    let state = build_state(Arc::clone(&llm));
    let (user_id, _personas) = seed_user(&state, 1);
    state.start_workers();

    state
        .letters()
        .submit_letter(user_id, "dear future me")
        .await
        .unwrap();

    wait_for("letter to reach FAILED", Duration::from_secs(5), || {
        state.letters().letter_status(user_id).unwrap() == LetterStatus::Failed
    });

    // Initial delivery plus exactly three retries, and nothing further.
    assert_eq!(llm.calls(), 4);
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(llm.calls(), 4);

    state.shutdown();
}

#[tokio::test]
async fn transient_then_success_commits_ready() {
    // The report path: one transient failure, then a good WOOP payload.
    let llm = Arc::new(FakeLlm::scripted(
        vec![
            Ok("letter reply".to_string()),
            Err(futureself_engine::services::llm::LlmError::NetworkError {
                message: "blip".to_string(),
            }),
            Ok(crate::common::wrapped_woop_output()),
        ],
        Ok("unexpected extra call".to_string()),
    ));
    let state = build_state(Arc::clone(&llm));
    let (user_id, personas) = seed_user(&state, 1);
    state.start_workers();

    state
        .letters()
        .submit_letter(user_id, "dear future me")
        .await
        .unwrap();
    wait_for("replies ready", Duration::from_secs(5), || {
        state.letters().letter_status(user_id).unwrap() == LetterStatus::RepliesReady
    });

    // Seed one conversation turn directly so the report job has history.
    let persona_id = personas[0];
    let now = crate::common::now();
    let user_msg = futureself_engine::models::chat::ChatMessage {
        id: uuid::Uuid::new_v4(),
        future_profile_id: persona_id,
        user_id,
        sender: futureself_engine::models::chat::MessageSender::User,
        content: "a question".to_string(),
        created_at: now.clone(),
    };
    let agent_msg = futureself_engine::models::chat::ChatMessage {
        id: uuid::Uuid::new_v4(),
        future_profile_id: persona_id,
        user_id,
        sender: futureself_engine::models::chat::MessageSender::Agent,
        content: "an answer".to_string(),
        created_at: now,
    };
    state
        .database()
        .append_exchange(&user_msg, &agent_msg, true)
        .unwrap();

    state.reports().request_report(user_id, None, None).unwrap();
    wait_for("report READY after a transient blip", Duration::from_secs(5), || {
        state.reports().report_status(user_id).unwrap() == ReportStatus::Ready
    });

    // letter (1) + failed report attempt (1) + successful retry (1).
    assert_eq!(llm.calls(), 3);

    state.shutdown();
}
