//! Report pipeline: generation through the worker pool, read-time repair
//! of wrapped/list-valued output, the fixed fallback, the dedup guard, and
//! the no-retry data-error path.

use std::sync::Arc;
use std::time::Duration;

use futureself_engine::models::letter::LetterStatus;
use futureself_engine::models::report::ReportStatus;

use crate::common::{build_state, seed_user, wait_for, wrapped_woop_output, FakeLlm};

/// Submit a letter, run it to replies, and hold one short conversation so
/// the report job has history to read.
async fn prepare_history(state: &futureself_engine::AppState, user_id: uuid::Uuid) {
    state.start_workers();
    state
        .letters()
        .submit_letter(user_id, "I want to change careers but fear the risk.")
        .await
        .unwrap();
    wait_for("replies ready", Duration::from_secs(5), || {
        state.letters().letter_status(user_id).unwrap() == LetterStatus::RepliesReady
    });

    let persona_id = state.letters().inbox(user_id).unwrap().replies[0].future_profile_id;
    state
        .chat()
        .send_message(user_id, persona_id, "How did you handle the career change?")
        .await
        .unwrap();
}

#[tokio::test]
async fn report_generates_and_reads_back_repaired() {
    // Letter reply + chat turn are generic; the report call returns a
    // wrapped WOOP object with a list-valued obstacle.
    let llm = Arc::new(FakeLlm::scripted(
        vec![
            Ok("letter reply".to_string()),
            Ok("chat reply".to_string()),
            Ok(wrapped_woop_output()),
        ],
        Ok("unexpected extra call".to_string()),
    ));
    let state = build_state(Arc::clone(&llm));
    let (user_id, _personas) = seed_user(&state, 1);
    prepare_history(&state, user_id).await;

    let report = state.reports().request_report(user_id, None, None).unwrap();
    assert_eq!(report.status, ReportStatus::Generating);

    wait_for("report READY", Duration::from_secs(5), || {
        state.reports().report_status(user_id).unwrap() == ReportStatus::Ready
    });

    let view = state.reports().latest_report(user_id).unwrap();
    assert_eq!(view.report_id, report.id);
    assert_eq!(view.content.wish, "lead a design team");
    assert_eq!(view.content.outcome, "creative independence");
    // The list-valued obstacle was flattened to a newline-joined string.
    assert_eq!(view.content.obstacle, "self-doubt\nburnout");
    assert_eq!(view.content.plan, "ship one side project");

    // Stored content is the raw wrapped text, encrypted at rest.
    let conn = state.database().pool().get().unwrap();
    let raw: String = conn
        .query_row(
            "SELECT content FROM reports WHERE id = ?1",
            [report.id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert!(!raw.contains("lead a design team"));
    let stored = state.database().get_report(report.id).unwrap().unwrap();
    assert!(stored.content.unwrap().contains("```json"));

    state.shutdown();
}

#[tokio::test]
async fn duplicate_request_while_generating_reuses_report() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(llm);
    let (user_id, _personas) = seed_user(&state, 1);
    // No workers: the first report stays GENERATING.

    let first = state.reports().request_report(user_id, None, None).unwrap();
    let second = state.reports().request_report(user_id, None, None).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(
        state.reports().report_status(user_id).unwrap(),
        ReportStatus::Generating
    );
}

#[tokio::test]
async fn missing_history_fails_without_retry() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(Arc::clone(&llm));
    let (user_id, _personas) = seed_user(&state, 1);
    state.start_workers();

    // Letter exists but the user never chatted: a data error, not a
    // retryable failure.
    state
        .letters()
        .submit_letter(user_id, "hello")
        .await
        .unwrap();
    wait_for("replies ready", Duration::from_secs(5), || {
        state.letters().letter_status(user_id).unwrap() == LetterStatus::RepliesReady
    });
    let calls_before = llm.calls();

    state.reports().request_report(user_id, None, None).unwrap();
    wait_for("report FAILED", Duration::from_secs(5), || {
        state.reports().report_status(user_id).unwrap() == ReportStatus::Failed
    });

    // The job failed during data loading; generation was never invoked.
    assert_eq!(llm.calls(), calls_before);

    state.shutdown();
}

#[tokio::test]
async fn malformed_output_retries_then_succeeds() {
    // Two malformed generations, then a good one: the job retries through
    // the extraction failures and lands READY.
    let llm = Arc::new(FakeLlm::scripted(
        vec![
            Ok("letter reply".to_string()),
            Ok("chat reply".to_string()),
            Ok("no json here".to_string()),
            Ok("{\"wish\":\"w\"}".to_string()),
            Ok(wrapped_woop_output()),
        ],
        Ok("unexpected extra call".to_string()),
    ));
    let state = build_state(Arc::clone(&llm));
    let (user_id, _personas) = seed_user(&state, 1);
    prepare_history(&state, user_id).await;

    state.reports().request_report(user_id, None, None).unwrap();
    wait_for("report READY after retries", Duration::from_secs(5), || {
        state.reports().report_status(user_id).unwrap() == ReportStatus::Ready
    });

    // 2 setup calls + 2 malformed attempts + 1 success.
    assert_eq!(llm.calls(), 5);

    state.shutdown();
}

#[tokio::test]
async fn persona_scoped_report_uses_that_conversation() {
    let llm = Arc::new(FakeLlm::scripted(
        vec![
            Ok("letter reply".to_string()),
            Ok("chat reply".to_string()),
            Ok(wrapped_woop_output()),
        ],
        Ok("unexpected extra call".to_string()),
    ));
    let state = build_state(llm);
    let (user_id, personas) = seed_user(&state, 1);
    prepare_history(&state, user_id).await;

    let report = state
        .reports()
        .request_report(user_id, None, Some(personas[0]))
        .unwrap();
    wait_for("scoped report READY", Duration::from_secs(5), || {
        state.reports().report_status(user_id).unwrap() == ReportStatus::Ready
    });
    assert_eq!(
        state.reports().latest_report(user_id).unwrap().report_id,
        report.id
    );

    state.shutdown();
}
