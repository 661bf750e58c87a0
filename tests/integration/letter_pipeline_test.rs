//! Letter pipeline: submission through the worker pool to replies-ready,
//! duplicate-submission rejection, redelivery safety, encryption at rest.

use std::sync::Arc;
use std::time::Duration;

use futureself_engine::models::job::{JobMessage, JobTask};
use futureself_engine::models::letter::{ChatStatus, LetterStatus};
use futureself_engine::utils::error::LETTER_ALREADY_SUBMITTED;

use crate::common::{build_state, seed_user, wait_for, FakeLlm};

#[tokio::test]
async fn letter_flows_to_replies_ready() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(Arc::clone(&llm));
    let (user_id, personas) = seed_user(&state, 2);
    state.start_workers();

    let letter = state
        .letters()
        .submit_letter(user_id, "I am worried about my career direction.")
        .await
        .unwrap();
    assert_eq!(letter.status, LetterStatus::Pending);

    wait_for("letter to reach REPLIES_READY", Duration::from_secs(5), || {
        state.letters().letter_status(user_id).unwrap() == LetterStatus::RepliesReady
    });

    // One reply per persona, readable and decrypted.
    let inbox = state.letters().inbox(user_id).unwrap();
    assert_eq!(inbox.replies.len(), 2);
    for reply in &inbox.replies {
        assert!(personas.contains(&reply.future_profile_id));
        assert_eq!(reply.chat_status, ChatStatus::NotStarted);
        let view = state.letters().read_reply(user_id, reply.reply_id).unwrap();
        assert_eq!(view.content, "generated text");
    }

    // One standard-tier call per persona.
    assert_eq!(llm.calls(), 2);

    // The letter plus both replies land in vector memory (reply indexing
    // trails the status commit).
    wait_for("memory chunks to be indexed", Duration::from_secs(5), || {
        state.database().list_memory_chunks(user_id, None).unwrap().len() == 3
    });

    state.shutdown();
}

#[tokio::test]
async fn duplicate_submission_rejected_before_enqueue() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(Arc::clone(&llm));
    let (user_id, _personas) = seed_user(&state, 1);

    state
        .letters()
        .submit_letter(user_id, "first letter")
        .await
        .unwrap();

    let err = state
        .letters()
        .submit_letter(user_id, "second letter")
        .await
        .unwrap_err();
    assert!(err.is_rejection(LETTER_ALREADY_SUBMITTED));

    // Workers were never started: the only queued job is the first one,
    // and no generation ran for the rejected submission.
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn redelivered_job_does_not_duplicate_replies() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(Arc::clone(&llm));
    let (user_id, _personas) = seed_user(&state, 2);
    state.start_workers();

    let letter = state
        .letters()
        .submit_letter(user_id, "dear future me")
        .await
        .unwrap();

    wait_for("letter to reach REPLIES_READY", Duration::from_secs(5), || {
        state.letters().letter_status(user_id).unwrap() == LetterStatus::RepliesReady
    });
    let calls_after_first_run = llm.calls();

    // The broker redelivers the same message.
    state
        .queue()
        .enqueue(JobMessage::new(JobTask::ProcessLetter {
            letter_id: letter.id,
            user_id,
        }))
        .unwrap();

    // The redelivery is consumed as a no-op: no new generation calls, no
    // extra replies, status unchanged.
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(llm.calls(), calls_after_first_run);
    assert_eq!(state.letters().inbox(user_id).unwrap().replies.len(), 2);
    assert_eq!(
        state.letters().letter_status(user_id).unwrap(),
        LetterStatus::RepliesReady
    );

    state.shutdown();
}

#[tokio::test]
async fn letter_content_is_encrypted_at_rest() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(llm);
    let (user_id, _personas) = seed_user(&state, 1);

    let plaintext = "很私密的内容 — a very private letter";
    let letter = state
        .letters()
        .submit_letter(user_id, plaintext)
        .await
        .unwrap();

    // The raw column value is ciphertext.
    let conn = state.database().pool().get().unwrap();
    let raw: String = conn
        .query_row(
            "SELECT content FROM letters WHERE id = ?1",
            [letter.id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_ne!(raw, plaintext);
    assert!(!raw.contains("private"));

    // Reads are transparently decrypted.
    let loaded = state.database().get_letter(letter.id).unwrap().unwrap();
    assert_eq!(loaded.content, plaintext);
}
