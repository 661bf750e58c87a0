//! Conversation guard: the hard USER-turn cap, first-turn reply
//! consumption, and rejection without side effects.

use std::sync::Arc;
use std::time::Duration;

use futureself_engine::models::chat::MessageSender;
use futureself_engine::models::letter::{ChatStatus, LetterStatus};
use futureself_engine::utils::error::MESSAGE_LIMIT_EXCEEDED;

use crate::common::{build_state, seed_user, wait_for, FakeLlm};

/// Drive the letter job so the persona has a reply to consume.
async fn prepare_conversation(
    state: &futureself_engine::AppState,
    user_id: uuid::Uuid,
) {
    state.start_workers();
    state
        .letters()
        .submit_letter(user_id, "I keep doubting my choices.")
        .await
        .unwrap();
    wait_for("replies ready", Duration::from_secs(5), || {
        state.letters().letter_status(user_id).unwrap() == LetterStatus::RepliesReady
    });
}

#[tokio::test]
async fn five_turns_then_rejection() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(Arc::clone(&llm));
    let (user_id, personas) = seed_user(&state, 1);
    let persona_id = personas[0];
    prepare_conversation(&state, user_id).await;

    for i in 0..5 {
        let agent = state
            .chat()
            .send_message(user_id, persona_id, &format!("question {}", i + 1))
            .await
            .unwrap();
        assert_eq!(agent.sender, MessageSender::Agent);
    }

    let history = state.chat().history(user_id, persona_id).unwrap();
    assert_eq!(history.len(), 10);

    // The sixth turn is rejected with the stable code and persists nothing.
    let err = state
        .chat()
        .send_message(user_id, persona_id, "question 6")
        .await
        .unwrap_err();
    assert!(err.is_rejection(MESSAGE_LIMIT_EXCEEDED));
    assert_eq!(state.chat().history(user_id, persona_id).unwrap().len(), 10);
    assert_eq!(
        state.database().count_user_turns(user_id, persona_id).unwrap(),
        5
    );

    state.shutdown();
}

#[tokio::test]
async fn first_turn_consumes_the_reply_exactly_once() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(llm);
    let (user_id, personas) = seed_user(&state, 1);
    let persona_id = personas[0];
    prepare_conversation(&state, user_id).await;

    let reply_before = state
        .database()
        .reply_for_persona(persona_id)
        .unwrap()
        .unwrap();
    assert_eq!(reply_before.chat_status, ChatStatus::NotStarted);

    state
        .chat()
        .send_message(user_id, persona_id, "hello future me")
        .await
        .unwrap();

    let reply_after = state
        .database()
        .reply_for_persona(persona_id)
        .unwrap()
        .unwrap();
    assert_eq!(reply_after.chat_status, ChatStatus::Completed);

    // Later turns leave the reply untouched.
    state
        .chat()
        .send_message(user_id, persona_id, "another question")
        .await
        .unwrap();
    let reply_later = state
        .database()
        .reply_for_persona(persona_id)
        .unwrap()
        .unwrap();
    assert_eq!(reply_later.chat_status, ChatStatus::Completed);

    state.shutdown();
}

#[tokio::test]
async fn conversations_are_scoped_per_persona() {
    let llm = Arc::new(FakeLlm::always_ok());
    let state = build_state(llm);
    let (user_id, personas) = seed_user(&state, 2);
    prepare_conversation(&state, user_id).await;

    // Exhaust the cap with the first persona.
    for i in 0..5 {
        state
            .chat()
            .send_message(user_id, personas[0], &format!("q{}", i))
            .await
            .unwrap();
    }
    let err = state
        .chat()
        .send_message(user_id, personas[0], "over")
        .await
        .unwrap_err();
    assert!(err.is_rejection(MESSAGE_LIMIT_EXCEEDED));

    // The second persona's budget is untouched.
    state
        .chat()
        .send_message(user_id, personas[1], "hello other self")
        .await
        .unwrap();
    assert_eq!(
        state
            .database()
            .count_user_turns(user_id, personas[1])
            .unwrap(),
        1
    );

    state.shutdown();
}
