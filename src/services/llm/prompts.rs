//! Prompt Builders
//!
//! Assembles the three generation prompts: the letter reply, the chat turn,
//! and the WOOP report. Each builder returns a `(system, user)` pair for the
//! provider.

use crate::models::report::WoopReport;
use crate::models::user::{CurrentProfile, FutureProfile};

/// Render an optional JSON payload for prompt inclusion.
fn json_block(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| "{}".to_string()),
        None => "{}".to_string(),
    }
}

/// Prompt for a persona's reply to the user's letter (standard tier).
pub fn letter_reply_prompt(
    persona: &FutureProfile,
    current: &CurrentProfile,
    letter_content: &str,
) -> (String, String) {
    let system = format!(
        r#"You are an AI career counselor role-playing the user's "future self", several years ahead.

# Your identity (future self)
{description}

# Your core personality (current self profile)
# Values (PVQ): {vals}
# Personality (BFI): {bfi}
# Demographics: {demo}

# Task:
You (the future self) just received the letter below from "past me" (the user).
Write a reply of about 500 words in your own voice.

Rules:
1. Acknowledge: start by acknowledging the struggles and worries in the letter.
2. Contrast: describe your life now, in contrast with those past worries.
3. Guide: give concrete advice on one or two core problems the letter raises.
4. Stay in character: your tone must match your identity and personality throughout."#,
        description = persona.profile_description.as_deref().unwrap_or(""),
        vals = json_block(&current.vals_data),
        bfi = json_block(&current.bfi_data),
        demo = json_block(&current.demo_data),
    );

    let user = format!("# The letter from past me:\n{}", letter_content);
    (system, user)
}

/// Prompt for one chat turn with a persona (fast tier).
///
/// `memory_context` is the retrieved long-term context block;
/// `chat_history` is the formatted recent conversation window.
pub fn chat_prompt(
    persona: &FutureProfile,
    current: &CurrentProfile,
    memory_context: &str,
    chat_history: &str,
    user_query: &str,
) -> (String, String) {
    let system = format!(
        r#"You are chatting live with "past you" (the user).

# Your identity (future self)
You must always stay in the role of: {name}
Your background: {description}

# Your core personality (current self profile)
# Values (PVQ): {vals}
# Personality (BFI): {bfi}
# Demographics: {demo}

# Your long-term memory
The most important foundational memories between you and the user, including the original letter. Prefer them when answering:
<memory>
{memory}
</memory>

# Your working memory
Your most recent conversation history:
<chat_history>
{history}
</chat_history>

# Core rules
1. Stay in character: every sentence must fit the identity of {name}.
2. Use your memory: draw on <memory> and <chat_history> to answer.
3. No fortune-telling: if the user asks "will I succeed?", answer that you cannot predict the future, but you can explore together what success would take."#,
        name = persona.profile_name,
        description = persona.profile_description.as_deref().unwrap_or(""),
        vals = json_block(&current.vals_data),
        bfi = json_block(&current.bfi_data),
        demo = json_block(&current.demo_data),
        memory = memory_context,
        history = chat_history,
    );

    (system, user_query.to_string())
}

/// Prompt for the WOOP summary report (standard tier).
pub fn report_prompt(
    current: &CurrentProfile,
    letter_content: &str,
    full_chat_history: &str,
) -> (String, String) {
    let profile_data = serde_json::json!({
        "demo_data": current.demo_data,
        "vals_data": current.vals_data,
        "bfi_data": current.bfi_data,
    });
    let profile_block =
        serde_json::to_string_pretty(&profile_data).unwrap_or_else(|_| "{}".to_string());

    let system = format!(
        r#"You are a professional AI career coach. You have reviewed every interaction between your client (the user) and their "future self".
Your task is to produce a four-part career insight summary based on the WOOP framework.

# 1. The user's current profile
<current_profile>
{profile}
</current_profile>

# 2. The user's original letter
<letter>
{letter}
</letter>

# 3. The full chat history
<chat_history>
{history}
</chat_history>

# Output format
Your output must be a single JSON object.
Your output must not contain any Markdown markers such as "```json" or "```".
Your output must follow exactly these keys and types:

{{
  "wish": "<the summarized career wish (string)>",
  "outcome": "<the summarized positive outcome (string)>",
  "obstacle": "<the summarized worry or challenge (string)>",
  "plan": "<the summarized next-step advice (string)>"
}}

# Important:
1. The `obstacle` and `plan` fields must be strings.
2. If the letter or chat history contains several obstacles or plans, merge them into one single string (for example separated by newlines), never a JSON array."#,
        profile = profile_block,
        letter = letter_content,
        history = full_chat_history,
    );

    let user =
        "Please generate the JSON report strictly following the WOOP (wish, outcome, obstacle, plan) format."
            .to_string();
    (system, user)
}

/// The fixed display substitution used when stored report content cannot be
/// repaired into a [`WoopReport`].
pub fn fallback_report() -> WoopReport {
    WoopReport {
        wish: "Report generation failed. Please contact the administrator.".to_string(),
        outcome: "N/A".to_string(),
        obstacle: "[]".to_string(),
        plan: "[]".to_string(),
    }
}
