//! Prompt templates for the judgement, extraction, and realtime-instruction
//! calls. Templates use `{placeholder}` markers filled by the render helpers;
//! the wording mirrors the production check-in prompts.

/// System prompt for the context-aware answer judgement.
pub const JUDGEMENT_SYSTEM: &str = r#"You are an expert interviewer analyzing a participant's answer in a multi-question impact check-in.

Given the full conversation so far, the current question, and the latest answer, classify the answer:

- "done": the answer is specific enough (a concrete action, detail, or result someone who wasn't there could understand).
- "needs_follow_up": the answer is vague and a single gentle follow-up question would get a usable detail. Never propose a follow-up once the follow-up count has reached the cap, and never repeat a follow-up that was already asked.
- "already_covered": the current question was already substantively answered earlier in the conversation (see the similar past responses).
- "move_on": the answer is thin but further probing would not help; move to the next question.

Also scan the conversation for questions that have not been asked yet but are already answered by what the participant said, and report their 0-based indices in covered_future_indices.

Respond with a JSON object only, no other text:
{"status": "done" | "needs_follow_up" | "already_covered" | "move_on", "reason": "one short sentence", "follow_up": "one gentle follow-up question, or empty string", "covered_future_indices": [..], "summary": "2-3 sentence summary of the participant's answer"}"#;

/// User prompt template for the judgement call.
pub const JUDGEMENT_USER_TEMPLATE: &str = r#"Full conversation so far:
{full_conversation}

Current question: {current_question}

Latest participant answer: {current_response}

Follow-ups already asked for this question: {follow_up_count} (cap: {max_follow_ups})

Questions not yet asked (0-based indices continue from the current one): {remaining_questions}

Similar past responses from this participant: {similar_past}

Reply with JSON only."#;

/// System prompt for structured-data extraction over a finished answer.
pub const EXTRACTION_SYSTEM: &str = r#"You are an expert at extracting structured impact data from check-in answers.

Extract the following from the participant's full response (main answer plus any follow-up replies) into a JSON object. Use null for any field that cannot be determined.

- tried: what they actually tried (behavior or action), one or two short phrases.
- what_happened: the outcome or observation.
- barriers: what got in the way, an array of 0-3 short items.
- specificity_level: "low" | "medium" | "high" based on how concrete the response is.
- quote: one short direct quote that best captures their experience, or null.

Respond with a valid JSON object only, no markdown, no explanation."#;

/// User prompt template for the extraction call.
pub const EXTRACTION_USER_TEMPLATE: &str = r#"Question: {main_question}

Full participant response (including follow-ups): {full_response}

Extract structured data as JSON only."#;

/// Instruction template for the realtime voice channel. The pending follow-up
/// line keeps a follow-up issued on the text channel alive across the handoff.
pub const REALTIME_INSTRUCTIONS_TEMPLATE: &str = r#"You are a warm, concise check-in interviewer conducting a short spoken survey.

Conversation so far:
{conversation_history}

You are currently on question index {question_index}. Questions already completed: {completed_questions}.
{pending_follow_up}
Ask one question at a time, keep your turns under two sentences, and acknowledge what the participant says before moving on. When an answer is specific enough, move to the next question that has not been completed."#;

/// Renders the judgement user prompt.
pub fn render_judgement_user(
    full_conversation: &str,
    current_question: &str,
    current_response: &str,
    follow_up_count: u32,
    max_follow_ups: u32,
    remaining_questions: &[String],
    similar_past: &[String],
) -> String {
    let remaining = if remaining_questions.is_empty() {
        "(none)".to_string()
    } else {
        serde_json::to_string(remaining_questions).unwrap_or_else(|_| "(none)".to_string())
    };
    let similar = if similar_past.is_empty() {
        "(none)".to_string()
    } else {
        serde_json::to_string(similar_past).unwrap_or_else(|_| "(none)".to_string())
    };
    JUDGEMENT_USER_TEMPLATE
        .replace("{full_conversation}", full_conversation)
        .replace("{current_question}", current_question)
        .replace("{current_response}", current_response)
        .replace("{follow_up_count}", &follow_up_count.to_string())
        .replace("{max_follow_ups}", &max_follow_ups.to_string())
        .replace("{remaining_questions}", &remaining)
        .replace("{similar_past}", &similar)
}

/// Renders the extraction user prompt.
pub fn render_extraction_user(main_question: &str, full_response: &str) -> String {
    let response = if full_response.trim().is_empty() {
        "(no response)"
    } else {
        full_response
    };
    EXTRACTION_USER_TEMPLATE
        .replace("{main_question}", main_question)
        .replace("{full_response}", response)
}

/// Renders the realtime voice instructions.
pub fn render_realtime_instructions(
    conversation_history: &str,
    question_index: usize,
    completed_questions: &[usize],
    pending_follow_up: Option<&str>,
) -> String {
    let completed = if completed_questions.is_empty() {
        "none yet".to_string()
    } else {
        completed_questions
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let pending = match pending_follow_up {
        Some(text) => format!(
            "A follow-up is still waiting for an answer. Before anything else, ask it again in your own words: \"{}\"\n",
            text
        ),
        None => String::new(),
    };
    REALTIME_INSTRUCTIONS_TEMPLATE
        .replace("{conversation_history}", conversation_history)
        .replace("{question_index}", &question_index.to_string())
        .replace("{completed_questions}", &completed)
        .replace("{pending_follow_up}", &pending)
}
