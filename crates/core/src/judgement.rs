//! Judgement Gateway
//!
//! The external LLM collaborator that classifies the latest answer. The
//! gateway is a single blocking call with no retry: any transport error or
//! malformed reply is converted into a safe fallback verdict so the interview
//! always moves forward.

use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Maximum characters of the raw answer kept as the fallback summary.
const FALLBACK_SUMMARY_CHARS: usize = 150;

/// The four possible classifications of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// The answer is specific enough; move to the next question.
    Done,
    /// The answer needs one clarifying follow-up.
    NeedsFollowUp,
    /// The question was already substantively answered earlier.
    AlreadyCovered,
    /// Stop probing this question even though the answer is thin.
    MoveOn,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictStatus::Done => write!(f, "done"),
            VerdictStatus::NeedsFollowUp => write!(f, "needs_follow_up"),
            VerdictStatus::AlreadyCovered => write!(f, "already_covered"),
            VerdictStatus::MoveOn => write!(f, "move_on"),
        }
    }
}

impl VerdictStatus {
    /// Whether this status finishes the current question.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerdictStatus::NeedsFollowUp)
    }
}

/// The gateway's structured verdict on one answer.
///
/// `status` is required; everything else defaults so a minimal-but-valid
/// reply still parses. A verdict is never mutated once produced — the guard
/// builds a derived, corrected copy instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub follow_up: String,
    #[serde(default)]
    pub covered_future_indices: Vec<usize>,
    #[serde(default)]
    pub summary: String,
}

impl Verdict {
    /// The safe verdict used when the gateway call or parse fails: the
    /// question is treated as done, and the participant's own words stand in
    /// for the summary.
    pub fn fallback(response: &str, reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Done,
            reason: reason.into(),
            follow_up: String::new(),
            covered_future_indices: Vec::new(),
            summary: truncate_chars(response, FALLBACK_SUMMARY_CHARS),
        }
    }
}

/// Truncates to at most `max` characters without splitting a code point.
fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Strips an optional markdown code fence (```json ... ```) around a reply.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parses the gateway's raw reply into a [`Verdict`].
pub fn parse_verdict(raw: &str) -> Result<Verdict> {
    let cleaned = strip_code_fence(raw);
    serde_json::from_str(cleaned).context("gateway reply did not parse as a verdict")
}

/// Contract for the external judgement call: one prompt in, raw text out.
#[async_trait]
pub trait JudgementClient: Send + Sync {
    async fn judge(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// A `JudgementClient` for any OpenAI-compatible chat completion API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    json_object: bool,
}

impl OpenAICompatibleClient {
    /// Client tuned for the answer judgement call.
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            temperature: 0.3,
            max_tokens: 600,
            json_object: false,
        }
    }

    /// Client tuned for structured extraction: lower temperature and the
    /// JSON-object response format, so the reply is machine-parseable.
    pub fn extraction(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            temperature: 0.2,
            max_tokens: 512,
            json_object: true,
        }
    }
}

#[async_trait]
impl JudgementClient for OpenAICompatibleClient {
    async fn judge(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_prompt)
                    .build()?
                    .into(),
            ]);
        if self.json_object {
            builder.response_format(ResponseFormat::JsonObject);
        }
        let request = builder.build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .context("no response choice from judgement model")?
            .message
            .content
            .clone()
            .context("no content in judgement response")?;

        info!(model = %self.model, chars = content.len(), "Judgement call completed");
        Ok(content)
    }
}

/// A `JudgementClient` that always returns the same reply. Useful for
/// development and integration testing without API costs.
pub struct StaticJudgementClient {
    pub reply: String,
}

#[async_trait]
impl JudgementClient for StaticJudgementClient {
    async fn judge(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}
