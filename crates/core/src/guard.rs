//! Coverage & Repetition Guard
//!
//! The local policy layer that corrects the judgement gateway's raw verdict.
//! The gateway proposes; the guard disposes. Its rules fire in a fixed
//! precedence order, each one overriding the raw status and clearing any
//! proposed follow-up, so the interview stays bounded and non-repetitive even
//! when the model keeps asking for more.
//!
//! Everything in this module is CPU-bound and non-suspending.

use crate::judgement::{Verdict, VerdictStatus};
use crate::script::InterviewScript;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Everything the guard needs to judge one submitted answer.
pub struct GuardContext<'a> {
    pub script: &'a InterviewScript,
    /// Index of the question the answer belongs to.
    pub question_idx: usize,
    /// Follow-ups already asked for this question.
    pub follow_up_count: u32,
    /// The latest answer text.
    pub response: &'a str,
    /// Up to the last 3 user-role texts recorded for this question.
    pub recent_user_texts: &'a [String],
    /// Up to the last 3 AI-role texts recorded for this question.
    pub recent_ai_texts: &'a [String],
    /// The rendered transcript of the whole session so far.
    pub transcript: &'a str,
}

/// Lowercases, strips punctuation, and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Token-overlap ratio between two texts.
///
/// Only tokens longer than 3 characters count, so filler words never inflate
/// the score. The ratio is the shared-token count divided by the larger
/// token-set size: symmetric, 1.0 for identical texts, and 0.0 when either
/// side has no qualifying tokens.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<&str> = a
        .split_whitespace()
        .filter(|t| t.chars().count() > 3)
        .collect();
    let tokens_b: HashSet<&str> = b
        .split_whitespace()
        .filter(|t| t.chars().count() > 3)
        .collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let common = tokens_a.intersection(&tokens_b).count();
    common as f64 / tokens_a.len().max(tokens_b.len()) as f64
}

/// Whether a normalized reply is one of the script's closing utterances.
fn is_terminal_reply(script: &InterviewScript, normalized_response: &str) -> bool {
    script
        .terminal_replies
        .iter()
        .any(|reply| normalize(reply) == normalized_response)
}

/// Scans the conversation for keywords that cover questions ahead of the
/// current one: outcome terms cover the next question, barrier terms cover
/// the final one. Only indices strictly after `question_idx` are proposed.
fn infer_covered_ahead(
    script: &InterviewScript,
    transcript: &str,
    response: &str,
    question_idx: usize,
) -> BTreeSet<usize> {
    let haystack = format!("{} {}", normalize(transcript), normalize(response));
    let mut covered = BTreeSet::new();

    let next_idx = question_idx + 1;
    if next_idx < script.len()
        && script
            .outcome_keywords
            .iter()
            .any(|kw| haystack.contains(&normalize(kw)))
    {
        covered.insert(next_idx);
    }

    let last_idx = script.last_index();
    if last_idx > question_idx
        && script
            .barrier_keywords
            .iter()
            .any(|kw| haystack.contains(&normalize(kw)))
    {
        covered.insert(last_idx);
    }

    covered
}

/// Applies the guard's precedence rules to the gateway's raw verdict and
/// merges forward-coverage evidence from both sources.
///
/// The returned verdict is a derived copy: the raw verdict itself is never
/// mutated, and the correction is attributable to the guard, not the gateway.
pub fn apply(raw: &Verdict, ctx: &GuardContext<'_>) -> Verdict {
    let mut corrected = raw.clone();
    let normalized_response = normalize(ctx.response);

    if is_terminal_reply(ctx.script, &normalized_response) {
        debug!(question_idx = ctx.question_idx, "Guard: terminal reply, forcing done");
        corrected.status = VerdictStatus::Done;
        corrected.follow_up.clear();
        corrected.reason = "participant gave a closing reply".to_string();
    } else if raw.status == VerdictStatus::NeedsFollowUp
        && ctx.recent_user_texts.iter().any(|prior| {
            token_overlap(&normalized_response, &normalize(prior))
                >= ctx.script.repeat_answer_threshold
        })
    {
        debug!(question_idx = ctx.question_idx, "Guard: repeated answer, forcing done");
        corrected.status = VerdictStatus::Done;
        corrected.follow_up.clear();
        corrected.reason = "avoid repetitive follow-up".to_string();
    } else if raw.status == VerdictStatus::NeedsFollowUp
        && ctx.recent_ai_texts.iter().any(|prior| {
            token_overlap(&normalize(&raw.follow_up), &normalize(prior))
                >= ctx.script.repeat_follow_up_threshold
        })
    {
        debug!(question_idx = ctx.question_idx, "Guard: repeated follow-up, moving on");
        corrected.status = VerdictStatus::MoveOn;
        corrected.follow_up.clear();
        corrected.reason = "proposed follow-up repeats earlier AI prompt".to_string();
    } else if ctx.question_idx == ctx.script.last_index() && ctx.follow_up_count >= 1 {
        // A real barrier, once identified, gets at most one clarifying
        // follow-up regardless of the raw verdict.
        debug!(question_idx = ctx.question_idx, "Guard: barrier question follow-up cap");
        corrected.status = VerdictStatus::Done;
        corrected.follow_up.clear();
        corrected.reason = "barrier question already had a follow-up".to_string();
    } else if raw.status == VerdictStatus::NeedsFollowUp
        && ctx.follow_up_count >= ctx.script.follow_up_cap
    {
        debug!(question_idx = ctx.question_idx, "Guard: global follow-up cap reached");
        corrected.status = VerdictStatus::Done;
        corrected.follow_up.clear();
        corrected.reason = "follow-up cap reached".to_string();
    }

    // Forward coverage: union of what the gateway proposed and what the
    // local keyword heuristic infers, restricted to questions strictly
    // after the current one.
    let mut merged: BTreeSet<usize> = raw
        .covered_future_indices
        .iter()
        .copied()
        .filter(|&idx| idx > ctx.question_idx && idx < ctx.script.len())
        .collect();
    merged.extend(infer_covered_ahead(
        ctx.script,
        ctx.transcript,
        ctx.response,
        ctx.question_idx,
    ));
    corrected.covered_future_indices = merged.into_iter().collect();

    corrected
}
