//! Interview Script and Heuristic Tunables
//!
//! The check-in asks a fixed sequence of open-ended questions. Everything the
//! decision layer treats as data — the question texts, the closing-utterance
//! set, the lookahead keyword lists, and the overlap thresholds — lives here
//! so deployments can tune the interview without touching the policy code.

use serde::{Deserialize, Serialize};

/// Default number of follow-ups allowed per main question.
pub const DEFAULT_FOLLOW_UP_CAP: u32 = 2;

/// The full configuration of one interview: questions plus guard tunables.
///
/// `Default` reproduces the production three-question impact check-in. The
/// struct is `Deserialize` so an operator can override any field from a JSON
/// file (see `serde(default)` on each field).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewScript {
    /// The main questions, asked in order.
    #[serde(default = "default_questions")]
    pub questions: Vec<String>,
    /// Minimal closing utterances that end a question (compared after
    /// normalization, so punctuation and case do not matter).
    #[serde(default = "default_terminal_replies")]
    pub terminal_replies: Vec<String>,
    /// Terms suggesting the participant already described an outcome,
    /// covering the question immediately after the current one.
    #[serde(default = "default_outcome_keywords")]
    pub outcome_keywords: Vec<String>,
    /// Terms suggesting the participant already described a barrier,
    /// covering the final question.
    #[serde(default = "default_barrier_keywords")]
    pub barrier_keywords: Vec<String>,
    /// Token-overlap ratio at or above which a new answer counts as a
    /// repeat of an earlier one.
    #[serde(default = "default_repeat_answer_threshold")]
    pub repeat_answer_threshold: f64,
    /// Token-overlap ratio at or above which a proposed follow-up counts as
    /// a repeat of an earlier AI prompt.
    #[serde(default = "default_repeat_follow_up_threshold")]
    pub repeat_follow_up_threshold: f64,
    /// Hard cap on follow-ups per question.
    #[serde(default = "default_follow_up_cap")]
    pub follow_up_cap: u32,
}

fn default_questions() -> Vec<String> {
    vec![
        "What did you try?".to_string(),
        "What happened?".to_string(),
        "What got in the way?".to_string(),
    ]
}

fn default_terminal_replies() -> Vec<String> {
    [
        "nothing", "no", "none", "that's it", "no more", "n/a", "nope", "nah", "ok", "okay",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_outcome_keywords() -> Vec<String> {
    [
        "outcome",
        "result",
        "improved",
        "faster",
        "saved",
        "worked",
        "team responded",
        "noticed",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_barrier_keywords() -> Vec<String> {
    [
        "difficult",
        "barrier",
        "could not",
        "couldn't",
        "need help",
        "colleague",
        "hard",
        "blocked",
        "pushback",
        "no time",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_repeat_answer_threshold() -> f64 {
    0.75
}

fn default_repeat_follow_up_threshold() -> f64 {
    0.65
}

fn default_follow_up_cap() -> u32 {
    DEFAULT_FOLLOW_UP_CAP
}

impl Default for InterviewScript {
    fn default() -> Self {
        Self {
            questions: default_questions(),
            terminal_replies: default_terminal_replies(),
            outcome_keywords: default_outcome_keywords(),
            barrier_keywords: default_barrier_keywords(),
            repeat_answer_threshold: default_repeat_answer_threshold(),
            repeat_follow_up_threshold: default_repeat_follow_up_threshold(),
            follow_up_cap: default_follow_up_cap(),
        }
    }
}

impl InterviewScript {
    /// Parses a script override from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the question text at `idx`, or `None` when out of range.
    pub fn question(&self, idx: usize) -> Option<&str> {
        self.questions.get(idx).map(String::as_str)
    }

    /// Number of main questions in the script.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Index of the final (barrier) question.
    pub fn last_index(&self) -> usize {
        self.questions.len().saturating_sub(1)
    }

    /// The questions not yet asked once `idx` has been posed.
    pub fn remaining_after(&self, idx: usize) -> &[String] {
        if idx + 1 < self.questions.len() {
            &self.questions[idx + 1..]
        } else {
            &[]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_script_has_three_questions() {
        let script = InterviewScript::default();
        assert_eq!(script.len(), 3);
        assert_eq!(script.question(0), Some("What did you try?"));
        assert_eq!(script.last_index(), 2);
    }

    #[test]
    fn remaining_after_slices_forward() {
        let script = InterviewScript::default();
        assert_eq!(script.remaining_after(0).len(), 2);
        assert_eq!(script.remaining_after(1), &["What got in the way?"]);
        assert!(script.remaining_after(2).is_empty());
        assert!(script.remaining_after(99).is_empty());
    }

    #[test]
    fn question_out_of_range_is_none() {
        let script = InterviewScript::default();
        assert_eq!(script.question(3), None);
    }

    #[test]
    fn from_json_keeps_defaults_for_missing_fields() {
        let script = InterviewScript::from_json(r#"{"follow_up_cap": 1}"#).unwrap();
        assert_eq!(script.follow_up_cap, 1);
        assert_eq!(script.len(), 3);
        assert_eq!(script.repeat_answer_threshold, 0.75);
        assert_eq!(script.repeat_follow_up_threshold, 0.65);
    }

    #[test]
    fn from_json_overrides_questions() {
        let script = InterviewScript::from_json(
            r#"{"questions": ["Only question?"], "outcome_keywords": ["shipped"]}"#,
        )
        .unwrap();
        assert_eq!(script.len(), 1);
        assert_eq!(script.last_index(), 0);
        assert_eq!(script.outcome_keywords, vec!["shipped"]);
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        assert!(InterviewScript::from_json("not json").is_err());
    }
}
