//! Session Store and Turn Log
//!
//! The only shared mutable structure in the system: an in-memory registry of
//! per-session conversation state. Each session sits behind its own async
//! mutex inside a store-level read-write map, so concurrent requests mutate a
//! given session one at a time while other sessions proceed independently.
//!
//! State lives for the lifetime of the process; there is no deletion and no
//! persistence. An unknown session id is an absent-state condition, never an
//! error.

use crate::judgement::Verdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

/// Who produced a dialogue turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Ai => write!(f, "ai"),
        }
    }
}

/// One recorded unit of conversation. Turns are append-only: once recorded
/// they are never mutated or removed, and their order is chronological.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// A finalized main-question answer, with the guard-corrected analysis
    /// when one was produced.
    Answer {
        question_idx: usize,
        question: String,
        response: String,
        analysis: Option<Verdict>,
        ts: DateTime<Utc>,
    },
    /// A single voice or text exchange, including follow-up prompts and the
    /// replies to them.
    Dialogue {
        question_idx: usize,
        role: Role,
        text: String,
        ts: DateTime<Utc>,
    },
}

impl Turn {
    pub fn question_idx(&self) -> usize {
        match self {
            Turn::Answer { question_idx, .. } | Turn::Dialogue { question_idx, .. } => {
                *question_idx
            }
        }
    }
}

/// A follow-up that has been issued but not yet answered. At most one exists
/// per session, across channels: a voice session starter must honor it before
/// opening a new main question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFollowUp {
    pub question_idx: usize,
    pub text: String,
    pub ts: DateTime<Utc>,
}

/// All mutable state for one participant's interview.
#[derive(Debug)]
pub struct Session {
    pub created_at: DateTime<Utc>,
    pub entries: Vec<Turn>,
    pub completed_qs: BTreeSet<usize>,
    pub covered_ahead: BTreeSet<usize>,
    pub covered_evidence: HashMap<usize, String>,
    pub pending_follow_up: Option<PendingFollowUp>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            created_at: Utc::now(),
            entries: Vec::new(),
            completed_qs: BTreeSet::new(),
            covered_ahead: BTreeSet::new(),
            covered_evidence: HashMap::new(),
            pending_follow_up: None,
        }
    }

    /// Appends a finalized answer turn.
    pub fn push_answer(
        &mut self,
        question_idx: usize,
        question: &str,
        response: &str,
        analysis: Option<Verdict>,
    ) {
        self.entries.push(Turn::Answer {
            question_idx,
            question: question.to_string(),
            response: response.to_string(),
            analysis,
            ts: Utc::now(),
        });
    }

    /// Appends a dialogue turn; empty text is dropped silently.
    pub fn push_dialogue(&mut self, question_idx: usize, role: Role, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.entries.push(Turn::Dialogue {
            question_idx,
            role,
            text: text.to_string(),
            ts: Utc::now(),
        });
    }

    /// Deterministically serializes the whole log into the transcript handed
    /// to the judgement gateway. This is the only session data the gateway
    /// ever sees.
    pub fn render_context(&self) -> String {
        if self.entries.is_empty() {
            return "(no prior conversation)".to_string();
        }
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|turn| match turn {
                Turn::Answer {
                    question_idx,
                    question,
                    response,
                    ..
                } => format!(
                    "[Question {}] {}\nParticipant: {}",
                    question_idx + 1,
                    question,
                    response
                ),
                Turn::Dialogue {
                    question_idx,
                    role,
                    text,
                    ..
                } => {
                    let label = match role {
                        Role::User => "Participant",
                        Role::Ai => "AI",
                    };
                    format!("[Question {}] {}: {}", question_idx + 1, label, text)
                }
            })
            .collect();
        parts.join("\n\n")
    }

    /// The last `limit` texts for `question_idx` spoken by `role`, oldest
    /// first. For the user role this includes finalized answer turns, since
    /// those are the participant's words too.
    pub fn recent_texts(&self, question_idx: usize, role: Role, limit: usize) -> Vec<String> {
        let mut texts: Vec<String> = self
            .entries
            .iter()
            .rev()
            .filter_map(|turn| match turn {
                Turn::Dialogue {
                    question_idx: idx,
                    role: r,
                    text,
                    ..
                } if *idx == question_idx && *r == role => Some(text.clone()),
                Turn::Answer {
                    question_idx: idx,
                    response,
                    ..
                } if *idx == question_idx && role == Role::User => Some(response.clone()),
                _ => None,
            })
            .take(limit)
            .collect();
        texts.reverse();
        texts
    }

    /// Every user text recorded for `question_idx`, in order, joined into
    /// the single combined response that extraction runs over: the main
    /// answer plus each follow-up reply.
    pub fn combined_user_response(&self, question_idx: usize) -> String {
        let texts: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|turn| match turn {
                Turn::Answer {
                    question_idx: idx,
                    response,
                    ..
                } if *idx == question_idx => Some(response.as_str()),
                Turn::Dialogue {
                    question_idx: idx,
                    role: Role::User,
                    text,
                    ..
                } if *idx == question_idx => Some(text.as_str()),
                _ => None,
            })
            .collect();
        texts.join(" ")
    }

    /// Stores a pending follow-up, replacing any prior record. Empty text
    /// clears instead.
    pub fn set_pending_follow_up(&mut self, question_idx: usize, text: &str) {
        if text.trim().is_empty() {
            self.pending_follow_up = None;
            return;
        }
        self.pending_follow_up = Some(PendingFollowUp {
            question_idx,
            text: text.to_string(),
            ts: Utc::now(),
        });
    }

    /// Removes the pending record. When `question_idx` is given, only a
    /// record for that question is removed.
    pub fn clear_pending_follow_up(&mut self, question_idx: Option<usize>) {
        match (question_idx, &self.pending_follow_up) {
            (Some(idx), Some(pending)) if pending.question_idx != idx => {}
            _ => self.pending_follow_up = None,
        }
    }
}

/// In-memory registry of sessions, keyed by an opaque token.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh session and returns its identifier. The session is
    /// fully initialized before it becomes visible to lookups.
    pub async fn create(&self) -> String {
        let sid = Uuid::new_v4().simple().to_string();
        let session = Arc::new(Mutex::new(Session::new()));
        self.sessions.write().await.insert(sid.clone(), session);
        info!(session_id = %sid, "Session created");
        sid
    }

    /// Looks up a session. Unknown ids return `None`, never an error.
    pub async fn get(&self, sid: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(sid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judgement::{Verdict, VerdictStatus};

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = SessionStore::new();
        let sid = store.create().await;
        let session = store.get(&sid).await.expect("session should exist");
        let session = session.lock().await;
        assert!(session.entries.is_empty());
        assert!(session.completed_qs.is_empty());
        assert!(session.pending_follow_up.is_none());
    }

    #[tokio::test]
    async fn unknown_session_is_absent_not_an_error() {
        let store = SessionStore::new();
        assert!(store.get("no-such-session").await.is_none());
    }

    #[tokio::test]
    async fn created_ids_are_distinct() {
        let store = SessionStore::new();
        let a = store.create().await;
        let b = store.create().await;
        assert_ne!(a, b);
    }

    #[test]
    fn entries_grow_monotonically_and_keep_order() {
        let mut session = Session::new();
        session.push_answer(0, "What did you try?", "A new template", None);
        session.push_dialogue(0, Role::Ai, "Which template?");
        session.push_dialogue(0, Role::User, "The weekly report one");

        assert_eq!(session.entries.len(), 3);
        assert_eq!(session.entries[0].question_idx(), 0);
        assert!(matches!(session.entries[0], Turn::Answer { .. }));
        assert!(matches!(
            session.entries[1],
            Turn::Dialogue { role: Role::Ai, .. }
        ));
        assert!(matches!(
            session.entries[2],
            Turn::Dialogue {
                role: Role::User,
                ..
            }
        ));
    }

    #[test]
    fn empty_dialogue_text_is_dropped() {
        let mut session = Session::new();
        session.push_dialogue(0, Role::User, "   ");
        session.push_dialogue(0, Role::User, "");
        assert!(session.entries.is_empty());
    }

    #[test]
    fn render_context_empty_log_returns_sentinel() {
        let session = Session::new();
        assert_eq!(session.render_context(), "(no prior conversation)");
    }

    #[test]
    fn render_context_pairs_questions_and_labels_roles() {
        let mut session = Session::new();
        session.push_answer(0, "What did you try?", "Used the new template", None);
        session.push_dialogue(1, Role::Ai, "What happened after that?");
        session.push_dialogue(1, Role::User, "Reports went out a day earlier");

        let context = session.render_context();
        assert_eq!(
            context,
            "[Question 1] What did you try?\nParticipant: Used the new template\n\n\
             [Question 2] AI: What happened after that?\n\n\
             [Question 2] Participant: Reports went out a day earlier"
        );
    }

    #[test]
    fn render_context_is_deterministic() {
        let mut session = Session::new();
        session.push_answer(0, "Q", "first", None);
        session.push_dialogue(0, Role::Ai, "probe");
        assert_eq!(session.render_context(), session.render_context());
    }

    #[test]
    fn recent_texts_filters_by_question_and_role() {
        let mut session = Session::new();
        session.push_dialogue(0, Role::User, "first answer");
        session.push_dialogue(0, Role::Ai, "a probe");
        session.push_dialogue(1, Role::User, "different question");
        for i in 0..4 {
            session.push_dialogue(0, Role::User, &format!("reply {i}"));
        }

        let texts = session.recent_texts(0, Role::User, 3);
        assert_eq!(texts, vec!["reply 1", "reply 2", "reply 3"]);
        assert_eq!(session.recent_texts(0, Role::Ai, 3), vec!["a probe"]);
        assert!(session.recent_texts(2, Role::User, 3).is_empty());
    }

    #[test]
    fn recent_user_texts_include_answer_turns() {
        let mut session = Session::new();
        session.push_answer(0, "What did you try?", "Used the template", None);
        session.push_dialogue(0, Role::Ai, "Which template?");
        session.push_dialogue(0, Role::User, "The weekly one");

        let texts = session.recent_texts(0, Role::User, 3);
        assert_eq!(texts, vec!["Used the template", "The weekly one"]);
        // Answer turns never count as AI speech.
        assert_eq!(session.recent_texts(0, Role::Ai, 3), vec!["Which template?"]);
    }

    #[test]
    fn combined_user_response_joins_answers_and_replies_in_order() {
        let mut session = Session::new();
        session.push_answer(0, "What did you try?", "I reorganized our intake process", None);
        session.push_dialogue(0, Role::Ai, "Which part specifically?");
        session.push_dialogue(0, Role::User, "Specifically the customer intake form");
        session.push_dialogue(1, Role::User, "unrelated question text");

        assert_eq!(
            session.combined_user_response(0),
            "I reorganized our intake process Specifically the customer intake form"
        );
        assert_eq!(session.combined_user_response(2), "");
    }

    #[test]
    fn pending_follow_up_replaces_never_stacks() {
        let mut session = Session::new();
        session.set_pending_follow_up(0, "What exactly changed?");
        session.set_pending_follow_up(1, "Who was involved?");

        let pending = session.pending_follow_up.as_ref().unwrap();
        assert_eq!(pending.question_idx, 1);
        assert_eq!(pending.text, "Who was involved?");
    }

    #[test]
    fn empty_pending_text_clears() {
        let mut session = Session::new();
        session.set_pending_follow_up(0, "What exactly changed?");
        session.set_pending_follow_up(0, "");
        assert!(session.pending_follow_up.is_none());
    }

    #[test]
    fn clear_pending_respects_question_index() {
        let mut session = Session::new();
        session.set_pending_follow_up(1, "Who was involved?");

        session.clear_pending_follow_up(Some(0));
        assert!(session.pending_follow_up.is_some());

        session.clear_pending_follow_up(Some(1));
        assert!(session.pending_follow_up.is_none());

        session.set_pending_follow_up(2, "Anything else?");
        session.clear_pending_follow_up(None);
        assert!(session.pending_follow_up.is_none());
    }

    #[test]
    fn answer_turn_keeps_its_analysis() {
        let mut session = Session::new();
        let verdict = Verdict {
            status: VerdictStatus::Done,
            reason: "specific".to_string(),
            follow_up: String::new(),
            covered_future_indices: vec![1],
            summary: "Template adopted".to_string(),
        };
        session.push_answer(0, "What did you try?", "Template", Some(verdict.clone()));
        match &session.entries[0] {
            Turn::Answer { analysis, .. } => assert_eq!(analysis.as_ref(), Some(&verdict)),
            _ => panic!("expected answer turn"),
        }
    }
}
