//! Interview Engine
//!
//! Orchestrates one answer submission end to end: transcript rendering,
//! similarity lookup, the judgement gateway call, the guard's correction, and
//! every session side effect (turn appends, forward-coverage bookkeeping,
//! pending follow-up handoff). External collaborators are trait objects; the
//! engine itself never fails a submission — external failures degrade into
//! the fallback verdict and the interview keeps moving.

use crate::guard::{self, GuardContext};
use crate::judgement::{self, JudgementClient, Verdict, VerdictStatus};
use crate::prompts;
use crate::script::InterviewScript;
use crate::session::{PendingFollowUp, Role, SessionStore};
use crate::similarity::SimilarityIndex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// How many prior responses the similarity index is asked for.
const SIMILARITY_TOP_K: usize = 5;
/// How many of those are shown to the judgement gateway.
const SIMILARITY_PROMPT_LIMIT: usize = 3;
/// How many recent same-question texts per role feed the repetition checks.
const RECENT_TEXT_LIMIT: usize = 3;

/// Answer to a "was this question already covered?" query.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageStatus {
    pub covered: bool,
    pub evidence: String,
}

/// Everything a caller needs after submitting one answer.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub status: VerdictStatus,
    pub reason: String,
    pub follow_up: String,
    pub transition_text: String,
    pub summary: String,
    pub covered_future_indices: Vec<usize>,
    pub done: bool,
    /// Structured extraction of the finished answer; `None` while a
    /// follow-up is outstanding or when the extraction call degrades.
    pub structured: Option<Value>,
}

pub struct InterviewEngine {
    store: Arc<SessionStore>,
    script: Arc<InterviewScript>,
    judgement: Arc<dyn JudgementClient>,
    extraction: Arc<dyn JudgementClient>,
    similarity: Arc<dyn SimilarityIndex>,
}

impl InterviewEngine {
    pub fn new(
        script: InterviewScript,
        judgement: Arc<dyn JudgementClient>,
        similarity: Arc<dyn SimilarityIndex>,
    ) -> Self {
        Self {
            store: Arc::new(SessionStore::new()),
            script: Arc::new(script),
            extraction: judgement.clone(),
            judgement,
            similarity,
        }
    }

    /// Routes structured extraction through its own client, so it can run on
    /// a different model and request shape than the judgement call.
    pub fn with_extraction_client(mut self, extraction: Arc<dyn JudgementClient>) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn script(&self) -> &InterviewScript {
        &self.script
    }

    /// Creates a new interview session and returns its opaque id.
    pub async fn create_session(&self) -> String {
        self.store.create().await
    }

    /// Whether `question_idx` is already considered answered by earlier
    /// content, with the best supporting quote. Unknown sessions are simply
    /// not covered.
    pub async fn question_coverage(&self, sid: &str, question_idx: usize) -> CoverageStatus {
        let Some(session) = self.store.get(sid).await else {
            return CoverageStatus {
                covered: false,
                evidence: String::new(),
            };
        };
        let session = session.lock().await;
        CoverageStatus {
            covered: session.covered_ahead.contains(&question_idx),
            evidence: session
                .covered_evidence
                .get(&question_idx)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Appends a finalized answer turn and indexes the response text for
    /// later similarity queries. A no-op for unknown sessions.
    pub async fn record_answer(
        &self,
        sid: &str,
        question_idx: usize,
        response: &str,
        analysis: Option<Verdict>,
    ) {
        let Some(session) = self.store.get(sid).await else {
            return;
        };
        let question = self.script.question(question_idx).unwrap_or_default();
        session
            .lock()
            .await
            .push_answer(question_idx, question, response, analysis);
        self.similarity.index(sid, response).await;
    }

    /// Appends a dialogue turn; user-role text is also indexed. Empty text
    /// and unknown sessions are no-ops.
    pub async fn record_dialogue(&self, sid: &str, question_idx: usize, role: Role, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let Some(session) = self.store.get(sid).await else {
            return;
        };
        session.lock().await.push_dialogue(question_idx, role, text);
        if role == Role::User {
            self.similarity.index(sid, text).await;
        }
    }

    /// Renders the full transcript for a session; the empty-log sentinel is
    /// also returned for unknown sessions.
    pub async fn render_context(&self, sid: &str) -> String {
        match self.store.get(sid).await {
            Some(session) => session.lock().await.render_context(),
            None => "(no prior conversation)".to_string(),
        }
    }

    /// Prior responses from this session closest to the canonical text of
    /// `question_idx`. Empty when the index is unavailable or the question
    /// is out of range.
    pub async fn find_similar(&self, sid: &str, question_idx: usize) -> Vec<String> {
        let Some(question) = self.script.question(question_idx) else {
            return Vec::new();
        };
        self.similarity.query(sid, question, SIMILARITY_TOP_K).await
    }

    /// Completed question indices, for the realtime instruction builder.
    pub async fn completed_questions(&self, sid: &str) -> Vec<usize> {
        match self.store.get(sid).await {
            Some(session) => session.lock().await.completed_qs.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// The outstanding cross-channel follow-up, if any.
    pub async fn pending_follow_up(&self, sid: &str) -> Option<PendingFollowUp> {
        let session = self.store.get(sid).await?;
        let session = session.lock().await;
        session.pending_follow_up.clone()
    }

    /// Clears the pending follow-up; with `question_idx` given, only when it
    /// matches the outstanding record.
    pub async fn clear_pending(&self, sid: &str, question_idx: Option<usize>) {
        if let Some(session) = self.store.get(sid).await {
            session.lock().await.clear_pending_follow_up(question_idx);
        }
    }

    /// Runs the full judgement pipeline for one submitted answer and applies
    /// every session side effect. Always returns a verdict: gateway failures
    /// degrade to the fallback and the turn is still recorded.
    pub async fn analyze_response(
        &self,
        sid: &str,
        question_idx: usize,
        response: &str,
        follow_up_count: u32,
    ) -> Verdict {
        let question = self.script.question(question_idx).unwrap_or_default();
        let transcript = self.render_context(sid).await;
        let similar = self.find_similar(sid, question_idx).await;

        let user_prompt = prompts::render_judgement_user(
            &transcript,
            question,
            response,
            follow_up_count,
            self.script.follow_up_cap,
            self.script.remaining_after(question_idx),
            &similar[..similar.len().min(SIMILARITY_PROMPT_LIMIT)],
        );

        let raw_verdict = match self
            .judgement
            .judge(prompts::JUDGEMENT_SYSTEM, &user_prompt)
            .await
        {
            Ok(raw) => judgement::parse_verdict(&raw).unwrap_or_else(|e| {
                warn!(session_id = %sid, question_idx, "Judgement reply unusable, falling back: {e:#}");
                Verdict::fallback(response, format!("judgement reply unusable: {e}"))
            }),
            Err(e) => {
                warn!(session_id = %sid, question_idx, "Judgement call failed, falling back: {e:#}");
                Verdict::fallback(response, format!("judgement call failed: {e}"))
            }
        };

        // Recent same-question texts are read before this answer is appended,
        // so the repetition checks only see prior turns.
        let (recent_user, recent_ai) = match self.store.get(sid).await {
            Some(session) => {
                let session = session.lock().await;
                (
                    session.recent_texts(question_idx, Role::User, RECENT_TEXT_LIMIT),
                    session.recent_texts(question_idx, Role::Ai, RECENT_TEXT_LIMIT),
                )
            }
            None => (Vec::new(), Vec::new()),
        };

        let corrected = guard::apply(
            &raw_verdict,
            &GuardContext {
                script: &self.script,
                question_idx,
                follow_up_count,
                response,
                recent_user_texts: &recent_user,
                recent_ai_texts: &recent_ai,
                transcript: &transcript,
            },
        );

        info!(
            session_id = %sid,
            question_idx,
            raw_status = %raw_verdict.status,
            status = %corrected.status,
            covered_ahead = ?corrected.covered_future_indices,
            "Answer analyzed"
        );

        self.record_answer(sid, question_idx, response, Some(corrected.clone()))
            .await;

        if let Some(session) = self.store.get(sid).await {
            let mut session = session.lock().await;
            for &idx in &corrected.covered_future_indices {
                session.covered_ahead.insert(idx);
                session.covered_evidence.entry(idx).or_insert_with(|| {
                    if corrected.summary.trim().is_empty() {
                        response.to_string()
                    } else {
                        corrected.summary.clone()
                    }
                });
            }
            if corrected.status == VerdictStatus::NeedsFollowUp && !corrected.follow_up.is_empty()
            {
                session.set_pending_follow_up(question_idx, &corrected.follow_up);
                session.push_dialogue(question_idx, Role::Ai, &corrected.follow_up);
            } else {
                session.completed_qs.insert(question_idx);
                session.clear_pending_follow_up(Some(question_idx));
            }
        }

        corrected
    }

    /// Submits one answer: analysis plus the caller-facing extras (transition
    /// text toward the next open question, structured extraction once the
    /// question is finished).
    pub async fn submit_answer(
        &self,
        sid: &str,
        question_idx: usize,
        response: &str,
        follow_up_count: u32,
    ) -> SubmissionOutcome {
        let verdict = self
            .analyze_response(sid, question_idx, response, follow_up_count)
            .await;
        let done = verdict.status.is_terminal();

        let (transition_text, structured) = if done {
            let transition = match self.next_open_question(sid, question_idx).await {
                Some(question) => format!("Thanks for sharing. Next question: {question}"),
                None => "That's everything I had. Thank you for checking in!".to_string(),
            };
            let question = self.script.question(question_idx).unwrap_or_default();
            // Extraction runs over the whole exchange for this question (the
            // main answer plus every follow-up reply), not just the latest
            // fragment.
            let full_response = match self.store.get(sid).await {
                Some(session) => session.lock().await.combined_user_response(question_idx),
                None => response.to_string(),
            };
            (
                transition,
                self.extract_structured(question, &full_response).await,
            )
        } else {
            (String::new(), None)
        };

        SubmissionOutcome {
            status: verdict.status,
            reason: verdict.reason,
            follow_up: verdict.follow_up,
            transition_text,
            summary: verdict.summary,
            covered_future_indices: verdict.covered_future_indices,
            done,
            structured,
        }
    }

    /// Structured-data extraction over a finished answer. Opaque LLM call;
    /// degrades to `None` on any failure.
    pub async fn extract_structured(&self, question: &str, full_response: &str) -> Option<Value> {
        let user_prompt = prompts::render_extraction_user(question, full_response);
        match self
            .extraction
            .judge(prompts::EXTRACTION_SYSTEM, &user_prompt)
            .await
        {
            Ok(raw) => match serde_json::from_str(judgement::strip_code_fence(&raw)) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Extraction reply was not valid JSON: {e}");
                    None
                }
            },
            Err(e) => {
                warn!("Extraction call failed: {e:#}");
                None
            }
        }
    }

    /// First question after `question_idx` that is neither completed nor
    /// covered ahead.
    async fn next_open_question(&self, sid: &str, question_idx: usize) -> Option<String> {
        let (completed, covered) = match self.store.get(sid).await {
            Some(session) => {
                let session = session.lock().await;
                (session.completed_qs.clone(), session.covered_ahead.clone())
            }
            None => Default::default(),
        };
        ((question_idx + 1)..self.script.len())
            .find(|idx| !completed.contains(idx) && !covered.contains(idx))
            .and_then(|idx| self.script.question(idx))
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judgement::StaticJudgementClient;
    use crate::similarity::NoopIndex;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct FailingJudgementClient;

    #[async_trait]
    impl JudgementClient for FailingJudgementClient {
        async fn judge(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Err(anyhow!("gateway unreachable"))
        }
    }

    /// Replays a fixed sequence of replies and records every user prompt.
    struct ScriptedJudgementClient {
        replies: std::sync::Mutex<std::collections::VecDeque<String>>,
        prompts: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedJudgementClient {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl JudgementClient for ScriptedJudgementClient {
        async fn judge(&self, _system: &str, user: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| DONE_REPLY.to_string());
            Ok(reply)
        }
    }

    fn engine_with_reply(reply: &str) -> InterviewEngine {
        InterviewEngine::new(
            InterviewScript::default(),
            Arc::new(StaticJudgementClient {
                reply: reply.to_string(),
            }),
            Arc::new(NoopIndex),
        )
    }

    const DONE_REPLY: &str = r#"{"status": "done", "reason": "specific", "follow_up": "", "covered_future_indices": [], "summary": "Adopted the weekly template."}"#;

    const NEEDS_FOLLOW_UP_REPLY: &str = r#"{"status": "needs_follow_up", "reason": "vague", "follow_up": "What changed in your weekly routine?", "covered_future_indices": [], "summary": "Tried something new."}"#;

    #[tokio::test]
    async fn done_submission_completes_the_question() {
        let engine = engine_with_reply(DONE_REPLY);
        let sid = engine.create_session().await;

        let outcome = engine
            .submit_answer(&sid, 0, "I moved our reports to the shared template", 0)
            .await;

        assert_eq!(outcome.status, VerdictStatus::Done);
        assert!(outcome.done);
        assert!(outcome.follow_up.is_empty());
        assert!(outcome.transition_text.contains("What happened?"));
        assert_eq!(engine.completed_questions(&sid).await, vec![0]);
        assert!(engine.pending_follow_up(&sid).await.is_none());
    }

    #[tokio::test]
    async fn needs_follow_up_sets_the_pending_record() {
        let engine = engine_with_reply(NEEDS_FOLLOW_UP_REPLY);
        let sid = engine.create_session().await;

        let outcome = engine.submit_answer(&sid, 0, "I tried some stuff", 0).await;

        assert_eq!(outcome.status, VerdictStatus::NeedsFollowUp);
        assert!(!outcome.done);
        assert!(outcome.transition_text.is_empty());
        assert!(outcome.structured.is_none());

        let pending = engine.pending_follow_up(&sid).await.expect("pending record");
        assert_eq!(pending.question_idx, 0);
        assert_eq!(pending.text, "What changed in your weekly routine?");

        // The follow-up prompt itself lands in the transcript.
        let context = engine.render_context(&sid).await;
        assert!(context.contains("AI: What changed in your weekly routine?"));
    }

    #[tokio::test]
    async fn gateway_failure_falls_back_and_still_records_the_turn() {
        let engine = InterviewEngine::new(
            InterviewScript::default(),
            Arc::new(FailingJudgementClient),
            Arc::new(NoopIndex),
        );
        let sid = engine.create_session().await;

        let verdict = engine
            .analyze_response(&sid, 0, "I paired with the data team on Tuesday", 0)
            .await;

        assert_eq!(verdict.status, VerdictStatus::Done);
        assert!(!verdict.reason.is_empty());
        assert!(verdict.summary.starts_with("I paired with the data team"));

        let context = engine.render_context(&sid).await;
        assert!(context.contains("I paired with the data team on Tuesday"));
    }

    #[tokio::test]
    async fn unparsable_gateway_reply_falls_back() {
        let engine = engine_with_reply("Sounds good to me!");
        let sid = engine.create_session().await;

        let verdict = engine.analyze_response(&sid, 0, "Short answer", 0).await;

        assert_eq!(verdict.status, VerdictStatus::Done);
        assert!(verdict.reason.contains("unusable"));
    }

    #[tokio::test]
    async fn repeated_answer_is_cut_off_end_to_end() {
        let engine = engine_with_reply(NEEDS_FOLLOW_UP_REPLY);
        let sid = engine.create_session().await;

        let first = engine
            .submit_answer(
                &sid,
                0,
                "I tried using the new template for my weekly report",
                0,
            )
            .await;
        assert_eq!(first.status, VerdictStatus::NeedsFollowUp);

        let second = engine
            .submit_answer(&sid, 0, "I tried using the new template for my report", 1)
            .await;
        assert_eq!(second.status, VerdictStatus::Done);
        assert!(second.follow_up.is_empty());
        assert!(engine.pending_follow_up(&sid).await.is_none());
    }

    #[tokio::test]
    async fn barrier_question_cap_holds_end_to_end() {
        let engine = engine_with_reply(NEEDS_FOLLOW_UP_REPLY);
        let sid = engine.create_session().await;
        let last = engine.script().last_index();

        let outcome = engine
            .submit_answer(&sid, last, "Scheduling conflicts kept derailing the rollout", 1)
            .await;
        assert_eq!(outcome.status, VerdictStatus::Done);
        assert!(outcome.done);
    }

    #[tokio::test]
    async fn lookahead_keywords_mark_future_coverage_with_evidence() {
        let engine = engine_with_reply(DONE_REPLY);
        let sid = engine.create_session().await;

        let outcome = engine
            .submit_answer(
                &sid,
                0,
                "I automated the export and it saved us about an hour a week",
                0,
            )
            .await;
        assert!(outcome.covered_future_indices.contains(&1));

        let coverage = engine.question_coverage(&sid, 1).await;
        assert!(coverage.covered);
        assert_eq!(coverage.evidence, "Adopted the weekly template.");
    }

    #[tokio::test]
    async fn coverage_query_is_deterministic_between_turns() {
        let engine = engine_with_reply(DONE_REPLY);
        let sid = engine.create_session().await;
        engine
            .submit_answer(&sid, 0, "It saved the team a full day of rework", 0)
            .await;

        let first = engine.question_coverage(&sid, 1).await;
        let second = engine.question_coverage(&sid, 1).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn transition_skips_covered_ahead_questions() {
        let engine = engine_with_reply(DONE_REPLY);
        let sid = engine.create_session().await;

        // "saved" covers question 1, so the transition should point at 2.
        let outcome = engine
            .submit_answer(&sid, 0, "The new flow saved everyone time", 0)
            .await;
        assert!(outcome.transition_text.contains("What got in the way?"));
    }

    #[tokio::test]
    async fn unknown_session_fails_soft_everywhere() {
        let engine = engine_with_reply(DONE_REPLY);

        let coverage = engine.question_coverage("missing", 1).await;
        assert!(!coverage.covered);
        assert!(coverage.evidence.is_empty());

        assert_eq!(
            engine.render_context("missing").await,
            "(no prior conversation)"
        );

        // Submission against a stale id still returns a verdict.
        let outcome = engine.submit_answer("missing", 0, "hello there", 0).await;
        assert_eq!(outcome.status, VerdictStatus::Done);
    }

    #[tokio::test]
    async fn terminal_reply_closes_the_question() {
        let engine = engine_with_reply(NEEDS_FOLLOW_UP_REPLY);
        let sid = engine.create_session().await;

        let outcome = engine.submit_answer(&sid, 1, "Nothing.", 0).await;
        assert_eq!(outcome.status, VerdictStatus::Done);
        assert!(outcome.done);
    }

    #[tokio::test]
    async fn voice_dialogue_feeds_the_transcript_and_recents() {
        let engine = engine_with_reply(DONE_REPLY);
        let sid = engine.create_session().await;

        engine
            .record_dialogue(&sid, 0, Role::Ai, "What did you try?")
            .await;
        engine
            .record_dialogue(&sid, 0, Role::User, "I ran the retro with the new board")
            .await;
        engine.record_dialogue(&sid, 0, Role::User, "   ").await;

        let context = engine.render_context(&sid).await;
        assert!(context.contains("[Question 1] AI: What did you try?"));
        assert!(context.contains("Participant: I ran the retro with the new board"));
        assert!(!context.contains("   \n"));
    }

    #[tokio::test]
    async fn extraction_covers_the_whole_exchange_not_just_the_last_fragment() {
        let client = Arc::new(ScriptedJudgementClient::new(&[
            NEEDS_FOLLOW_UP_REPLY,
            DONE_REPLY,
            r#"{"tried": "intake form"}"#,
        ]));
        let engine = InterviewEngine::new(
            InterviewScript::default(),
            client.clone(),
            Arc::new(NoopIndex),
        );
        let sid = engine.create_session().await;

        engine
            .submit_answer(&sid, 0, "I reorganized our intake process", 0)
            .await;
        let outcome = engine
            .submit_answer(&sid, 0, "Specifically the customer intake form", 1)
            .await;
        assert!(outcome.done);

        let prompts = client.prompts.lock().unwrap();
        let extraction_prompt = prompts.last().expect("extraction prompt");
        assert!(extraction_prompt.contains("I reorganized our intake process"));
        assert!(extraction_prompt.contains("Specifically the customer intake form"));
    }

    #[tokio::test]
    async fn extraction_runs_through_its_own_client() {
        let extraction_client = Arc::new(StaticJudgementClient {
            reply: r#"{"tried": "intake form", "specificity_level": "high"}"#.to_string(),
        });
        let engine = InterviewEngine::new(
            InterviewScript::default(),
            Arc::new(StaticJudgementClient {
                reply: DONE_REPLY.to_string(),
            }),
            Arc::new(NoopIndex),
        )
        .with_extraction_client(extraction_client);
        let sid = engine.create_session().await;

        let outcome = engine
            .submit_answer(&sid, 0, "I rebuilt the customer intake form", 0)
            .await;
        let structured = outcome.structured.expect("structured value");
        assert_eq!(structured["tried"], "intake form");
    }

    #[tokio::test]
    async fn extraction_parses_json_and_degrades_on_prose() {
        let engine =
            engine_with_reply(r#"{"tried": "new template", "specificity_level": "high"}"#);
        let value = engine
            .extract_structured("What did you try?", "I used the new template")
            .await
            .expect("structured value");
        assert_eq!(value["tried"], "new template");

        let prose_engine = engine_with_reply("cannot help with that");
        assert!(
            prose_engine
                .extract_structured("What did you try?", "answer")
                .await
                .is_none()
        );
    }
}
