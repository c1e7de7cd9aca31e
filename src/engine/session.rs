//! Session answer collector — transient per-user Q&A state.
//!
//! A session walks a user through its challenge's reflection questions one
//! at a time: `AwaitingAnswer(i)` advances to `AwaitingAnswer(i+1)` per
//! accepted answer, and the final answer transitions out of the session.
//! Sessions live only in process memory; a restart loses them by design.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::catalog::{self, ChallengeKind};

/// Transient progress through a challenge's question sequence.
#[derive(Debug, Clone)]
pub struct ChallengeSession {
    pub challenge: ChallengeKind,
    /// Index of the question currently awaiting an answer.
    /// Strictly advances by 1 per accepted answer; never exceeds the
    /// question count.
    pub index: usize,
    /// Answers collected so far, stored verbatim. The system measures
    /// engagement, not answer correctness.
    pub answers: Vec<String>,
}

impl ChallengeSession {
    pub fn new(challenge: ChallengeKind) -> Self {
        Self {
            challenge,
            index: 0,
            answers: Vec::new(),
        }
    }

    /// The prompt currently awaiting an answer, if any remain.
    pub fn current_prompt(&self) -> Option<&'static str> {
        catalog::get(self.challenge).questions.get(self.index).copied()
    }

    /// Whether every question has been answered.
    pub fn is_complete(&self) -> bool {
        self.index == catalog::question_count(self.challenge)
    }
}

/// Result of submitting free text to a session.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Input was rejected (empty, command-sigil, or no session) — not an
    /// error, just nothing to do.
    Ignored,
    /// Answer accepted; deliver the next prompt.
    Advanced { next_prompt: &'static str },
    /// All questions answered. The session has been removed from the map;
    /// the caller must now invoke `complete` on the lifecycle engine.
    Completed { session: ChallengeSession },
}

/// Keyed store of in-flight sessions, one per user.
///
/// Inserted on `begin_answering`, removed on completion or abandonment.
/// The dispatch model guarantees at most one in-flight event per user, so
/// the lock is held only for short map operations.
pub struct SessionMap {
    sessions: RwLock<HashMap<String, ChallengeSession>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a fresh session for a user, replacing any existing one.
    pub async fn insert(&self, user_id: &str, session: ChallengeSession) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(user_id.to_string(), session);
    }

    pub async fn get(&self, user_id: &str) -> Option<ChallengeSession> {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).cloned()
    }

    /// Drop a user's session (abandonment).
    pub async fn remove(&self, user_id: &str) -> Option<ChallengeSession> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(user_id)
    }

    /// Feed free text into a user's session.
    pub async fn submit(&self, user_id: &str, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() || text.starts_with('/') {
            return SubmitOutcome::Ignored;
        }

        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(user_id) else {
            return SubmitOutcome::Ignored;
        };

        session.answers.push(text.to_string());
        session.index += 1;

        if session.is_complete() {
            let session = sessions.remove(user_id).unwrap_or_else(|| {
                // get_mut succeeded above, so the key is present
                unreachable!("session vanished during submit")
            });
            SubmitOutcome::Completed { session }
        } else {
            let next_prompt = session
                .current_prompt()
                .unwrap_or("(no further questions)");
            SubmitOutcome::Advanced { next_prompt }
        }
    }
}

impl Default for SessionMap {
    fn default() -> Self {
        Self::new()
    }
}
