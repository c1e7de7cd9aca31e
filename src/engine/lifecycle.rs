//! Challenge lifecycle engine.
//!
//! Drives a single user through not-started → active → answering →
//! completed, enforcing one active challenge at a time and emitting the
//! ledger entries (start = 1pt, completion = 3pt).

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::catalog::{self, ChallengeKind};
use crate::engine::reminder::ReminderScheduler;
use crate::engine::session::{ChallengeSession, SessionMap, SubmitOutcome};
use crate::error::{LifecycleError, Result};
use crate::store::{EntryKind, LedgerEntry, Repository, User};

/// Points for a challenge start entry.
pub const START_POINTS: i64 = 1;
/// Points for a challenge completion entry.
pub const COMPLETE_POINTS: i64 = 3;

/// The per-user challenge lifecycle state machine.
pub struct LifecycleEngine {
    repo: Arc<dyn Repository>,
    sessions: SessionMap,
    reminders: ReminderScheduler,
}

impl LifecycleEngine {
    pub fn new(repo: Arc<dyn Repository>, reminders: ReminderScheduler) -> Self {
        Self {
            repo,
            sessions: SessionMap::new(),
            reminders,
        }
    }

    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Catalog kinds the user has not yet completed, in catalog order.
    /// Side-effect-free.
    pub fn list_remaining(&self, user: &User) -> Vec<ChallengeKind> {
        ChallengeKind::all()
            .iter()
            .copied()
            .filter(|kind| !user.completed_challenges.contains(kind))
            .collect()
    }

    /// Start a challenge for a user.
    ///
    /// Appends the 1-point start entry, marks the challenge active, and
    /// schedules the deferred completion reminder. The ledger append comes
    /// before the user-record save, so a crash between the two leaves an
    /// orphan start entry (known consistency gap).
    pub async fn start(&self, user_id: &str, kind: ChallengeKind) -> Result<()> {
        let mut user = self.repo.get_user(user_id).await?;

        if let Some(active) = user.active_challenge {
            return Err(LifecycleError::ChallengeActive {
                user_id: user_id.to_string(),
                active: active.to_string(),
            }
            .into());
        }
        if user.completed_challenges.contains(&kind) {
            return Err(LifecycleError::AlreadyCompleted {
                user_id: user_id.to_string(),
                kind: kind.to_string(),
            }
            .into());
        }

        let started_at = Utc::now();
        self.repo
            .append_entry(&LedgerEntry::new(
                user_id,
                START_POINTS,
                EntryKind::Challenge(kind),
                started_at,
            ))
            .await?;

        user.active_challenge = Some(kind);
        self.repo.save_user(&user).await?;

        self.reminders.schedule(user_id, kind, started_at).await;

        info!(user_id, challenge = %kind, "Challenge started (+{START_POINTS}pt)");
        Ok(())
    }

    /// Open the Q&A session for the user's active challenge and return the
    /// first question.
    pub async fn begin_answering(&self, user_id: &str) -> Result<&'static str> {
        let user = self.repo.get_user(user_id).await?;

        let Some(kind) = user.active_challenge else {
            return Err(LifecycleError::NoActiveChallenge {
                user_id: user_id.to_string(),
            }
            .into());
        };

        let session = ChallengeSession::new(kind);
        let first_prompt = session
            .current_prompt()
            .unwrap_or("(no questions defined)");
        self.sessions.insert(user_id, session).await;
        Ok(first_prompt)
    }

    /// Feed free text into the user's session.
    pub async fn submit(&self, user_id: &str, text: &str) -> SubmitOutcome {
        self.sessions.submit(user_id, text).await
    }

    /// Whether the user currently has a Q&A session open.
    pub async fn has_session(&self, user_id: &str) -> bool {
        self.sessions.get(user_id).await.is_some()
    }

    /// Abandon the user's in-flight session. The active challenge (and its
    /// pending reminder) stays set; the user may `/done` again later.
    pub async fn abandon(&self, user_id: &str) {
        self.sessions.remove(user_id).await;
    }

    /// Record a completed challenge.
    ///
    /// Preconditioned on the session having answered every question.
    /// Appends the 3-point entry (with the reflection answers as its note),
    /// moves the kind to the completed set, clears the active challenge,
    /// cancels the pending reminder, and returns the remaining kinds for
    /// re-display.
    pub async fn complete(
        &self,
        user_id: &str,
        session: &ChallengeSession,
    ) -> Result<Vec<ChallengeKind>> {
        let expected = catalog::question_count(session.challenge);
        if session.index != expected {
            return Err(LifecycleError::IncompleteSession {
                user_id: user_id.to_string(),
                answered: session.index,
                expected,
            }
            .into());
        }

        let mut user = self.repo.get_user(user_id).await?;

        self.repo
            .append_entry(
                &LedgerEntry::new(
                    user_id,
                    COMPLETE_POINTS,
                    EntryKind::Challenge(session.challenge),
                    Utc::now(),
                )
                .with_note(session.answers.join(" / ")),
            )
            .await?;

        user.completed_challenges.insert(session.challenge);
        user.active_challenge = None;
        self.repo.save_user(&user).await?;

        self.reminders.cancel(user_id).await;
        self.sessions.remove(user_id).await;

        info!(
            user_id,
            challenge = %session.challenge,
            "Challenge completed (+{COMPLETE_POINTS}pt)"
        );
        Ok(self.list_remaining(&user))
    }
}
