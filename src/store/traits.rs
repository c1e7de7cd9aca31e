//! `Repository` trait — single async interface for user progress and the
//! points ledger.
//!
//! The bot core consumes persistence only through this trait; the backing
//! store's delivery and durability guarantees are its own concern.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::ChallengeKind;
use crate::error::DatabaseError;

/// Durable per-user progress record.
///
/// Created lazily with empty state on first interaction, never deleted.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub completed_challenges: HashSet<ChallengeKind>,
    pub active_challenge: Option<ChallengeKind>,
    /// True only on the record returned by the `get_user` call that
    /// created it. Drives the one-time welcome message.
    pub is_new: bool,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            completed_challenges: HashSet::new(),
            active_challenge: None,
            is_new: true,
        }
    }
}

/// What a ledger entry was earned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Challenge(ChallengeKind),
    Bonus,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Challenge(kind) => kind.as_str(),
            Self::Bonus => "bonus",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s == "bonus" {
            Some(Self::Bonus)
        } else {
            ChallengeKind::parse(s).map(Self::Challenge)
        }
    }
}

/// An immutable record of points earned for a single event.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    pub points: i64,
    pub kind: EntryKind,
    /// Free-text attached to the entry — the joined reflection answers on
    /// completion entries, absent elsewhere.
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: impl Into<String>,
        points: i64,
        kind: EntryKind,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            points,
            kind,
            note: None,
            occurred_at,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Ledger query filter. `None` fields are unconstrained — in particular,
/// the weekly bonus check deliberately leaves `user_id` unset.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub user_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            since: None,
        }
    }

    pub fn since(mut self, ts: DateTime<Utc>) -> Self {
        self.since = Some(ts);
        self
    }
}

/// Backend-agnostic repository covering user progress, the points ledger,
/// and bonus grant tracking.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetch a user, creating a default record if absent.
    /// The created record (and only it) comes back with `is_new == true`.
    async fn get_user(&self, id: &str) -> Result<User, DatabaseError>;

    /// Overwrite a user's durable record.
    async fn save_user(&self, user: &User) -> Result<(), DatabaseError>;

    /// Append a point-earning event. The ledger is append-only.
    async fn append_entry(&self, entry: &LedgerEntry) -> Result<(), DatabaseError>;

    /// Fetch ledger entries matching the filter, oldest first.
    async fn query_entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, DatabaseError>;

    /// Count ledger entries matching the filter.
    async fn count_entries(&self, filter: &LedgerFilter) -> Result<u64, DatabaseError>;

    /// Whether the weekly activity bonus was already granted to this user
    /// for the given ISO week (e.g. `"2026-W35"`).
    async fn bonus_granted(&self, user_id: &str, week: &str) -> Result<bool, DatabaseError>;

    /// Record that the bonus was granted for `(user_id, week)`.
    async fn record_bonus_grant(&self, user_id: &str, week: &str) -> Result<(), DatabaseError>;
}
