//! Daily summary and weekly-activity bonus.
//!
//! The summary reports today's completed challenges and points for one
//! user. The bonus check counts the trailing 7 days of ledger entries
//! across ALL users — a deliberate carry-over of the original product
//! behavior, not a per-user filter.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::info;

use crate::catalog;
use crate::config::BonusMode;
use crate::error::Result;
use crate::store::{EntryKind, LedgerEntry, LedgerFilter, Repository};

/// Points granted by the weekly activity bonus.
pub const BONUS_POINTS: i64 = 5;

/// Builds the `/dailysuccess` report and grants the activity bonus.
pub struct SummaryBuilder {
    repo: Arc<dyn Repository>,
    bonus_mode: BonusMode,
    weekly_threshold: u64,
}

impl SummaryBuilder {
    pub fn new(repo: Arc<dyn Repository>, bonus_mode: BonusMode, weekly_threshold: u64) -> Self {
        Self {
            repo,
            bonus_mode,
            weekly_threshold,
        }
    }

    /// Compose the user's daily summary, granting the weekly bonus when
    /// the trailing-week activity qualifies.
    ///
    /// In `BonusMode::Legacy` this is not idempotent: every qualifying
    /// invocation appends another bonus entry. `BonusMode::Corrected`
    /// grants at most once per (user, ISO week).
    pub async fn build_daily_summary(&self, user_id: &str, now: DateTime<Utc>) -> Result<String> {
        let today = self
            .repo
            .query_entries(
                &LedgerFilter::for_user(user_id).since(start_of_day(now)),
            )
            .await?;

        let mut summary = String::from("📅 Today's wins:\n\n");

        // One line per challenge kind, first-seen order, latest note wins.
        let mut seen: Vec<crate::catalog::ChallengeKind> = Vec::new();
        for entry in &today {
            if let EntryKind::Challenge(kind) = entry.kind {
                if !seen.contains(&kind) {
                    seen.push(kind);
                }
            }
        }
        for kind in seen {
            let note = today
                .iter()
                .rev()
                .find_map(|e| match e.kind {
                    EntryKind::Challenge(k) if k == kind => e.note.as_deref(),
                    _ => None,
                })
                .unwrap_or("N/A");
            summary.push_str(&format!("✅ {}\n   - Answer: {}\n\n", catalog::get(kind).title, note));
        }

        let total: i64 = today.iter().map(|e| e.points).sum();
        summary.push_str(&format!("💰 Total points: {total}"));

        if self.grant_weekly_bonus(user_id, now).await? {
            summary.push_str(&format!(
                "\n\n🎁 Active bonus +{BONUS_POINTS} points (for showing up all week)"
            ));
        }

        Ok(summary)
    }

    /// Evaluate the weekly activity bonus; returns true when granted.
    ///
    /// The eligibility count is global (unfiltered by user). See module docs.
    async fn grant_weekly_bonus(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let week_ago = now - Duration::days(7);
        let count = self
            .repo
            .count_entries(&LedgerFilter::default().since(week_ago))
            .await?;

        if count < self.weekly_threshold {
            return Ok(false);
        }

        let week = iso_week(now);
        if self.bonus_mode == BonusMode::Corrected
            && self.repo.bonus_granted(user_id, &week).await?
        {
            return Ok(false);
        }

        self.repo
            .append_entry(&LedgerEntry::new(user_id, BONUS_POINTS, EntryKind::Bonus, now))
            .await?;
        if self.bonus_mode == BonusMode::Corrected {
            self.repo.record_bonus_grant(user_id, &week).await?;
        }

        info!(user_id, week = %week, "Weekly activity bonus granted (+{BONUS_POINTS}pt)");
        Ok(true)
    }
}

/// UTC midnight of the given instant's day.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|ndt| ndt.and_utc())
        .unwrap_or(now)
}

/// ISO week identifier, e.g. `2026-W35`.
pub fn iso_week(now: DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}
