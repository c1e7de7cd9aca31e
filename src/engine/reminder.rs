//! Deferred one-shot completion reminders.
//!
//! Starting a challenge schedules a single reminder that fires after a
//! fixed delay and re-prompts the user. Tasks are tracked per user and
//! keyed by start timestamp; completing or abandoning the challenge
//! cancels the pending task (an intentional improvement over the original
//! fire-and-forget behavior).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::catalog::{self, ChallengeKind};
use crate::channels::Messenger;

/// Key for a scheduled reminder: user plus challenge start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReminderKey {
    user_id: String,
    started_at: DateTime<Utc>,
}

/// Schedules and cancels the post-start completion reminders.
pub struct ReminderScheduler {
    messenger: Arc<dyn Messenger>,
    delay: Duration,
    tasks: Mutex<HashMap<ReminderKey, JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(messenger: Arc<dyn Messenger>, delay: Duration) -> Self {
        Self {
            messenger,
            delay,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule the one-shot reminder for a freshly started challenge.
    ///
    /// There is no ordering guarantee relative to concurrent user actions:
    /// without a matching `cancel`, the reminder fires even if the user has
    /// already completed or abandoned the challenge.
    pub async fn schedule(&self, user_id: &str, kind: ChallengeKind, started_at: DateTime<Utc>) {
        let key = ReminderKey {
            user_id: user_id.to_string(),
            started_at,
        };
        let messenger = Arc::clone(&self.messenger);
        let delay = self.delay;
        let task_user = user_id.to_string();
        let title = catalog::get(kind).title;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let text = format!("⏰ {title} — done yet?\n\nReply /done to answer the questions.");
            if let Err(e) = messenger.send_text(&task_user, &text).await {
                tracing::warn!(user_id = %task_user, "Failed to deliver reminder: {e}");
            }
        });

        let mut tasks = self.tasks.lock().await;
        // A user has at most one active challenge, so at most one live
        // reminder; drop any stale handle for the same user.
        tasks.retain(|k, h| {
            if k.user_id == user_id {
                h.abort();
                false
            } else {
                true
            }
        });
        tasks.insert(key, handle);
    }

    /// Cancel any pending reminder for a user.
    pub async fn cancel(&self, user_id: &str) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|k, h| {
            if k.user_id == user_id {
                h.abort();
                false
            } else {
                true
            }
        });
    }

    /// Number of pending reminders (used by tests).
    pub async fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, h| !h.is_finished());
        tasks.len()
    }
}
