//! Bot dispatcher — the single-threaded event loop.
//!
//! Each inbound event (command, selection, free text) is handled to
//! completion before the next is dispatched. Lifecycle violations are
//! translated into advisory messages for the user; repository failures
//! fail the current event with a generic message and leave in-memory
//! session state untouched so the user may retry.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, warn};

use crate::catalog::{self, ChallengeKind};
use crate::channels::{
    ChannelManager, ChoiceOption, CommandKind, Event, EventPayload, Messenger,
};
use crate::engine::{LifecycleEngine, SubmitOutcome, SummaryBuilder};
use crate::error::{Error, LifecycleError, Result};

const GENERIC_FAILURE: &str = "😕 Something went wrong on my end. Please try that again.";

/// The bot: engine + summary + channels, driven by the event stream.
pub struct Bot {
    engine: LifecycleEngine,
    summary: SummaryBuilder,
    channels: Arc<ChannelManager>,
}

impl Bot {
    pub fn new(
        engine: LifecycleEngine,
        summary: SummaryBuilder,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            engine,
            summary,
            channels,
        }
    }

    /// Start all channels and consume events until the streams close.
    pub async fn run(&self) -> Result<()> {
        let mut events = self.channels.start_all().await?;

        while let Some(event) = events.next().await {
            self.channels
                .record_route(&event.user_id, &event.channel)
                .await;

            if let Err(e) = self.handle_event(&event).await {
                error!(user_id = %event.user_id, "Event handling failed: {e}");
                let _ = self
                    .channels
                    .send_text(&event.user_id, GENERIC_FAILURE)
                    .await;
            }
        }

        self.channels.shutdown_all().await;
        Ok(())
    }

    /// Dispatch one event. Public for integration tests.
    pub async fn handle_event(&self, event: &Event) -> Result<()> {
        match &event.payload {
            EventPayload::Command(CommandKind::Start) => self.on_start(&event.user_id).await,
            EventPayload::Command(CommandKind::Done) => self.on_done(&event.user_id).await,
            EventPayload::Command(CommandKind::DailySuccess) => {
                self.on_daily_success(&event.user_id).await
            }
            EventPayload::Selection { token } => self.on_selection(&event.user_id, token).await,
            EventPayload::Text { text } => self.on_text(&event.user_id, text).await,
        }
    }

    // ── Command handlers ────────────────────────────────────────────

    async fn on_start(&self, user_id: &str) -> Result<()> {
        let user = self.engine.repo().get_user(user_id).await?;

        if user.is_new {
            self.channels
                .send_text(
                    user_id,
                    "🌟 Glad you're here! Let's start your progress journey together.",
                )
                .await?;
            self.channels
                .send_text(
                    user_id,
                    &format!("💌 A little motivation for you:\n\n\"{}\"", catalog::random_quote()),
                )
                .await?;
        }

        self.offer_challenges(user_id, &self.engine.list_remaining(&user))
            .await
    }

    async fn on_selection(&self, user_id: &str, token: &str) -> Result<()> {
        let Some(kind) = ChallengeKind::from_token(token) else {
            warn!(user_id, token, "Ignoring unknown selection token");
            return Ok(());
        };

        match self.engine.start(user_id, kind).await {
            Ok(()) => {
                let title = catalog::get(kind).title;
                self.channels
                    .send_text(
                        user_id,
                        &format!(
                            "✅ {title} started! (+1pt)\n\nI'll check back in 30 minutes."
                        ),
                    )
                    .await?;
                Ok(())
            }
            Err(Error::Lifecycle(e)) => self.send_advisory(user_id, &e).await,
            Err(e) => Err(e),
        }
    }

    async fn on_done(&self, user_id: &str) -> Result<()> {
        match self.engine.begin_answering(user_id).await {
            Ok(first_prompt) => {
                self.channels
                    .send_text(user_id, &format!("❔ {first_prompt}"))
                    .await?;
                Ok(())
            }
            Err(Error::Lifecycle(LifecycleError::NoActiveChallenge { .. })) => {
                let user = self.engine.repo().get_user(user_id).await?;
                let remaining = self.engine.list_remaining(&user);
                // Nothing to suggest when everything is done — stay silent,
                // matching the original behavior.
                if remaining.is_empty() {
                    return Ok(());
                }
                let titles: Vec<&str> =
                    remaining.iter().map(|&k| catalog::get(k).title).collect();
                self.channels
                    .send_text(
                        user_id,
                        &format!(
                            "⚠️ No challenge in progress! Pick one of these first:\n{}",
                            titles.join("\n")
                        ),
                    )
                    .await?;
                Ok(())
            }
            Err(Error::Lifecycle(e)) => self.send_advisory(user_id, &e).await,
            Err(e) => Err(e),
        }
    }

    async fn on_text(&self, user_id: &str, text: &str) -> Result<()> {
        match self.engine.submit(user_id, text).await {
            SubmitOutcome::Ignored => Ok(()),
            SubmitOutcome::Advanced { next_prompt } => {
                self.channels
                    .send_text(user_id, &format!("❔ {next_prompt}"))
                    .await?;
                Ok(())
            }
            SubmitOutcome::Completed { session } => {
                let title = catalog::get(session.challenge).title;
                let remaining = self.engine.complete(user_id, &session).await?;
                self.channels
                    .send_text(user_id, &format!("🎉 {title} completed — +3 points!"))
                    .await?;
                self.offer_challenges(user_id, &remaining).await
            }
        }
    }

    async fn on_daily_success(&self, user_id: &str) -> Result<()> {
        let summary = self
            .summary
            .build_daily_summary(user_id, chrono::Utc::now())
            .await?;
        self.channels.send_text(user_id, &summary).await?;
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// Offer the remaining challenges as selectable options.
    async fn offer_challenges(&self, user_id: &str, remaining: &[ChallengeKind]) -> Result<()> {
        if remaining.is_empty() {
            self.channels
                .send_text(
                    user_id,
                    "🎉 All of today's challenges are done! Try /dailysuccess for your summary.",
                )
                .await?;
            return Ok(());
        }

        let options: Vec<ChoiceOption> = remaining
            .iter()
            .map(|&kind| ChoiceOption {
                label: catalog::get(kind).title.to_string(),
                token: kind.token(),
            })
            .collect();

        self.channels
            .send_choice(user_id, "🔻 Challenges you can take on today:", &options)
            .await?;
        Ok(())
    }

    /// Translate a lifecycle violation into a user-facing advisory.
    async fn send_advisory(&self, user_id: &str, err: &LifecycleError) -> Result<()> {
        let text = match err {
            LifecycleError::ChallengeActive { active, .. } => {
                let title = ChallengeKind::parse(active)
                    .map(|k| catalog::get(k).title)
                    .unwrap_or("your current challenge");
                format!("⚠️ {title} is still in progress — finish it with /done first.")
            }
            LifecycleError::AlreadyCompleted { .. } => {
                "⚠️ You already completed that one today. Pick another!".to_string()
            }
            LifecycleError::NoActiveChallenge { .. } => {
                "⚠️ No challenge in progress — use /start to pick one.".to_string()
            }
            LifecycleError::IncompleteSession { .. } => {
                "⚠️ There are still questions left to answer.".to_string()
            }
        };
        self.channels.send_text(user_id, &text).await?;
        Ok(())
    }
}
