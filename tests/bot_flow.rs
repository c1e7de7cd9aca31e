//! End-to-end command flow tests against an in-memory database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use habit_coach::bot::Bot;
use habit_coach::catalog::ChallengeKind;
use habit_coach::channels::{
    Channel, ChannelManager, ChoiceOption, CommandKind, Event, EventPayload, EventStream,
};
use habit_coach::config::BonusMode;
use habit_coach::engine::{LifecycleEngine, ReminderScheduler, SummaryBuilder};
use habit_coach::error::ChannelError;
use habit_coach::store::{EntryKind, LedgerEntry, LedgerFilter, LibSqlBackend, Repository};

/// What the bot sent out, in order.
#[derive(Debug, Clone)]
enum Sent {
    Text(String),
    Choice { text: String, tokens: Vec<String> },
}

/// Test channel that records every outbound message.
#[derive(Default)]
struct RecordingChannel {
    sent: Arc<Mutex<Vec<Sent>>>,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "test"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send_text(&self, _user_id: &str, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().await.push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_choice(
        &self,
        _user_id: &str,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError> {
        self.sent.lock().await.push(Sent::Choice {
            text: text.to_string(),
            tokens: options.iter().map(|o| o.token.clone()).collect(),
        });
        Ok(())
    }
}

struct Fixture {
    bot: Bot,
    repo: Arc<dyn Repository>,
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl Fixture {
    async fn new(bonus_mode: BonusMode) -> Self {
        let repo: Arc<dyn Repository> = Arc::new(LibSqlBackend::new_memory().await.unwrap());

        let channel = RecordingChannel::default();
        let sent = Arc::clone(&channel.sent);
        let mut channels = ChannelManager::new();
        channels.add(Arc::new(channel));
        let channels = Arc::new(channels);
        channels.record_route("u1", "test").await;
        channels.record_route("u2", "test").await;

        let reminders = ReminderScheduler::new(
            Arc::clone(&channels) as Arc<dyn habit_coach::channels::Messenger>,
            Duration::from_secs(1800),
        );
        let engine = LifecycleEngine::new(Arc::clone(&repo), reminders);
        let summary = SummaryBuilder::new(Arc::clone(&repo), bonus_mode, 5);
        let bot = Bot::new(engine, summary, channels);

        Self { bot, repo, sent }
    }

    async fn command(&self, user_id: &str, cmd: CommandKind) {
        self.bot
            .handle_event(&Event::new("test", user_id, EventPayload::Command(cmd)))
            .await
            .unwrap();
    }

    async fn select(&self, user_id: &str, token: &str) {
        self.bot
            .handle_event(&Event::new(
                "test",
                user_id,
                EventPayload::Selection {
                    token: token.to_string(),
                },
            ))
            .await
            .unwrap();
    }

    async fn text(&self, user_id: &str, text: &str) {
        self.bot
            .handle_event(&Event::new(
                "test",
                user_id,
                EventPayload::Text {
                    text: text.to_string(),
                },
            ))
            .await
            .unwrap();
    }

    async fn drain(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().await)
    }

    async fn user_entries(&self, user_id: &str) -> Vec<LedgerEntry> {
        self.repo
            .query_entries(&LedgerFilter::for_user(user_id))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn fresh_user_start_gets_welcome_and_all_choices() {
    let fx = Fixture::new(BonusMode::Corrected).await;

    fx.command("u1", CommandKind::Start).await;
    let sent = fx.drain().await;

    assert_eq!(sent.len(), 3, "welcome + motivation + choices: {sent:?}");
    assert!(matches!(&sent[0], Sent::Text(t) if t.contains("Glad you're here")));
    assert!(matches!(&sent[1], Sent::Text(t) if t.contains("motivation")));
    match &sent[2] {
        Sent::Choice { tokens, .. } => {
            assert_eq!(tokens, &["start_reading", "start_exercise", "start_video"]);
        }
        other => panic!("expected a choice, got {other:?}"),
    }

    // Second /start skips the welcome
    fx.command("u1", CommandKind::Start).await;
    let sent = fx.drain().await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], Sent::Choice { .. }));
}

#[tokio::test]
async fn reading_round_trip() {
    let fx = Fixture::new(BonusMode::Corrected).await;
    fx.command("u1", CommandKind::Start).await;
    fx.drain().await;

    // Select reading: +1pt entry and a confirmation
    fx.select("u1", "start_reading").await;
    let sent = fx.drain().await;
    assert!(matches!(&sent[0], Sent::Text(t) if t.contains("started! (+1pt)")));

    let entries = fx.user_entries("u1").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].points, 1);
    assert_eq!(
        entries[0].kind,
        EntryKind::Challenge(ChallengeKind::Reading)
    );

    // /done opens the question flow
    fx.command("u1", CommandKind::Done).await;
    let sent = fx.drain().await;
    assert!(matches!(&sent[0], Sent::Text(t) if t.contains("What did you read?")));

    // Three answers complete the challenge
    fx.text("u1", "a sci-fi novel").await;
    fx.text("u1", "new ideas").await;
    fx.text("u1", "definitely").await;
    let sent = fx.drain().await;

    // Two next-prompts, a congratulation, then the trimmed choice list
    assert_eq!(sent.len(), 4, "{sent:?}");
    assert!(matches!(&sent[2], Sent::Text(t) if t.contains("+3 points")));
    match &sent[3] {
        Sent::Choice { tokens, .. } => {
            assert_eq!(tokens, &["start_exercise", "start_video"]);
        }
        other => panic!("expected trimmed choices, got {other:?}"),
    }

    // Ledger: exactly one 1pt and one 3pt entry tagged reading
    let entries = fx.user_entries("u1").await;
    let points: Vec<i64> = entries.iter().map(|e| e.points).collect();
    assert_eq!(points, vec![1, 3]);
    assert!(entries
        .iter()
        .all(|e| e.kind == EntryKind::Challenge(ChallengeKind::Reading)));
    assert_eq!(
        entries[1].note.as_deref(),
        Some("a sci-fi novel / new ideas / definitely")
    );

    // User record: completed, nothing active
    let user = fx.repo.get_user("u1").await.unwrap();
    assert!(user.completed_challenges.contains(&ChallengeKind::Reading));
    assert_eq!(user.active_challenge, None);
}

#[tokio::test]
async fn double_start_gets_advisory_not_crash() {
    let fx = Fixture::new(BonusMode::Corrected).await;
    fx.select("u1", "start_reading").await;
    fx.drain().await;

    fx.select("u1", "start_exercise").await;
    let sent = fx.drain().await;
    assert!(matches!(&sent[0], Sent::Text(t) if t.contains("still in progress")));

    // No second start entry
    assert_eq!(fx.user_entries("u1").await.len(), 1);
    let user = fx.repo.get_user("u1").await.unwrap();
    assert_eq!(user.active_challenge, Some(ChallengeKind::Reading));
}

#[tokio::test]
async fn done_without_active_challenge_lists_remaining() {
    let fx = Fixture::new(BonusMode::Corrected).await;
    fx.command("u1", CommandKind::Done).await;
    let sent = fx.drain().await;

    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Sent::Text(t) => {
            assert!(t.contains("No challenge in progress"));
            assert!(t.contains("Read for 30 minutes"));
            assert!(t.contains("Exercise for 15 minutes"));
            assert!(t.contains("video recap"));
        }
        other => panic!("expected advisory, got {other:?}"),
    }

    // No state mutation
    assert!(fx.user_entries("u1").await.is_empty());
    let user = fx.repo.get_user("u1").await.unwrap();
    assert!(user.completed_challenges.is_empty());
    assert_eq!(user.active_challenge, None);
}

#[tokio::test]
async fn unknown_selection_token_is_ignored() {
    let fx = Fixture::new(BonusMode::Corrected).await;
    fx.select("u1", "start_juggling").await;
    fx.select("u1", "bogus").await;

    assert!(fx.drain().await.is_empty());
    assert!(fx.user_entries("u1").await.is_empty());
}

#[tokio::test]
async fn stray_text_without_session_is_ignored() {
    let fx = Fixture::new(BonusMode::Corrected).await;
    fx.text("u1", "hello there").await;
    assert!(fx.drain().await.is_empty());

    // Even with an active challenge, answers only count inside a session
    fx.select("u1", "start_video").await;
    fx.drain().await;
    fx.text("u1", "not collected").await;
    assert!(fx.drain().await.is_empty());

    let user = fx.repo.get_user("u1").await.unwrap();
    assert_eq!(user.active_challenge, Some(ChallengeKind::Video));
}

#[tokio::test]
async fn daily_success_grants_bonus_and_legacy_regrants() {
    let fx = Fixture::new(BonusMode::Legacy).await;
    let now = chrono::Utc::now();

    // Seed five entries across users inside the trailing week
    for i in 0..5 {
        fx.repo
            .append_entry(&LedgerEntry::new(
                format!("seed-{i}"),
                1,
                EntryKind::Challenge(ChallengeKind::Exercise),
                now - chrono::Duration::days(i % 6),
            ))
            .await
            .unwrap();
    }

    fx.command("u1", CommandKind::DailySuccess).await;
    let sent = fx.drain().await;
    assert!(matches!(&sent[0], Sent::Text(t) if t.contains("Active bonus +5")));

    let bonuses = |entries: Vec<LedgerEntry>| {
        entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::Bonus)
            .count()
    };
    assert_eq!(bonuses(fx.user_entries("u1").await), 1);

    // Legacy mode: invoking again immediately re-grants
    fx.command("u1", CommandKind::DailySuccess).await;
    fx.drain().await;
    assert_eq!(bonuses(fx.user_entries("u1").await), 2);
}

#[tokio::test]
async fn daily_success_corrected_mode_grants_once() {
    let fx = Fixture::new(BonusMode::Corrected).await;
    let now = chrono::Utc::now();

    for i in 0..5 {
        fx.repo
            .append_entry(&LedgerEntry::new(
                format!("seed-{i}"),
                1,
                EntryKind::Challenge(ChallengeKind::Exercise),
                now,
            ))
            .await
            .unwrap();
    }

    fx.command("u1", CommandKind::DailySuccess).await;
    fx.command("u1", CommandKind::DailySuccess).await;

    let bonuses = fx
        .user_entries("u1")
        .await
        .into_iter()
        .filter(|e| e.kind == EntryKind::Bonus)
        .count();
    assert_eq!(bonuses, 1);
}

#[tokio::test]
async fn summary_reflects_completed_challenge() {
    let fx = Fixture::new(BonusMode::Corrected).await;

    fx.select("u1", "start_exercise").await;
    fx.command("u1", CommandKind::Done).await;
    fx.text("u1", "pushups").await;
    fx.text("u1", "15 minutes").await;
    fx.text("u1", "more reps tomorrow").await;
    fx.drain().await;

    fx.command("u1", CommandKind::DailySuccess).await;
    let sent = fx.drain().await;
    match &sent[0] {
        Sent::Text(t) => {
            assert!(t.contains("Exercise for 15 minutes"));
            assert!(t.contains("pushups / 15 minutes / more reps tomorrow"));
            assert!(t.contains("Total points: 4"));
        }
        other => panic!("expected summary text, got {other:?}"),
    }
}

#[tokio::test]
async fn completing_all_challenges_ends_with_all_done_message() {
    let fx = Fixture::new(BonusMode::Corrected).await;

    for (kind, answers) in [
        (ChallengeKind::Reading, ["a", "b", "c"]),
        (ChallengeKind::Exercise, ["d", "e", "f"]),
        (ChallengeKind::Video, ["g", "h", "i"]),
    ] {
        fx.select("u1", &kind.token()).await;
        fx.command("u1", CommandKind::Done).await;
        for answer in answers {
            fx.text("u1", answer).await;
        }
    }
    fx.drain().await;

    fx.command("u1", CommandKind::Start).await;
    let sent = fx.drain().await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], Sent::Text(t) if t.contains("All of today's challenges are done")));

    // And /done stays silent
    fx.command("u1", CommandKind::Done).await;
    assert!(fx.drain().await.is_empty());
}
