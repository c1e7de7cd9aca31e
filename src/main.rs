use std::sync::Arc;

use habit_coach::bot::Bot;
use habit_coach::channels::{ChannelManager, CliChannel, TelegramChannel};
use habit_coach::config::{BotConfig, TelegramConfig};
use habit_coach::engine::{LifecycleEngine, ReminderScheduler, SummaryBuilder};
use habit_coach::store::{LibSqlBackend, Repository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env()?;

    eprintln!("🏃 Habit Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Reminder delay: {} min",
        config.reminder_delay.as_secs() / 60
    );
    eprintln!("   Bonus mode: {:?}", config.bonus_mode);

    // ── Database ─────────────────────────────────────────────────────
    let db_path = std::env::var("HABIT_COACH_DB_PATH")
        .unwrap_or_else(|_| "./data/habit-coach.db".to_string());

    let db_path_ref = std::path::Path::new(&db_path);
    let repo: Arc<dyn Repository> = Arc::new(
        LibSqlBackend::new_local(db_path_ref)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Channels ─────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    channels.add(Arc::new(CliChannel::new()));

    if let Some(telegram) = TelegramConfig::from_env() {
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if telegram.allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                telegram.allowed_users.join(", ")
            }
        );
        channels.add(Arc::new(TelegramChannel::new(
            telegram.bot_token,
            telegram.allowed_users,
        )));
    } else {
        eprintln!("   Telegram: disabled (TELEGRAM_BOT_TOKEN not set)");
    }

    eprintln!("   Channels: {}\n", channels.channel_names().join(", "));
    let channels = Arc::new(channels);

    // ── Engine ───────────────────────────────────────────────────────
    let reminders = ReminderScheduler::new(
        Arc::clone(&channels) as Arc<dyn habit_coach::channels::Messenger>,
        config.reminder_delay,
    );
    let engine = LifecycleEngine::new(Arc::clone(&repo), reminders);
    let summary = SummaryBuilder::new(
        Arc::clone(&repo),
        config.bonus_mode,
        config.weekly_bonus_threshold,
    );

    let bot = Bot::new(engine, summary, channels);
    bot.run().await?;

    Ok(())
}
