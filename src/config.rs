//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// How repeated weekly-activity bonus grants are handled.
///
/// `Legacy` reproduces the original behavior: every qualifying summary
/// re-grants the +5 bonus. `Corrected` grants at most once per user per
/// ISO week, tracked in the `bonus_grants` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusMode {
    Legacy,
    Corrected,
}

impl BonusMode {
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("HABIT_COACH_BONUS_MODE") {
            Ok(v) => match v.to_ascii_lowercase().as_str() {
                "legacy" => Ok(Self::Legacy),
                "corrected" => Ok(Self::Corrected),
                other => Err(ConfigError::InvalidValue {
                    key: "HABIT_COACH_BONUS_MODE".into(),
                    message: format!("expected 'legacy' or 'corrected', got '{other}'"),
                }),
            },
            Err(_) => Ok(Self::Corrected),
        }
    }
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Delay before the post-start completion reminder fires.
    pub reminder_delay: Duration,
    /// Bonus grant behavior for the daily summary.
    pub bonus_mode: BonusMode,
    /// Minimum number of ledger entries in the trailing week that
    /// qualifies for the activity bonus.
    pub weekly_bonus_threshold: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            reminder_delay: Duration::from_secs(30 * 60),
            bonus_mode: BonusMode::Corrected,
            weekly_bonus_threshold: 5,
        }
    }
}

impl BotConfig {
    /// Build the config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(minutes) = std::env::var("HABIT_COACH_REMINDER_MIN") {
            let minutes: u64 =
                minutes
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "HABIT_COACH_REMINDER_MIN".into(),
                        message: format!("expected integer minutes, got '{minutes}'"),
                    })?;
            config.reminder_delay = Duration::from_secs(minutes * 60);
        }

        config.bonus_mode = BonusMode::from_env()?;
        Ok(config)
    }
}

/// Telegram transport configuration, present only when a token is set.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    /// Read from `TELEGRAM_BOT_TOKEN` / `TELEGRAM_ALLOWED_USERS`.
    /// Returns `None` when no token is configured.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let allowed_users: Vec<String> = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Some(Self {
            bot_token: SecretString::from(token),
            allowed_users,
        })
    }
}
