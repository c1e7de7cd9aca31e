//! Error types for Habit Coach.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("No channel known for user {user_id}")]
    NoRoute { user_id: String },
}

/// Challenge lifecycle violations.
///
/// These are recovered locally by the dispatcher and translated into a
/// user-facing advisory message, never surfaced as a crash.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Challenge {active} is already active for user {user_id}")]
    ChallengeActive { user_id: String, active: String },

    #[error("Challenge {kind} was already completed by user {user_id}")]
    AlreadyCompleted { user_id: String, kind: String },

    #[error("No active challenge for user {user_id}")]
    NoActiveChallenge { user_id: String },

    #[error("Session for user {user_id} has {answered} of {expected} answers")]
    IncompleteSession {
        user_id: String,
        answered: usize,
        expected: usize,
    },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
