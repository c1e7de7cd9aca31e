//! Channel abstraction for message I/O.
//!
//! Channels turn transport-native updates into `Event`s and carry the
//! outbound `send_text` / `send_choice` surface the core produces into.

pub mod cli;
pub mod telegram;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::RwLock;

use crate::error::ChannelError;

pub use cli::CliChannel;
pub use telegram::TelegramChannel;

/// Commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Welcome / resume (`/start`).
    Start,
    /// Begin or continue answering (`/done`).
    Done,
    /// Daily summary (`/dailysuccess`).
    DailySuccess,
}

impl CommandKind {
    /// Parse a command line (`/start`, `/done`, `/dailysuccess`).
    /// Unknown commands return `None` and are ignored upstream.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "/start" => Some(Self::Start),
            "/done" => Some(Self::Done),
            "/dailysuccess" => Some(Self::DailySuccess),
            _ => None,
        }
    }
}

/// What an inbound event carries.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Command(CommandKind),
    /// A button/option selection; `token` round-trips from `send_choice`.
    Selection { token: String },
    /// Free-form text.
    Text { text: String },
}

/// An inbound event from some channel.
#[derive(Debug, Clone)]
pub struct Event {
    /// Name of the channel the event arrived on.
    pub channel: String,
    /// Opaque user identifier.
    pub user_id: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(channel: impl Into<String>, user_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
            payload,
        }
    }
}

/// A selectable option offered to the user.
#[derive(Debug, Clone)]
pub struct ChoiceOption {
    pub label: String,
    pub token: String,
}

/// Stream of inbound events from a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g. "telegram", "cli").
    fn name(&self) -> &str;

    /// Start listening and return the stream of inbound events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Send plain text to a user.
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError>;

    /// Send text with selectable options; the chosen token comes back as a
    /// `Selection` event.
    async fn send_choice(
        &self,
        user_id: &str,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError>;

    /// Verify the channel can reach its transport.
    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Narrow outbound interface consumed by the engine (reminders and other
/// core-originated messages).
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError>;

    async fn send_choice(
        &self,
        user_id: &str,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError>;
}

/// Registry of channels plus outbound routing.
///
/// Outbound messages go to the channel the user was last seen on; the
/// routing table is updated by the dispatcher on every inbound event.
pub struct ChannelManager {
    channels: Vec<Arc<dyn Channel>>,
    routes: RwLock<HashMap<String, String>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&mut self, channel: Arc<dyn Channel>) {
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Start every channel and merge their event streams into one.
    pub async fn start_all(&self) -> Result<EventStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            streams.push(channel.start().await?);
            tracing::info!(channel = channel.name(), "Channel started");
        }
        Ok(Box::pin(futures::stream::select_all(streams)))
    }

    /// Remember which channel a user was last seen on.
    pub async fn record_route(&self, user_id: &str, channel: &str) {
        let mut routes = self.routes.write().await;
        routes.insert(user_id.to_string(), channel.to_string());
    }

    async fn route(&self, user_id: &str) -> Result<Arc<dyn Channel>, ChannelError> {
        let routes = self.routes.read().await;
        let name = routes
            .get(user_id)
            .ok_or_else(|| ChannelError::NoRoute {
                user_id: user_id.to_string(),
            })?;
        self.channels
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| ChannelError::NoRoute {
                user_id: user_id.to_string(),
            })
    }

    pub async fn shutdown_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), "Shutdown error: {e}");
            }
        }
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Messenger for ChannelManager {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        self.route(user_id).await?.send_text(user_id, text).await
    }

    async fn send_choice(
        &self,
        user_id: &str,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError> {
        self.route(user_id)
            .await?
            .send_choice(user_id, text, options)
            .await
    }
}
