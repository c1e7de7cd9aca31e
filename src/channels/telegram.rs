//! Telegram channel — long-polls the Bot API for updates.
//!
//! Text messages become `Command`/`Text` events, inline-keyboard button
//! presses arrive as `callback_query` updates and become `Selection` events.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{
    Channel, ChoiceOption, CommandKind, Event, EventPayload, EventStream,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Check if any of the provided identities is allowed.
    pub fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        check_user_allowed(&self.allowed_users, identities)
    }

    /// Send a text message, splitting chunks that exceed Telegram's limit.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            // Keyboard goes on the final chunk only
            if i == last {
                if let Some(ref markup) = reply_markup {
                    body["reply_markup"] = markup.clone();
                }
            }

            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&body)
                .send()
                .await
                .map_err(|e| ChannelError::SendFailed {
                    name: "telegram".into(),
                    reason: e.to_string(),
                })?;

            if !resp.status().is_success() {
                let status = resp.status();
                let err = resp.text().await.unwrap_or_default();
                return Err(ChannelError::SendFailed {
                    name: "telegram".into(),
                    reason: format!("sendMessage returned {status}: {err}"),
                });
            }
        }
        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let url = format!(
                    "https://api.telegram.org/bot{}/getUpdates",
                    bot_token.expose_secret()
                );
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(serde_json::Value::as_array)
                else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let event = if let Some(query) = update.get("callback_query") {
                        // Acknowledge so the client stops its spinner
                        if let Some(query_id) =
                            query.get("id").and_then(serde_json::Value::as_str)
                        {
                            let _ = client
                                .post(format!(
                                    "https://api.telegram.org/bot{}/answerCallbackQuery",
                                    bot_token.expose_secret()
                                ))
                                .json(&serde_json::json!({ "callback_query_id": query_id }))
                                .send()
                                .await;
                        }
                        selection_event(query, &allowed_users)
                    } else if let Some(message) = update.get("message") {
                        message_event(message, &allowed_users)
                    } else {
                        None
                    };

                    if let Some(event) = event {
                        if tx.send(event).is_err() {
                            tracing::info!("Telegram listener channel closed");
                            return;
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        // For private chats the chat id equals the user id.
        self.send_message(user_id, text, None).await
    }

    async fn send_choice(
        &self,
        user_id: &str,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError> {
        let buttons: Vec<serde_json::Value> = options
            .iter()
            .map(|opt| {
                serde_json::json!({
                    "text": opt.label,
                    "callback_data": opt.token,
                })
            })
            .collect();

        let markup = serde_json::json!({ "inline_keyboard": [buttons] });
        self.send_message(user_id, text, Some(markup)).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Update parsing ──────────────────────────────────────────────────

/// Extract sender identities and user id from a `from` object, applying
/// the allowlist. Returns the user id when allowed.
fn allowed_user_id(from: &serde_json::Value, allowed_users: &[String]) -> Option<String> {
    let username = from
        .get("username")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .get("id")
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string())?;

    let identities = [username, user_id.as_str()];
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            "Telegram: ignoring update from unauthorized user: username={username}, user_id={user_id}"
        );
        return None;
    }
    Some(user_id)
}

/// Turn a `callback_query` update into a Selection event.
fn selection_event(query: &serde_json::Value, allowed_users: &[String]) -> Option<Event> {
    let user_id = allowed_user_id(query.get("from")?, allowed_users)?;
    let token = query.get("data").and_then(serde_json::Value::as_str)?;
    Some(Event::new(
        "telegram",
        user_id,
        EventPayload::Selection {
            token: token.to_string(),
        },
    ))
}

/// Turn a `message` update into a Command or Text event.
/// Unknown slash commands are dropped with a debug log.
fn message_event(message: &serde_json::Value, allowed_users: &[String]) -> Option<Event> {
    let user_id = allowed_user_id(message.get("from")?, allowed_users)?;
    let text = message.get("text").and_then(serde_json::Value::as_str)?;

    let payload = if text.trim_start().starts_with('/') {
        match CommandKind::parse(text) {
            Some(cmd) => EventPayload::Command(cmd),
            None => {
                tracing::debug!(command = text, "Ignoring unknown command");
                return None;
            }
        }
    } else {
        EventPayload::Text {
            text: text.to_string(),
        }
    };

    Some(Event::new("telegram", user_id, payload))
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Clamp the window to a char boundary so multi-byte text can't
        // split mid-codepoint
        let mut window = max_len;
        while !remaining.is_char_boundary(window) {
            window -= 1;
        }
        let chunk = &remaining[..window];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(window);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { window } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allowed: Vec<String>) -> TelegramChannel {
        TelegramChannel::new(SecretString::from("123:ABC"), allowed)
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(vec!["*".into()]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel(vec![]).api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    // ── User allowlist tests ────────────────────────────────────────

    #[test]
    fn allowlist_wildcard() {
        assert!(channel(vec!["*".into()]).is_any_user_allowed(["anyone"]));
    }

    #[test]
    fn allowlist_specific() {
        let ch = channel(vec!["alice".into(), "bob".into()]);
        assert!(ch.is_any_user_allowed(["alice"]));
        assert!(!ch.is_any_user_allowed(["eve"]));
    }

    #[test]
    fn allowlist_empty_denies() {
        assert!(!channel(vec![]).is_any_user_allowed(["anyone"]));
    }

    #[test]
    fn allowlist_exact_match_not_substring() {
        let ch = channel(vec!["alice".into()]);
        assert!(!ch.is_any_user_allowed(["alice_bot"]));
        assert!(!ch.is_any_user_allowed(["malice"]));
    }

    #[test]
    fn allowlist_numeric_id_identity() {
        let ch = channel(vec!["123456789".into()]);
        assert!(ch.is_any_user_allowed(["unknown", "123456789"]));
        assert!(!ch.is_any_user_allowed(["unknown", "987654321"]));
    }

    // ── Update parsing tests ────────────────────────────────────────

    #[test]
    fn message_update_parses_command() {
        let message = serde_json::json!({
            "from": { "id": 42, "username": "alice" },
            "text": "/start"
        });
        let event = message_event(&message, &["*".to_string()]).unwrap();
        assert_eq!(event.user_id, "42");
        assert!(matches!(
            event.payload,
            EventPayload::Command(CommandKind::Start)
        ));
    }

    #[test]
    fn message_update_parses_free_text() {
        let message = serde_json::json!({
            "from": { "id": 42 },
            "text": "a great book"
        });
        let event = message_event(&message, &["*".to_string()]).unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::Text { ref text } if text == "a great book"
        ));
    }

    #[test]
    fn message_update_drops_unknown_command() {
        let message = serde_json::json!({
            "from": { "id": 42 },
            "text": "/fly"
        });
        assert!(message_event(&message, &["*".to_string()]).is_none());
    }

    #[test]
    fn message_update_drops_unauthorized() {
        let message = serde_json::json!({
            "from": { "id": 42, "username": "eve" },
            "text": "/start"
        });
        assert!(message_event(&message, &["alice".to_string()]).is_none());
    }

    #[test]
    fn callback_update_parses_selection() {
        let query = serde_json::json!({
            "id": "q1",
            "from": { "id": 42, "username": "alice" },
            "data": "start_reading"
        });
        let event = selection_event(&query, &["alice".to_string()]).unwrap();
        assert_eq!(event.user_id, "42");
        assert!(matches!(
            event.payload,
            EventPayload::Selection { ref token } if token == "start_reading"
        ));
    }

    #[test]
    fn non_text_message_ignored() {
        let message = serde_json::json!({
            "from": { "id": 42 },
            "sticker": {}
        });
        assert!(message_event(&message, &["*".to_string()]).is_none());
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_multibyte_stays_on_char_boundaries() {
        // Leading ASCII byte misaligns every following 4-byte emoji, so a
        // naive cut at 4096 would land mid-codepoint
        let msg = format!("a{}", "🎉".repeat(2000));
        let chunks = split_message(&msg, 4096);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.len() <= 4096));
        assert_eq!(chunks.concat(), msg);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    // ── Network error tests (no server reachable) ───────────────────

    #[tokio::test]
    async fn send_text_fails_without_network() {
        let ch = channel(vec!["*".into()]);
        // Fails on connect or on the API error response; either way an Err.
        let result = ch.send_text("42", "hello").await;
        assert!(result.is_err());
    }
}
