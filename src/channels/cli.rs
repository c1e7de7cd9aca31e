//! CLI channel — stdin/stdout REPL for local testing.
//!
//! Choices are printed with their tokens; typing a token back selects it.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Channel, ChoiceOption, CommandKind, Event, EventPayload, EventStream,
};
use crate::error::ChannelError;

const CLI_USER: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a line of CLI input to an event payload.
///
/// Lines starting with `start_` are treated as selection tokens so the
/// printed choices can be picked by typing them back.
fn parse_line(line: &str) -> Option<EventPayload> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('/') {
        return match CommandKind::parse(line) {
            Some(cmd) => Some(EventPayload::Command(cmd)),
            None => {
                eprintln!("Unknown command: {line}");
                None
            }
        };
    }
    if line.starts_with("start_") {
        return Some(EventPayload::Selection {
            token: line.to_string(),
        });
    }
    Some(EventPayload::Text {
        text: line.to_string(),
    })
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(payload) = parse_line(&line) else {
                            eprint!("> ");
                            continue;
                        };
                        let event = Event::new("cli", CLI_USER, payload);
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {e}");
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_text(&self, _user_id: &str, text: &str) -> Result<(), ChannelError> {
        println!("\n{text}\n");
        eprint!("> ");
        Ok(())
    }

    async fn send_choice(
        &self,
        _user_id: &str,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError> {
        println!("\n{text}");
        for opt in options {
            println!("  {}  (type: {})", opt.label, opt.token);
        }
        println!();
        eprint!("> ");
        Ok(())
    }
}
