//! Line-oriented chat client over the gateway runtime.
//!
//! Stands in for a view layer: stdin lines become commands, broadcast
//! events become printed lines. All synchronization logic lives in the
//! runtime; this binary only renders.

mod config;
mod logging;

use std::{process, sync::Arc};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use client_core::{Chat, ClientCommand, ClientEvent, ConnectionState, Message};
use client_gateway::{GatewayConfig, RuntimeHandle, spawn_runtime};
use client_platform::{FileTokenStore, TokenStore};
use config::CliConfig;

#[tokio::main]
async fn main() {
    logging::init();

    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            process::exit(1);
        }
    };
    info!(endpoint = %config.endpoint, "starting ternchat-cli");

    let token_store = FileTokenStore::new(&config.token_file);
    let Some(token) = resolve_token(&config, &token_store) else {
        eprintln!(
            "no token available: set TERNCHAT_TOKEN or put one in {}",
            config.token_file.display()
        );
        process::exit(1);
    };

    let mut gateway_config = GatewayConfig::new(config.endpoint.clone());
    gateway_config.sync.optimistic_send = config.optimistic_send;
    gateway_config.command_buffer = config.command_buffer;
    gateway_config.event_buffer = config.event_buffer;

    let handle = spawn_runtime(gateway_config, Arc::new(token_store));
    let mut events = handle.subscribe();
    if handle
        .send(ClientCommand::Connect { token })
        .await
        .is_err()
    {
        eprintln!("runtime unavailable");
        process::exit(1);
    }

    println!("connecting to {} ...", config.endpoint);
    print_help();

    let mut session = CliSession::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            maybe_line = lines.next_line() => {
                match maybe_line {
                    Ok(Some(line)) => {
                        if !session.handle_line(&handle, line.trim()).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed; disconnecting");
                        let _ = handle.send(ClientCommand::Disconnect).await;
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "stdin read failed");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !session.handle_event(event) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("event stream closed");
                        break;
                    }
                }
            }
        }
    }
}

fn resolve_token(config: &CliConfig, token_store: &FileTokenStore) -> Option<String> {
    if let Some(token) = &config.token {
        // Persist the fresh token so the next run can reuse it, and so a
        // server rejection observable clears it.
        if let Err(err) = token_store.save(token) {
            warn!(error = %err, "failed persisting token");
        }
        return Some(token.clone());
    }

    match token_store.load() {
        Ok(token) => token,
        Err(err) => {
            warn!(error = %err, "failed loading persisted token");
            None
        }
    }
}

#[derive(Default)]
struct CliSession {
    chats: Vec<Chat>,
}

impl CliSession {
    /// Handle one stdin line; returns `false` to end the session.
    async fn handle_line(&mut self, handle: &RuntimeHandle, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }

        let command = match self.parse_line(line) {
            ParsedLine::Command(command) => command,
            ParsedLine::Quit => {
                let _ = handle.send(ClientCommand::Disconnect).await;
                return false;
            }
            ParsedLine::Local => return true,
        };

        if handle.send(command).await.is_err() {
            eprintln!("runtime unavailable");
            return false;
        }
        true
    }

    fn parse_line(&mut self, line: &str) -> ParsedLine {
        if !line.starts_with('/') {
            return ParsedLine::Command(ClientCommand::SendMessage {
                text: line.to_owned(),
            });
        }

        let mut parts = line.splitn(2, ' ');
        let keyword = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match keyword {
            "/quit" => ParsedLine::Quit,
            "/chats" => {
                self.print_chats();
                ParsedLine::Local
            }
            "/select" => match rest.parse::<usize>() {
                Ok(index) if index > 0 && index <= self.chats.len() => {
                    ParsedLine::Command(ClientCommand::SelectChat {
                        chat: self.chats[index - 1].clone(),
                    })
                }
                _ => {
                    println!("usage: /select <chat number from /chats>");
                    ParsedLine::Local
                }
            },
            "/new" => {
                let mut pieces = rest.splitn(2, ' ');
                let ids_raw = pieces.next().unwrap_or_default();
                let name = pieces.next().unwrap_or_default().trim().to_owned();
                let member_ids: Vec<i64> = ids_raw
                    .split(',')
                    .filter(|piece| !piece.trim().is_empty())
                    .filter_map(|piece| piece.trim().parse::<i64>().ok())
                    .collect();
                if member_ids.is_empty() {
                    println!("usage: /new <user-id[,user-id...]> [chat name]");
                    ParsedLine::Local
                } else {
                    ParsedLine::Command(ClientCommand::CreateChat { member_ids, name })
                }
            }
            _ => {
                print_help();
                ParsedLine::Local
            }
        }
    }

    /// Handle one runtime event; returns `false` to end the session.
    fn handle_event(&mut self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::StateChanged { state } => {
                println!("· connection: {}", state_label(state));
                state != ConnectionState::Closed
            }
            ClientEvent::AuthAccepted { user_id } => {
                println!("· signed in as user {user_id}");
                true
            }
            ClientEvent::AuthRejected { reason } => {
                eprintln!("· sign-in rejected: {reason}");
                eprintln!("  obtain a fresh token and restart");
                false
            }
            ClientEvent::ChatListReplaced { chats } => {
                self.chats = chats;
                self.print_chats();
                true
            }
            ClientEvent::TimelineReplaced { chat_id, messages } => {
                println!("--- {} ({} messages) ---", self.chat_label(&chat_id), messages.len());
                for message in &messages {
                    println!("{}", format_message(message));
                }
                true
            }
            ClientEvent::MessageAppended { message } => {
                println!("{}", format_message(&message));
                true
            }
            ClientEvent::TransportError { message } => {
                eprintln!("· transport error: {message}");
                true
            }
        }
    }

    fn print_chats(&self) {
        if self.chats.is_empty() {
            println!("· no chats yet; /new <user-id> starts one");
            return;
        }
        println!("· chats:");
        for (index, chat) in self.chats.iter().enumerate() {
            println!("  {}. {}", index + 1, chat_display_name(chat));
        }
    }

    fn chat_label(&self, chat_id: &str) -> String {
        self.chats
            .iter()
            .find(|chat| chat.id == chat_id)
            .map(chat_display_name)
            .unwrap_or_else(|| chat_id.to_owned())
    }
}

enum ParsedLine {
    Command(ClientCommand),
    Quit,
    Local,
}

fn chat_display_name(chat: &Chat) -> String {
    if chat.name.trim().is_empty() {
        format!("chat {}", &chat.id[..chat.id.len().min(8)])
    } else {
        chat.name.clone()
    }
}

fn format_message(message: &Message) -> String {
    format!(
        "[{}] user {}: {}",
        message.sent_at.format("%H:%M"),
        message.sender_id,
        message.text
    )
}

fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Authenticating => "authenticating",
        ConnectionState::Ready => "ready",
        ConnectionState::Closed => "closed",
    }
}

fn print_help() {
    println!("commands: /chats  /select <n>  /new <user-id[,...]> [name]  /quit");
    println!("anything else is sent to the selected chat");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_chats(chats: Vec<Chat>) -> CliSession {
        CliSession { chats }
    }

    fn chat(id: &str, name: &str) -> Chat {
        Chat {
            id: id.to_owned(),
            name: name.to_owned(),
        }
    }

    #[test]
    fn bare_text_becomes_a_send_command() {
        let mut session = CliSession::default();
        match session.parse_line("hello there") {
            ParsedLine::Command(ClientCommand::SendMessage { text }) => {
                assert_eq!(text, "hello there");
            }
            _ => panic!("expected a send command"),
        }
    }

    #[test]
    fn select_resolves_one_based_indices() {
        let mut session = session_with_chats(vec![chat("c1", "Team"), chat("c2", "")]);
        match session.parse_line("/select 2") {
            ParsedLine::Command(ClientCommand::SelectChat { chat }) => {
                assert_eq!(chat.id, "c2");
            }
            _ => panic!("expected a select command"),
        }

        assert!(matches!(session.parse_line("/select 0"), ParsedLine::Local));
        assert!(matches!(session.parse_line("/select 9"), ParsedLine::Local));
        assert!(matches!(session.parse_line("/select x"), ParsedLine::Local));
    }

    #[test]
    fn new_parses_member_ids_and_optional_name() {
        let mut session = CliSession::default();
        match session.parse_line("/new 42,43 Weekend plans") {
            ParsedLine::Command(ClientCommand::CreateChat { member_ids, name }) => {
                assert_eq!(member_ids, vec![42, 43]);
                assert_eq!(name, "Weekend plans");
            }
            _ => panic!("expected a create command"),
        }

        match session.parse_line("/new 7") {
            ParsedLine::Command(ClientCommand::CreateChat { member_ids, name }) => {
                assert_eq!(member_ids, vec![7]);
                assert_eq!(name, "");
            }
            _ => panic!("expected a create command"),
        }

        assert!(matches!(session.parse_line("/new"), ParsedLine::Local));
        assert!(matches!(session.parse_line("/new abc"), ParsedLine::Local));
    }

    #[test]
    fn unnamed_chats_render_with_a_short_id() {
        assert_eq!(
            chat_display_name(&chat("0123456789abcdef", "")),
            "chat 01234567"
        );
        assert_eq!(chat_display_name(&chat("c1", "Team")), "Team");
    }

    #[test]
    fn closed_state_ends_the_session() {
        let mut session = CliSession::default();
        assert!(session.handle_event(ClientEvent::StateChanged {
            state: ConnectionState::Ready
        }));
        assert!(!session.handle_event(ClientEvent::StateChanged {
            state: ConnectionState::Closed
        }));
    }
}
