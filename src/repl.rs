//! Line-oriented terminal front end: reads commands from stdin and renders
//! session events to stdout.

use crate::commands;
use crate::models::{Message, ModelType, Role};
use crate::session::SessionEvent;
use crate::state::AppState;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

const HELP: &str = "\
Commands:
  /new                      start a new chat
  /list                     list saved conversations
  /open <n>                 open conversation number n from /list
  /delete <n>               delete conversation number n from /list
  /mode encyclopedia|map    switch answer mode
  /help                     show this help
  /quit                     exit
Anything else is sent to Ski Sage.";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Chat(String),
    New,
    List,
    Open(usize),
    Delete(usize),
    Mode(ModelType),
    Help,
    Quit,
    Invalid(String),
}

impl Input {
    pub fn parse(line: &str) -> Input {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return Input::Chat(line.to_string());
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        match (name, arg) {
            ("new", None) => Input::New,
            ("list", None) => Input::List,
            ("open", Some(n)) => parse_index(n).map_or_else(Input::Invalid, Input::Open),
            ("delete", Some(n)) => parse_index(n).map_or_else(Input::Invalid, Input::Delete),
            ("mode", Some(mode)) => match mode.parse::<ModelType>() {
                Ok(mode) => Input::Mode(mode),
                Err(e) => Input::Invalid(e.to_string()),
            },
            ("help", None) => Input::Help,
            ("quit", None) | ("exit", None) => Input::Quit,
            _ => Input::Invalid(format!("Unknown command: /{}", command)),
        }
    }
}

fn parse_index(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("Expected a conversation number, got '{}'", raw)),
    }
}

/// Runs the prompt loop until `/quit`, end of input, or Ctrl-C.
pub async fn run_loop(state: &mut AppState) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Ski Sage - ask anything about skiing. Type /help for commands.");

    loop {
        print!("[{}] > ", state.mode.as_str());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Input::parse(&line) {
            Input::Chat(text) if text.is_empty() => continue,
            Input::Chat(text) => {
                let scope = state.session.scope();
                tokio::select! {
                    _ = commands::send_message(state, &text) => {}
                    _ = tokio::signal::ctrl_c() => {
                        scope.teardown();
                        println!();
                        break;
                    }
                }
            }
            Input::New => {
                commands::new_chat(state);
                println!("Started a new chat.");
            }
            Input::List => print_conversations(state),
            Input::Open(index) => match conversation_at(state, index) {
                Some(id) => {
                    commands::select_conversation(state, id);
                    print_transcript(state.session.messages());
                }
                None => println!("No conversation number {}.", index + 1),
            },
            Input::Delete(index) => match conversation_at(state, index) {
                Some(id) => {
                    commands::delete_conversation(state, id).await;
                    println!("Deleted.");
                }
                None => println!("No conversation number {}.", index + 1),
            },
            Input::Mode(mode) => commands::set_mode(state, mode),
            Input::Help => println!("{}", HELP),
            Input::Quit => break,
            Input::Invalid(reason) => println!("{}", reason),
        }
    }

    state.session.teardown();
    Ok(())
}

fn conversation_at(state: &AppState, index: usize) -> Option<Uuid> {
    commands::list_conversations(state).get(index).map(|c| c.id)
}

fn print_conversations(state: &AppState) {
    let conversations = commands::list_conversations(state);
    if conversations.is_empty() {
        println!("No saved conversations.");
        return;
    }
    let selected = state.session.chat_id();
    for (i, conversation) in conversations.iter().enumerate() {
        let marker = if Some(conversation.id) == selected { '*' } else { ' ' };
        println!(
            "{}{:>3}. {} ({})",
            marker,
            i + 1,
            conversation.title,
            conversation.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn print_transcript(messages: &[Message]) {
    for message in messages {
        println!("{}", format_message(message));
    }
}

fn format_message(message: &Message) -> String {
    match message.role {
        Role::User => format!("you: {}", message.content),
        Role::Assistant => format!("sage: {}", message.content),
    }
}

/// Renders session events. Streaming text is printed incrementally; the final
/// assistant message completes the line (or is printed whole in JSON mode).
pub async fn render_events(mut events: UnboundedReceiver<SessionEvent>) {
    let mut shown = String::new();
    let mut awaiting_reply = false;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::LoadingChanged(true) => {
                shown.clear();
                awaiting_reply = true;
                log::debug!("Waiting for Ski Sage...");
            }
            SessionEvent::LoadingChanged(false) => {}
            SessionEvent::StreamingMessage(text) => {
                if text.is_empty() || !awaiting_reply {
                    continue;
                }
                if shown.is_empty() {
                    print!("sage: ");
                }
                match text.strip_prefix(shown.as_str()) {
                    Some(delta) => print!("{}", delta),
                    None => print!("\nsage: {}", text),
                }
                shown = text;
                let _ = std::io::stdout().flush();
            }
            SessionEvent::MessagesChanged(messages) => {
                let Some(reply) = messages.last().filter(|m| m.role == Role::Assistant) else {
                    continue;
                };
                if !awaiting_reply {
                    continue;
                }
                if shown.is_empty() {
                    println!("{}", format_message(reply));
                } else {
                    match reply.content.strip_prefix(shown.as_str()) {
                        Some(rest) => println!("{}", rest),
                        None => println!("\n{}", format_message(reply)),
                    }
                }
                shown.clear();
                awaiting_reply = false;
            }
            SessionEvent::Failed(reason) => log::warn!("Request failed: {}", reason),
        }
    }
}
