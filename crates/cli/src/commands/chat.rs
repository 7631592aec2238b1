//! `studiobot chat`: stream a single turn to the terminal.
//!
//! Tokens are printed inline as they arrive; tool results and sources are
//! printed as one JSON object per line once the text so far is flushed.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use studiobot_agent::{ChatEvent, ChatTurn};
use studiobot_gateway::AppState;

pub async fn run(
    config_path: Option<&Path>,
    message: String,
    agent: Option<String>,
    project: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let state = Arc::new(AppState::build(config));

    let turn = ChatTurn {
        project_key: project,
        ..ChatTurn::from_message(agent.as_deref(), message)
    };
    let mut events = state.orchestrator.run_stream(turn);

    let mut stdout = std::io::stdout();
    let mut failure = None;
    let mut mid_line = false;
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::Token(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
                mid_line = !text.ends_with('\n');
            }
            ChatEvent::Error(message) => {
                if mid_line {
                    writeln!(stdout)?;
                    mid_line = false;
                }
                eprintln!("[error] {message}");
                failure = Some(message);
            }
            ChatEvent::Done => break,
            other => {
                if mid_line {
                    writeln!(stdout)?;
                    mid_line = false;
                }
                writeln!(stdout, "{}", json!({ "event": other.kind(), "data": other.data() }))?;
            }
        }
    }
    if mid_line {
        writeln!(stdout)?;
    }

    match failure {
        Some(message) => Err(message.into()),
        None => Ok(()),
    }
}
