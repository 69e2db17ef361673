//! `toolchat chat`: send one message to a thread and stream the reply.
//!
//! The thread's persisted history is replayed as context, so consecutive
//! invocations continue the same conversation.

use std::io::Write;

use tracing::debug;

use toolchat_agent::{OutputChunk, RunInput};
use toolchat_core::message::Message;

use super::load_config;

/// Longest tool result echoed to the terminal.
const RESULT_PREVIEW: usize = 120;

pub async fn run(
    thread_id: String,
    message: String,
    model: Option<String>,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    // Local providers run without a key
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TOOLCHAT_API_KEY, OPENAI_API_KEY or OPENROUTER_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", toolchat_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let state = toolchat_gateway::build_state(&config).await?;
    if state.threads.get_thread(&thread_id).await?.is_none() {
        return Err(format!("Thread '{thread_id}' not found").into());
    }

    let mut history = state.messages.list_messages(&thread_id).await?;
    let user = Message::user(message).in_thread(&thread_id);
    if save {
        state.messages.create_message(&user).await?;
    }
    history.push(user);

    let mut input = RunInput::new(&thread_id, history);
    input.model = model;
    input.save = save;

    let mut run = state.responder.run(input).await?;
    let mut stdout = std::io::stdout();
    while let Some(chunk) = run.events.recv().await {
        match chunk {
            OutputChunk::Delta(d) => {
                if let Some(text) = d.delta.content {
                    print!("{text}");
                    stdout.flush()?;
                }
            }
            OutputChunk::ToolResult(result) => {
                let preview: String = result.text().chars().take(RESULT_PREVIEW).collect();
                eprintln!(
                    "  [tool {}] {preview}",
                    result.tool_call_id.as_deref().unwrap_or("?")
                );
            }
        }
    }
    println!();

    let outcome = run.handle.await?;
    debug!(
        requests = outcome.completion_requests,
        tool_steps = outcome.tool_steps,
        saved = outcome.persisted.saved,
        "Chat turn finished"
    );
    if let Some(err) = outcome.error {
        return Err(format!("Response ended early: {err}").into());
    }
    Ok(())
}
