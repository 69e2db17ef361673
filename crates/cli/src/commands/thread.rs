//! `toolchat thread`: thread management.

use toolchat_core::thread::Thread;

use super::load_config;

pub async fn create(
    name: String,
    model: Option<String>,
    system_prompt: Option<String>,
    max_input_tokens: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let (threads, _, _) = toolchat_gateway::open_stores(&config).await?;

    let mut thread = Thread::new(name);
    thread.model = model;
    thread.system_prompt = system_prompt;
    thread.max_input_tokens = max_input_tokens;
    threads.create_thread(&thread).await?;

    println!("{}", thread.id);
    Ok(())
}
