//! `toolchat serve`: start the HTTP API server.

use super::load_config;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("toolchat gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} via {}", config.default_model, config.default_provider);
    println!(
        "   Auth:      {}",
        if config.gateway.bearer_tokens.is_empty() {
            "open"
        } else {
            "bearer token"
        }
    );

    toolchat_gateway::start(config).await?;

    Ok(())
}
