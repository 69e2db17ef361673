//! Subcommand implementations.

pub mod chat;
pub mod serve;
pub mod thread;
pub mod tool;

use toolchat_config::AppConfig;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
