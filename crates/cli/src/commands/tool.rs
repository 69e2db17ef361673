//! `toolchat tool`: register and list OpenAPI tools.

use toolchat_core::tool::{AuthType, BaseTool};
use toolchat_tools::ToolCompiler;

use super::load_config;

pub async fn add(
    name: String,
    schema_path: std::path::PathBuf,
    description: String,
    auth_type: String,
    credential: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let schema = std::fs::read_to_string(&schema_path)
        .map_err(|e| format!("Failed to read {}: {e}", schema_path.display()))?;

    let mut tool = BaseTool::new(name, schema).with_description(description);
    tool.auth_type = AuthType::from(auth_type);
    tool.credential = credential;

    // Validate before storing: the agent compiles the same way at run time
    let descriptors = ToolCompiler::default().compile(&tool)?;

    let (_, _, tools) = toolchat_gateway::open_stores(&config).await?;
    tools.create_tool(&tool).await?;

    println!("{}", tool.id);
    for d in &descriptors {
        println!("  {}", d.description);
    }
    Ok(())
}

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let (_, _, tools) = toolchat_gateway::open_stores(&config).await?;
    let tools = tools.list_tools().await?;

    if tools.is_empty() {
        println!("No tools registered. Add one with `toolchat tool add`.");
        return Ok(());
    }

    println!("{:<38} {:<24} {:<14} {:>6} {:>8}", "ID", "NAME", "AUTH", "CALLS", "OK %");
    for tool in &tools {
        let ok = if tool.stats.count == 0 {
            "-".to_string()
        } else {
            format!(
                "{:.0}",
                tool.stats.success_count as f64 * 100.0 / tool.stats.count as f64
            )
        };
        println!(
            "{:<38} {:<24} {:<14} {:>6} {:>8}",
            tool.id,
            tool.name,
            tool.auth_type.as_str(),
            tool.stats.count,
            ok
        );
    }
    Ok(())
}
