//! toolchat CLI: the main entry point.
//!
//! Commands:
//! - `serve`         : start the HTTP gateway
//! - `chat`          : send one message to a thread and stream the reply
//! - `thread create` : create a conversation thread
//! - `tool add`      : register an OpenAPI document as a tool
//! - `tool list`     : list registered tools

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolchat",
    about = "toolchat: a streaming LLM chat agent that calls your OpenAPI tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a message to a thread and stream the reply
    Chat {
        /// Thread to talk in
        #[arg(short, long)]
        thread: String,

        /// The message to send
        message: String,

        /// Override the thread's model
        #[arg(short, long)]
        model: Option<String>,

        /// Do not persist this exchange
        #[arg(long)]
        no_save: bool,
    },

    /// Manage threads
    #[command(subcommand)]
    Thread(ThreadCommand),

    /// Manage OpenAPI tools
    #[command(subcommand)]
    Tool(ToolCommand),
}

#[derive(Subcommand)]
enum ThreadCommand {
    /// Create a new thread
    Create {
        #[arg(short, long, default_value = "")]
        name: String,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        system_prompt: Option<String>,

        /// History budget in tokens
        #[arg(long)]
        max_input_tokens: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ToolCommand {
    /// Register an OpenAPI document (JSON or YAML) as a tool
    Add {
        #[arg(short, long)]
        name: String,

        /// Path to the OpenAPI document
        #[arg(short, long)]
        schema: std::path::PathBuf,

        #[arg(short, long, default_value = "")]
        description: String,

        /// None, Bearer or "Custom Header"
        #[arg(long, default_value = "None")]
        auth_type: String,

        /// Bearer token, or a JSON object of headers
        #[arg(long, env = "TOOLCHAT_TOOL_CREDENTIAL", hide_env_values = true)]
        credential: Option<String>,
    },

    /// List registered tools
    List,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat {
            thread,
            message,
            model,
            no_save,
        } => commands::chat::run(thread, message, model, !no_save).await?,
        Commands::Thread(ThreadCommand::Create {
            name,
            model,
            system_prompt,
            max_input_tokens,
        }) => commands::thread::create(name, model, system_prompt, max_input_tokens).await?,
        Commands::Tool(ToolCommand::Add {
            name,
            schema,
            description,
            auth_type,
            credential,
        }) => commands::tool::add(name, schema, description, auth_type, credential).await?,
        Commands::Tool(ToolCommand::List) => commands::tool::list().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat() {
        let cli = Cli::try_parse_from([
            "toolchat", "chat", "--thread", "t1", "What's the weather?", "--no-save",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat {
                thread,
                message,
                no_save,
                model,
            } => {
                assert_eq!(thread, "t1");
                assert_eq!(message, "What's the weather?");
                assert!(no_save);
                assert!(model.is_none());
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn parses_tool_add_with_auth() {
        let cli = Cli::try_parse_from([
            "toolchat",
            "tool",
            "add",
            "--name",
            "Weather",
            "--schema",
            "weather.yaml",
            "--auth-type",
            "Bearer",
            "--credential",
            "sk-1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Tool(ToolCommand::Add { ref auth_type, .. }) if auth_type == "Bearer"
        ));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["toolchat", "tool", "list", "--verbose", "--json-logs"])
            .unwrap();
        assert!(cli.verbose);
        assert!(cli.json_logs);
    }

    #[test]
    fn chat_requires_thread() {
        assert!(Cli::try_parse_from(["toolchat", "chat", "hello"]).is_err());
    }
}
