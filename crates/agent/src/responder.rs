//! Responder: the tool-calling agent loop behind one chat turn.
//!
//! ```text
//! run(input)
//!   ├─ validate input, load thread           (errors returned to caller)
//!   ├─ prefix = system prompt + memory
//!   ├─ history = trim(messages, budget - prefix)
//!   ├─ toolset = compile(top-K relevant tools)
//!   └─ spawn loop ──► events (OutputChunk)
//!        step: stream completion, forward deltas, finalize message
//!              tool calls? dispatch in parallel, emit results, next step
//!              otherwise done
//!        close stream, then persist finalized messages + tool stats
//! ```

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use toolchat_config::AppConfig;
use toolchat_core::error::{Error, ProviderError, Result, StoreError};
use toolchat_core::message::{Message, Role};
use toolchat_core::provider::{FinishReason, Provider, ProviderRequest};
use toolchat_core::store::{MessageStore, ThreadStore, ToolStore};
use toolchat_core::thread::Thread;
use toolchat_core::tool::ToolSet;
use toolchat_tools::ToolCompiler;
use tracing::{debug, error, info, warn};

use crate::context::token::{estimate_messages_tokens, truncate_to_tokens};
use crate::context::trim::trim_to_budget;
use crate::dispatch::dispatch;
use crate::merge::DeltaAccumulator;
use crate::persist::{self, PersistReport};
use crate::stream_event::OutputChunk;

/// Capacity of the output channel between the loop and its consumer.
const OUTPUT_BUFFER: usize = 128;

/// Tunables for a responder.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Model used when neither the request nor the thread names one
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Upper bound on completion requests per run
    pub max_steps: usize,
    /// Top-K tools offered per run
    pub tool_limit: usize,
    /// Trailing messages used to pick relevant tools
    pub relevance_window: usize,
    /// History budget for threads without their own
    pub default_max_input_tokens: usize,
    /// System prompt for threads without their own
    pub system_prompt: Option<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: None,
            max_steps: 5,
            tool_limit: 5,
            relevance_window: 5,
            default_max_input_tokens: 8192,
            system_prompt: None,
        }
    }
}

impl ResponderConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: config.default_max_tokens,
            max_steps: config.agent.max_steps,
            tool_limit: config.agent.tool_limit,
            relevance_window: config.agent.relevance_window,
            default_max_input_tokens: config.agent.default_max_input_tokens,
            system_prompt: config.agent.system_prompt.clone(),
        }
    }
}

fn default_save() -> bool {
    true
}

/// One chat turn to respond to.
#[derive(Debug, Clone, Deserialize)]
pub struct RunInput {
    pub thread_id: String,

    /// Conversation history, oldest first
    pub messages: Vec<Message>,

    /// Persist the run's messages once it finishes
    #[serde(default = "default_save")]
    pub save: bool,

    /// Overrides the thread's model
    #[serde(default)]
    pub model: Option<String>,
}

impl RunInput {
    pub fn new(thread_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages,
            save: true,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn without_save(mut self) -> Self {
        self.save = false;
        self
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub completion_requests: usize,
    /// Steps that ended in tool calls
    pub tool_steps: usize,
    /// Messages finalized during the run, in order
    pub messages: Vec<Message>,
    pub persisted: PersistReport,
    /// Set when the provider failed mid-run
    pub error: Option<String>,
}

/// A validated agent turn that has not started streaming.
pub struct PreparedRun {
    run_loop: RunLoop,
}

impl PreparedRun {
    /// Spawn the loop.
    pub fn start(self) -> AgentRun {
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        let handle = tokio::spawn(self.run_loop.run(tx));
        AgentRun { events: rx, handle }
    }
}

/// A running agent turn.
///
/// `events` closes when the loop ends; `handle` resolves once the
/// background persistence has finished too.
pub struct AgentRun {
    pub events: mpsc::Receiver<OutputChunk>,
    pub handle: JoinHandle<RunOutcome>,
}

impl AgentRun {
    /// Drain every chunk, then wait for the run to settle.
    pub async fn collect(mut self) -> Result<(Vec<OutputChunk>, RunOutcome)> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.events.recv().await {
            chunks.push(chunk);
        }
        let outcome = self
            .handle
            .await
            .map_err(|e| Error::Internal(format!("agent task failed: {e}")))?;
        Ok((chunks, outcome))
    }
}

/// The responder agent.
#[derive(Clone)]
pub struct Responder {
    provider: Arc<dyn Provider>,
    threads: Arc<dyn ThreadStore>,
    messages: Arc<dyn MessageStore>,
    tools: Arc<dyn ToolStore>,
    http: reqwest::Client,
    config: ResponderConfig,
}

impl Responder {
    pub fn new(
        provider: Arc<dyn Provider>,
        threads: Arc<dyn ThreadStore>,
        messages: Arc<dyn MessageStore>,
        tools: Arc<dyn ToolStore>,
    ) -> Self {
        Self {
            provider,
            threads,
            messages,
            tools,
            http: reqwest::Client::new(),
            config: ResponderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResponderConfig) -> Self {
        self.config = config;
        self
    }

    /// HTTP client shared by every compiled tool executor.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Start responding to `input`.
    ///
    /// Caller and configuration errors are returned before anything is
    /// streamed. Once the loop is spawned, failures only end the stream early.
    pub async fn run(&self, input: RunInput) -> Result<AgentRun> {
        Ok(self.prepare(input).await?.start())
    }

    /// Validate `input` and build the run without starting it.
    ///
    /// Every fatal error surfaces here, so a caller can commit side effects
    /// of its own between this and [`PreparedRun::start`].
    pub async fn prepare(&self, input: RunInput) -> Result<PreparedRun> {
        let RunInput {
            thread_id,
            messages,
            save,
            model,
        } = input;

        if messages.is_empty() {
            return Err(Error::config("no messages to respond to"));
        }
        if self.config.max_steps == 0 {
            return Err(Error::config("max_steps must be at least 1"));
        }

        let thread = self
            .threads
            .get_thread(&thread_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("thread {thread_id}")))?;

        let model = model
            .or_else(|| thread.model.clone())
            .unwrap_or_else(|| self.config.default_model.clone());

        let prefix = self.context_prefix(&thread);
        let budget = thread
            .max_input_tokens
            .unwrap_or(self.config.default_max_input_tokens)
            .saturating_sub(estimate_messages_tokens(&prefix));
        let history = trim_to_budget(&messages, budget);
        if history.len() < messages.len() {
            debug!(
                dropped = messages.len() - history.len(),
                budget, "Trimmed history to fit the token budget"
            );
        }

        let toolset = self.select_tools(&history).await?;

        info!(
            thread_id = %thread_id,
            model = %model,
            tools = toolset.len(),
            history = history.len(),
            "Starting agent run"
        );

        let run_loop = RunLoop {
            provider: self.provider.clone(),
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            toolset,
            model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            max_steps: self.config.max_steps,
            prefix,
            history,
            thread_id,
            save,
        };

        Ok(PreparedRun { run_loop })
    }

    /// System prompt and memory, as at most one leading system message.
    fn context_prefix(&self, thread: &Thread) -> Vec<Message> {
        let mut text = thread
            .system_prompt
            .as_deref()
            .or(self.config.system_prompt.as_deref())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        if let Some(memory) = thread.active_memory() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str("Memory:\n");
            text.push_str(truncate_to_tokens(memory.trim(), thread.memory_max_tokens));
        }

        if text.is_empty() {
            Vec::new()
        } else {
            vec![Message::system(text).in_thread(&thread.id)]
        }
    }

    /// Compile the tools most relevant to the tail of the conversation.
    async fn select_tools(&self, history: &[Message]) -> Result<ToolSet> {
        let mut toolset = ToolSet::new();

        let start = history.len().saturating_sub(self.config.relevance_window);
        let query = history[start..]
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| format!("{}: {}", m.role.as_str(), m.text()))
            .collect::<Vec<_>>()
            .join("\n");

        let candidates = match self
            .tools
            .tools_by_prompt(&query, self.config.tool_limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Tool selection failed, continuing without tools");
                return Ok(toolset);
            }
        };

        let mut compiler = ToolCompiler::new(self.http.clone());
        for tool in &candidates {
            match compiler.compile(tool) {
                Ok(descriptors) => {
                    for descriptor in descriptors {
                        toolset.insert(descriptor);
                    }
                }
                Err(e) if e.is_configuration() => return Err(e.into()),
                Err(e) => warn!(tool = %tool.name, error = %e, "Skipping tool"),
            }
        }

        Ok(toolset)
    }
}

/// Everything the spawned loop owns.
struct RunLoop {
    provider: Arc<dyn Provider>,
    messages: Arc<dyn MessageStore>,
    tools: Arc<dyn ToolStore>,
    toolset: ToolSet,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_steps: usize,
    prefix: Vec<Message>,
    history: Vec<Message>,
    thread_id: String,
    save: bool,
}

impl RunLoop {
    async fn run(mut self, tx: mpsc::Sender<OutputChunk>) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        let mut executions = Vec::new();
        let definitions = self.toolset.definitions();

        for step in 0..self.max_steps {
            if tx.is_closed() {
                debug!(step, "Output stream dropped, stopping before next step");
                break;
            }

            // The last permitted step gets no tools, forcing a text answer.
            let final_step = step + 1 == self.max_steps;
            let request = ProviderRequest {
                model: self.model.clone(),
                messages: self.prefix.iter().chain(&self.history).cloned().collect(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: if final_step {
                    Vec::new()
                } else {
                    definitions.clone()
                },
            };
            outcome.completion_requests += 1;

            let (message, finish_reason) = match self.stream_step(request, &tx).await {
                Ok(finished) => finished,
                Err(e) => {
                    error!(step, error = %e, "Provider failed, ending run");
                    outcome.error = Some(e.to_string());
                    break;
                }
            };

            let wants_tools =
                finish_reason == Some(FinishReason::ToolCalls) && message.has_tool_calls();
            self.history.push(message.clone());
            outcome.messages.push(message.clone());
            if !wants_tools {
                break;
            }

            debug!(step, calls = message.tool_calls.len(), "Dispatching tool calls");
            for result in dispatch(&self.toolset, &message.tool_calls, &self.thread_id).await {
                let _ = tx.send(OutputChunk::ToolResult(result.message.clone())).await;
                executions.extend(result.execution);
                self.history.push(result.message.clone());
                outcome.messages.push(result.message);
            }
            outcome.tool_steps += 1;
        }
        drop(tx);

        if self.save {
            outcome.persisted = persist::save_messages(
                self.messages.as_ref(),
                outcome.messages.clone(),
                &self.toolset.metadata(),
            )
            .await;
        }
        persist::record_executions(self.tools.as_ref(), &executions).await;

        info!(
            thread_id = %self.thread_id,
            requests = outcome.completion_requests,
            tool_steps = outcome.tool_steps,
            "Agent run finished"
        );
        outcome
    }

    /// Stream one completion, forwarding each fragment as it arrives.
    async fn stream_step(
        &self,
        request: ProviderRequest,
        tx: &mpsc::Sender<OutputChunk>,
    ) -> std::result::Result<(Message, Option<FinishReason>), ProviderError> {
        let mut fragments = self.provider.stream(request).await?;
        let step_id = uuid::Uuid::new_v4().to_string();
        let mut acc = DeltaAccumulator::new();

        while let Some(fragment) = fragments.recv().await {
            let chunk = fragment?;
            if !chunk.delta.is_empty() {
                let _ = tx
                    .send(OutputChunk::delta(&step_id, chunk.delta.clone()))
                    .await;
            }
            acc.push(chunk);
        }

        if let Some(usage) = acc.usage() {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Step usage"
            );
        }
        let finish_reason = acc.finish_reason().cloned();
        Ok((acc.into_message(&step_id, &self.thread_id), finish_reason))
    }
}
