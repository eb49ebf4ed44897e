//! The ReAct execution engine
//!
//! Drives the LLM through Thought / Action / Observation rounds until it
//! produces a final answer or a safety limit stops it. The engine streams
//! every decision through an [`EventSink`], checks a cancel token around
//! each await, detects repeated actions, and self-heals known tool
//! failures with a bounded retry budget.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::agent::client::LlmProvider;
use crate::agent::events::{ActivityStatus, AgentEvent, EngineStatus, EventSink};
use crate::agent::loop_guard::{LoopGuard, LoopVerdict};
use crate::agent::memory::ErrorMemory;
use crate::agent::recovery::{RecoveryAction, RecoveryActionType, RecoveryManager};
use crate::agent::signals::CancelToken;
use crate::agent::types::{AgentState, ChatMessage, FileCreated, ReactStep};
use crate::config::AgentConfig;
use crate::session::SharedContext;
use crate::tools::ToolRegistry;

/// Standard terminal messages
pub const INTERRUPTED_ANSWER: &str = "Task interrupted by user.";
pub const TIMEOUT_ANSWER: &str = "Request timed out.";
pub const MAX_ITERATIONS_ANSWER: &str =
    "Maximum iterations reached. Unable to complete the task.";

const INVALID_ACTION_OBSERVATION: &str = "Invalid action format. Use: \
     Action: tool_name({\"param\": \"value\"}) or Action: Final Answer: <answer>";

/// How a run terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A final answer was produced (including forced stops)
    Completed,
    /// Cancelled by the user
    Interrupted,
    /// LLM failure or timeout
    Failed,
}

/// Result of one engine run
pub struct RunOutcome {
    pub state: AgentState,
    pub termination: Termination,
    pub react_steps: Vec<ReactStep>,
}

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override the configured iteration cap
    pub max_iterations: Option<u32>,
    /// Extra system message injected after the tool prompt (step framing,
    /// plan context)
    pub extra_system: Option<String>,
    /// Skip appending the task/answer to the conversation context
    pub transient: bool,
}

/// Queue of user suggestions delivered into a running task. Suggestions are
/// appended to the next LLM turn, never injected into the current one.
#[derive(Clone, Default)]
pub struct SuggestionQueue(Arc<Mutex<Vec<String>>>);

impl SuggestionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, suggestion: String) {
        self.0.lock().unwrap().push(suggestion);
    }

    fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// The ReAct engine
pub struct ReactEngine {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    temperature: f32,
    context: Option<SharedContext>,
    suggestions: SuggestionQueue,
    error_memory: Option<Arc<ErrorMemory>>,
}

impl ReactEngine {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        ReactEngine {
            llm,
            tools,
            config,
            temperature: 0.2,
            context: None,
            suggestions: SuggestionQueue::new(),
            error_memory: None,
        }
    }

    /// Attach a conversation context for history injection and persistence.
    pub fn with_context(mut self, context: SharedContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach the offline error-memory store.
    pub fn with_error_memory(mut self, memory: Arc<ErrorMemory>) -> Self {
        self.error_memory = Some(memory);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Shared handle for injecting suggestions mid-run.
    pub fn suggestions(&self) -> SuggestionQueue {
        self.suggestions.clone()
    }

    /// Run the ReAct loop for a task.
    pub async fn run(
        &self,
        task: &str,
        sink: &dyn EventSink,
        mut cancel: CancelToken,
    ) -> RunOutcome {
        self.run_with(task, RunOptions::default(), sink, &mut cancel)
            .await
    }

    /// Run with explicit options. One call equals one task execution.
    pub async fn run_with(
        &self,
        task: &str,
        options: RunOptions,
        sink: &dyn EventSink,
        cancel: &mut CancelToken,
    ) -> RunOutcome {
        let mut state = AgentState::new(task);
        let mut react_steps: Vec<ReactStep> = Vec::new();
        let mut loop_guard = LoopGuard::new(self.config.loop_detection_threshold);
        let mut recovery = RecoveryManager::new(self.config.recovery_max_retries);
        let max_iterations = options.max_iterations.unwrap_or(self.config.max_iterations);

        let mut messages = self.build_initial_messages(task, options.extra_system.as_deref());
        let mut termination = Termination::Completed;

        'run: while state.iteration < max_iterations && !state.is_complete {
            if cancel.is_cancelled() {
                self.interrupt(&mut state, sink).await;
                termination = Termination::Interrupted;
                break;
            }

            state.iteration += 1;

            for suggestion in self.suggestions.drain() {
                info!("Applying user suggestion");
                messages.push(ChatMessage::user(format!("[USER SUGGESTION] {}", suggestion)));
            }

            sink.emit(AgentEvent::Status {
                status: EngineStatus::Thinking,
            })
            .await;

            // --- LLM call, bounded and cancellable -------------------------
            let response = {
                let chat = self.llm.chat(&messages, self.temperature, None);
                tokio::select! {
                    result = tokio::time::timeout(self.config.llm_call_timeout, chat) => result,
                    _ = cancel.cancelled() => {
                        self.interrupt(&mut state, sink).await;
                        termination = Termination::Interrupted;
                        break 'run;
                    }
                }
            };

            let response = match response {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!("LLM call failed: {}", e);
                    sink.emit(AgentEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                    react_steps.push(ReactStep::Error {
                        content: e.to_string(),
                    });
                    state.set_final_answer(&format!("LLM error: {}", e));
                    termination = Termination::Failed;
                    break;
                }
                Err(_) => {
                    warn!("LLM call timed out");
                    sink.emit(AgentEvent::Error {
                        message: "LLM timeout".to_string(),
                    })
                    .await;
                    react_steps.push(ReactStep::Error {
                        content: "LLM timeout".to_string(),
                    });
                    state.set_final_answer(TIMEOUT_ANSWER);
                    termination = Termination::Failed;
                    break;
                }
            };

            if cancel.is_cancelled() {
                self.interrupt(&mut state, sink).await;
                termination = Termination::Interrupted;
                break;
            }

            // --- Thought ---------------------------------------------------
            if let Some(thought) = parse_thought(&response) {
                state.add_thought(&thought);
                messages.push(ChatMessage::assistant(format!("Thought: {}", thought)));
                react_steps.push(ReactStep::Thought {
                    content: thought.clone(),
                });
                sink.emit(AgentEvent::Thought { content: thought }).await;
            }

            // --- Action ----------------------------------------------------
            match parse_action(&response) {
                ParsedAction::FinalAnswer(answer) => {
                    // Completion always carries a non-empty answer.
                    let answer = if answer.is_empty() {
                        "Task completed.".to_string()
                    } else {
                        answer
                    };
                    state.set_final_answer(&answer);
                    react_steps.push(ReactStep::FinalAnswer {
                        content: answer.clone(),
                    });
                    sink.emit(AgentEvent::FinalAnswer { content: answer }).await;
                    break;
                }
                ParsedAction::ToolCall { name, params } if self.tools.contains(&name) => {
                    match loop_guard.record(&name, &params) {
                        LoopVerdict::Proceed => {}
                        LoopVerdict::Warn => {
                            let observation = LoopGuard::warning_observation(&name);
                            warn!("Loop guard warning for {}", name);
                            state.add_observation(&observation);
                            messages.push(ChatMessage::user(format!(
                                "Observation: {}",
                                observation
                            )));
                            react_steps.push(ReactStep::Observation {
                                content: observation,
                                file_created: None,
                            });
                            continue;
                        }
                        LoopVerdict::Abort => {
                            let answer = LoopGuard::abort_answer(&name);
                            warn!("Loop guard abort for {}", name);
                            state.set_final_answer(&answer);
                            react_steps.push(ReactStep::FinalAnswer {
                                content: answer.clone(),
                            });
                            sink.emit(AgentEvent::FinalAnswer { content: answer }).await;
                            break;
                        }
                    }

                    if cancel.is_cancelled() {
                        self.interrupt(&mut state, sink).await;
                        termination = Termination::Interrupted;
                        break;
                    }

                    let action_payload =
                        serde_json::to_string(&params).unwrap_or_else(|_| "{}".to_string());
                    state.add_action(&format!("{}({})", name, action_payload));
                    messages.push(ChatMessage::assistant(format!(
                        "Action: {}({})",
                        name, action_payload
                    )));
                    react_steps.push(ReactStep::Action {
                        tool: name.clone(),
                        params: params.clone(),
                    });

                    sink.emit(AgentEvent::Activity {
                        activity_type: activity_type(&name).to_string(),
                        tool: name.clone(),
                        params: Some(params.clone()),
                        result: None,
                        error: None,
                        status: ActivityStatus::Running,
                        file_created: None,
                    })
                    .await;

                    let observation = match self.dispatch(&name, params.clone(), cancel).await {
                        Dispatch::Done(observation) => observation,
                        Dispatch::Cancelled => {
                            self.interrupt(&mut state, sink).await;
                            termination = Termination::Interrupted;
                            break 'run;
                        }
                    };

                    self.ingest_observation(
                        &name,
                        &params,
                        observation.clone(),
                        &mut state,
                        &mut messages,
                        &mut react_steps,
                        sink,
                    )
                    .await;

                    // --- Self-healing ---------------------------------------
                    if observation.starts_with("Error") {
                        if let Some(action) =
                            recovery.analyze(&observation, &name, Some(&params))
                        {
                            self.heal_and_retry(
                                action,
                                &name,
                                &params,
                                &observation,
                                &mut recovery,
                                &mut state,
                                &mut messages,
                                &mut react_steps,
                                sink,
                                cancel,
                            )
                            .await;
                            if cancel.is_cancelled() {
                                self.interrupt(&mut state, sink).await;
                                termination = Termination::Interrupted;
                                break 'run;
                            }
                        }
                    }
                }
                _ => {
                    // Unknown tool or unparseable action: tell the model the
                    // exact format. Does not consume a loop-detection slot.
                    state.add_observation(INVALID_ACTION_OBSERVATION);
                    messages.push(ChatMessage::user(format!(
                        "Observation: {}",
                        INVALID_ACTION_OBSERVATION
                    )));
                }
            }
        }

        if !state.is_complete && state.iteration >= max_iterations {
            state.set_final_answer(MAX_ITERATIONS_ANSWER);
            react_steps.push(ReactStep::FinalAnswer {
                content: MAX_ITERATIONS_ANSWER.to_string(),
            });
            sink.emit(AgentEvent::FinalAnswer {
                content: MAX_ITERATIONS_ANSWER.to_string(),
            })
            .await;
        }

        if !options.transient {
            if let Some(ref context) = self.context {
                if let Ok(mut context) = context.lock() {
                    context.add_user_message(task);
                    context.add_assistant_message(&state.final_answer, react_steps.clone());
                }
            }
        }

        info!(
            "Engine run finished: termination={:?}, iterations={}",
            termination, state.iteration
        );

        RunOutcome {
            state,
            termination,
            react_steps,
        }
    }

    fn build_initial_messages(&self, task: &str, extra_system: Option<&str>) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.build_system_prompt())];

        if let Some(ref context) = self.context {
            if let Ok(context) = context.lock() {
                let history = context.recent_messages(5);
                if !history.is_empty() {
                    let lines: Vec<String> = history
                        .iter()
                        .map(|m| {
                            if m.content.len() > 200 {
                                format!("{}: {}...", m.role, truncate(&m.content, 200))
                            } else {
                                format!("{}: {}", m.role, m.content)
                            }
                        })
                        .collect();
                    messages.push(ChatMessage::system(format!(
                        "Previous conversation context:\n{}",
                        lines.join("\n")
                    )));
                }
            }
        }

        if let Some(extra) = extra_system {
            messages.push(ChatMessage::system(extra));
        }

        messages.push(ChatMessage::user(format!("Task: {}", task)));
        messages
    }

    fn build_system_prompt(&self) -> String {
        let tool_lines: Vec<String> = self
            .tools
            .schema()
            .into_iter()
            .map(|schema| {
                format!(
                    "- {}: {}\n  Params: {}",
                    schema.name, schema.description, schema.parameters
                )
            })
            .collect();

        format!(
            "You are a helpful AI assistant that uses the ReAct framework.\n\n\
             IMPORTANT: For complex tasks (tasks requiring multiple steps, file creation, \
             code execution, or any non-trivial work), you MUST first create a detailed plan \
             in your Thought. Break down the task into clear, sequential steps. \
             Then execute each step using tools.\n\n\
             Available tools:\n{}\n\n\
             Follow this format strictly:\n\
             Thought: <your reasoning - for complex tasks, create a detailed plan here>\n\
             Action: tool_name({{\"param\": \"value\"}})\n\
             Observation: <result>\n\
             ...\n\
             When done, respond with:\n\
             Action: Final Answer: <your final answer>\n\n\
             RULES:\n\
             1. Always think before acting\n\
             2. For complex tasks, create a plan first\n\
             3. Execute one action at a time\n\
             4. Use tools to accomplish tasks - don't just describe what you would do\n\
             5. Save important outputs using save_output tool\n",
            tool_lines.join("\n")
        )
    }

    async fn interrupt(&self, state: &mut AgentState, sink: &dyn EventSink) {
        sink.emit(AgentEvent::Interrupted).await;
        if !state.is_complete {
            state.set_final_answer(INTERRUPTED_ANSWER);
        }
    }

    /// Execute a tool with the per-tool timeout, checking for cancellation.
    async fn dispatch(&self, name: &str, params: Value, cancel: &mut CancelToken) -> Dispatch {
        let execute = self.tools.execute(name, params);
        let result = tokio::select! {
            result = tokio::time::timeout(self.config.tool_call_timeout, execute) => result,
            _ = cancel.cancelled() => return Dispatch::Cancelled,
        };

        match result {
            Ok(observation) => {
                if cancel.is_cancelled() {
                    Dispatch::Cancelled
                } else {
                    Dispatch::Done(observation)
                }
            }
            Err(_) => {
                let minutes = self.config.tool_call_timeout.as_secs() / 60;
                Dispatch::Done(format!("Tool {} timed out after {} minutes", name, minutes))
            }
        }
    }

    /// Record an observation everywhere it belongs and emit its activity.
    #[allow(clippy::too_many_arguments)]
    async fn ingest_observation(
        &self,
        tool: &str,
        params: &Value,
        observation: String,
        state: &mut AgentState,
        messages: &mut Vec<ChatMessage>,
        react_steps: &mut Vec<ReactStep>,
        sink: &dyn EventSink,
    ) {
        state.add_observation(&observation);
        messages.push(ChatMessage::user(format!("Observation: {}", observation)));

        let file_created = file_created_from(tool, params, &observation);
        react_steps.push(ReactStep::Observation {
            content: observation.clone(),
            file_created: file_created.clone(),
        });

        if observation.starts_with("Error") {
            sink.emit(AgentEvent::Activity {
                activity_type: activity_type(tool).to_string(),
                tool: tool.to_string(),
                params: None,
                result: None,
                error: Some(truncate(&observation, 500)),
                status: ActivityStatus::Failed,
                file_created: None,
            })
            .await;
        } else {
            sink.emit(AgentEvent::Activity {
                activity_type: activity_type(tool).to_string(),
                tool: tool.to_string(),
                params: None,
                result: Some(truncate(&observation, 500)),
                error: None,
                status: ActivityStatus::Completed,
                file_created,
            })
            .await;
        }
    }

    /// Run one recovery action, then retry the original tool once.
    #[allow(clippy::too_many_arguments)]
    async fn heal_and_retry(
        &self,
        action: RecoveryAction,
        tool: &str,
        params: &Value,
        original_error: &str,
        recovery: &mut RecoveryManager,
        state: &mut AgentState,
        messages: &mut Vec<ChatMessage>,
        react_steps: &mut Vec<ReactStep>,
        sink: &dyn EventSink,
        cancel: &mut CancelToken,
    ) {
        info!("Attempting recovery: {}", action.description);
        sink.emit(AgentEvent::Recovery {
            description: action.description.clone(),
        })
        .await;
        react_steps.push(ReactStep::Recovery {
            description: action.description.clone(),
        });

        match action.action_type {
            RecoveryActionType::ExecuteCommand if self.tools.contains("execute_command") => {
                sink.emit(AgentEvent::Activity {
                    activity_type: "terminal".to_string(),
                    tool: "execute_command".to_string(),
                    params: Some(action.params.clone()),
                    result: None,
                    error: None,
                    status: ActivityStatus::Running,
                    file_created: None,
                })
                .await;
                let observation =
                    match self.dispatch("execute_command", action.params.clone(), cancel).await {
                        Dispatch::Done(observation) => observation,
                        Dispatch::Cancelled => return,
                    };
                self.ingest_observation(
                    "execute_command",
                    &action.params,
                    observation,
                    state,
                    messages,
                    react_steps,
                    sink,
                )
                .await;
            }
            RecoveryActionType::RetryWithDelay => {
                let delay = action
                    .params
                    .get("delay_secs")
                    .and_then(|d| d.as_u64())
                    .unwrap_or(2);
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
            RecoveryActionType::NotifyUser | RecoveryActionType::RetryWithTimeout => {
                // Advisory: surface the hint to the model, change nothing.
                messages.push(ChatMessage::user(format!(
                    "[RECOVERY] {}",
                    action.description
                )));
            }
            RecoveryActionType::ExecuteCommand => {
                debug!("execute_command tool not registered; skipping recovery command");
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        // Retry the original action once with the original parameters.
        sink.emit(AgentEvent::Activity {
            activity_type: activity_type(tool).to_string(),
            tool: tool.to_string(),
            params: Some(params.clone()),
            result: None,
            error: None,
            status: ActivityStatus::Running,
            file_created: None,
        })
        .await;
        let retry_observation = match self.dispatch(tool, params.clone(), cancel).await {
            Dispatch::Done(observation) => observation,
            Dispatch::Cancelled => return,
        };
        let retry_succeeded = !retry_observation.starts_with("Error");

        self.ingest_observation(
            tool,
            params,
            retry_observation,
            state,
            messages,
            react_steps,
            sink,
        )
        .await;

        if retry_succeeded {
            let hash = RecoveryManager::error_hash(original_error, tool);
            recovery.record_success(&hash);
        }

        if let Some(ref memory) = self.error_memory {
            memory.record(original_error, &action.description, retry_succeeded);
        }
    }
}

enum Dispatch {
    Done(String),
    Cancelled,
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

pub(crate) enum ParsedAction {
    FinalAnswer(String),
    ToolCall { name: String, params: Value },
    None,
}

fn action_re() -> &'static Regex {
    static ACTION: OnceLock<Regex> = OnceLock::new();
    ACTION.get_or_init(|| Regex::new(r"(?i)action:").unwrap())
}

/// Extract the thought: text after `Thought:` up to the next `Action:` (or
/// the end of the response).
pub(crate) fn parse_thought(response: &str) -> Option<String> {
    static THOUGHT: OnceLock<Regex> = OnceLock::new();
    let thought_re = THOUGHT.get_or_init(|| Regex::new(r"(?i)thought:").unwrap());

    let start = thought_re.find(response)?.end();
    let rest = &response[start..];
    let end = action_re().find(rest).map(|m| m.start()).unwrap_or(rest.len());
    let thought = rest[..end].trim();
    if thought.is_empty() {
        None
    } else {
        Some(thought.to_string())
    }
}

/// Parse the action from an LLM response.
///
/// Exactly one action is honored per response. A `Final Answer:` in any
/// `Action:` line wins over a tool call; otherwise the first tool-shaped
/// action is used. JSON parameter parsing is tolerant: failures become the
/// empty object, because tools validate their own arguments.
pub(crate) fn parse_action(response: &str) -> ParsedAction {
    static TOOL: OnceLock<Regex> = OnceLock::new();
    let tool_re = TOOL.get_or_init(|| Regex::new(r"(?s)^([A-Za-z_]\w*)\s*\((.*)\)").unwrap());

    let mut first_tool: Option<(String, Value)> = None;

    for action_match in action_re().find_iter(response) {
        let text = response[action_match.end()..].trim_start();
        let lower = text.to_lowercase();

        if lower.starts_with("final answer:") {
            let answer = text["final answer:".len()..].trim();
            return ParsedAction::FinalAnswer(answer.to_string());
        }
        if let Some(idx) = find_case_insensitive(text, "final answer:") {
            let answer = text[idx + "final answer:".len()..].trim();
            return ParsedAction::FinalAnswer(answer.to_string());
        }

        if first_tool.is_none() {
            // Prefer a single-line call; fall back to a multi-line capture
            // for JSON parameters that span lines.
            let first_line = text.lines().next().unwrap_or("");
            let captures = tool_re
                .captures(first_line)
                .or_else(|| tool_re.captures(text));
            if let Some(captures) = captures {
                let name = captures.get(1).unwrap().as_str().to_string();
                let raw_params = captures.get(2).unwrap().as_str().trim();
                let params = if raw_params.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(raw_params)
                        .unwrap_or_else(|_| Value::Object(Default::default()))
                };
                first_tool = Some((name, params));
            }
        }
    }

    match first_tool {
        Some((name, params)) => ParsedAction::ToolCall { name, params },
        None => ParsedAction::None,
    }
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_lowercase().find(needle)
}

/// Map a tool name to its activity category for the client.
fn activity_type(tool_name: &str) -> &'static str {
    match tool_name {
        "execute_command" | "terminal" => "terminal",
        "write_file" | "read_file" | "list_directory" | "delete_file" => "file",
        "web_search" | "news_search" | "fetch_webpage" | "http_request" => "search",
        "create_pdf" => "document",
        "calculator" => "compute",
        _ => "tool",
    }
}

fn file_created_from(tool: &str, params: &Value, observation: &str) -> Option<FileCreated> {
    if tool == "write_file" && observation.contains("File written successfully") {
        Some(FileCreated {
            path: params
                .get("file_path")
                .and_then(|p| p.as_str())
                .unwrap_or_default()
                .to_string(),
            content: params
                .get("content")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    } else {
        None
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::MemorySink;
    use crate::agent::signals::cancel_pair;
    use crate::error::{Error, Result};
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // --- test doubles -----------------------------------------------------

    /// LLM that replays a fixed script of responses.
    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(ScriptedLlm {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::Provider("script exhausted".to_string()))
        }
    }

    /// LLM that never answers within any reasonable time.
    struct StallingLlm;

    #[async_trait]
    impl LlmProvider for StallingLlm {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    struct CalculatorStub;

    #[async_trait]
    impl Tool for CalculatorStub {
        fn name(&self) -> &str {
            "calculator"
        }
        fn description(&self) -> &str {
            "calculates"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::success("Result: 345")
        }
    }

    struct ListDirStub;

    #[async_trait]
    impl Tool for ListDirStub {
        fn name(&self) -> &str {
            "list_directory"
        }
        fn description(&self) -> &str {
            "lists"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::success("Directory: .\n\nFILE a.txt")
        }
    }

    /// Tool that fails with a module error until `pip install` has run.
    struct FlakyImportTool {
        healed: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl Tool for FlakyImportTool {
        fn name(&self) -> &str {
            "execute_script"
        }
        fn description(&self) -> &str {
            "runs a script"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            if self.healed.load(Ordering::SeqCst) {
                ToolResult::success("Exit code: 0\nOutput:\nok")
            } else {
                ToolResult::failure("Error: ModuleNotFoundError: No module named 'bs4'")
            }
        }
    }

    struct InstallerShell {
        healed: Arc<std::sync::atomic::AtomicBool>,
        commands: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for InstallerShell {
        fn name(&self) -> &str {
            "execute_command"
        }
        fn description(&self) -> &str {
            "shell"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, args: Value) -> ToolResult {
            let command = args
                .get("command")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string();
            if command.starts_with("pip install") {
                self.healed.store(true, Ordering::SeqCst);
            }
            self.commands.lock().unwrap().push(command);
            ToolResult::success("Exit code: 0")
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow_tool"
        }
        fn description(&self) -> &str {
            "slow"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ToolResult::success("never")
        }
    }

    fn engine(llm: Arc<dyn LlmProvider>, tools: ToolRegistry) -> ReactEngine {
        let mut config = AgentConfig::default();
        config.llm_call_timeout = Duration::from_millis(200);
        config.tool_call_timeout = Duration::from_millis(200);
        ReactEngine::new(llm, Arc::new(tools), config)
    }

    fn count_events(events: &[AgentEvent], predicate: impl Fn(&AgentEvent) -> bool) -> usize {
        events.iter().filter(|e| predicate(e)).count()
    }

    // --- parsing ----------------------------------------------------------

    #[test]
    fn parses_thought_up_to_action() {
        let response = "Thought: I should compute\nthe product.\nAction: calculator({\"expression\": \"15*23\"})";
        assert_eq!(
            parse_thought(response).unwrap(),
            "I should compute\nthe product."
        );
    }

    #[test]
    fn parses_tool_call_with_params() {
        let response = "Action: calculator({\"expression\": \"15 * 23\"})";
        match parse_action(response) {
            ParsedAction::ToolCall { name, params } => {
                assert_eq!(name, "calculator");
                assert_eq!(params["expression"], "15 * 23");
            }
            _ => panic!("expected tool call"),
        }
    }

    #[test]
    fn empty_params_become_empty_object() {
        match parse_action("Action: list_outputs()") {
            ParsedAction::ToolCall { name, params } => {
                assert_eq!(name, "list_outputs");
                assert_eq!(params, serde_json::json!({}));
            }
            _ => panic!("expected tool call"),
        }
    }

    #[test]
    fn malformed_json_params_become_empty_object() {
        match parse_action("Action: web_search({query: unquoted})") {
            ParsedAction::ToolCall { params, .. } => {
                assert_eq!(params, serde_json::json!({}));
            }
            _ => panic!("expected tool call"),
        }
    }

    #[test]
    fn final_answer_parses_case_insensitively() {
        match parse_action("action: FINAL ANSWER: done and dusted") {
            ParsedAction::FinalAnswer(answer) => assert_eq!(answer, "done and dusted"),
            _ => panic!("expected final answer"),
        }
    }

    #[test]
    fn final_answer_wins_over_tool_call() {
        let response = "Action: calculator({\"expression\": \"1\"})\nAction: Final Answer: it is 1";
        match parse_action(response) {
            ParsedAction::FinalAnswer(answer) => assert_eq!(answer, "it is 1"),
            _ => panic!("final answer should win"),
        }
    }

    #[test]
    fn no_action_parses_to_none() {
        assert!(matches!(
            parse_action("Thought: still thinking"),
            ParsedAction::None
        ));
    }

    #[test]
    fn multiline_params_are_accepted() {
        let response = "Action: write_file({\"file_path\": \"a.py\",\n\"content\": \"print(1)\"})";
        match parse_action(response) {
            ParsedAction::ToolCall { name, params } => {
                assert_eq!(name, "write_file");
                assert_eq!(params["file_path"], "a.py");
            }
            _ => panic!("expected tool call"),
        }
    }

    // --- engine scenarios -------------------------------------------------

    #[tokio::test]
    async fn calculator_task_runs_to_final_answer() {
        let llm = ScriptedLlm::new(&[
            "Thought: multiply\nAction: calculator({\"expression\": \"15 * 23\"})",
            "Thought: done\nAction: Final Answer: The answer is 345.",
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorStub);

        let engine = engine(llm, tools);
        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("What is 15 * 23?", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(outcome.state.final_answer.contains("345"));

        let events = sink.events();
        // thinking, thought, activity running, activity completed, thinking,
        // thought, final_answer
        assert_eq!(
            count_events(&events, |e| matches!(e, AgentEvent::FinalAnswer { .. })),
            1
        );
        let running = count_events(&events, |e| {
            matches!(
                e,
                AgentEvent::Activity {
                    status: ActivityStatus::Running,
                    ..
                }
            )
        });
        assert_eq!(running, 1);
        // Thought precedes its activity
        let thought_idx = events
            .iter()
            .position(|e| matches!(e, AgentEvent::Thought { .. }))
            .unwrap();
        let activity_idx = events
            .iter()
            .position(|e| matches!(e, AgentEvent::Activity { .. }))
            .unwrap();
        assert!(thought_idx < activity_idx);
    }

    #[tokio::test]
    async fn unknown_tool_gets_format_observation_and_continues() {
        let llm = ScriptedLlm::new(&[
            "Action: no_such_tool({})",
            "Action: Final Answer: giving up politely",
        ]);
        let engine = engine(llm, ToolRegistry::new());
        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("do something", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(outcome.state.observations[0].contains("Invalid action format"));
        assert_eq!(outcome.state.iteration, 2);
    }

    #[tokio::test]
    async fn llm_timeout_ends_task_with_zero_tool_calls() {
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorStub);
        let engine = engine(Arc::new(StallingLlm), tools);
        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("anything", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Failed);
        assert_eq!(outcome.state.final_answer, TIMEOUT_ANSWER);
        assert_eq!(outcome.state.observations.len(), 0);

        let events = sink.events();
        assert_eq!(
            count_events(&events, |e| matches!(e, AgentEvent::Error { .. })),
            1
        );
        assert_eq!(
            count_events(&events, |e| matches!(e, AgentEvent::Activity { .. })),
            0
        );
    }

    #[tokio::test]
    async fn tool_timeout_surfaces_as_observation_and_continues() {
        let llm = ScriptedLlm::new(&[
            "Action: slow_tool({})",
            "Action: Final Answer: moved on",
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(SlowTool);
        let engine = engine(llm, tools);
        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("run the slow thing", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(outcome.state.observations[0].contains("slow_tool timed out"));
        assert_eq!(outcome.state.final_answer, "moved on");
    }

    #[tokio::test]
    async fn loop_detection_warns_then_aborts() {
        let repeat = "Action: list_directory({\"directory_path\": \".\"})";
        let llm = ScriptedLlm::new(&[repeat, repeat, repeat, repeat]);
        let mut tools = ToolRegistry::new();
        tools.register(ListDirStub);
        let engine = engine(llm, tools);
        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("look around", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(
            outcome.state.final_answer,
            "Task stopped due to repeated actions. Last action: list_directory"
        );

        // Two real dispatches, then a LOOP DETECTED observation, then abort.
        let events = sink.events();
        let running = count_events(&events, |e| {
            matches!(
                e,
                AgentEvent::Activity {
                    status: ActivityStatus::Running,
                    ..
                }
            )
        });
        assert_eq!(running, 2);
        assert!(outcome
            .state
            .observations
            .iter()
            .any(|o| o.contains("LOOP DETECTED")));
    }

    #[tokio::test]
    async fn self_healing_installs_and_retries_once() {
        let healed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let llm = ScriptedLlm::new(&[
            "Action: execute_script({})",
            "Action: Final Answer: recovered and finished",
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(FlakyImportTool {
            healed: healed.clone(),
        });
        tools.register(InstallerShell {
            healed,
            commands: commands.clone(),
        });

        let engine = engine(llm, tools);
        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("run the script", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Completed);

        let events = sink.events();
        let recovery: Vec<&AgentEvent> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Recovery { .. }))
            .collect();
        assert_eq!(recovery.len(), 1);
        if let AgentEvent::Recovery { description } = recovery[0] {
            assert!(description.contains("beautifulsoup4"));
        }

        // The recovery command ran, and the retry of the original tool
        // succeeded.
        assert_eq!(
            commands.lock().unwrap().as_slice(),
            &["pip install beautifulsoup4".to_string()]
        );
        assert!(outcome
            .state
            .observations
            .iter()
            .any(|o| o.contains("Exit code: 0\nOutput:\nok")));
        // steps contain a recovery record
        assert!(outcome
            .react_steps
            .iter()
            .any(|s| matches!(s, ReactStep::Recovery { .. })));
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_emits_interrupted_without_activity() {
        let (handle, cancel) = cancel_pair();
        handle.cancel();

        let llm = ScriptedLlm::new(&["Action: calculator({})"]);
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorStub);
        let engine = engine(llm, tools);
        let sink = MemorySink::new();
        let outcome = engine.run("compute", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Interrupted);
        assert_eq!(outcome.state.final_answer, INTERRUPTED_ANSWER);

        let events = sink.events();
        assert_eq!(
            count_events(&events, |e| matches!(e, AgentEvent::Interrupted)),
            1
        );
        assert_eq!(
            count_events(&events, |e| matches!(e, AgentEvent::Activity { .. })),
            0
        );
    }

    #[tokio::test]
    async fn cancellation_mid_tool_call_unwinds_cleanly() {
        let llm = ScriptedLlm::new(&["Action: slow_tool({})"]);
        let mut tools = ToolRegistry::new();
        tools.register(SlowTool);

        let mut config = AgentConfig::default();
        config.llm_call_timeout = Duration::from_secs(5);
        config.tool_call_timeout = Duration::from_secs(3600);
        let engine = ReactEngine::new(llm, Arc::new(tools), config);
        let suggestions = engine.suggestions();
        drop(suggestions);

        let sink = Arc::new(MemorySink::new());
        let (handle, cancel) = cancel_pair();

        let sink_clone = sink.clone();
        let run = tokio::spawn(async move {
            engine.run("slow", sink_clone.as_ref(), cancel).await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        let outcome = run.await.unwrap();

        assert_eq!(outcome.termination, Termination::Interrupted);
        assert_eq!(outcome.state.final_answer, INTERRUPTED_ANSWER);
        assert_eq!(
            count_events(&sink.events(), |e| matches!(e, AgentEvent::Interrupted)),
            1
        );
    }

    #[tokio::test]
    async fn max_iterations_produces_standard_answer() {
        let llm = ScriptedLlm::new(&["Thought: hmm", "Thought: hmm", "Thought: hmm"]);
        let mut config = AgentConfig::default();
        config.max_iterations = 3;
        config.llm_call_timeout = Duration::from_secs(5);
        let engine = ReactEngine::new(llm, Arc::new(ToolRegistry::new()), config);

        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("impossible", &sink, cancel).await;

        assert_eq!(outcome.state.iteration, 3);
        assert_eq!(outcome.state.final_answer, MAX_ITERATIONS_ANSWER);
        assert_eq!(
            count_events(&sink.events(), |e| matches!(
                e,
                AgentEvent::FinalAnswer { .. }
            )),
            1
        );
    }

    #[tokio::test]
    async fn suggestions_reach_the_next_turn() {
        struct CapturingLlm {
            saw_suggestion: Arc<std::sync::atomic::AtomicBool>,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl LlmProvider for CapturingLlm {
            async fn chat(
                &self,
                messages: &[ChatMessage],
                _temperature: f32,
                _max_tokens: Option<u32>,
            ) -> Result<String> {
                if messages
                    .iter()
                    .any(|m| m.content.contains("[USER SUGGESTION] use wikipedia"))
                {
                    self.saw_suggestion.store(true, Ordering::SeqCst);
                }
                match self.calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok("Thought: thinking".to_string()),
                    _ => Ok("Action: Final Answer: ok".to_string()),
                }
            }
        }

        let saw = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let llm = Arc::new(CapturingLlm {
            saw_suggestion: saw.clone(),
            calls: AtomicUsize::new(0),
        });
        let engine = engine(llm, ToolRegistry::new());
        engine.suggestions().push("use wikipedia".to_string());

        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("task", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Completed);
        assert!(saw.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn conversation_context_gains_two_messages() {
        let dir = tempfile::tempdir().unwrap();
        let context = crate::session::ConversationContext::new(dir.path(), "ctx11111", false)
            .unwrap();
        let context: SharedContext = Arc::new(Mutex::new(context));

        let llm = ScriptedLlm::new(&["Action: Final Answer: hi there"]);
        let engine =
            engine(llm, ToolRegistry::new()).with_context(context.clone());

        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        engine.run("greet me", &sink, cancel).await;

        let context = context.lock().unwrap();
        assert_eq!(context.messages().len(), 2);
        assert_eq!(context.messages()[0].content, "greet me");
        assert_eq!(context.messages()[1].content, "hi there");
        assert!(!context.messages()[1].react_steps.is_empty());
    }

    #[tokio::test]
    async fn write_file_success_attaches_file_created() {
        struct WriteStub;

        #[async_trait]
        impl Tool for WriteStub {
            fn name(&self) -> &str {
                "write_file"
            }
            fn description(&self) -> &str {
                "writes"
            }
            fn parameters_schema(&self) -> Value {
                serde_json::json!({"type": "object"})
            }
            async fn execute(&self, _args: Value) -> ToolResult {
                ToolResult::success("File written successfully: hello.py\nSize: 20 bytes (1 lines)")
            }
        }

        let llm = ScriptedLlm::new(&[
            "Action: write_file({\"file_path\": \"hello.py\", \"content\": \"print('hi')\"})",
            "Action: Final Answer: created hello.py",
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(WriteStub);
        let engine = engine(llm, tools);
        let sink = MemorySink::new();
        let (_handle, cancel) = cancel_pair();
        let outcome = engine.run("create hello.py", &sink, cancel).await;

        assert_eq!(outcome.termination, Termination::Completed);
        let events = sink.events();
        let completed = events.iter().find(|e| {
            matches!(
                e,
                AgentEvent::Activity {
                    status: ActivityStatus::Completed,
                    ..
                }
            )
        });
        match completed {
            Some(AgentEvent::Activity {
                file_created: Some(file),
                ..
            }) => {
                assert_eq!(file.path, "hello.py");
                assert!(file.content.contains("print"));
            }
            other => panic!("expected completed activity with file_created, got {:?}", other),
        }
    }
}
