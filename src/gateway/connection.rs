//! Per-socket connection handling
//!
//! One long-lived bidirectional channel per session. Session binding is
//! lazy: the socket is accepted immediately and the sandbox only starts on
//! the first message that needs it. One task runs at a time per session;
//! control messages (interrupt, suggestion, plan updates, pause/resume)
//! are accepted while a task runs.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use crate::agent::client::{LlmClient, LlmProvider};
use crate::agent::events::{AgentEvent, EngineStatus, EventSink};
use crate::agent::memory::ErrorMemory;
use crate::agent::orchestrator::{ExecutionMode, Orchestrator};
use crate::agent::planner::{
    classify_task, phase_plan_from_value, PhasePlan, Planner, PlanStatus, TaskComplexity,
};
use crate::agent::react::{ReactEngine, RunOptions, SuggestionQueue, Termination};
use crate::agent::signals::{cancel_pair, pause_pair, CancelHandle, PauseHandle};
use crate::config::Config;
use crate::error::Result;
use crate::gateway::protocol::{ClientMessage, ConnectionEvent, ServerMessage};
use crate::session::{Session, SessionManager};
use crate::tools::{session_registry, ToolRegistry};

/// Creates or resumes sessions on first use. A seam so transports can be
/// exercised without a container runtime.
#[async_trait]
pub trait SessionBinder: Send + Sync {
    async fn bind(&self, config: &Config, requested: Option<&str>) -> Result<Session>;
}

/// Production binder: resume when the id exists, create otherwise. Starts
/// the session sandbox; a missing container runtime surfaces as an error
/// and the session stays unbound.
pub struct SandboxSessionBinder {
    manager: SessionManager,
}

#[async_trait]
impl SessionBinder for SandboxSessionBinder {
    async fn bind(&self, config: &Config, requested: Option<&str>) -> Result<Session> {
        match requested {
            Some(session_id) if self.manager.session_exists(session_id) => {
                Session::resume(config, session_id).await
            }
            _ => Session::create_new(config).await,
        }
    }
}

/// Shared gateway state (socket handlers and REST routes)
pub struct GatewayState {
    pub config: Config,
    pub manager: SessionManager,
    pub llm: Arc<dyn LlmProvider>,
    pub error_memory: Arc<ErrorMemory>,
    pub binder: Arc<dyn SessionBinder>,
}

impl GatewayState {
    /// Build state with the configured HTTP LLM client.
    pub fn new(config: Config) -> Result<Self> {
        let llm: Arc<dyn LlmProvider> = Arc::new(LlmClient::new(config.provider.clone())?);
        Self::with_llm(config, llm)
    }

    /// Build state with an explicit LLM (tests, embedders).
    pub fn with_llm(config: Config, llm: Arc<dyn LlmProvider>) -> Result<Self> {
        let manager = SessionManager::new(&config)?;
        let binder = Arc::new(SandboxSessionBinder {
            manager: SessionManager::new(&config)?,
        });
        let error_memory = Arc::new(ErrorMemory::open(
            config.sandbox.workspace_root.join("error_memory.json"),
        ));
        Ok(GatewayState {
            config,
            manager,
            llm,
            error_memory,
            binder,
        })
    }

    /// Swap the session binder (tests).
    pub fn with_binder(mut self, binder: Arc<dyn SessionBinder>) -> Self {
        self.binder = binder;
        self
    }
}

/// Event sink that forwards engine events into the outbound channel.
struct ChannelSink {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: AgentEvent) {
        let _ = self.tx.send(ServerMessage::Agent(event));
    }
}

/// Mutable task state shared between the reader loop and running tasks.
#[derive(Default)]
struct TaskSlot {
    is_processing: bool,
    cancel: Option<CancelHandle>,
    suggestions: Option<SuggestionQueue>,
    pending_plan: Option<PhasePlan>,
    pending_task: Option<String>,
}

/// State machine for one connection.
pub struct Connection {
    state: Arc<GatewayState>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    requested_session: Option<String>,
    session: Option<Arc<Session>>,
    registry: Option<Arc<ToolRegistry>>,
    slot: Arc<TokioMutex<TaskSlot>>,
    pause: PauseHandle,
}

impl Connection {
    pub fn new(
        state: Arc<GatewayState>,
        tx: mpsc::UnboundedSender<ServerMessage>,
        requested_session: Option<String>,
    ) -> Self {
        let (pause, _token) = pause_pair();
        Connection {
            state,
            tx,
            requested_session,
            session: None,
            registry: None,
            slot: Arc::new(TokioMutex::new(TaskSlot::default())),
            pause,
        }
    }

    /// First frame on every socket, before any session exists.
    pub fn send_connected(&self) {
        self.send(ConnectionEvent::Connected {
            session_id: self.requested_session.clone().unwrap_or_default(),
            workspace: String::new(),
        });
    }

    fn send(&self, event: impl Into<ServerMessage>) {
        let _ = self.tx.send(event.into());
    }

    fn send_error(&self, message: impl Into<String>) {
        self.send(AgentEvent::Error {
            message: message.into(),
        });
    }

    /// Bind a session lazily: resume when the requested id exists,
    /// otherwise create a fresh one.
    async fn ensure_session(&mut self) -> bool {
        if self.session.is_some() {
            return true;
        }
        self.send(ConnectionEvent::Initializing);

        let result = self
            .state
            .binder
            .bind(&self.state.config, self.requested_session.as_deref())
            .await;

        let session = match result {
            Ok(session) => Arc::new(session),
            Err(e) => {
                warn!("Session bind failed: {}", e);
                self.send_error(e.to_string());
                return false;
            }
        };

        let registry = Arc::new(session_registry(
            session.container.clone(),
            session.context.clone(),
        ));

        self.send(ConnectionEvent::SessionReady {
            session_id: session.session_id.clone(),
            workspace: session.workspace_dir().display().to_string(),
        });
        self.session = Some(session);
        self.registry = Some(registry);
        true
    }

    /// A frame that did not parse as any known message kind.
    pub fn handle_invalid_frame(&self) {
        self.send_error("Unknown message type");
    }

    /// Handle one client message.
    pub async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Chat { content } => self.on_chat(content).await,
            ClientMessage::RequestPlan { content } => self.on_request_plan(content).await,
            ClientMessage::ApprovePlan => self.on_approve_plan().await,
            ClientMessage::UpdatePlan { plan } => self.on_update_plan(plan).await,
            ClientMessage::Interrupt => self.on_interrupt().await,
            ClientMessage::Suggestion { content } => self.on_suggestion(content).await,
            // The orchestrator observes the flag at step boundaries and
            // emits project_paused / project_resumed itself.
            ClientMessage::PauseExecution => self.pause.pause(),
            ClientMessage::ResumeExecution => self.pause.resume(),
        }
    }

    async fn on_chat(&mut self, content: String) {
        if content.is_empty() {
            self.send_error("Empty message");
            return;
        }
        if self.slot.lock().await.is_processing {
            self.send_error("Agent is already processing");
            return;
        }
        if !self.ensure_session().await {
            return;
        }

        let pending_plan = self.slot.lock().await.pending_plan.clone();
        if classify_task(&content) == TaskComplexity::Complex && pending_plan.is_none() {
            self.propose_plan(content).await;
            return;
        }

        // A pending (approved or not) plan frames the run.
        let extra_system = pending_plan.map(|plan| {
            format!(
                "You are executing this plan:\n{}\n\nExecute the tasks in order. \
                 Do not propose a new plan.",
                serde_json::to_string_pretty(&plan).unwrap_or_default()
            )
        });
        self.spawn_direct(content, extra_system).await;
    }

    async fn on_request_plan(&mut self, content: String) {
        if content.is_empty() {
            self.send_error("Empty message");
            return;
        }
        if self.slot.lock().await.is_processing {
            self.send_error("Agent is already processing");
            return;
        }
        if !self.ensure_session().await {
            return;
        }
        self.propose_plan(content).await;
    }

    async fn propose_plan(&mut self, task: String) {
        self.send(AgentEvent::Status {
            status: EngineStatus::Planning,
        });

        let registry = self.registry.as_ref().expect("session bound");
        let planner = Planner::new(self.state.llm.clone(), registry.description_lines());
        let plan = planner.propose_phase_plan(&task).await;

        {
            let mut slot = self.slot.lock().await;
            slot.pending_plan = Some(plan.clone());
            slot.pending_task = Some(task);
        }

        self.send(ConnectionEvent::PlanProposal {
            plan,
            message: "I've created an execution plan for your task. You can modify it \
                      or approve to start."
                .to_string(),
        });
    }

    async fn on_approve_plan(&mut self) {
        let (plan, task) = {
            let mut slot = self.slot.lock().await;
            if slot.is_processing {
                self.send_error("Agent is already processing");
                return;
            }
            let Some(mut plan) = slot.pending_plan.take() else {
                self.send_error("No plan to approve");
                return;
            };
            let Some(task) = slot.pending_task.take() else {
                slot.pending_plan = Some(plan);
                self.send_error("No plan to approve");
                return;
            };
            plan.status = PlanStatus::Approved;
            (plan, task)
        };

        if !self.ensure_session().await {
            return;
        }

        self.send(AgentEvent::Status {
            status: EngineStatus::Working,
        });
        self.send(ConnectionEvent::PlanStarted { plan });
        self.spawn_planned(task).await;
    }

    async fn on_update_plan(&mut self, plan: serde_json::Value) {
        let mut slot = self.slot.lock().await;
        if slot.pending_plan.is_none() {
            self.send_error("No plan to update");
            return;
        }

        let updated = serde_json::from_value::<PhasePlan>(plan.clone())
            .unwrap_or_else(|_| phase_plan_from_value(&plan));
        slot.pending_plan = Some(updated.clone());
        drop(slot);

        self.send(ConnectionEvent::PlanUpdated { plan: updated });
    }

    async fn on_interrupt(&mut self) {
        let slot = self.slot.lock().await;
        if let Some(ref cancel) = slot.cancel {
            cancel.cancel();
        }
        drop(slot);
        self.send(ConnectionEvent::Interrupting);
    }

    async fn on_suggestion(&mut self, content: String) {
        if content.is_empty() {
            return;
        }
        let slot = self.slot.lock().await;
        if slot.is_processing {
            if let Some(ref suggestions) = slot.suggestions {
                suggestions.push(content.clone());
                drop(slot);
                self.send(ConnectionEvent::SuggestionReceived {
                    content,
                    status: "queued".to_string(),
                });
            }
        }
    }

    fn build_engine(&self) -> ReactEngine {
        let session = self.session.as_ref().expect("session bound");
        let registry = self.registry.as_ref().expect("session bound");
        ReactEngine::new(
            self.state.llm.clone(),
            registry.clone(),
            self.state.config.agent.clone(),
        )
        .with_context(session.context.clone())
        .with_error_memory(self.state.error_memory.clone())
        .with_temperature(self.state.config.provider.temperature)
    }

    /// Run a chat task straight through the engine.
    async fn spawn_direct(&mut self, task: String, extra_system: Option<String>) {
        let engine = self.build_engine();
        let (cancel_handle, mut cancel_token) = cancel_pair();
        let suggestions = engine.suggestions();

        {
            let mut slot = self.slot.lock().await;
            slot.is_processing = true;
            slot.cancel = Some(cancel_handle);
            slot.suggestions = Some(suggestions);
        }

        let tx = self.tx.clone();
        let slot = self.slot.clone();
        tokio::spawn(async move {
            let sink = ChannelSink { tx: tx.clone() };
            sink.emit(AgentEvent::Status {
                status: EngineStatus::Working,
            })
            .await;

            let options = RunOptions {
                extra_system,
                ..Default::default()
            };
            let outcome = engine
                .run_with(&task, options, &sink, &mut cancel_token)
                .await;

            if outcome.termination == Termination::Completed {
                sink.emit(AgentEvent::Complete { task }).await;
            }

            let mut slot = slot.lock().await;
            slot.is_processing = false;
            slot.cancel = None;
            slot.suggestions = None;
            if let Some(ref mut plan) = slot.pending_plan {
                plan.status = PlanStatus::Completed;
            }
        });
    }

    /// Run an approved task through the planned orchestrator.
    async fn spawn_planned(&mut self, task: String) {
        let engine = self.build_engine();
        let registry = self.registry.as_ref().expect("session bound");
        let planner = Planner::new(self.state.llm.clone(), registry.description_lines());
        let orchestrator = Orchestrator::new(engine, planner, ExecutionMode::Planned)
            .with_pause(self.pause.token());

        let (cancel_handle, mut cancel_token) = cancel_pair();
        let suggestions = orchestrator.engine().suggestions();
        {
            let mut slot = self.slot.lock().await;
            slot.is_processing = true;
            slot.cancel = Some(cancel_handle);
            slot.suggestions = Some(suggestions);
        }

        let tx = self.tx.clone();
        let slot = self.slot.clone();
        tokio::spawn(async move {
            let sink = ChannelSink { tx: tx.clone() };
            let result = orchestrator.execute(&task, &sink, &mut cancel_token).await;

            if !result.interrupted {
                sink.emit(AgentEvent::Complete { task }).await;
            }

            let mut slot = slot.lock().await;
            slot.is_processing = false;
            slot.cancel = None;
            slot.suggestions = None;
        });
    }

    /// Cancel any running task and close the session. Called on the socket
    /// teardown path.
    pub async fn shutdown(&mut self) {
        {
            let slot = self.slot.lock().await;
            if let Some(ref cancel) = slot.cancel {
                cancel.cancel();
            }
        }
        if let Some(ref session) = self.session {
            info!("Closing session {}", session.session_id);
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::ChatMessage;
    use crate::error::Result as CrateResult;
    use std::time::Duration;

    struct ScriptedLlm {
        responses: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(ScriptedLlm {
                responses: std::sync::Mutex::new(
                    responses.iter().rev().map(|s| s.to_string()).collect(),
                ),
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
        ) -> CrateResult<String> {
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| "Action: Final Answer: fallback".to_string()))
        }
    }

    /// Binds sessions without touching a container runtime.
    struct TestBinder;

    #[async_trait]
    impl SessionBinder for TestBinder {
        async fn bind(&self, config: &Config, requested: Option<&str>) -> Result<Session> {
            let sessions_dir = config.sandbox.sessions_dir();
            let session_id = requested
                .map(|s| s.to_string())
                .unwrap_or_else(crate::session::new_session_id);
            let context = crate::session::ConversationContext::new(
                &sessions_dir,
                &session_id,
                false,
            )?;
            let container = Arc::new(crate::sandbox::WorkspaceContainer::new(
                &session_id,
                context.files_dir().to_path_buf(),
                config.sandbox.clone(),
            ));
            Ok(Session {
                session_id,
                context: Arc::new(std::sync::Mutex::new(context)),
                container,
            })
        }
    }

    fn test_state(llm: Arc<dyn LlmProvider>) -> Arc<GatewayState> {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sandbox.workspace_root = dir.path().to_path_buf();
        // Leak the tempdir so the workspace outlives the test state.
        std::mem::forget(dir);
        Arc::new(
            GatewayState::with_llm(config, llm)
                .unwrap()
                .with_binder(Arc::new(TestBinder)),
        )
    }

    async fn drain(
        rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
        wait: Duration,
    ) -> Vec<serde_json::Value> {
        tokio::time::sleep(wait).await;
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::to_value(&frame).unwrap());
        }
        frames
    }

    fn types_of(frames: &[serde_json::Value]) -> Vec<String> {
        frames
            .iter()
            .map(|f| f["type"].as_str().unwrap_or("?").to_string())
            .collect()
    }

    fn complex_task() -> String {
        "Please research and produce a multiple page pdf report with charts and \
         analysis of global solar adoption trends across several regions, compare \
         policies, and include a summary section with key findings for executives"
            .to_string()
    }

    #[tokio::test]
    async fn connected_frame_precedes_everything() {
        let state = test_state(ScriptedLlm::new(&[]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Connection::new(state, tx, None);
        connection.send_connected();

        let frames = drain(&mut rx, Duration::from_millis(10)).await;
        assert_eq!(frames[0]["type"], "connected");
        assert_eq!(frames[0]["workspace"], "");
    }

    #[tokio::test]
    async fn empty_chat_is_rejected() {
        let state = test_state(ScriptedLlm::new(&[]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = Connection::new(state, tx, None);

        connection
            .handle(ClientMessage::Chat {
                content: String::new(),
            })
            .await;

        let frames = drain(&mut rx, Duration::from_millis(10)).await;
        assert_eq!(frames[0]["type"], "error");
        assert_eq!(frames[0]["message"], "Empty message");
    }

    #[tokio::test]
    async fn complex_chat_yields_plan_proposal_without_execution() {
        let plan_json = r#"{"title": "Solar report", "phases": [
            {"name": "Research", "tasks": ["Gather sources", "Collect data"]},
            {"name": "Write", "tasks": ["Draft", "Assemble PDF"]}
        ]}"#;
        let state = test_state(ScriptedLlm::new(&[plan_json]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = Connection::new(state, tx, None);

        connection
            .handle(ClientMessage::Chat {
                content: complex_task(),
            })
            .await;

        let frames = drain(&mut rx, Duration::from_millis(100)).await;
        let kinds = types_of(&frames);
        // Lazy bind happens first, then planning, then the proposal.
        assert!(kinds.contains(&"initializing".to_string()));
        assert!(kinds.contains(&"session_ready".to_string()));
        assert!(kinds.contains(&"status".to_string()));

        let proposal = frames
            .iter()
            .find(|f| f["type"] == "plan_proposal")
            .expect("plan proposal");
        let phases = proposal["plan"]["phases"].as_array().unwrap();
        assert!(phases.len() >= 2 && phases.len() <= 4);

        // No execution happened
        assert!(!kinds.contains(&"activity".to_string()));
        assert!(!kinds.contains(&"final_answer".to_string()));
    }

    #[tokio::test]
    async fn update_plan_before_approval_replaces_plan() {
        let plan_json = r#"{"title": "Original", "phases": [
            {"name": "One", "tasks": ["a"]},
            {"name": "Two", "tasks": ["b"]}
        ]}"#;
        let state = test_state(ScriptedLlm::new(&[plan_json]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = Connection::new(state, tx, None);

        connection
            .handle(ClientMessage::Chat {
                content: complex_task(),
            })
            .await;
        drain(&mut rx, Duration::from_millis(100)).await;

        connection
            .handle(ClientMessage::UpdatePlan {
                plan: serde_json::json!({
                    "title": "Edited",
                    "phases": [{"name": "Only", "tasks": ["do it"]}]
                }),
            })
            .await;

        let frames = drain(&mut rx, Duration::from_millis(50)).await;
        let updated = frames
            .iter()
            .find(|f| f["type"] == "plan_updated")
            .expect("plan_updated");
        assert_eq!(updated["plan"]["title"], "Edited");
    }

    #[tokio::test]
    async fn update_without_pending_plan_errors() {
        let state = test_state(ScriptedLlm::new(&[]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = Connection::new(state, tx, None);

        connection
            .handle(ClientMessage::UpdatePlan {
                plan: serde_json::json!({"title": "x"}),
            })
            .await;

        let frames = drain(&mut rx, Duration::from_millis(10)).await;
        assert_eq!(frames[0]["type"], "error");
    }

    #[tokio::test]
    async fn approve_without_plan_errors() {
        let state = test_state(ScriptedLlm::new(&[]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = Connection::new(state, tx, None);

        connection.handle(ClientMessage::ApprovePlan).await;
        let frames = drain(&mut rx, Duration::from_millis(10)).await;
        assert_eq!(frames[0]["type"], "error");
        assert_eq!(frames[0]["message"], "No plan to approve");
    }

    #[tokio::test]
    async fn simple_chat_runs_to_completion() {
        let state = test_state(ScriptedLlm::new(&[
            "Thought: easy\nAction: Final Answer: 345",
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = Connection::new(state, tx, None);

        connection
            .handle(ClientMessage::Chat {
                content: "what is 15 times 23".to_string(),
            })
            .await;

        let frames = drain(&mut rx, Duration::from_millis(300)).await;
        let kinds = types_of(&frames);
        assert!(kinds.contains(&"session_ready".to_string()));
        assert!(kinds.contains(&"thought".to_string()));

        let final_idx = kinds.iter().position(|k| k == "final_answer").unwrap();
        let complete_idx = kinds.iter().position(|k| k == "complete").unwrap();
        assert!(final_idx < complete_idx);

        // Only `complete` follows the final answer.
        assert!(kinds[final_idx + 1..]
            .iter()
            .all(|k| k == "complete"));
    }

    #[tokio::test]
    async fn busy_connection_rejects_second_chat_but_accepts_interrupt() {
        struct StallingLlm;
        #[async_trait]
        impl LlmProvider for StallingLlm {
            async fn chat(
                &self,
                _messages: &[ChatMessage],
                _temperature: f32,
                _max_tokens: Option<u32>,
            ) -> CrateResult<String> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }

        let state = test_state(Arc::new(StallingLlm));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = Connection::new(state, tx, None);

        connection
            .handle(ClientMessage::Chat {
                content: "first".to_string(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        connection
            .handle(ClientMessage::Chat {
                content: "second".to_string(),
            })
            .await;
        let frames = drain(&mut rx, Duration::from_millis(50)).await;
        assert!(frames
            .iter()
            .any(|f| f["type"] == "error" && f["message"] == "Agent is already processing"));

        connection.handle(ClientMessage::Interrupt).await;
        let frames = drain(&mut rx, Duration::from_millis(200)).await;
        let kinds = types_of(&frames);
        assert!(kinds.contains(&"interrupting".to_string()));
        assert!(kinds.contains(&"interrupted".to_string()));

        // The slot is free again.
        connection
            .handle(ClientMessage::Chat {
                content: "third".to_string(),
            })
            .await;
        let frames = drain(&mut rx, Duration::from_millis(50)).await;
        assert!(!frames
            .iter()
            .any(|f| f["type"] == "error" && f["message"] == "Agent is already processing"));
    }
}
