//! Plan-gated task orchestration
//!
//! Wraps the ReAct engine with planning: analyze complexity, synthesize a
//! plan, optionally wait for user approval, then execute step by step with
//! dependency tracking and per-step iteration budgets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::agent::events::{AgentEvent, EngineStatus, EventSink};
use crate::agent::planner::{classify_task, estimate_complexity, Plan, Planner, TaskComplexity};
use crate::agent::react::{ReactEngine, RunOptions, Termination, INTERRUPTED_ANSWER};
use crate::agent::signals::{CancelToken, PauseToken};
use crate::agent::types::ReactStep;
use crate::agent::validator::{OutputValidator, TaskValidator, ValidationStatus};

/// Poll interval while execution is paused
const PAUSE_POLL: Duration = Duration::from_millis(500);

/// Execution modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run the engine directly with a short iteration cap
    Direct,
    /// Plan, then execute step by step
    Planned,
    /// Plan, wait for approval, then execute step by step
    Interactive,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Direct => "direct",
            ExecutionMode::Planned => "planned",
            ExecutionMode::Interactive => "interactive",
        }
    }
}

/// Iteration cap for direct mode
const DIRECT_MAX_ITERATIONS: u32 = 20;

/// Result of executing one plan step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step_id: u32,
    pub success: bool,
    pub observation: String,
    pub iterations_used: u32,
    pub validation_status: ValidationStatus,
}

/// Complete execution result
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub task: String,
    pub mode: ExecutionMode,
    pub plan: Option<Plan>,
    pub step_results: Vec<StepResult>,
    pub final_answer: String,
    pub total_iterations: u32,
    pub success: bool,
    pub interrupted: bool,
}

/// Single-shot approval gate for interactive mode. `update_plan` while the
/// gate is open replaces the plan held by the caller; the wait continues.
pub struct ApprovalGate {
    tx: watch::Sender<bool>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        ApprovalGate { tx }
    }

    /// Approve the pending plan.
    pub fn approve(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_approved(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once approved.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates planning, approval, per-step execution, and validation.
pub struct Orchestrator {
    engine: ReactEngine,
    planner: Planner,
    validator: OutputValidator,
    mode: ExecutionMode,
    pause: Option<PauseToken>,
    approval: Option<Arc<ApprovalGate>>,
}

impl Orchestrator {
    pub fn new(engine: ReactEngine, planner: Planner, mode: ExecutionMode) -> Self {
        Orchestrator {
            engine,
            planner,
            validator: OutputValidator::new(),
            mode,
            pause: None,
            approval: None,
        }
    }

    /// Observe a pause flag at step boundaries.
    pub fn with_pause(mut self, pause: PauseToken) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Gate step execution on an approval signal (interactive mode).
    pub fn with_approval(mut self, gate: Arc<ApprovalGate>) -> Self {
        self.approval = Some(gate);
        self
    }

    /// The wrapped engine (suggestion queue access)
    pub fn engine(&self) -> &ReactEngine {
        &self.engine
    }

    /// Execute a task.
    pub async fn execute(
        &self,
        task: &str,
        sink: &dyn EventSink,
        cancel: &mut CancelToken,
    ) -> ExecutionResult {
        let estimate = estimate_complexity(task);
        sink.emit(AgentEvent::ComplexityAssessed {
            complexity: estimate.complexity.as_str().to_string(),
            estimated_iterations: estimate.estimated_iterations,
            needs_planning: estimate.needs_planning,
        })
        .await;

        if classify_task(task) == TaskComplexity::Simple && self.mode != ExecutionMode::Interactive
        {
            self.execute_direct(task, sink, cancel).await
        } else {
            self.execute_planned(task, sink, cancel).await
        }
    }

    async fn execute_direct(
        &self,
        task: &str,
        sink: &dyn EventSink,
        cancel: &mut CancelToken,
    ) -> ExecutionResult {
        let options = RunOptions {
            max_iterations: Some(DIRECT_MAX_ITERATIONS),
            ..Default::default()
        };
        let outcome = self.engine.run_with(task, options, sink, cancel).await;

        ExecutionResult {
            task: task.to_string(),
            mode: ExecutionMode::Direct,
            plan: None,
            step_results: Vec::new(),
            final_answer: outcome.state.final_answer.clone(),
            total_iterations: outcome.state.iteration,
            success: outcome.termination == Termination::Completed,
            interrupted: outcome.termination == Termination::Interrupted,
        }
    }

    async fn execute_planned(
        &self,
        task: &str,
        sink: &dyn EventSink,
        cancel: &mut CancelToken,
    ) -> ExecutionResult {
        sink.emit(AgentEvent::Status {
            status: EngineStatus::Planning,
        })
        .await;
        sink.emit(AgentEvent::PlanningStarted {
            task: task.to_string(),
        })
        .await;

        let plan = self.planner.create_plan(task).await;
        sink.emit(AgentEvent::PlanCreated {
            plan: serde_json::to_value(&plan).unwrap_or_default(),
        })
        .await;

        // Interactive mode blocks on a single approval event before any
        // step executes.
        if self.mode == ExecutionMode::Interactive {
            if let Some(ref gate) = self.approval {
                sink.emit(AgentEvent::PlanPendingApproval {
                    plan: serde_json::Value::String(plan.to_markdown()),
                })
                .await;
                tokio::select! {
                    _ = gate.wait() => {}
                    _ = cancel.cancelled() => {
                        sink.emit(AgentEvent::Interrupted).await;
                        return interrupted_result(task, self.mode, Some(plan));
                    }
                }
            }
        }

        let mut task_validator = TaskValidator::new();
        let mut step_results: Vec<StepResult> = Vec::new();
        let mut total_iterations = 0;
        let mut interrupted = false;

        for step in &plan.steps {
            if self.wait_while_paused(sink, cancel).await.is_err() || cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            let dependencies_met = step.dependencies.iter().all(|dep| {
                step_results
                    .iter()
                    .any(|result| result.step_id == *dep && result.success)
            });
            if !dependencies_met {
                info!("Skipping step {}: dependencies not met", step.id);
                step_results.push(StepResult {
                    step_id: step.id,
                    success: false,
                    observation: "Dependencies not met".to_string(),
                    iterations_used: 0,
                    validation_status: ValidationStatus::Skipped,
                });
                continue;
            }

            sink.emit(AgentEvent::StepStarted {
                step: serde_json::to_value(step).unwrap_or_default(),
            })
            .await;

            let context = step_context(&plan, step.id, &step_results);
            let options = RunOptions {
                max_iterations: Some(step.estimated_iterations.saturating_mul(2).max(1)),
                extra_system: Some(context),
                transient: true,
            };
            let step_sink = StepSink { inner: sink };
            let prompt = format!("Execute this step: {}", step.description);
            let outcome = self
                .engine
                .run_with(&prompt, options, &step_sink, cancel)
                .await;

            if outcome.termination == Termination::Interrupted {
                interrupted = true;
                break;
            }

            let validation_status =
                self.validate_steps(&outcome.react_steps, &mut task_validator);
            let success = outcome.termination == Termination::Completed
                && outcome.state.is_complete
                && !outcome.state.final_answer.starts_with("Maximum iterations")
                && !outcome.state.final_answer.starts_with("Task stopped");

            let observation = outcome
                .state
                .observations
                .last()
                .cloned()
                .unwrap_or_else(|| outcome.state.final_answer.clone());

            let result = StepResult {
                step_id: step.id,
                success,
                observation,
                iterations_used: outcome.state.iteration,
                validation_status,
            };
            total_iterations += result.iterations_used;

            sink.emit(AgentEvent::StepCompleted {
                result: serde_json::json!({
                    "step_id": result.step_id,
                    "success": result.success,
                    "observation": short(&result.observation, 200),
                }),
            })
            .await;

            if !result.success {
                if let Some(ref fallback) = step.fallback {
                    sink.emit(AgentEvent::ExecutingFallback {
                        step_id: step.id,
                        fallback: fallback.clone(),
                    })
                    .await;
                }
            }

            step_results.push(result);
        }

        if interrupted {
            return interrupted_result(task, self.mode, Some(plan));
        }

        let final_answer = compile_final_answer(&plan, &step_results);
        let task_validation = task_validator.assess_task_completion();
        let success = task_validation.status == ValidationStatus::Valid;

        sink.emit(AgentEvent::FinalAnswer {
            content: final_answer.clone(),
        })
        .await;

        ExecutionResult {
            task: task.to_string(),
            mode: self.mode,
            plan: Some(plan),
            step_results,
            final_answer,
            total_iterations,
            success,
            interrupted: false,
        }
    }

    /// Validate every action/observation pair from a step run.
    fn validate_steps(
        &self,
        react_steps: &[ReactStep],
        task_validator: &mut TaskValidator,
    ) -> ValidationStatus {
        let mut status = ValidationStatus::Skipped;
        let mut pending_action: Option<(&str, &serde_json::Value)> = None;

        for step in react_steps {
            match step {
                ReactStep::Action { tool, params } => {
                    pending_action = Some((tool.as_str(), params));
                }
                ReactStep::Observation { content, .. } => {
                    if let Some((tool, params)) = pending_action.take() {
                        let validation = self.validator.validate(tool, content, params);
                        if validation.status != ValidationStatus::Skipped {
                            status = validation.status;
                        }
                        task_validator.record_action(tool, &validation);
                    }
                }
                _ => {}
            }
        }
        status
    }

    /// Block at a step boundary while paused. Errors when cancelled.
    async fn wait_while_paused(
        &self,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<(), ()> {
        let Some(ref pause) = self.pause else {
            return Ok(());
        };
        if !pause.is_paused() {
            return Ok(());
        }

        warn!("Execution paused");
        sink.emit(AgentEvent::ProjectPaused).await;
        while pause.is_paused() {
            if cancel.is_cancelled() {
                return Err(());
            }
            tokio::time::sleep(PAUSE_POLL).await;
        }
        sink.emit(AgentEvent::ProjectResumed).await;
        Ok(())
    }
}

/// Sink wrapper for step runs: step-level final answers are folded into
/// step results instead of reaching the client.
struct StepSink<'a> {
    inner: &'a dyn EventSink,
}

#[async_trait]
impl EventSink for StepSink<'_> {
    async fn emit(&self, event: AgentEvent) {
        if matches!(event, AgentEvent::FinalAnswer { .. }) {
            return;
        }
        self.inner.emit(event).await;
    }
}

fn interrupted_result(
    task: &str,
    mode: ExecutionMode,
    plan: Option<Plan>,
) -> ExecutionResult {
    ExecutionResult {
        task: task.to_string(),
        mode,
        plan,
        step_results: Vec::new(),
        final_answer: INTERRUPTED_ANSWER.to_string(),
        total_iterations: 0,
        success: false,
        interrupted: true,
    }
}

/// Step-scoped framing injected as a system message.
fn step_context(plan: &Plan, step_id: u32, previous: &[StepResult]) -> String {
    let step = plan
        .steps
        .iter()
        .find(|s| s.id == step_id)
        .expect("step belongs to plan");

    let mut lines = vec![
        format!("OVERALL TASK: {}", plan.task),
        format!(
            "CURRENT STEP: {}/{} - {}",
            step.id,
            plan.steps.len(),
            step.description
        ),
    ];
    if let Some(ref tool) = step.tool {
        lines.push(format!("SUGGESTED TOOL: {}", tool));
    }
    if let Some(ref expected) = step.expected_output {
        lines.push(format!("EXPECTED OUTPUT: {}", expected));
    }
    if !previous.is_empty() {
        lines.push("\nPREVIOUS RESULTS:".to_string());
        for result in previous.iter().rev().take(3).rev() {
            let status = if result.success { "OK" } else { "FAILED" };
            lines.push(format!("  Step {}: {}", result.step_id, status));
        }
    }
    lines.join("\n")
}

/// Compose the planned-mode final answer from step results.
fn compile_final_answer(plan: &Plan, results: &[StepResult]) -> String {
    let successful: Vec<&StepResult> = results.iter().filter(|r| r.success).collect();
    let failed: Vec<&StepResult> = results.iter().filter(|r| !r.success).collect();

    let mut lines = vec![format!("Task: {}", plan.task), String::new()];

    if !successful.is_empty() {
        lines.push("Completed steps:".to_string());
        for result in &successful {
            if let Some(step) = plan.steps.iter().find(|s| s.id == result.step_id) {
                lines.push(format!("  - {}", step.description));
            }
        }
    }

    if !failed.is_empty() {
        lines.push(String::new());
        lines.push("Failed steps:".to_string());
        for result in &failed {
            if let Some(step) = plan.steps.iter().find(|s| s.id == result.step_id) {
                lines.push(format!(
                    "  - {}: {}",
                    step.description,
                    short(&result.observation, 100)
                ));
            }
        }
    }

    for result in &successful {
        if result.observation.contains("Download URL")
            || result.observation.to_lowercase().contains("written")
        {
            lines.push(String::new());
            lines.push(format!("Output: {}", result.observation));
            break;
        }
    }

    lines.join("\n")
}

fn short(s: &str, max: usize) -> String {
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
    use crate::agent::client::LlmProvider;
    use crate::agent::events::MemorySink;
    use crate::agent::signals::{cancel_pair, pause_pair};
    use crate::agent::types::ChatMessage;
    use crate::config::AgentConfig;
    use crate::error::Result;
    use crate::tools::{Tool, ToolRegistry, ToolResult};
    use std::sync::Mutex;

    /// LLM whose reply depends on whether it is planning or executing.
    struct RoutedLlm {
        plan_json: String,
        step_replies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmProvider for RoutedLlm {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<String> {
            let is_planning = messages
                .iter()
                .any(|m| m.content.contains("Planning Agent"));
            if is_planning {
                return Ok(self.plan_json.clone());
            }
            let mut replies = self.step_replies.lock().unwrap();
            if replies.is_empty() {
                Ok("Action: Final Answer: step done".to_string())
            } else {
                Ok(replies.remove(0))
            }
        }
    }

    struct WriteStub;

    #[async_trait]
    impl Tool for WriteStub {
        fn name(&self) -> &str {
            "write_file"
        }
        fn description(&self) -> &str {
            "writes"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: serde_json::Value) -> ToolResult {
            ToolResult::success("File written successfully: out.md\nSize: 5 bytes (1 lines)")
        }
    }

    const TWO_STEP_PLAN: &str = r#"{
        "complexity": "complex",
        "summary": "two steps",
        "steps": [
            {"id": 1, "description": "write the file", "step_type": "file_create",
             "tool": "write_file", "dependencies": [], "estimated_iterations": 2},
            {"id": 2, "description": "verify the file", "step_type": "validate",
             "dependencies": [1], "estimated_iterations": 1}
        ]
    }"#;

    fn orchestrator(llm: Arc<dyn LlmProvider>, mode: ExecutionMode) -> Orchestrator {
        let mut tools = ToolRegistry::new();
        tools.register(WriteStub);
        let tools = Arc::new(tools);

        let mut config = AgentConfig::default();
        config.llm_call_timeout = Duration::from_secs(5);
        config.tool_call_timeout = Duration::from_secs(5);

        let engine = ReactEngine::new(llm.clone(), tools.clone(), config);
        let planner = Planner::new(llm, tools.description_lines());
        Orchestrator::new(engine, planner, mode)
    }

    fn complex_task() -> &'static str {
        "produce a multiple page pdf report with analysis of rust adoption"
    }

    #[tokio::test]
    async fn planned_mode_executes_steps_in_order() {
        let llm = Arc::new(RoutedLlm {
            plan_json: TWO_STEP_PLAN.to_string(),
            step_replies: Mutex::new(vec![
                "Thought: writing\nAction: write_file({\"file_path\": \"out.md\", \"content\": \"hello\"})"
                    .to_string(),
                "Action: Final Answer: file written".to_string(),
                "Action: Final Answer: verified".to_string(),
            ]),
        });

        let orchestrator = orchestrator(llm, ExecutionMode::Planned);
        let sink = MemorySink::new();
        let (_handle, mut cancel) = cancel_pair();
        let result = orchestrator
            .execute(complex_task(), &sink, &mut cancel)
            .await;

        assert_eq!(result.mode, ExecutionMode::Planned);
        assert_eq!(result.step_results.len(), 2);
        assert!(result.step_results.iter().all(|r| r.success));
        assert!(result.final_answer.contains("Completed steps:"));
        assert!(result.final_answer.contains("write the file"));
        // The write observation is surfaced as the Output line
        assert!(result.final_answer.contains("Output:"));

        // Exactly one top-level final answer; step-level ones are folded.
        let finals = sink
            .events()
            .iter()
            .filter(|e| matches!(e, AgentEvent::FinalAnswer { .. }))
            .count();
        assert_eq!(finals, 1);
    }

    #[tokio::test]
    async fn failed_dependency_skips_dependent_step() {
        // Step 1 burns its budget without finishing, so step 2 is skipped.
        let llm = Arc::new(RoutedLlm {
            plan_json: TWO_STEP_PLAN.to_string(),
            step_replies: Mutex::new(vec![
                "Thought: dawdling".to_string(),
                "Thought: dawdling more".to_string(),
                "Thought: dawdling again".to_string(),
                "Thought: still dawdling".to_string(),
            ]),
        });

        let orchestrator = orchestrator(llm, ExecutionMode::Planned);
        let sink = MemorySink::new();
        let (_handle, mut cancel) = cancel_pair();
        let result = orchestrator
            .execute(complex_task(), &sink, &mut cancel)
            .await;

        assert_eq!(result.step_results.len(), 2);
        assert!(!result.step_results[0].success);

        let skipped = &result.step_results[1];
        assert_eq!(skipped.step_id, 2);
        assert_eq!(skipped.iterations_used, 0);
        assert_eq!(skipped.validation_status, ValidationStatus::Skipped);
        assert_eq!(skipped.observation, "Dependencies not met");
        assert!(result.final_answer.contains("Failed steps:"));
    }

    #[tokio::test]
    async fn direct_mode_for_simple_tasks() {
        let llm = Arc::new(RoutedLlm {
            plan_json: String::new(),
            step_replies: Mutex::new(vec![
                "Action: Final Answer: 4".to_string(),
            ]),
        });

        let orchestrator = orchestrator(llm, ExecutionMode::Planned);
        let sink = MemorySink::new();
        let (_handle, mut cancel) = cancel_pair();
        let result = orchestrator.execute("what is 2 + 2", &sink, &mut cancel).await;

        assert_eq!(result.mode, ExecutionMode::Direct);
        assert!(result.plan.is_none());
        assert_eq!(result.final_answer, "4");
        assert!(result.success);
    }

    #[tokio::test]
    async fn interactive_mode_blocks_until_approved() {
        let llm = Arc::new(RoutedLlm {
            plan_json: TWO_STEP_PLAN.to_string(),
            step_replies: Mutex::new(vec![]),
        });

        let gate = Arc::new(ApprovalGate::new());
        let orchestrator =
            orchestrator(llm, ExecutionMode::Interactive).with_approval(gate.clone());
        let sink = Arc::new(MemorySink::new());
        let (_handle, mut cancel) = cancel_pair();

        let sink_clone = sink.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .execute(complex_task(), sink_clone.as_ref(), &mut cancel)
                .await
        });

        // Give the orchestrator time to reach the gate; no step events yet.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let events = sink.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::PlanPendingApproval { .. })));
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::StepStarted { .. })));

        gate.approve();
        let result = run.await.unwrap();
        assert!(!result.interrupted);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, AgentEvent::StepStarted { .. })));
    }

    #[tokio::test]
    async fn cancel_while_awaiting_approval_interrupts() {
        let llm = Arc::new(RoutedLlm {
            plan_json: TWO_STEP_PLAN.to_string(),
            step_replies: Mutex::new(vec![]),
        });

        let gate = Arc::new(ApprovalGate::new());
        let orchestrator =
            orchestrator(llm, ExecutionMode::Interactive).with_approval(gate);
        let sink = Arc::new(MemorySink::new());
        let (handle, mut cancel) = cancel_pair();

        let sink_clone = sink.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .execute(complex_task(), sink_clone.as_ref(), &mut cancel)
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        let result = run.await.unwrap();

        assert!(result.interrupted);
        assert_eq!(result.final_answer, INTERRUPTED_ANSWER);
    }

    #[tokio::test]
    async fn pause_is_honored_at_step_boundaries() {
        let llm = Arc::new(RoutedLlm {
            plan_json: TWO_STEP_PLAN.to_string(),
            step_replies: Mutex::new(vec![
                "Action: Final Answer: step one done".to_string(),
                "Action: Final Answer: step two done".to_string(),
            ]),
        });

        let (pause_handle, pause_token) = pause_pair();
        pause_handle.pause();

        let orchestrator =
            orchestrator(llm, ExecutionMode::Planned).with_pause(pause_token);
        let sink = Arc::new(MemorySink::new());
        let (_cancel_handle, mut cancel) = cancel_pair();

        let sink_clone = sink.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .execute(complex_task(), sink_clone.as_ref(), &mut cancel)
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, AgentEvent::ProjectPaused)));
        assert!(!sink
            .events()
            .iter()
            .any(|e| matches!(e, AgentEvent::StepStarted { .. })));

        pause_handle.resume();
        let result = run.await.unwrap();
        assert!(!result.interrupted);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, AgentEvent::ProjectResumed)));
    }

    #[test]
    fn step_context_includes_framing() {
        let llm = Arc::new(RoutedLlm {
            plan_json: String::new(),
            step_replies: Mutex::new(vec![]),
        });
        let _ = llm;

        let plan: Plan = {
            let parsed: serde_json::Value = serde_json::from_str(TWO_STEP_PLAN).unwrap();
            Plan {
                task: "big task".into(),
                complexity: TaskComplexity::Complex,
                summary: "s".into(),
                steps: serde_json::from_value(parsed["steps"].clone()).unwrap(),
                estimated_total_iterations: 3,
                resources_needed: vec![],
                potential_risks: vec![],
                success_criteria: vec![],
            }
        };
        let previous = vec![StepResult {
            step_id: 1,
            success: true,
            observation: "ok".into(),
            iterations_used: 1,
            validation_status: ValidationStatus::Valid,
        }];

        let context = step_context(&plan, 2, &previous);
        assert!(context.contains("OVERALL TASK: big task"));
        assert!(context.contains("CURRENT STEP: 2/2"));
        assert!(context.contains("Step 1: OK"));
    }
}
