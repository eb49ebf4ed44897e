//! Agent module - the ReAct engine and everything it leans on
//!
//! - `client`: provider-agnostic LLM access
//! - `react`: the ReAct execution engine (the hot path)
//! - `loop_guard`: repeated-action detection
//! - `recovery`: self-healing for known tool failures
//! - `validator`: structural checks on tool observations
//! - `planner`: complexity assessment and plan synthesis
//! - `orchestrator`: plan-gated step execution
//! - `events` / `signals`: streamed decisions and cooperative control
//! - `memory`: offline error telemetry

pub mod client;
pub mod events;
pub mod loop_guard;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod react;
pub mod recovery;
pub mod signals;
pub mod types;
pub mod validator;

pub use client::{LlmClient, LlmProvider};
pub use events::{ActivityStatus, AgentEvent, EngineStatus, EventSink, MemorySink, NullSink};
pub use loop_guard::{LoopGuard, LoopVerdict};
pub use memory::ErrorMemory;
pub use orchestrator::{
    ApprovalGate, ExecutionMode, ExecutionResult, Orchestrator, StepResult,
};
pub use planner::{
    classify_task, estimate_complexity, Phase, PhasePlan, PhaseTask, Plan, PlanStatus,
    PlanStep, Planner, RiskLevel, StepType, TaskComplexity,
};
pub use react::{
    ReactEngine, RunOptions, RunOutcome, SuggestionQueue, Termination,
    INTERRUPTED_ANSWER, MAX_ITERATIONS_ANSWER, TIMEOUT_ANSWER,
};
pub use recovery::{ErrorKind, RecoveryAction, RecoveryActionType, RecoveryManager};
pub use signals::{cancel_pair, pause_pair, CancelHandle, CancelToken, PauseHandle, PauseToken};
pub use types::{AgentState, ChatMessage, FileCreated, ReactStep, Role};
pub use validator::{OutputValidator, TaskValidator, ValidationResult, ValidationStatus};
