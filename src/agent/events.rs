//! Streamed engine events
//!
//! The engine does not stream model tokens; it streams its own decisions.
//! Every event is a typed record serialized as `{"type": ..., ...}` on the
//! wire. Callers hook in through [`EventSink`], the engine-side analogue of
//! a progress callback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::types::FileCreated;

/// Engine status surfaced to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Waiting on the LLM
    Thinking,
    /// Executing a task
    Working,
    /// Producing a plan
    Planning,
}

/// Lifecycle of a tool dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Running,
    Completed,
    Failed,
}

/// A single event emitted by the engine or orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Engine state change
    Status { status: EngineStatus },
    /// A parsed thought
    Thought { content: String },
    /// A tool dispatch lifecycle record
    Activity {
        activity_type: String,
        tool: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        status: ActivityStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_created: Option<FileCreated>,
    },
    /// A self-healing attempt
    Recovery { description: String },
    /// Terminal success
    FinalAnswer { content: String },
    /// Terminal cancellation
    Interrupted,
    /// Engine finished processing the task
    Complete { task: String },
    /// Fatal condition for the current task
    Error { message: String },

    // --- orchestrator events ---
    /// Result of the complexity heuristic
    ComplexityAssessed {
        complexity: String,
        estimated_iterations: u32,
        needs_planning: bool,
    },
    /// Plan synthesis started
    PlanningStarted { task: String },
    /// Plan synthesis finished
    PlanCreated { plan: Value },
    /// Interactive mode is waiting for approval
    PlanPendingApproval { plan: Value },
    /// A plan step began executing
    StepStarted { step: Value },
    /// A plan step finished
    StepCompleted { result: Value },
    /// A failed step has a fallback hint
    ExecutingFallback { step_id: u32, fallback: String },
    /// Execution paused at a step boundary
    ProjectPaused,
    /// Execution resumed
    ProjectResumed,
}

/// Receiver for engine events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Ordering follows emission order per session.
    async fn emit(&self, event: AgentEvent);
}

/// Sink that discards all events
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: AgentEvent) {}
}

/// Sink that buffers events in memory (used by tests and embedders)
#[derive(Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<AgentEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn emit(&self, event: AgentEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = AgentEvent::Status {
            status: EngineStatus::Thinking,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"], "thinking");
    }

    #[test]
    fn test_activity_omits_absent_fields() {
        let event = AgentEvent::Activity {
            activity_type: "compute".into(),
            tool: "calculator".into(),
            params: Some(serde_json::json!({"expression": "1+1"})),
            result: None,
            error: None,
            status: ActivityStatus::Running,
            file_created: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""status":"running""#));
        assert!(!json.contains("result"));
        assert!(!json.contains("file_created"));
    }

    #[tokio::test]
    async fn test_memory_sink_preserves_order() {
        let sink = MemorySink::new();
        sink.emit(AgentEvent::Thought {
            content: "a".into(),
        })
        .await;
        sink.emit(AgentEvent::FinalAnswer {
            content: "b".into(),
        })
        .await;
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AgentEvent::Thought { .. }));
        assert!(matches!(events[1], AgentEvent::FinalAnswer { .. }));
    }
}
