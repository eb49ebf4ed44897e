//! Gateway wire protocol
//!
//! Every frame is JSON `{"type": <kind>, ...}`. Client frames deserialize
//! into [`ClientMessage`]; server frames are either connection-level events
//! or engine events, unified under [`ServerMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::events::AgentEvent;
use crate::agent::planner::PhasePlan;

/// Client → server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Run a task (may first produce a plan proposal)
    Chat { content: String },
    /// Cancel the running task
    Interrupt,
    /// Steer the running task; applied on the next LLM turn
    Suggestion { content: String },
    /// Explicitly ask for a plan without executing
    RequestPlan { content: String },
    /// Approve the pending plan
    ApprovePlan,
    /// Replace the pending plan
    UpdatePlan { plan: Value },
    /// Pause step execution at the next boundary
    PauseExecution,
    /// Resume step execution
    ResumeExecution,
}

/// Connection-level server → client events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Sent on accept, before any session exists
    Connected {
        session_id: String,
        workspace: String,
    },
    /// Lazy session bind started
    Initializing,
    /// Session is bound and its sandbox is running
    SessionReady {
        session_id: String,
        workspace: String,
    },
    /// A plan awaits approval
    PlanProposal { plan: PhasePlan, message: String },
    /// The approved plan is being executed
    PlanStarted { plan: PhasePlan },
    /// The pending plan was replaced
    PlanUpdated { plan: PhasePlan },
    /// A suggestion was queued for the running task
    SuggestionReceived { content: String, status: String },
    /// Interrupt acknowledged; cancellation in progress
    Interrupting,
}

/// Any server → client frame
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Connection(ConnectionEvent),
    Agent(AgentEvent),
}

impl From<ConnectionEvent> for ServerMessage {
    fn from(event: ConnectionEvent) -> Self {
        ServerMessage::Connection(event)
    }
}

impl From<AgentEvent> for ServerMessage {
    fn from(event: AgentEvent) -> Self {
        ServerMessage::Agent(event)
    }
}
