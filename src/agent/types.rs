//! Type definitions for the agent module

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing context and instructions
    System,
    /// User message
    User,
    /// Assistant (AI) response
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A transient message sent to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A file created by a tool during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCreated {
    /// Path relative to the session workspace
    pub path: String,
    /// Content written to the file
    pub content: String,
}

/// One recorded step of a ReAct run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactStep {
    /// Free-text rationale extracted from the LLM response
    Thought { content: String },
    /// A tool dispatch with its parsed parameters
    Action {
        tool: String,
        params: serde_json::Value,
    },
    /// Result string produced by a tool
    Observation {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_created: Option<FileCreated>,
    },
    /// A self-healing attempt
    Recovery { description: String },
    /// An error surfaced to the model
    Error { content: String },
    /// The terminal answer
    FinalAnswer { content: String },
}

/// Mutable state of one ReAct task execution
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    /// The task being executed
    pub task: String,
    /// Transcript of the run in LLM message form
    pub conversation_history: Vec<ChatMessage>,
    /// Observations in dispatch order
    pub observations: Vec<String>,
    /// Completed iterations
    pub iteration: u32,
    /// Whether a final answer has been set
    pub is_complete: bool,
    /// The final answer (non-empty once complete)
    pub final_answer: String,
}

impl AgentState {
    /// Create state for a new task
    pub fn new(task: impl Into<String>) -> Self {
        AgentState {
            task: task.into(),
            ..Default::default()
        }
    }

    /// Record a thought
    pub fn add_thought(&mut self, thought: &str) {
        self.conversation_history
            .push(ChatMessage::assistant(format!("Thought: {}", thought)));
    }

    /// Record an action in `tool({json})` form
    pub fn add_action(&mut self, action: &str) {
        self.conversation_history
            .push(ChatMessage::assistant(format!("Action: {}", action)));
    }

    /// Record an observation
    pub fn add_observation(&mut self, observation: &str) {
        self.observations.push(observation.to_string());
        self.conversation_history
            .push(ChatMessage::user(format!("Observation: {}", observation)));
    }

    /// Set the final answer and mark the task complete
    pub fn set_final_answer(&mut self, answer: &str) {
        self.final_answer = answer.to_string();
        self.is_complete = true;
        self.conversation_history
            .push(ChatMessage::assistant(format!("Final Answer: {}", answer)));
    }
}
