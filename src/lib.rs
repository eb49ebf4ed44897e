//! # Reagent
//!
//! An autonomous agent runtime that drives an LLM through a
//! Reason-Act-Observe loop to execute user tasks, with per-session Docker
//! workspaces, live event streaming, and a plan-approval layer.
//!
//! ## Architecture
//!
//! - **Agent** (`agent`): the ReAct engine, LLM client, loop guard,
//!   recovery, validation, planning, and orchestration
//! - **Session** (`session`): persistent conversation context + lifecycle
//! - **Sandbox** (`sandbox`): per-session Docker workspace containers
//! - **Tools** (`tools`): the action surface exposed to the model
//! - **Gateway** (`gateway`): WebSocket streaming transport + REST surface
//! - **Configuration** (`config`): focused config types with env overrides
//!
//! ## Design Principles
//!
//! 1. **Trait seams**: the LLM, event sinks, and session binding are traits
//!    so every layer can be exercised in isolation
//! 2. **Tools never throw**: failures are observation strings the model can
//!    react to
//! 3. **Cooperative cancellation**: a cancel token is checked around every
//!    await in the hot path
//! 4. **Plans are data**: nothing in a plan is executable; the engine runs,
//!    the plan frames

// Agent logic and LLM interaction
pub mod agent;

// Modular configuration
pub mod config;

// Error types
pub mod error;

// WebSocket gateway + REST surface
pub mod gateway;

// Secure execution sandboxes
pub mod sandbox;

// Session lifecycle and persistence
pub mod session;

// Tool system
pub mod tools;

// Re-export commonly used items
pub use error::{Error, Result};

pub use agent::{
    AgentEvent, AgentState, ChatMessage, EventSink, LlmClient, LlmProvider, Orchestrator,
    Plan, Planner, ReactEngine, ReactStep, Role, Termination,
};
pub use config::Config;
pub use session::{Session, SessionManager};
pub use tools::{Tool, ToolRegistry, ToolResult};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
