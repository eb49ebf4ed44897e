//! Session management
//!
//! A session binds one persistent conversation context to one sandboxed
//! execution context under an 8-char opaque id.

mod context;
mod manager;

pub use context::{
    ContextMetadata, ConversationContext, Message, OutputRecord, SharedContext,
};
pub use manager::{new_session_id, Session, SessionInfo, SessionManager};
