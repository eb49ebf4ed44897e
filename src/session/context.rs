//! Conversation context storage and persistence
//!
//! Append-only message log plus derived state (created files, protected
//! files, saved outputs) for one session. Every mutation bumps
//! `updated_at`; when autosave is enabled every mutation also snapshots to
//! disk. A failed snapshot is logged and the in-memory state stays
//! authoritative.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::types::{ChatMessage, ReactStep, Role};
use crate::error::{Error, Result};

/// A context shared between the engine and its tools
pub type SharedContext = Arc<Mutex<ConversationContext>>;

/// A single persisted message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub react_steps: Vec<ReactStep>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, react_steps: Vec<ReactStep>) -> Self {
        Message {
            role,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
            react_steps,
        }
    }
}

/// A saved output record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub task: String,
    pub result: String,
    pub timestamp: String,
    pub file_path: String,
}

/// Session metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Full snapshot written to `context.json`
#[derive(Debug, Serialize, Deserialize)]
struct ContextSnapshot {
    session_id: String,
    metadata: ContextMetadata,
    message_history: Vec<Message>,
    created_files: Vec<String>,
    protected_files: Vec<String>,
    outputs: Vec<OutputRecord>,
}

/// Compact snapshot written to `state.json`
#[derive(Debug, Serialize)]
struct StateSnapshot<'a> {
    session_id: &'a str,
    message_count: usize,
    created_files: Vec<&'a String>,
    protected_files: Vec<&'a String>,
    output_count: usize,
    updated_at: &'a str,
}

/// Manages conversation context and persistence for one session.
#[derive(Debug)]
pub struct ConversationContext {
    pub session_id: String,
    session_dir: PathBuf,
    files_dir: PathBuf,
    outputs_dir: PathBuf,
    messages: Vec<Message>,
    created_files: HashSet<String>,
    protected_files: HashSet<String>,
    outputs: Vec<OutputRecord>,
    metadata: ContextMetadata,
    autosave: bool,
}

impl ConversationContext {
    /// Create a fresh context, ensuring the session directories exist.
    pub fn new(sessions_dir: &Path, session_id: &str, autosave: bool) -> Result<Self> {
        let session_dir = sessions_dir.join(session_id);
        let files_dir = session_dir.join("files");
        let outputs_dir = session_dir.join("outputs");
        std::fs::create_dir_all(&files_dir)?;
        std::fs::create_dir_all(&outputs_dir)?;

        let now = Utc::now().to_rfc3339();
        Ok(ConversationContext {
            session_id: session_id.to_string(),
            session_dir,
            files_dir,
            outputs_dir,
            messages: Vec::new(),
            created_files: HashSet::new(),
            protected_files: HashSet::new(),
            outputs: Vec::new(),
            metadata: ContextMetadata {
                session_id: session_id.to_string(),
                created_at: now.clone(),
                updated_at: now,
            },
            autosave,
        })
    }

    /// Load a context from its `context.json` snapshot.
    pub fn load(sessions_dir: &Path, session_id: &str, autosave: bool) -> Result<Self> {
        let context_path = sessions_dir.join(session_id).join("context.json");
        if !context_path.exists() {
            return Err(Error::Session(format!("Session {} not found", session_id)));
        }

        let raw = std::fs::read_to_string(&context_path)?;
        let snapshot: ContextSnapshot = serde_json::from_str(&raw)?;

        let mut context = Self::new(sessions_dir, session_id, autosave)?;
        context.metadata = snapshot.metadata;
        context.messages = snapshot.message_history;
        context.created_files = snapshot.created_files.into_iter().collect();
        context.protected_files = snapshot.protected_files.into_iter().collect();
        context.outputs = snapshot.outputs;
        Ok(context)
    }

    /// Whether a session snapshot exists on disk
    pub fn exists(sessions_dir: &Path, session_id: &str) -> bool {
        sessions_dir.join(session_id).join("context.json").exists()
    }

    /// Session directory (parent of `files/`)
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Workspace directory bind-mounted into the sandbox
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    // --- Message management ---

    /// Append a user message
    pub fn add_user_message(&mut self, content: &str) {
        let message = Message::new(Role::User, content, Vec::new());
        self.append_message(message);
    }

    /// Append an assistant message with its ReAct trace
    pub fn add_assistant_message(&mut self, content: &str, react_steps: Vec<ReactStep>) {
        let message = Message::new(Role::Assistant, content, react_steps);
        self.append_message(message);
    }

    fn append_message(&mut self, message: Message) {
        // The history log is durable before any snapshot happens.
        if let Err(e) = self.append_to_history_log(&message) {
            warn!("Failed to append history log: {}", e);
        }
        self.messages.push(message);
        self.touch();
        self.autosave_now();
    }

    /// All persisted messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The last `count` messages in LLM chat form
    pub fn recent_messages(&self, count: usize) -> Vec<ChatMessage> {
        let start = self.messages.len().saturating_sub(count);
        self.messages[start..]
            .iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    // --- File management ---

    /// Register a created file; protected by default.
    pub fn register_file(&mut self, file_path: &str, auto_protect: bool) {
        self.created_files.insert(file_path.to_string());
        if auto_protect {
            self.protected_files.insert(file_path.to_string());
        }
        if let Err(e) = self.write_protected_file() {
            warn!("Failed to update .protected: {}", e);
        }
        self.touch();
        self.autosave_now();
    }

    /// Mark a file as protected
    pub fn protect_file(&mut self, file_path: &str) {
        self.protected_files.insert(file_path.to_string());
        if let Err(e) = self.write_protected_file() {
            warn!("Failed to update .protected: {}", e);
        }
        self.touch();
    }

    /// Remove protection from a file
    pub fn unprotect_file(&mut self, file_path: &str) {
        self.protected_files.remove(file_path);
        if let Err(e) = self.write_protected_file() {
            warn!("Failed to update .protected: {}", e);
        }
        self.touch();
    }

    /// Whether a file is protected
    pub fn is_protected(&self, file_path: &str) -> bool {
        self.protected_files.contains(file_path)
    }

    /// Forget a deleted file
    pub fn discard_file(&mut self, file_path: &str) {
        self.created_files.remove(file_path);
        self.protected_files.remove(file_path);
        if let Err(e) = self.write_protected_file() {
            warn!("Failed to update .protected: {}", e);
        }
        self.touch();
        self.autosave_now();
    }

    /// Files created this session
    pub fn created_files(&self) -> &HashSet<String> {
        &self.created_files
    }

    /// Protected files
    pub fn protected_files(&self) -> &HashSet<String> {
        &self.protected_files
    }

    fn write_protected_file(&self) -> Result<()> {
        let mut entries: Vec<&String> = self.protected_files.iter().collect();
        entries.sort();
        let body = entries
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(self.session_dir.join(".protected"), body)?;
        Ok(())
    }

    // --- Output management ---

    /// Persist an output record and return the file it was written to.
    pub fn save_output(&mut self, task: &str, result: &str) -> Result<PathBuf> {
        let now = Utc::now();
        let filename = format!("{}.json", now.format("%Y-%m-%d_%H-%M-%S"));
        let file_path = self.outputs_dir.join(&filename);

        let record = serde_json::json!({
            "task": task,
            "result": result,
            "timestamp": now.to_rfc3339(),
        });
        std::fs::write(&file_path, serde_json::to_string_pretty(&record)?)?;

        self.outputs.push(OutputRecord {
            task: task.to_string(),
            result: result.to_string(),
            timestamp: now.to_rfc3339(),
            file_path: format!("outputs/{}", filename),
        });
        self.touch();
        self.autosave_now();
        Ok(file_path)
    }

    /// Saved outputs in order
    pub fn outputs(&self) -> &[OutputRecord] {
        &self.outputs
    }

    /// Session metadata
    pub fn metadata(&self) -> &ContextMetadata {
        &self.metadata
    }

    // --- Persistence ---

    /// Write `context.json`, `state.json`, and `metadata.json`.
    pub fn save(&mut self) -> Result<()> {
        self.touch();

        let snapshot = ContextSnapshot {
            session_id: self.session_id.clone(),
            metadata: self.metadata.clone(),
            message_history: self.messages.clone(),
            created_files: self.created_files.iter().cloned().collect(),
            protected_files: self.protected_files.iter().cloned().collect(),
            outputs: self.outputs.clone(),
        };
        std::fs::write(
            self.session_dir.join("context.json"),
            serde_json::to_string_pretty(&snapshot)?,
        )?;

        let state = StateSnapshot {
            session_id: &self.session_id,
            message_count: self.messages.len(),
            created_files: self.created_files.iter().collect(),
            protected_files: self.protected_files.iter().collect(),
            output_count: self.outputs.len(),
            updated_at: &self.metadata.updated_at,
        };
        std::fs::write(
            self.session_dir.join("state.json"),
            serde_json::to_string_pretty(&state)?,
        )?;

        std::fs::write(
            self.session_dir.join("metadata.json"),
            serde_json::to_string_pretty(&self.metadata)?,
        )?;

        Ok(())
    }

    fn autosave_now(&mut self) {
        if self.autosave {
            if let Err(e) = self.save() {
                warn!("Context autosave failed: {}", e);
            }
        }
    }

    fn append_to_history_log(&self, message: &Message) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_dir.join("history.jsonl"))?;
        writeln!(file, "{}", serde_json::to_string(message)?)?;
        file.flush()?;
        Ok(())
    }

    fn touch(&mut self) {
        let now = Utc::now().to_rfc3339();
        // Wall clock could step backwards; updated_at never does.
        if now > self.metadata.updated_at {
            self.metadata.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_new_creates_directories() {
        let dir = tempdir().unwrap();
        let context = ConversationContext::new(dir.path(), "abc12345", false).unwrap();
        assert!(context.files_dir().is_dir());
        assert!(dir.path().join("abc12345/outputs").is_dir());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let mut context = ConversationContext::new(dir.path(), "s1", false).unwrap();

        context.add_user_message("make hello.py");
        context.add_assistant_message(
            "Done",
            vec![ReactStep::FinalAnswer {
                content: "Done".into(),
            }],
        );
        context.register_file("hello.py", true);
        context.save_output("make hello.py", "created hello.py").unwrap();
        context.save().unwrap();

        let loaded = ConversationContext::load(dir.path(), "s1", false).unwrap();
        assert_eq!(loaded.messages().len(), 2);
        assert_eq!(loaded.messages()[0].content, "make hello.py");
        assert_eq!(loaded.messages()[1].react_steps.len(), 1);
        assert!(loaded.created_files().contains("hello.py"));
        assert!(loaded.is_protected("hello.py"));
        assert_eq!(loaded.outputs().len(), 1);
        assert_eq!(
            loaded.metadata().created_at,
            context.metadata().created_at
        );
    }

    #[test]
    fn test_load_missing_session_fails() {
        let dir = tempdir().unwrap();
        let err = ConversationContext::load(dir.path(), "nope", false).unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }

    #[test]
    fn test_register_file_protection() {
        let dir = tempdir().unwrap();
        let mut context = ConversationContext::new(dir.path(), "s2", false).unwrap();

        context.register_file("a.txt", true);
        assert!(context.created_files().contains("a.txt"));
        assert!(context.is_protected("a.txt"));

        context.register_file("b.txt", false);
        assert!(context.created_files().contains("b.txt"));
        assert!(!context.is_protected("b.txt"));

        let protected = std::fs::read_to_string(dir.path().join("s2/.protected")).unwrap();
        assert_eq!(protected.trim(), "a.txt");

        context.unprotect_file("a.txt");
        assert!(!context.is_protected("a.txt"));
    }

    #[test]
    fn test_discard_file_clears_both_sets() {
        let dir = tempdir().unwrap();
        let mut context = ConversationContext::new(dir.path(), "s3", false).unwrap();
        context.register_file("x.txt", true);
        context.discard_file("x.txt");
        assert!(!context.created_files().contains("x.txt"));
        assert!(!context.is_protected("x.txt"));
    }

    #[test]
    fn test_history_log_is_append_only() {
        let dir = tempdir().unwrap();
        let mut context = ConversationContext::new(dir.path(), "s4", false).unwrap();
        context.add_user_message("one");
        context.add_user_message("two");

        let log = std::fs::read_to_string(dir.path().join("s4/history.jsonl")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("one"));
        assert!(lines[1].contains("two"));
    }

    #[test]
    fn test_updated_at_is_monotone() {
        let dir = tempdir().unwrap();
        let mut context = ConversationContext::new(dir.path(), "s5", false).unwrap();
        let before = context.metadata().updated_at.clone();
        context.add_user_message("bump");
        assert!(context.metadata().updated_at >= before);
    }

    #[test]
    fn test_recent_messages_takes_tail() {
        let dir = tempdir().unwrap();
        let mut context = ConversationContext::new(dir.path(), "s6", false).unwrap();
        for i in 0..8 {
            context.add_user_message(&format!("m{}", i));
        }
        let recent = context.recent_messages(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m5");
        assert_eq!(recent[2].content, "m7");
    }

    #[test]
    fn test_autosave_writes_snapshots() {
        let dir = tempdir().unwrap();
        let mut context = ConversationContext::new(dir.path(), "s7", true).unwrap();
        context.add_user_message("hello");

        assert!(dir.path().join("s7/context.json").exists());
        assert!(dir.path().join("s7/state.json").exists());
        assert!(dir.path().join("s7/metadata.json").exists());
    }
}
