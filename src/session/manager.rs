//! Session lifecycle management

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::sandbox::WorkspaceContainer;
use crate::session::context::{ConversationContext, SharedContext};

/// Summary of a persisted session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: usize,
    pub file_count: usize,
}

/// Enumerates and deletes persisted sessions.
pub struct SessionManager {
    sessions_dir: PathBuf,
}

impl SessionManager {
    pub fn new(config: &Config) -> Result<Self> {
        let sessions_dir = config.sandbox.sessions_dir();
        std::fs::create_dir_all(&sessions_dir)?;
        Ok(SessionManager { sessions_dir })
    }

    /// List all sessions, most recently updated first.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions = Vec::new();
        let entries = match std::fs::read_dir(&self.sessions_dir) {
            Ok(entries) => entries,
            Err(_) => return sessions,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let context_path = path.join("context.json");
            let Ok(raw) = std::fs::read_to_string(&context_path) else {
                continue;
            };
            let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };

            let metadata = data.get("metadata").cloned().unwrap_or_default();
            sessions.push(SessionInfo {
                session_id: entry.file_name().to_string_lossy().to_string(),
                created_at: metadata
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                updated_at: metadata
                    .get("updated_at")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                message_count: data
                    .get("message_history")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len())
                    .unwrap_or(0),
                file_count: data
                    .get("created_files")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len())
                    .unwrap_or(0),
            });
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Whether a session snapshot exists
    pub fn session_exists(&self, session_id: &str) -> bool {
        ConversationContext::exists(&self.sessions_dir, session_id)
    }

    /// Delete a session directory (workspace included).
    pub fn delete_session(&self, session_id: &str) -> bool {
        let session_dir = self.sessions_dir.join(session_id);
        if !session_dir.exists() {
            return false;
        }
        if let Err(e) = std::fs::remove_dir_all(&session_dir) {
            warn!("Failed to delete session {}: {}", session_id, e);
            return false;
        }
        true
    }

    /// Root of all session directories
    pub fn sessions_dir(&self) -> &PathBuf {
        &self.sessions_dir
    }
}

/// An active session: conversation context plus sandbox container.
pub struct Session {
    pub session_id: String,
    pub context: SharedContext,
    pub container: Arc<WorkspaceContainer>,
}

impl Session {
    /// Create a new session with a fresh context and a started sandbox.
    pub async fn create_new(config: &Config) -> Result<Self> {
        let session_id = new_session_id();
        Self::bind(config, &session_id, false).await
    }

    /// Resume an existing session. Fails when the snapshot is missing.
    pub async fn resume(config: &Config, session_id: &str) -> Result<Self> {
        Self::bind(config, session_id, true).await
    }

    async fn bind(config: &Config, session_id: &str, load: bool) -> Result<Self> {
        let sessions_dir = config.sandbox.sessions_dir();
        let autosave = config.agent.context_autosave;

        let mut context = if load {
            ConversationContext::load(&sessions_dir, session_id, autosave)?
        } else {
            ConversationContext::new(&sessions_dir, session_id, autosave)?
        };

        let container = Arc::new(WorkspaceContainer::new(
            session_id,
            context.files_dir().to_path_buf(),
            config.sandbox.clone(),
        ));
        container.start().await?;
        context.save()?;

        info!(
            "Session {} {}",
            session_id,
            if load { "resumed" } else { "created" }
        );

        Ok(Session {
            session_id: session_id.to_string(),
            context: Arc::new(Mutex::new(context)),
            container,
        })
    }

    /// Host workspace directory for this session
    pub fn workspace_dir(&self) -> PathBuf {
        self.container.workspace_dir().to_path_buf()
    }

    /// Save the context and stop the sandbox. Idempotent.
    pub async fn close(&self) {
        if let Ok(mut context) = self.context.lock() {
            if let Err(e) = context.save() {
                warn!("Failed to save context on close: {}", e);
            }
        }
        self.container.stop().await;
    }

    /// Close and optionally remove the workspace.
    pub async fn cleanup(&self) {
        if let Ok(mut context) = self.context.lock() {
            if let Err(e) = context.save() {
                warn!("Failed to save context on cleanup: {}", e);
            }
        }
        self.container.cleanup().await;
    }
}

/// 8-char opaque session id
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::ReactStep;

    fn test_config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.sandbox.workspace_root = root.to_path_buf();
        config
    }

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn test_list_sessions_sorted_by_update() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let manager = SessionManager::new(&config).unwrap();
        let sessions_dir = config.sandbox.sessions_dir();

        let mut older = ConversationContext::new(&sessions_dir, "older111", false).unwrap();
        older.save().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut newer = ConversationContext::new(&sessions_dir, "newer222", false).unwrap();
        newer.add_user_message("hi");
        newer.add_assistant_message(
            "hello",
            vec![ReactStep::FinalAnswer {
                content: "hello".into(),
            }],
        );
        newer.save().unwrap();

        let sessions = manager.list_sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "newer222");
        assert_eq!(sessions[0].message_count, 2);
        assert_eq!(sessions[1].session_id, "older111");
    }

    #[test]
    fn test_delete_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let manager = SessionManager::new(&config).unwrap();
        let sessions_dir = config.sandbox.sessions_dir();

        let mut context = ConversationContext::new(&sessions_dir, "gone1234", false).unwrap();
        context.save().unwrap();
        assert!(manager.session_exists("gone1234"));

        assert!(manager.delete_session("gone1234"));
        assert!(!manager.session_exists("gone1234"));
        assert!(!manager.delete_session("gone1234"));
    }
}
