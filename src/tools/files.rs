//! File operation tools (read, write, list, delete)
//!
//! All paths resolve through the session container's workspace guard, so a
//! tool can never touch the host outside the session workspace. Deletion
//! consults the protected-file set; protection is enforced here, not by OS
//! permissions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{required_str, Tool, ToolResult};
use crate::sandbox::WorkspaceContainer;
use crate::session::SharedContext;

/// Built-in tool: read_file
pub struct ReadFileTool {
    container: Arc<WorkspaceContainer>,
}

impl ReadFileTool {
    pub fn new(container: Arc<WorkspaceContainer>) -> Self {
        ReadFileTool { container }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file from the workspace."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to file relative to workspace (e.g. 'script.py', 'data/file.txt')"
                }
            },
            "required": ["file_path"]
        })
    }

    fn requires_sandbox(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let file_path = match required_str(&args, "file_path") {
            Ok(path) => path,
            Err(failure) => return failure,
        };

        let path = match self.container.resolve_path(file_path) {
            Ok(path) => path,
            Err(e) => return ToolResult::failure(format!("Error: {}", e)),
        };

        if !path.exists() {
            return ToolResult::failure(format!("Error: File not found: {}", file_path));
        }
        if !path.is_file() {
            return ToolResult::failure(format!("Error: Path is not a file: {}", file_path));
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let lines = content.lines().count().max(1);
                ToolResult::success(format!(
                    "File: {} ({} lines)\n\n{}",
                    file_path, lines, content
                ))
            }
            Err(e) => ToolResult::failure(format!("Error reading file: {}", e)),
        }
    }
}

/// Built-in tool: write_file
pub struct WriteFileTool {
    container: Arc<WorkspaceContainer>,
    context: SharedContext,
}

impl WriteFileTool {
    pub fn new(container: Arc<WorkspaceContainer>, context: SharedContext) -> Self {
        WriteFileTool { container, context }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates the file if it doesn't \
         exist. Creates parent directories if needed."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to file relative to workspace (e.g. 'script.py', 'src/utils.py')"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    fn requires_sandbox(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let file_path = match required_str(&args, "file_path") {
            Ok(path) => path,
            Err(failure) => return failure,
        };
        let content = match required_str(&args, "content") {
            Ok(content) => content,
            Err(failure) => return failure,
        };

        let path = match self.container.resolve_path(file_path) {
            Ok(path) => path,
            Err(e) => return ToolResult::failure(format!("Error: {}", e)),
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::failure(format!("Error creating directories: {}", e));
            }
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                if let Ok(mut context) = self.context.lock() {
                    context.register_file(file_path, true);
                }
                ToolResult::success(format!(
                    "File written successfully: {}\nSize: {} bytes ({} lines)",
                    file_path,
                    content.len(),
                    content.lines().count().max(1)
                ))
            }
            Err(e) => ToolResult::failure(format!("Error writing file: {}", e)),
        }
    }
}

/// Built-in tool: list_directory
pub struct ListDirectoryTool {
    container: Arc<WorkspaceContainer>,
}

impl ListDirectoryTool {
    pub fn new(container: Arc<WorkspaceContainer>) -> Self {
        ListDirectoryTool { container }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and directories in the workspace."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "directory_path": {
                    "type": "string",
                    "description": "Directory path relative to workspace (default: '.' for root)",
                    "default": "."
                }
            },
            "required": []
        })
    }

    fn requires_sandbox(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let directory_path = args
            .get("directory_path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");

        let path = match self.container.resolve_path(directory_path) {
            Ok(path) => path,
            Err(e) => return ToolResult::failure(format!("Error: {}", e)),
        };

        if !path.exists() {
            return ToolResult::failure(format!(
                "Error: Directory not found: {}",
                directory_path
            ));
        }
        if !path.is_dir() {
            return ToolResult::failure(format!(
                "Error: Path is not a directory: {}",
                directory_path
            ));
        }

        let mut entries = match std::fs::read_dir(&path) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.path())
                .collect::<Vec<_>>(),
            Err(e) => return ToolResult::failure(format!("Error listing directory: {}", e)),
        };
        entries.sort();

        let mut items = Vec::new();
        for entry in entries {
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.starts_with('.') {
                continue;
            }
            if entry.is_dir() {
                items.push(format!("DIR  {}/", name));
            } else {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                items.push(format!("FILE {:40} {:>10} bytes", name, size));
            }
        }

        if items.is_empty() {
            return ToolResult::success(format!("Directory '{}' is empty", directory_path));
        }
        ToolResult::success(format!(
            "Directory: {}\n\n{}",
            directory_path,
            items.join("\n")
        ))
    }
}

/// Built-in tool: delete_file
pub struct DeleteFileTool {
    container: Arc<WorkspaceContainer>,
    context: SharedContext,
}

impl DeleteFileTool {
    pub fn new(container: Arc<WorkspaceContainer>, context: SharedContext) -> Self {
        DeleteFileTool { container, context }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from the workspace. WARNING: Protected files (user-requested) \
         cannot be deleted. Use with caution."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to file to delete relative to workspace"
                },
                "force": {
                    "type": "boolean",
                    "description": "Force delete even if protected (default: false)",
                    "default": false
                }
            },
            "required": ["file_path"]
        })
    }

    fn requires_sandbox(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let file_path = match required_str(&args, "file_path") {
            Ok(path) => path,
            Err(failure) => return failure,
        };
        let force = args.get("force").and_then(|v| v.as_bool()).unwrap_or(false);

        if !force {
            let protected = self
                .context
                .lock()
                .map(|context| context.is_protected(file_path))
                .unwrap_or(false);
            if protected {
                return ToolResult::failure(format!(
                    "Error: File '{}' is protected and cannot be deleted. This file was \
                     created based on user request. Use force=true to override (not recommended).",
                    file_path
                ));
            }
        }

        let path = match self.container.resolve_path(file_path) {
            Ok(path) => path,
            Err(e) => return ToolResult::failure(format!("Error: {}", e)),
        };

        if !path.exists() {
            return ToolResult::failure(format!("Error: File not found: {}", file_path));
        }
        if !path.is_file() {
            return ToolResult::failure(format!("Error: Path is not a file: {}", file_path));
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                if let Ok(mut context) = self.context.lock() {
                    context.discard_file(file_path);
                }
                ToolResult::success(format!("File deleted successfully: {}", file_path))
            }
            Err(e) => ToolResult::failure(format!("Error deleting file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::session::ConversationContext;
    use std::sync::Mutex;

    struct Fixture {
        container: Arc<WorkspaceContainer>,
        context: SharedContext,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let context =
            ConversationContext::new(dir.path(), "files001", false).unwrap();
        let workspace = context.files_dir().to_path_buf();
        Fixture {
            container: Arc::new(WorkspaceContainer::new(
                "files001",
                workspace,
                SandboxConfig::default(),
            )),
            context: Arc::new(Mutex::new(context)),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let fixture = fixture();
        let write = WriteFileTool::new(fixture.container.clone(), fixture.context.clone());
        let read = ReadFileTool::new(fixture.container.clone());

        let result = write
            .execute(serde_json::json!({"file_path": "hello.py", "content": "print('hi')\n"}))
            .await;
        assert!(result.success);
        assert!(result.to_observation().contains("File written successfully: hello.py"));

        let result = read
            .execute(serde_json::json!({"file_path": "hello.py"}))
            .await;
        assert!(result.success);
        assert!(result.to_observation().contains("print('hi')"));

        // Registered and protected
        let context = fixture.context.lock().unwrap();
        assert!(context.created_files().contains("hello.py"));
        assert!(context.is_protected("hello.py"));
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let fixture = fixture();
        let write = WriteFileTool::new(fixture.container.clone(), fixture.context.clone());

        let result = write
            .execute(serde_json::json!({"file_path": "a/b/c.txt", "content": "x"}))
            .await;
        assert!(result.success);
        assert!(fixture.container.workspace_dir().join("a/b/c.txt").exists());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let fixture = fixture();
        let read = ReadFileTool::new(fixture.container.clone());
        let result = read
            .execute(serde_json::json!({"file_path": "ghost.txt"}))
            .await;
        assert!(!result.success);
        assert!(result.to_observation().contains("File not found"));
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let fixture = fixture();
        let write = WriteFileTool::new(fixture.container.clone(), fixture.context.clone());
        let result = write
            .execute(serde_json::json!({"file_path": "../../escape.txt", "content": "x"}))
            .await;
        assert!(!result.success);
        assert!(result.to_observation().contains("outside workspace"));
    }

    #[tokio::test]
    async fn test_list_directory_skips_hidden() {
        let fixture = fixture();
        let write = WriteFileTool::new(fixture.container.clone(), fixture.context.clone());
        write
            .execute(serde_json::json!({"file_path": "visible.txt", "content": "x"}))
            .await;
        std::fs::write(fixture.container.workspace_dir().join(".hidden"), "x").unwrap();

        let list = ListDirectoryTool::new(fixture.container.clone());
        let result = list.execute(serde_json::json!({})).await;
        let observation = result.to_observation();
        assert!(observation.contains("visible.txt"));
        assert!(!observation.contains(".hidden"));
    }

    #[tokio::test]
    async fn test_protected_delete_requires_force() {
        let fixture = fixture();
        let write = WriteFileTool::new(fixture.container.clone(), fixture.context.clone());
        let delete = DeleteFileTool::new(fixture.container.clone(), fixture.context.clone());

        write
            .execute(serde_json::json!({"file_path": "keep.txt", "content": "precious"}))
            .await;

        // Protected: refused without force
        let result = delete
            .execute(serde_json::json!({"file_path": "keep.txt"}))
            .await;
        assert!(!result.success);
        assert!(result.to_observation().contains("protected"));
        assert!(fixture
            .context
            .lock()
            .unwrap()
            .created_files()
            .contains("keep.txt"));
        assert!(fixture.container.workspace_dir().join("keep.txt").exists());

        // Force succeeds and clears tracking
        let result = delete
            .execute(serde_json::json!({"file_path": "keep.txt", "force": true}))
            .await;
        assert!(result.success);
        assert!(!fixture
            .context
            .lock()
            .unwrap()
            .created_files()
            .contains("keep.txt"));
    }

    #[tokio::test]
    async fn test_delete_unprotected_file() {
        let fixture = fixture();
        std::fs::write(fixture.container.workspace_dir().join("tmp.txt"), "x").unwrap();

        let delete = DeleteFileTool::new(fixture.container.clone(), fixture.context.clone());
        let result = delete
            .execute(serde_json::json!({"file_path": "tmp.txt"}))
            .await;
        assert!(result.success);
        assert!(!fixture.container.workspace_dir().join("tmp.txt").exists());
    }
}
