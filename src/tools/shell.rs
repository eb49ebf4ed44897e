//! Shell command execution tool
//!
//! Runs commands inside the session's workspace container.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{required_str, Tool, ToolResult};
use crate::sandbox::WorkspaceContainer;

/// Built-in tool: execute_command
pub struct ShellTool {
    container: Arc<WorkspaceContainer>,
    command_timeout: Duration,
}

impl ShellTool {
    pub fn new(container: Arc<WorkspaceContainer>) -> Self {
        ShellTool {
            container,
            command_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute shell commands in the workspace. Use this to run any terminal command \
         like 'ls', 'python script.py', 'pip install package'. Commands run in an \
         isolated container with the workspace as the working directory."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute (e.g. 'ls -la', 'python script.py')"
                }
            },
            "required": ["command"]
        })
    }

    fn requires_sandbox(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let command = match required_str(&args, "command") {
            Ok(command) => command,
            Err(failure) => return failure,
        };

        match self.container.execute(command, self.command_timeout).await {
            Ok((stdout, stderr, exit_code)) => {
                let mut parts = vec![format!("Exit code: {}", exit_code)];
                if !stdout.is_empty() {
                    parts.push(format!("Output:\n{}", stdout));
                }
                if !stderr.is_empty() {
                    parts.push(format!("Errors:\n{}", stderr));
                }
                if stdout.is_empty() && stderr.is_empty() && exit_code == 0 {
                    parts.push("Command completed successfully (no output)".to_string());
                }
                ToolResult::success(parts.join("\n"))
            }
            Err(e) => ToolResult::failure(format!("Error executing command: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;

    #[tokio::test]
    async fn test_unstarted_container_yields_error_observation() {
        let dir = tempfile::tempdir().unwrap();
        let container = Arc::new(WorkspaceContainer::new(
            "sh111111",
            dir.path().to_path_buf(),
            SandboxConfig::default(),
        ));
        let tool = ShellTool::new(container);

        let result = tool
            .execute(serde_json::json!({"command": "echo hi"}))
            .await;
        assert!(!result.success);
        assert!(result.to_observation().starts_with("Error executing command"));
    }

    #[tokio::test]
    async fn test_missing_command_param() {
        let dir = tempfile::tempdir().unwrap();
        let container = Arc::new(WorkspaceContainer::new(
            "sh222222",
            dir.path().to_path_buf(),
            SandboxConfig::default(),
        ));
        let tool = ShellTool::new(container);

        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
    }
}
