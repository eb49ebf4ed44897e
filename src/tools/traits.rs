//! Core tool trait and result types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the LLM can invoke as an action.
///
/// Tools never fail across the engine boundary: every outcome, including
/// failure, is a [`ToolResult`] whose observation string starts with
/// `Error` on failure. Parameter validation is local to each tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (unique within a registry)
    fn name(&self) -> &str;

    /// Tool description for the LLM
    fn description(&self) -> &str;

    /// JSON Schema for the tool parameters
    fn parameters_schema(&self) -> Value;

    /// Whether this tool needs the session sandbox to be running
    fn requires_sandbox(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> ToolResult;
}

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the execution was successful
    pub success: bool,
    /// Result content (for successful execution)
    pub content: Option<String>,
    /// Error message (for failed execution)
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    /// Create a failed result
    pub fn failure(error: impl Into<String>) -> Self {
        ToolResult {
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }

    /// The observation string surfaced to the model
    pub fn to_observation(&self) -> String {
        if self.success {
            self.content.clone().unwrap_or_default()
        } else {
            let error = self.error.clone().unwrap_or_default();
            if error.starts_with("Error") {
                error
            } else {
                format!("Error: {}", error)
            }
        }
    }
}

/// Schema entry describing one registered tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Helper: pull a required string argument out of tool args.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolResult::failure(format!("Missing '{}' parameter", key)))
}
