//! Output persistence tools

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{required_str, Tool, ToolResult};
use crate::session::SharedContext;

/// Built-in tool: save_output
pub struct SaveOutputTool {
    context: SharedContext,
}

impl SaveOutputTool {
    pub fn new(context: SharedContext) -> Self {
        SaveOutputTool { context }
    }
}

#[async_trait]
impl Tool for SaveOutputTool {
    fn name(&self) -> &str {
        "save_output"
    }

    fn description(&self) -> &str {
        "Save an important result so it can be retrieved later. Use this for final \
         outputs, summaries, and anything the user asked to keep."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "Short description of the task that produced this output"
                },
                "result": {
                    "type": "string",
                    "description": "The output content to save"
                }
            },
            "required": ["task", "result"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let task = match required_str(&args, "task") {
            Ok(task) => task,
            Err(failure) => return failure,
        };
        let result = match required_str(&args, "result") {
            Ok(result) => result,
            Err(failure) => return failure,
        };

        let saved = {
            let mut context = match self.context.lock() {
                Ok(context) => context,
                Err(_) => return ToolResult::failure("Error: context unavailable"),
            };
            context.save_output(task, result)
        };

        match saved {
            Ok(path) => ToolResult::success(format!(
                "Output saved successfully: {}",
                path.display()
            )),
            Err(e) => ToolResult::failure(format!("Error saving output: {}", e)),
        }
    }
}

/// Built-in tool: list_outputs
pub struct ListOutputsTool {
    context: SharedContext,
}

impl ListOutputsTool {
    pub fn new(context: SharedContext) -> Self {
        ListOutputsTool { context }
    }
}

#[async_trait]
impl Tool for ListOutputsTool {
    fn name(&self) -> &str {
        "list_outputs"
    }

    fn description(&self) -> &str {
        "List outputs saved earlier in this session."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        let context = match self.context.lock() {
            Ok(context) => context,
            Err(_) => return ToolResult::failure("Error: context unavailable"),
        };

        let outputs = context.outputs();
        if outputs.is_empty() {
            return ToolResult::success("No outputs saved yet.");
        }

        let lines: Vec<String> = outputs
            .iter()
            .enumerate()
            .map(|(i, output)| {
                let preview: String = output.result.chars().take(100).collect();
                format!(
                    "{}. [{}] {}: {}",
                    i + 1,
                    output.timestamp,
                    output.task,
                    preview
                )
            })
            .collect();
        ToolResult::success(format!("Saved outputs:\n{}", lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConversationContext;
    use std::sync::{Arc, Mutex};

    fn context() -> (SharedContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let context = ConversationContext::new(dir.path(), "out11111", false).unwrap();
        (Arc::new(Mutex::new(context)), dir)
    }

    #[tokio::test]
    async fn test_save_then_list() {
        let (context, _dir) = context();
        let save = SaveOutputTool::new(context.clone());
        let list = ListOutputsTool::new(context.clone());

        let empty = list.execute(serde_json::json!({})).await;
        assert!(empty.to_observation().contains("No outputs"));

        let result = save
            .execute(serde_json::json!({"task": "summarize", "result": "a fine summary"}))
            .await;
        assert!(result.success);
        assert!(result.to_observation().contains("Output saved successfully"));

        let listed = list.execute(serde_json::json!({})).await;
        let observation = listed.to_observation();
        assert!(observation.contains("1."));
        assert!(observation.contains("summarize"));
        assert!(observation.contains("a fine summary"));
    }

    #[tokio::test]
    async fn test_missing_params() {
        let (context, _dir) = context();
        let save = SaveOutputTool::new(context);
        let result = save.execute(serde_json::json!({"task": "t"})).await;
        assert!(!result.success);
    }
}
