//! Tool registry - manages available tools for the agent

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::traits::{Tool, ToolResult, ToolSchema};

/// Registry of available tools.
///
/// Iteration order is insertion order so prompts stay stable; duplicate
/// names overwrite in place (last registration wins), which lets tests swap
/// providers.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        ToolRegistry::default()
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register an already-shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    /// All tools in registration order
    pub fn all(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Schema entries in registration order
    pub fn schema(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Execute a named tool, returning the observation string.
    pub async fn execute(&self, name: &str, args: Value) -> String {
        match self.get(name) {
            Some(tool) => tool.execute(args).await.to_observation(),
            None => format!("Error: Unknown tool: {}", name),
        }
    }

    /// `- name: description` lines for planner prompts
    pub fn description_lines(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect()
    }

    /// Whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
