//! Tools module - modular tool system for agent capabilities
//!
//! Each tool is a self-contained module implementing the [`Tool`] trait.
//! Tools are registered into a [`ToolRegistry`] and surfaced to the LLM as
//! `Action: tool_name({...})` targets.
//!
//! ## Built-in Tools
//!
//! - **calculator**: arithmetic expressions
//! - **execute_command**: shell commands in the session sandbox
//! - **read_file / write_file / list_directory / delete_file**: workspace files
//! - **web_search / news_search**: DuckDuckGo search (no API key required)
//! - **http_request / fetch_webpage**: outbound HTTP
//! - **search_knowledge**: bundled how-to recipes
//! - **save_output / list_outputs**: session output records
//! - **create_pdf**: PDF rendering in the sandbox
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `src/tools/` (e.g. `my_tool.rs`)
//! 2. Implement the `Tool` trait
//! 3. Add `mod my_tool;` and `pub use` in this file
//! 4. Register it where sessions assemble their registry

mod calculator;
mod files;
mod http;
mod knowledge;
mod output;
mod pdf;
mod registry;
mod search;
mod shell;
mod traits;

// Core trait and types
pub use traits::{Tool, ToolResult, ToolSchema};

// Registry
pub use registry::ToolRegistry;

// Built-in tools
pub use calculator::CalculatorTool;
pub use files::{DeleteFileTool, ListDirectoryTool, ReadFileTool, WriteFileTool};
pub use http::{FetchWebpageTool, HttpRequestTool};
pub use knowledge::{KnowledgeBase, Recipe, RecipeCategory, SearchKnowledgeTool};
pub use output::{ListOutputsTool, SaveOutputTool};
pub use pdf::CreatePdfTool;
pub use search::{NewsSearchTool, SearchResult, WebSearchTool};
pub use shell::ShellTool;

use std::sync::Arc;

use crate::sandbox::WorkspaceContainer;
use crate::session::SharedContext;

/// Format search results for display
pub(crate) fn format_search_results(results: &[SearchResult]) -> String {
    let mut output = String::new();
    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "{}. **{}**\n   URL: {}\n   {}\n\n",
            i + 1,
            result.title,
            result.url,
            result.snippet
        ));
    }
    output
}

/// URL encoding helpers
pub(crate) mod urlencoding {
    pub fn encode(s: &str) -> String {
        url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
    }

    pub fn decode(s: &str) -> Result<String, ()> {
        url::form_urlencoded::parse(s.as_bytes())
            .next()
            .map(|(k, _)| k.to_string())
            .ok_or(())
    }
}

/// Build the standard registry for one session: every built-in tool, wired
/// to the session's container and context.
pub fn session_registry(
    container: Arc<WorkspaceContainer>,
    context: SharedContext,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(CalculatorTool);
    registry.register(WebSearchTool::new());
    registry.register(NewsSearchTool::new());
    registry.register(HttpRequestTool::new());
    registry.register(FetchWebpageTool::new());
    registry.register(SearchKnowledgeTool::new());

    registry.register(ShellTool::new(container.clone()));
    registry.register(ReadFileTool::new(container.clone()));
    registry.register(WriteFileTool::new(container.clone(), context.clone()));
    registry.register(ListDirectoryTool::new(container.clone()));
    registry.register(DeleteFileTool::new(container.clone(), context.clone()));
    registry.register(CreatePdfTool::new(container, context.clone()));

    registry.register(SaveOutputTool::new(context.clone()));
    registry.register(ListOutputsTool::new(context));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::session::ConversationContext;
    use std::sync::Mutex;

    #[test]
    fn test_session_registry_has_all_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let context = ConversationContext::new(dir.path(), "reg11111", false).unwrap();
        let workspace = context.files_dir().to_path_buf();
        let container = Arc::new(WorkspaceContainer::new(
            "reg11111",
            workspace,
            SandboxConfig::default(),
        ));

        let registry = session_registry(container, Arc::new(Mutex::new(context)));
        for name in [
            "calculator",
            "web_search",
            "news_search",
            "http_request",
            "fetch_webpage",
            "search_knowledge",
            "execute_command",
            "read_file",
            "write_file",
            "list_directory",
            "delete_file",
            "create_pdf",
            "save_output",
            "list_outputs",
        ] {
            assert!(registry.contains(name), "missing tool {}", name);
        }
        assert_eq!(registry.len(), 14);
    }

    #[test]
    fn test_format_search_results() {
        let results = vec![SearchResult {
            title: "Test Title".to_string(),
            url: "https://example.com".to_string(),
            snippet: "Test snippet".to_string(),
        }];

        let formatted = format_search_results(&results);
        assert!(formatted.contains("Test Title"));
        assert!(formatted.contains("https://example.com"));
        assert!(formatted.contains("Test snippet"));
    }
}
