//! Knowledge-base search tool
//!
//! A small bundled recipe set (how-to guides and technical snippets) with a
//! keyword index over titles, questions, tags, and answers. Everything is
//! embedded at compile time; no external store is involved.

use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::{required_str, Tool, ToolResult};

/// Bundled recipe set
const RECIPES_JSON: &str = include_str!("knowledge_recipes.json");

/// Recipe domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeCategory {
    Documents,
    CodeCCpp,
    CodePython,
    WebFrontend,
    WebBackend,
    Devops,
    System,
    Data,
}

impl RecipeCategory {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "documents" => Some(RecipeCategory::Documents),
            "code_c_cpp" => Some(RecipeCategory::CodeCCpp),
            "code_python" => Some(RecipeCategory::CodePython),
            "web_frontend" => Some(RecipeCategory::WebFrontend),
            "web_backend" => Some(RecipeCategory::WebBackend),
            "devops" => Some(RecipeCategory::Devops),
            "system" => Some(RecipeCategory::System),
            "data" => Some(RecipeCategory::Data),
            _ => None,
        }
    }
}

/// One knowledge-base entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub category: RecipeCategory,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

#[derive(Deserialize)]
struct RecipeFile {
    recipes: Vec<Recipe>,
}

/// In-memory knowledge base with keyword scoring.
pub struct KnowledgeBase {
    recipes: Vec<Recipe>,
}

impl KnowledgeBase {
    /// The compiled-in recipe set, parsed once.
    pub fn builtin() -> &'static KnowledgeBase {
        static BASE: OnceLock<KnowledgeBase> = OnceLock::new();
        BASE.get_or_init(|| {
            let file: RecipeFile =
                serde_json::from_str(RECIPES_JSON).expect("bundled recipes are valid JSON");
            KnowledgeBase {
                recipes: file.recipes,
            }
        })
    }

    pub fn from_recipes(recipes: Vec<Recipe>) -> Self {
        KnowledgeBase { recipes }
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Rank recipes against a query. Title and tag hits weigh more than
    /// question hits, which weigh more than answer-body hits.
    pub fn search(
        &self,
        query: &str,
        category: Option<RecipeCategory>,
        max_results: usize,
    ) -> Vec<&Recipe> {
        let terms: HashSet<String> = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(u32, &Recipe)> = self
            .recipes
            .iter()
            .filter(|recipe| category.map_or(true, |c| recipe.category == c))
            .filter_map(|recipe| {
                let score = score_recipe(recipe, &terms);
                (score > 0).then_some((score, recipe))
            })
            .collect();

        // Stable order for equal scores: keep the bundled ordering.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(max_results)
            .map(|(_, recipe)| recipe)
            .collect()
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

fn score_recipe(recipe: &Recipe, terms: &HashSet<String>) -> u32 {
    let title = tokenize(&recipe.title);
    let tags = tokenize(&recipe.tags.join(" "));
    let question = tokenize(&recipe.question);
    let answer = tokenize(&recipe.answer);

    let mut score = 0;
    for term in terms {
        if title.contains(term) {
            score += 3;
        }
        if tags.contains(term) {
            score += 3;
        }
        if question.contains(term) {
            score += 2;
        }
        if answer.contains(term) {
            score += 1;
        }
    }
    score
}

fn format_results(results: &[&Recipe]) -> String {
    let mut lines = vec!["## Relevant knowledge:\n".to_string()];
    for (i, recipe) in results.iter().enumerate() {
        lines.push(format!("### {}. {}", i + 1, recipe.title));
        lines.push("*Source: knowledge_base*\n".to_string());
        lines.push(recipe.answer.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Built-in tool: search_knowledge
pub struct SearchKnowledgeTool {
    base: &'static KnowledgeBase,
}

impl SearchKnowledgeTool {
    pub fn new() -> Self {
        SearchKnowledgeTool {
            base: KnowledgeBase::builtin(),
        }
    }
}

impl Default for SearchKnowledgeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "search_knowledge"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for how-to guides, best practices, and technical \
         recipes. Use this when you need guidance on creating documents (LaTeX, PDF, \
         Markdown), programming tasks, or common commands and configurations (Git, \
         Docker, SSH). Returns step-by-step instructions and code examples."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What you need help with (e.g. 'create PDF with LaTeX', 'Makefile for C project', 'Docker compose setup')"
                },
                "category": {
                    "type": "string",
                    "enum": ["documents", "code_c_cpp", "code_python", "web_frontend", "web_backend", "devops", "system", "data"],
                    "description": "Optional category to filter results"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let query = match required_str(&args, "query") {
            Ok(query) => query,
            Err(failure) => return failure,
        };
        // An unrecognized category falls back to searching everything.
        let category = args
            .get("category")
            .and_then(|c| c.as_str())
            .and_then(RecipeCategory::parse);

        let results = self.base.search(query, category, 3);
        if results.is_empty() {
            return ToolResult::success(format!(
                "No knowledge found for: {}. Try a different search or proceed with \
                 your best judgment.",
                query
            ));
        }
        ToolResult::success(format_results(&results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_recipes_parse() {
        let base = KnowledgeBase::builtin();
        assert!(base.len() >= 10);
        assert!(!base.is_empty());
    }

    #[test]
    fn search_finds_latex_recipe() {
        let base = KnowledgeBase::builtin();
        let results = base.search("create PDF with LaTeX", None, 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "doc-latex-pdf");
    }

    #[test]
    fn category_filters_results() {
        let base = KnowledgeBase::builtin();
        let results = base.search("create a chart", Some(RecipeCategory::CodePython), 3);
        assert!(results
            .iter()
            .all(|r| r.category == RecipeCategory::CodePython));
        assert!(results.iter().any(|r| r.id == "py-matplotlib-chart"));
    }

    #[test]
    fn unmatched_query_returns_nothing() {
        let base = KnowledgeBase::builtin();
        assert!(base.search("quantum chromodynamics", None, 3).is_empty());
        assert!(base.search("", None, 3).is_empty());
    }

    #[tokio::test]
    async fn tool_formats_results() {
        let tool = SearchKnowledgeTool::new();
        let result = tool
            .execute(serde_json::json!({"query": "Makefile for C project"}))
            .await;
        assert!(result.success);
        let observation = result.to_observation();
        assert!(observation.contains("## Relevant knowledge:"));
        assert!(observation.contains("Makefile"));
        assert!(observation.contains("*Source: knowledge_base*"));
    }

    #[tokio::test]
    async fn tool_reports_misses_gracefully() {
        let tool = SearchKnowledgeTool::new();
        let result = tool
            .execute(serde_json::json!({"query": "xylophone maintenance"}))
            .await;
        assert!(result.success);
        assert!(result.to_observation().starts_with("No knowledge found for:"));
    }

    #[tokio::test]
    async fn unknown_category_searches_everything() {
        let tool = SearchKnowledgeTool::new();
        let result = tool
            .execute(serde_json::json!({"query": "ssh keys", "category": "nonsense"}))
            .await;
        assert!(result.success);
        assert!(result.to_observation().contains("SSH"));
    }

    #[tokio::test]
    async fn missing_query_param() {
        let tool = SearchKnowledgeTool::new();
        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
    }
}
