//! Web search tools
//!
//! DuckDuckGo-backed search without API keys: the Instant Answer API first,
//! HTML scraping as fallback. `news_search` is the same pipeline with a
//! recency hint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::{required_str, Tool, ToolResult};
use super::{format_search_results, urlencoding};

const SEARCH_TIMEOUT_SECS: u64 = 30;

/// A search result from any provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct InstantAnswerResponse {
    #[serde(rename = "AbstractText")]
    abstract_text: Option<String>,
    #[serde(rename = "AbstractURL")]
    abstract_url: Option<String>,
    #[serde(rename = "AbstractSource")]
    abstract_source: Option<String>,
    #[serde(rename = "Heading")]
    heading: Option<String>,
    #[serde(rename = "RelatedTopics")]
    related_topics: Option<Vec<RelatedTopic>>,
}

#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text")]
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
}

/// Shared DuckDuckGo client
struct DuckDuckGo {
    client: Client,
}

impl DuckDuckGo {
    fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .user_agent("Reagent/0.1")
            .build()
            .expect("Failed to create HTTP client");
        DuckDuckGo { client }
    }

    /// Instant Answer API search
    async fn instant(&self, query: &str, count: usize) -> Vec<SearchResult> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            _ => return Vec::new(),
        };
        let data: InstantAnswerResponse = match response.json().await {
            Ok(data) => data,
            Err(_) => return Vec::new(),
        };

        let mut results = Vec::new();

        if let (Some(text), Some(url), Some(source)) = (
            &data.abstract_text,
            &data.abstract_url,
            &data.abstract_source,
        ) {
            if !text.is_empty() {
                results.push(SearchResult {
                    title: data.heading.clone().unwrap_or_else(|| source.clone()),
                    url: url.clone(),
                    snippet: text.clone(),
                });
            }
        }

        if let Some(topics) = data.related_topics {
            for topic in topics {
                if results.len() >= count {
                    break;
                }
                if let (Some(text), Some(url)) = (topic.text, topic.first_url) {
                    let title = text.split(" - ").next().unwrap_or(&text).to_string();
                    results.push(SearchResult {
                        title,
                        url,
                        snippet: text,
                    });
                }
            }
        }

        results.truncate(count);
        results
    }

    /// HTML scraping fallback
    async fn html(&self, query: &str, count: usize) -> Vec<SearchResult> {
        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(query)
        );

        let response = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            _ => return Vec::new(),
        };
        let html = response.text().await.unwrap_or_default();

        let mut results = Vec::new();
        for chunk in html.split("class=\"result__a\"").skip(1) {
            if results.len() >= count {
                break;
            }

            let url = chunk
                .split("href=\"")
                .nth(1)
                .and_then(|s| s.split('"').next())
                .map(|s| {
                    if s.contains("uddg=") {
                        s.split("uddg=")
                            .nth(1)
                            .and_then(|u| urlencoding::decode(u).ok())
                            .unwrap_or_else(|| s.to_string())
                    } else {
                        s.to_string()
                    }
                });

            let title = chunk
                .split('>')
                .nth(1)
                .and_then(|s| s.split('<').next())
                .map(html_decode);

            let snippet = chunk
                .split("class=\"result__snippet\"")
                .nth(1)
                .and_then(|s| s.split('>').nth(1))
                .and_then(|s| s.split('<').next())
                .map(html_decode);

            if let (Some(url), Some(title)) = (url, title) {
                if !url.is_empty() && !title.is_empty() {
                    results.push(SearchResult {
                        title,
                        url,
                        snippet: snippet.unwrap_or_default(),
                    });
                }
            }
        }
        results
    }

    async fn search(&self, query: &str, count: usize) -> Vec<SearchResult> {
        let results = self.instant(query, count).await;
        if !results.is_empty() {
            return results;
        }
        self.html(query, count).await
    }
}

fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn requested_count(args: &Value) -> usize {
    args.get("max_results")
        .and_then(|v| v.as_u64())
        .map(|c| c.clamp(1, 10) as usize)
        .unwrap_or(5)
}

/// Built-in tool: web_search
pub struct WebSearchTool {
    backend: DuckDuckGo,
}

impl WebSearchTool {
    pub fn new() -> Self {
        WebSearchTool {
            backend: DuckDuckGo::new(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web using DuckDuckGo. Returns results with titles, URLs, and \
         snippets. No API key required."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query (e.g. 'Python web frameworks comparison')"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5, max: 10)",
                    "default": 5
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
        let count = requested_count(&args);

        let results = self.backend.search(query, count).await;
        if results.is_empty() {
            ToolResult::success(format!(
                "No results found for '{}'. Try rephrasing your query.",
                query
            ))
        } else {
            ToolResult::success(format_search_results(&results))
        }
    }
}

/// Built-in tool: news_search
pub struct NewsSearchTool {
    backend: DuckDuckGo,
}

impl NewsSearchTool {
    pub fn new() -> Self {
        NewsSearchTool {
            backend: DuckDuckGo::new(),
        }
    }
}

impl Default for NewsSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for NewsSearchTool {
    fn name(&self) -> &str {
        "news_search"
    }

    fn description(&self) -> &str {
        "Search for recent news articles on a topic."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "News topic to search for"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5, max: 10)",
                    "default": 5
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
        let count = requested_count(&args);

        // The recency hint biases DDG toward news coverage.
        let news_query = format!("{} latest news", query);
        let results = self.backend.search(&news_query, count).await;
        if results.is_empty() {
            ToolResult::success(format!(
                "No recent news found for '{}'. Try a broader topic.",
                query
            ))
        } else {
            ToolResult::success(format_search_results(&results))
        }
    }
}
