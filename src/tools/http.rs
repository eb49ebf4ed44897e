//! HTTP tools: raw requests and readable page fetches

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use super::traits::{required_str, Tool, ToolResult};

const HTTP_TIMEOUT_SECS: u64 = 30;
const MAX_BODY_CHARS: usize = 5000;
const MAX_PAGE_CHARS: usize = 3000;

fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent("Reagent/0.1")
        .build()
        .expect("Failed to create HTTP client")
}

/// Built-in tool: http_request
pub struct HttpRequestTool {
    client: Client,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        HttpRequestTool {
            client: http_client(),
        }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Make HTTP requests to fetch content from URLs. Supports GET and POST. Use \
         this to call APIs or download content."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch (e.g. 'https://example.com/api/data')"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method: GET or POST (default: GET)",
                    "default": "GET"
                },
                "headers": {
                    "type": "object",
                    "description": "Optional HTTP headers as key-value pairs"
                },
                "body": {
                    "type": "string",
                    "description": "Request body for POST requests"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let url = match required_str(&args, "url") {
            Ok(url) => url,
            Err(failure) => return failure,
        };
        if let Err(e) = Url::parse(url) {
            return ToolResult::failure(format!("Error: invalid URL: {}", e));
        }

        let method = args
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            other => {
                return ToolResult::failure(format!(
                    "Error: unsupported method: {} (use GET or POST)",
                    other
                ))
            }
        };

        if let Some(headers) = args.get("headers").and_then(|h| h.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, value);
                }
            }
        }
        if let Some(body) = args.get("body").and_then(|b| b.as_str()) {
            request = request.body(body.to_string());
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
                let suffix = if body.chars().count() > MAX_BODY_CHARS {
                    "\n... (truncated)"
                } else {
                    ""
                };
                ToolResult::success(format!(
                    "Status: {}\n\n{}{}",
                    status, truncated, suffix
                ))
            }
            Err(e) => ToolResult::failure(format!("Error making request: {}", e)),
        }
    }
}

/// Built-in tool: fetch_webpage
pub struct FetchWebpageTool {
    client: Client,
}

impl FetchWebpageTool {
    pub fn new() -> Self {
        FetchWebpageTool {
            client: http_client(),
        }
    }
}

impl Default for FetchWebpageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchWebpageTool {
    fn name(&self) -> &str {
        "fetch_webpage"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text content (HTML stripped)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL of the page to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let url = match required_str(&args, "url") {
            Ok(url) => url,
            Err(failure) => return failure,
        };
        if let Err(e) = Url::parse(url) {
            return ToolResult::failure(format!("Error: invalid URL: {}", e));
        }

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return ToolResult::failure(format!("Error fetching page: {}", e)),
        };
        if !response.status().is_success() {
            return ToolResult::failure(format!(
                "Error fetching page: status {}",
                response.status()
            ));
        }

        let html = response.text().await.unwrap_or_default();
        let text = strip_html(&html);
        if text.trim().is_empty() {
            return ToolResult::success(format!("Page at {} has no readable text.", url));
        }

        let truncated: String = text.chars().take(MAX_PAGE_CHARS).collect();
        let suffix = if text.chars().count() > MAX_PAGE_CHARS {
            "\n... (truncated)"
        } else {
            ""
        };
        ToolResult::success(format!("Content of {}:\n\n{}{}", url, truncated, suffix))
    }
}

/// Drop tags, scripts, and styles; collapse whitespace.
fn strip_html(html: &str) -> String {
    fn starts_with_ci(bytes: &[u8], prefix: &str) -> bool {
        bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    }
    fn find_ci(haystack: &[u8], needle: &str) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
    }

    let bytes = html.as_bytes();
    let mut text = String::with_capacity(html.len() / 4);
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'<' {
            if starts_with_ci(&bytes[i..], "<script") {
                i = find_ci(&bytes[i..], "</script>")
                    .map(|p| i + p + "</script>".len())
                    .unwrap_or(bytes.len());
                continue;
            }
            if starts_with_ci(&bytes[i..], "<style") {
                i = find_ci(&bytes[i..], "</style>")
                    .map(|p| i + p + "</style>".len())
                    .unwrap_or(bytes.len());
                continue;
            }
            match bytes[i..].iter().position(|&b| b == b'>') {
                Some(p) => {
                    i += p + 1;
                    text.push(' ');
                }
                None => break,
            }
            continue;
        }

        // Copy text up to the next tag; '<' is ASCII so the slice is safe.
        let next = bytes[i..]
            .iter()
            .position(|&b| b == b'<')
            .map(|p| i + p)
            .unwrap_or(bytes.len());
        text.push_str(&html[i..next]);
        i = next;
    }

    // Collapse runs of whitespace
    let mut collapsed = String::with_capacity(text.len());
    let mut last_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
            }
            last_was_space = true;
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_strip_html() {
        let html = "<html><head><style>p {color: red}</style></head>\
                    <body><h1>Title</h1><script>var x = 1;</script><p>Hello   world</p></body></html>";
        let text = strip_html(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Hello world"));
        assert!(!text.contains("color"));
        assert!(!text.contains("var x"));
    }

    #[tokio::test]
    async fn test_http_request_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\": true}"))
            .mount(&server)
            .await;

        let tool = HttpRequestTool::new();
        let result = tool
            .execute(serde_json::json!({"url": format!("{}/data", server.uri())}))
            .await;
        assert!(result.success);
        let observation = result.to_observation();
        assert!(observation.contains("Status: 200"));
        assert!(observation.contains("\"ok\": true"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let tool = HttpRequestTool::new();
        let result = tool
            .execute(serde_json::json!({"url": "not a url"}))
            .await;
        assert!(!result.success);
        assert!(result.to_observation().contains("invalid URL"));
    }

    #[tokio::test]
    async fn test_unsupported_method_rejected() {
        let tool = HttpRequestTool::new();
        let result = tool
            .execute(serde_json::json!({"url": "https://example.com", "method": "DELETE"}))
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_fetch_webpage_strips_markup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><p>Plain words here</p></body></html>"),
            )
            .mount(&server)
            .await;

        let tool = FetchWebpageTool::new();
        let result = tool
            .execute(serde_json::json!({"url": format!("{}/page", server.uri())}))
            .await;
        assert!(result.success);
        let observation = result.to_observation();
        assert!(observation.contains("Plain words here"));
        assert!(!observation.contains("<p>"));
    }
}
