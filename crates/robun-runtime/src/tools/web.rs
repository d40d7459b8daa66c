//! Web tools: Brave-backed search and page fetching with readable-text
//! extraction. Timeouts surface as tool-result strings, never as errors.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Node};
use serde_json::{Value, json};
use tracing::info;

use robun_core::Result;

use super::{Tool, ToolContext};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_CHARS: usize = 50_000;

// ── web_search ─────────────────────────────────────────────────

pub struct WebSearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl WebSearchTool {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return a numbered list of results"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "count": { "type": "integer", "description": "Number of results (default 5, max 10)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> Result<String> {
        let query = args["query"].as_str().unwrap_or_default();
        let count = args["count"].as_u64().unwrap_or(5).min(10);

        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Ok(
                "Error: Web search is not configured. Set tools.web_search_api_key.".into(),
            );
        };

        info!(query, count, "web search");

        let resp = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[("q", query), ("count", &count.to_string())])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Ok("Error: Web search timed out after 10s".into());
            }
            Err(e) => return Ok(format!("Error: Web search request failed: {e}")),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            return Ok(format!("Error: Search API returned HTTP {status}"));
        }

        let data: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return Ok(format!("Error: Failed to parse search results: {e}")),
        };

        let mut results = Vec::new();
        if let Some(items) = data["web"]["results"].as_array() {
            for (i, item) in items.iter().take(count as usize).enumerate() {
                let title = item["title"].as_str().unwrap_or("Untitled");
                let url = item["url"].as_str().unwrap_or("");
                let description = item["description"].as_str().unwrap_or("");
                results.push(format!("{}. {title}\n   {url}\n   {description}", i + 1));
            }
        }

        if results.is_empty() {
            return Ok(format!("No results found for: {query}"));
        }
        Ok(format!(
            "Search results for '{query}':\n\n{}",
            results.join("\n\n")
        ))
    }
}

// ── web_fetch ──────────────────────────────────────────────────

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its readable text (or raw body) as JSON"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "http(s) URL to fetch" },
                "extract_mode": {
                    "type": "string",
                    "enum": ["text", "raw"],
                    "description": "'text' extracts readable page text, 'raw' returns the body as-is (default text)"
                },
                "max_chars": { "type": "integer", "description": "Truncate the result to this many characters" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> Result<String> {
        let url = args["url"].as_str().unwrap_or_default();
        let mode = args["extract_mode"].as_str().unwrap_or("text");
        let max_chars = args["max_chars"].as_u64().unwrap_or(DEFAULT_MAX_CHARS as u64) as usize;

        let parsed = match reqwest::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            _ => {
                return Ok(json!({
                    "url": url,
                    "error": "URL validation failed: only http and https URLs are supported",
                })
                .to_string());
            }
        };

        info!(url, mode, "web fetch");

        let resp = match self
            .client
            .get(parsed)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Ok(json!({ "url": url, "error": "Fetch timed out after 30s" }).to_string());
            }
            Err(e) => {
                return Ok(json!({ "url": url, "error": format!("Fetch failed: {e}") }).to_string());
            }
        };

        let status = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                return Ok(
                    json!({ "url": url, "error": format!("Failed to read body: {e}") }).to_string(),
                );
            }
        };

        let extracted = match mode {
            "raw" => body,
            _ => extract_readable_text(&body),
        };

        let truncated = extracted.chars().count() > max_chars;
        let text: String = extracted.chars().take(max_chars).collect();

        Ok(json!({
            "url": url,
            "status": status,
            "extractMode": mode,
            "truncated": truncated,
            "text": text,
        })
        .to_string())
    }
}

/// Collect visible text from an HTML document, skipping script/style/head
/// content and collapsing whitespace.
fn extract_readable_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut chunks: Vec<String> = Vec::new();

    for node in document.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            matches!(
                a.value(),
                Node::Element(el) if matches!(el.name(), "script" | "style" | "noscript" | "head" | "template")
            )
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.split_whitespace().collect::<Vec<_>>().join(" "));
        }
    }

    chunks.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_http_url_fails_validation() {
        let fetch = WebFetchTool::new(reqwest::Client::new());
        for url in ["ftp://example.com/x", "file:///etc/passwd", "not-a-url"] {
            let result = fetch
                .execute(&ToolContext::default(), &json!({"url": url}))
                .await
                .unwrap();
            let parsed: Value = serde_json::from_str(&result).unwrap();
            assert!(
                parsed["error"]
                    .as_str()
                    .unwrap()
                    .contains("URL validation failed"),
                "expected validation failure for {url}"
            );
        }
    }

    #[tokio::test]
    async fn unconfigured_search_is_an_error_string() {
        let search = WebSearchTool::new(reqwest::Client::new(), None);
        let result = search
            .execute(&ToolContext::default(), &json!({"query": "rust"}))
            .await
            .unwrap();
        assert!(result.starts_with("Error: Web search is not configured"));
    }

    #[test]
    fn readable_text_skips_script_and_style() {
        let html = r#"
            <html><head><title>T</title><style>body { color: red }</style></head>
            <body>
              <h1>Heading</h1>
              <script>var x = "invisible";</script>
              <p>First   paragraph.</p>
              <p>Second paragraph.</p>
            </body></html>
        "#;
        let text = extract_readable_text(html);
        assert!(text.contains("Heading"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
        assert!(!text.contains("invisible"));
        assert!(!text.contains("color: red"));
    }
}
