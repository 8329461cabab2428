// Internet search backend: DuckDuckGo instant answers plus URL fetching.

use crate::dispatcher::Dispatcher;
use crate::resources::FnResource;
use crate::tools::Tool;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{
    FieldType, InputSchema, PeerInfo, PropertySchema, ResourceDescriptor, ToolDescriptor,
};
use url::Url;

pub const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";
const FETCH_CONTENT_LIMIT: usize = 5000;
const PAGE_TEXT_LIMIT: usize = 3000;
const MAX_LINKS: usize = 20;

/// Connection settings shared by the search tools.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    /// Hosts `fetch_url` may contact; `None` allows any host.
    pub allowed_domains: Option<Vec<String>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
            allowed_domains: None,
        }
    }
}

pub fn dispatcher() -> Dispatcher {
    dispatcher_with(SearchConfig::default())
}

pub fn dispatcher_with(config: SearchConfig) -> Dispatcher {
    let config = Arc::new(config);
    let mut d = Dispatcher::new(PeerInfo::new("internet-search-mcp", env!("CARGO_PKG_VERSION")))
        .with_tool(Arc::new(WebSearchTool::new(config.clone())))
        .with_tool(Arc::new(FetchUrlTool::new(config.clone())))
        .with_tool(Arc::new(PageContentTool::new(config)));

    for (uri, name, description) in [
        ("search://web", "Web Search", "Search the web for information"),
        ("search://news", "News Search", "Search for recent news articles"),
    ] {
        d = d.with_resource(Arc::new(FnResource::new(
            ResourceDescriptor::new(uri, name, description),
            move || {
                Ok(json!({
                    "message": format!("Use the search tools to query {}", uri),
                    "available_tools": ["web_search", "fetch_url", "get_page_content"],
                }))
            },
        )));
    }
    d
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("tether-mcp/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

pub struct WebSearchTool {
    config: Arc<SearchConfig>,
}

impl WebSearchTool {
    pub fn new(config: Arc<SearchConfig>) -> Self {
        Self { config }
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default = "default_num_results")]
    num_results: usize,
}

fn default_num_results() -> usize {
    10
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "web_search",
            "Search the web using a search engine",
            InputSchema::object()
                .string("query", "Search query")
                .property(
                    "num_results",
                    PropertySchema::new(FieldType::Integer, "Number of results to return")
                        .with_default(json!(10)),
                )
                .required("query"),
        )
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let args: WebSearchArgs =
            serde_json::from_value(arguments).context("Invalid arguments for web_search")?;

        let url = Url::parse_with_params(
            &self.config.endpoint,
            &[
                ("q", args.query.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )
        .context("Invalid search endpoint")?;

        let response = http_client(Duration::from_secs(30))?
            .get(url)
            .send()
            .await
            .context("Search failed")?;
        if !response.status().is_success() {
            bail!("Search failed with status: {}", response.status().as_u16());
        }
        let data: Value = response.json().await.context("Search failed")?;

        let field = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or_default();
        let related_topics: Vec<Value> = data
            .get("RelatedTopics")
            .and_then(Value::as_array)
            .map(|topics| {
                topics
                    .iter()
                    .take(args.num_results)
                    .filter(|t| t.get("Text").is_some())
                    .map(|t| json!({"text": t["Text"], "url": t.get("FirstURL").cloned().unwrap_or_else(|| json!(""))}))
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "query": args.query,
            "abstract": field("Abstract"),
            "abstract_source": field("AbstractSource"),
            "abstract_url": field("AbstractURL"),
            "answer": field("Answer"),
            "definition": field("Definition"),
            "related_topics": related_topics,
        }))
    }
}

pub struct FetchUrlTool {
    config: Arc<SearchConfig>,
}

impl FetchUrlTool {
    pub fn new(config: Arc<SearchConfig>) -> Self {
        Self { config }
    }

    fn is_domain_allowed(&self, url: &Url) -> bool {
        let Some(allowed) = &self.config.allowed_domains else {
            return true;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)))
    }

    fn validate(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw).with_context(|| format!("Invalid URL: {}", raw))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!("Only HTTP/HTTPS URLs are supported, got: {}", url.scheme());
        }
        if !self.is_domain_allowed(&url) {
            bail!(
                "Domain not allowed: {}",
                url.host_str().unwrap_or("unknown")
            );
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct FetchUrlArgs {
    url: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

#[async_trait::async_trait]
impl Tool for FetchUrlTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "fetch_url",
            "Fetch content from a specific URL",
            InputSchema::object()
                .string("url", "URL to fetch")
                .property(
                    "timeout",
                    PropertySchema::new(FieldType::Integer, "Request timeout in seconds")
                        .with_default(json!(30)),
                )
                .required("url"),
        )
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let args: FetchUrlArgs =
            serde_json::from_value(arguments).context("Invalid arguments for fetch_url")?;
        let url = self.validate(&args.url)?;

        let response = http_client(Duration::from_secs(args.timeout))?
            .get(url)
            .send()
            .await
            .context("URL fetch failed")?;
        let status = response.status().as_u16();
        let headers: serde_json::Map<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    json!(value.to_str().unwrap_or("<non-utf8>")),
                )
            })
            .collect();
        let body = response.text().await.context("Failed to read response body")?;

        Ok(json!({
            "url": args.url,
            "status": status,
            "headers": headers,
            "content": truncate_chars(&body, FETCH_CONTENT_LIMIT),
            "content_length": body.chars().count(),
        }))
    }
}

pub struct PageContentTool {
    fetch: FetchUrlTool,
}

impl PageContentTool {
    pub fn new(config: Arc<SearchConfig>) -> Self {
        Self {
            fetch: FetchUrlTool::new(config),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageContentArgs {
    url: String,
    #[serde(default)]
    extract_links: bool,
}

#[async_trait::async_trait]
impl Tool for PageContentTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "get_page_content",
            "Extract text content from a webpage",
            InputSchema::object()
                .string("url", "URL to extract content from")
                .property(
                    "extract_links",
                    PropertySchema::new(FieldType::Boolean, "Whether to extract links from the page")
                        .with_default(json!(false)),
                )
                .required("url"),
        )
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let args: PageContentArgs =
            serde_json::from_value(arguments).context("Invalid arguments for get_page_content")?;
        let url = self.fetch.validate(&args.url)?;

        let html = http_client(Duration::from_secs(30))?
            .get(url)
            .send()
            .await
            .context("Content extraction failed")?
            .text()
            .await
            .context("Content extraction failed")?;

        let page = strip_blocks(&strip_blocks(&html, "script"), "style");
        let text = collapse_whitespace(&strip_tags(&page));
        let mut result = json!({
            "url": args.url,
            "title": extract_title(&page).unwrap_or_else(|| "No title found".to_string()),
            "text_content": truncate_chars(&text, PAGE_TEXT_LIMIT),
            "content_length": text.chars().count(),
        });
        if args.extract_links {
            result["links"] = json!(extract_links(&page));
        }
        Ok(result)
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Remove `<tag ...>...</tag>` blocks, case-insensitively.
fn strip_blocks(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    while let Some(start) = lower[cursor..].find(&open).map(|i| i + cursor) {
        out.push_str(&html[cursor..start]);
        match lower[start..].find(&close) {
            Some(end) => cursor = start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&html[cursor..]);
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find("</title>")?;
    let title = html[content_start..content_end].trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn extract_links(html: &str) -> Vec<Value> {
    let lower = html.to_ascii_lowercase();
    let mut links = Vec::new();
    let mut cursor = 0;
    while links.len() < MAX_LINKS {
        let Some(start) = lower[cursor..].find("<a ").map(|i| i + cursor) else {
            break;
        };
        let Some(tag_end) = lower[start..].find('>').map(|i| i + start) else {
            break;
        };
        let Some(close) = lower[tag_end..].find("</a>").map(|i| i + tag_end) else {
            break;
        };
        if let Some(href) = attribute(&html[start..tag_end], "href") {
            links.push(json!({
                "url": href,
                "text": strip_tags(&html[tag_end + 1..close]).trim(),
            }));
        }
        cursor = close + 4;
    }
    links
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let at = lower.find(&format!("{}=", name))? + name.len() + 1;
    let quote = tag[at..].chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value_start = at + 1;
    let value_end = value_start + tag[value_start..].find(quote)?;
    Some(&tag[value_start..value_end])
}
