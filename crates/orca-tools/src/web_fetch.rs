//! Web page fetching with HTML to text conversion
//!
//! A successful fetch records the page URL and title as a source.

use std::time::Duration;

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Error, Result, Source, Tool, ToolContext, ToolResult};
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

const MAX_BODY_BYTES: usize = 1_000_000;

/// Elements whose text is never shown
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg"];

pub struct WebFetchTool {
    client: Client,
    max_body_bytes: usize,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("Mozilla/5.0 (compatible; orca/", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct FetchInput {
    url: String,
    #[serde(default = "default_true")]
    extract_main: bool,
    #[serde(default)]
    include_links: bool,
    #[serde(default = "default_max_chars")]
    max_chars: usize,
}

fn default_max_chars() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

/// A fetched page rendered for the model
#[derive(Debug)]
struct Page {
    title: String,
    text: String,
}

impl WebFetchTool {
    async fn fetch(&self, url: &Url, input: &FetchInput) -> Result<Page> {
        tracing::info!(url = %url, "Fetching web page");

        let response = self.client.get(url.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(Error::ToolExecution(format!("HTTP error: {}", response.status())));
        }
        if let Some(length) = response.content_length().filter(|&l| l as usize > self.max_body_bytes) {
            return Err(Error::ToolExecution(format!(
                "Content too large: {} bytes (max: {})",
                length, self.max_body_bytes
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let body = response.text().await?;

        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Ok(Page {
                title: url.to_string(),
                text: format!("Content-Type: {}\n\n{}", content_type, truncate_text(&body, input.max_chars)),
            });
        }

        Ok(render_html(&body, url, input.extract_main, input.include_links, input.max_chars))
    }
}

fn render_html(html: &str, url: &Url, extract_main: bool, include_links: bool, max_chars: usize) -> Page {
    let document = Html::parse_document(html);
    let title = extract_title(&document);

    let content = if extract_main {
        extract_main_content(&document)
    } else {
        extract_all_text(&document)
    };

    let truncated = truncate_text(&content, max_chars);
    let mut text = format!("Title: {}\n\n{}", title, truncated);
    if truncated.len() < content.len() {
        text.push_str(&format!("\n\n[Content truncated to {} characters]", max_chars));
    }

    if include_links {
        let links = extract_links(&document, url);
        if !links.is_empty() {
            text.push_str("\n\n## Links\n");
            text.push_str(&links);
        }
    }

    Page { title, text }
}

fn extract_title(document: &Html) -> String {
    Selector::parse("title")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .map(|title| title.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "No title".to_string())
}

/// Visible text under an element, whitespace collapsed
fn visible_text(element: ElementRef<'_>) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in element.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
            });
            if !hidden {
                words.extend(text.split_whitespace());
            }
        }
    }
    words.join(" ")
}

/// Text of the first content container with substance, else the whole body
fn extract_main_content(document: &Html) -> String {
    let candidates = ["article", "main", "[role='main']", ".content", "#content"];

    for candidate in candidates {
        if let Ok(selector) = Selector::parse(candidate) {
            let content = document
                .select(&selector)
                .map(visible_text)
                .collect::<Vec<_>>()
                .join(" ");
            if content.len() > 100 {
                return content;
            }
        }
    }

    extract_all_text(document)
}

fn extract_all_text(document: &Html) -> String {
    match Selector::parse("body").ok().and_then(|s| document.select(&s).next()) {
        Some(body) => visible_text(body),
        None => visible_text(document.root_element()),
    }
}

fn extract_links(document: &Html, base_url: &Url) -> String {
    let Ok(selector) = Selector::parse("a[href]") else {
        return String::new();
    };

    document
        .select(&selector)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let text = link.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
            let resolved = base_url.join(href).ok()?;
            (!text.is_empty() && matches!(resolved.scheme(), "http" | "https"))
                .then(|| format!("- [{}]({})", text, resolved))
        })
        .take(20)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut to at most `max_chars` characters, preferring a word boundary
fn truncate_text(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let truncated = &text[..cut];
    match truncated.rfind(' ') {
        Some(space) => truncated[..space].to_string(),
        None => truncated.to_string(),
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch and parse a web page, extracting text content. Returns the page title, main content, \
and optionally links."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("url", "The URL to fetch and parse", true)
            .boolean(
                "extract_main",
                "Extract only main content (article/main) instead of all text (default: true)",
                false,
            )
            .boolean("include_links", "Include extracted links in the output (default: false)", false)
            .integer("max_chars", "Maximum characters to return (default: 10000, max: 50000)", false)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let mut input: FetchInput = parse_input(input)?;
        input.max_chars = input.max_chars.clamp(1000, 50_000);

        let url = match Url::parse(input.url.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(_) => return Ok(ToolResult::error("Only HTTP and HTTPS URLs are supported")),
            Err(e) => return Ok(ToolResult::error(format!("Invalid URL: {}", e))),
        };

        match self.fetch(&url, &input).await {
            Ok(page) => {
                ctx.add_source(Source::new(url.as_str(), &page.title, self.name()));
                Ok(ToolResult::success(page.text))
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Fetch failed");
                Ok(ToolResult::error(format!("Failed to fetch URL: {}", e)))
            }
        }
    }
}
