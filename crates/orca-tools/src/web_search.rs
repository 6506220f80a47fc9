//! Web search via the Exa API, with DuckDuckGo as fallback
//!
//! Every result URL is recorded as a source in the session context.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Error, Result, Source, Tool, ToolContext, ToolResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const EXA_URL: &str = "https://api.exa.ai/search";
const DDG_URL: &str = "https://api.duckduckgo.com/";

pub struct WebSearchTool {
    client: Client,
    exa_api_key: Option<String>,
}

impl WebSearchTool {
    /// Reads `EXA_API_KEY` from the environment
    pub fn new() -> Self {
        Self::with_api_key(env::var("EXA_API_KEY").ok().filter(|k| !k.is_empty()))
    }

    pub fn with_api_key(exa_api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, exa_api_key }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_true")]
    use_exa: bool,
}

fn default_limit() -> usize {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    title: Option<String>,
    url: String,
    published_date: Option<String>,
    #[serde(default)]
    text: String,
}

/// DuckDuckGo Instant Answer response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoResponse {
    #[serde(default)]
    related_topics: Vec<DuckDuckGoTopic>,
    #[serde(default)]
    abstract_text: Option<String>,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: Option<String>,
    #[serde(default)]
    abstract_source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoTopic {
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
    published_date: Option<String>,
}

impl WebSearchTool {
    async fn search_exa(&self, api_key: &str, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let body = json!({
            "query": query,
            "numResults": limit,
            "type": "auto",
            "contents": {"text": {"maxCharacters": 1000}}
        });

        let response = self
            .client
            .post(EXA_URL)
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ToolExecution(format!("Exa API error ({}): {}", status, body)));
        }

        let exa: ExaResponse = response.json().await?;
        Ok(exa
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title.unwrap_or_else(|| "No title".to_string()),
                url: r.url,
                snippet: r.text,
                published_date: r.published_date,
            })
            .collect())
    }

    async fn search_duckduckgo(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            DDG_URL,
            urlencoding::encode(query)
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::ToolExecution(format!(
                "DuckDuckGo API error: {}",
                response.status()
            )));
        }

        let ddg: DuckDuckGoResponse = response.json().await?;
        Ok(ddg_results(ddg, limit))
    }
}

fn ddg_results(ddg: DuckDuckGoResponse, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(text) = ddg.abstract_text.filter(|t| !t.is_empty()) {
        results.push(SearchResult {
            title: ddg.abstract_source.unwrap_or_else(|| "Summary".to_string()),
            url: ddg.abstract_url.unwrap_or_default(),
            snippet: text,
            published_date: None,
        });
    }

    for topic in ddg.related_topics {
        if results.len() >= limit {
            break;
        }
        if let (Some(text), Some(url)) = (topic.text, topic.first_url) {
            if !text.is_empty() {
                results.push(SearchResult {
                    title: extract_title(&text),
                    url,
                    snippet: text,
                    published_date: None,
                });
            }
        }
    }

    results
}

fn format_results(results: &[SearchResult], query: &str) -> String {
    let mut output = format!("Search results for: \"{}\"\n\n", query);

    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!("## [{}] {}\n", i + 1, result.title));
        output.push_str(&format!("URL: {}\n", result.url));
        if let Some(date) = &result.published_date {
            output.push_str(&format!("Published: {}\n", date));
        }
        output.push_str(&format!("{}\n\n", result.snippet));
    }

    output.push_str(&format!("Found {} results.\n", results.len()));
    output
}

/// DuckDuckGo topic text usually reads "Title - Description"
fn extract_title(text: &str) -> String {
    text.split(" - ").next().unwrap_or("Result").to_string()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information using Exa (preferred) or DuckDuckGo fallback. Returns relevant \
search results with titles, URLs, and snippets."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("query", "The search query to look up", true)
            .integer("limit", "Maximum number of results to return (default: 5, max: 10)", false)
            .boolean(
                "use_exa",
                "Use Exa if available (default: true). Set to false to force DuckDuckGo.",
                false,
            )
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: SearchInput = parse_input(input)?;
        if input.query.trim().is_empty() {
            return Ok(ToolResult::error("Query cannot be empty"));
        }
        let limit = input.limit.clamp(1, 10);

        tracing::info!(query = %input.query, limit, use_exa = input.use_exa, "Executing web search");

        let mut results = None;
        if let Some(api_key) = self.exa_api_key.as_deref().filter(|_| input.use_exa) {
            match self.search_exa(api_key, &input.query, limit).await {
                Ok(found) => results = Some(found),
                Err(e) => tracing::warn!(error = %e, "Exa search failed, falling back to DuckDuckGo"),
            }
        }
        let results = match results {
            Some(found) => found,
            None => self.search_duckduckgo(&input.query, limit).await?,
        };

        if results.is_empty() {
            return Ok(ToolResult::success(format!(
                "No results found for '{}'. Try a different query.",
                input.query
            )));
        }

        for result in results.iter().filter(|r| !r.url.is_empty()) {
            ctx.add_source(Source::new(&result.url, &result.title, self.name()));
        }
        Ok(ToolResult::success(format_results(&results, &input.query)))
    }
}
