//! Web search: the search backend seam, the Brave Search client, page text
//! extraction, and the `web_search` tool built on them.

use super::{ParamKind, ParamSpec, Tool, ToolArgs};
use crate::error::OrchestrationError;
use crate::models::{SearchHit, ToolResult};
use crate::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const MAX_PAGE_CHARS: usize = 1500;
const RESULT_COUNT: usize = 3;

lazy_static! {
    static ref NOISE_BLOCKS: Regex =
        Regex::new(r"(?is)<(script|style|nav|footer|header|aside)\b.*?</(script|style|nav|footer|header|aside)>")
            .expect("noise block pattern is valid");
    static ref ARTICLE: Regex =
        Regex::new(r"(?is)<(article|main)\b[^>]*>(.*?)</(article|main)>").expect("article pattern is valid");
    static ref TAGS: Regex = Regex::new(r"<[^>]+>").expect("tag pattern is valid");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
}

/// External search backend
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Adapter turning a plain function into a search backend
pub struct SearchFn<F>(pub F);

#[async_trait]
impl<F> WebSearch for SearchFn<F>
where
    F: Fn(&str) -> Result<Vec<SearchHit>> + Send + Sync,
{
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let mut hits = (self.0)(query)?;
        hits.truncate(max_results);
        Ok(hits)
    }
}

/// Brave Search web API
pub struct BraveSearch {
    client: Client,
    api_key: Option<String>,
}

impl BraveSearch {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(timeout)
            .build()?;

        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            OrchestrationError::SearchError("BRAVE_API_KEY not configured".to_string())
        })?;

        let count = max_results.to_string();
        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .send()
            .await
            .map_err(|e| OrchestrationError::SearchError(format!("Brave request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::SearchError(format!(
                "Brave returned {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = response.json().await?;

        let hits = body
            .pointer("/web/results")
            .and_then(|v| v.as_array())
            .map(|results| {
                results
                    .iter()
                    .take(max_results)
                    .map(|r| SearchHit {
                        title: strip_html(r.get("title").and_then(|v| v.as_str()).unwrap_or_default()),
                        snippet: strip_html(
                            r.get("description").and_then(|v| v.as_str()).unwrap_or_default(),
                        ),
                        url: r.get("url").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }
}

/// Fetches a page and reduces it to readable text
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(OrchestrationError::SearchError(format!(
                "Fetching {} returned {}",
                url,
                response.status()
            )));
        }

        let html = response.text().await?;
        Ok(extract_page_text(&html, MAX_PAGE_CHARS))
    }
}

/// Main content text of an HTML page, truncated to `limit` characters
pub fn extract_page_text(html: &str, limit: usize) -> String {
    let cleaned = NOISE_BLOCKS.replace_all(html, " ");

    let body = ARTICLE
        .captures(&cleaned)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| cleaned.to_string());

    strip_html(&body).chars().take(limit).collect()
}

fn strip_html(text: &str) -> String {
    let without_tags = TAGS.replace_all(text, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub struct WebSearchTool {
    search: Arc<dyn WebSearch>,
    fetcher: Option<Arc<dyn PageFetcher>>,
}

impl WebSearchTool {
    pub fn new(search: Arc<dyn WebSearch>, fetcher: Option<Arc<dyn PageFetcher>>) -> Self {
        Self { search, fetcher }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> &'static str {
        "Search the web and read the top result. Use for symbols, history, trends or anything the data tools do not cover"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("query", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let query = args.text("query")?;
        debug!(query = %query, "web_search");

        let hits = self.search.search(query, RESULT_COUNT).await?;

        let mut full_content = String::new();
        if let (Some(fetcher), Some(first)) = (&self.fetcher, hits.first()) {
            if !first.url.is_empty() {
                match fetcher.fetch_text(&first.url).await {
                    Ok(text) => full_content = text,
                    Err(e) => {
                        warn!(url = %first.url, error = %e, "Page fetch failed, using snippet");
                        full_content = first.snippet.clone();
                    }
                }
            }
        }

        Ok(ToolResult::from_json(json!({
            "query": query,
            "results": hits
                .iter()
                .map(|h| json!({
                    "title": truncate(&h.title, 80),
                    "snippet": truncate(&h.snippet, 200),
                }))
                .collect::<Vec<_>>(),
            "full_content": if full_content.is_empty() {
                "Content could not be retrieved".to_string()
            } else {
                full_content
            },
            "source_url": hits.first().map(|h| h.url.clone()).unwrap_or_default(),
        })))
    }
}
