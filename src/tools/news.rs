//! News headlines and keyword sentiment

use super::{ParamKind, ParamSpec, Tool, ToolArgs};
use crate::error::OrchestrationError;
use crate::models::ToolResult;
use crate::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fetched before scrubbing, so duplicates and ads don't eat the 5 slots
const FETCHED_HEADLINES: usize = 20;
const HEADLINE_LIMIT: usize = 5;
const HEADLINE_CHARS: usize = 80;
const RETURNED_HEADLINES: usize = 3;

const POSITIVE_WORDS: &[&str] = &[
    "kâr", "artış", "büyüme", "rekor", "yükseliş",
    "profit", "growth", "record", "surge", "rally",
];
const NEGATIVE_WORDS: &[&str] = &[
    "zarar", "düşüş", "kriz", "risk", "satış",
    "loss", "decline", "crisis", "plunge", "selloff",
];

/// Similarity above which two titles count as the same story
const DUPLICATE_SIMILARITY: f64 = 0.8;

const NOISE_PHRASES: &[&str] = &[
    "yatırım tavsiyesi değildir",
    "sponsorlu içerik",
    "reklam",
    "casino",
    "bahis",
];

const TURKISH_CHARS: &[char] = &['ğ', 'ü', 'ş', 'ı', 'ö', 'ç', 'Ğ', 'Ü', 'Ş', 'İ', 'Ö', 'Ç'];

lazy_static! {
    static ref ITEM_TITLE: Regex =
        Regex::new(r"(?s)<item>.*?<title>(.*?)</title>").expect("item title pattern is valid");
    static ref CDATA: Regex =
        Regex::new(r"(?s)^<!\[CDATA\[(.*)\]\]>$").expect("cdata pattern is valid");
}

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn headlines(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

/// Google News RSS search
pub struct GoogleNewsRss {
    client: Client,
    base_url: String,
}

impl GoogleNewsRss {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NewsFeed for GoogleNewsRss {
    async fn headlines(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let url = format!("{}/rss/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("hl", "tr"), ("gl", "TR"), ("ceid", "TR:tr")])
            .send()
            .await
            .map_err(|e| OrchestrationError::NewsError(format!("RSS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(OrchestrationError::NewsError(format!(
                "RSS feed returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let mut titles = parse_rss_titles(&body);
        titles.truncate(limit);
        debug!(query = %query, count = titles.len(), "Fetched headlines");

        Ok(titles)
    }
}

/// Item titles of an RSS document, entities decoded
pub fn parse_rss_titles(xml: &str) -> Vec<String> {
    ITEM_TITLE
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| {
            let raw = m.as_str().trim();
            let text = CDATA
                .captures(raw)
                .and_then(|c| c.get(1))
                .map(|inner| inner.as_str())
                .unwrap_or(raw);
            html_escape::decode_html_entities(text).trim().to_string()
        })
        .filter(|title| !title.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Headline {
    pub title: String,
    /// "tr" or "en"
    pub language: &'static str,
}

/// Lowercase with the dot of a lowercased `İ` dropped
fn fold(text: &str) -> String {
    text.to_lowercase().replace('\u{307}', "")
}

pub fn is_noise(title: &str) -> bool {
    let folded = fold(title);
    NOISE_PHRASES.iter().any(|phrase| folded.contains(phrase))
}

pub fn detect_language(text: &str) -> &'static str {
    if text.contains(TURKISH_CHARS) {
        "tr"
    } else {
        "en"
    }
}

/// Drops ads and near-duplicate titles (earliest kept), tags the language
pub fn scrub_headlines(titles: Vec<String>) -> Vec<Headline> {
    let mut seen: Vec<String> = Vec::new();
    let mut kept = Vec::new();

    for title in titles {
        if is_noise(&title) {
            debug!(title = %title, "Dropped noise headline");
            continue;
        }

        let folded = fold(&title);
        if seen
            .iter()
            .any(|s| strsim::normalized_levenshtein(s, &folded) > DUPLICATE_SIMILARITY)
        {
            debug!(title = %title, "Dropped duplicate headline");
            continue;
        }
        seen.push(folded);

        kept.push(Headline {
            language: detect_language(&title),
            title,
        });
    }

    kept
}

/// +1 per positive keyword hit, -1 per negative one, across all headlines
pub fn sentiment_score(headlines: &[String]) -> i32 {
    headlines
        .iter()
        .map(|h| {
            let lower = h.to_lowercase();
            let hits = |words: &[&str]| words.iter().filter(|w| lower.contains(*w)).count() as i32;
            hits(POSITIVE_WORDS) - hits(NEGATIVE_WORDS)
        })
        .sum()
}

fn sentiment_label(score: i32) -> &'static str {
    match score {
        s if s > 0 => "+",
        s if s < 0 => "-",
        _ => "0",
    }
}

/// Fixed headlines, used by tests and offline runs
pub struct StaticNewsFeed {
    headlines: Vec<String>,
}

impl StaticNewsFeed {
    pub fn new(headlines: Vec<String>) -> Self {
        Self { headlines }
    }
}

#[async_trait]
impl NewsFeed for StaticNewsFeed {
    async fn headlines(&self, _query: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self.headlines.iter().take(limit).cloned().collect())
    }
}

pub struct GetNewsTool {
    feed: Arc<dyn NewsFeed>,
}

impl GetNewsTool {
    pub fn new(feed: Arc<dyn NewsFeed>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl Tool for GetNewsTool {
    fn name(&self) -> &'static str {
        "get_news"
    }

    fn description(&self) -> &'static str {
        "Recent news headlines for a company or asset with a simple sentiment score (+, -, 0)"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("company", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let company = args.text("company")?;

        let fetched = self.feed.headlines(company, FETCHED_HEADLINES).await?;

        let headlines: Vec<Headline> = scrub_headlines(fetched)
            .into_iter()
            .take(HEADLINE_LIMIT)
            .map(|h| Headline {
                title: h.title.chars().take(HEADLINE_CHARS).collect(),
                language: h.language,
            })
            .collect();

        let titles: Vec<String> = headlines.iter().map(|h| h.title.clone()).collect();
        let score = sentiment_score(&titles);

        Ok(ToolResult::from_json(json!({
            "company": company,
            "news": headlines.iter().take(RETURNED_HEADLINES).collect::<Vec<_>>(),
            "sentiment": sentiment_label(score),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rss_titles() {
        let xml = r#"<?xml version="1.0"?><rss><channel>
            <title>Google News</title>
            <item><title>THY rekor kâr açıkladı - Bloomberg HT</title><link>x</link></item>
            <item><title><![CDATA[Aselsan &amp; Roketsan ortaklığı]]></title></item>
            </channel></rss>"#;

        assert_eq!(
            parse_rss_titles(xml),
            vec!["THY rekor kâr açıkladı - Bloomberg HT", "Aselsan & Roketsan ortaklığı"]
        );
    }

    #[test]
    fn test_sentiment_score() {
        let headlines = vec![
            "Rekor kâr geldi".to_string(),
            "Piyasada düşüş".to_string(),
            "Nötr haber".to_string(),
        ];
        assert_eq!(sentiment_score(&headlines), 1);
        assert_eq!(sentiment_label(0), "0");
        assert_eq!(sentiment_label(-2), "-");
    }

    #[tokio::test]
    async fn test_get_news_truncates_and_scores() {
        let long = format!("Borsa kriz {}", "x".repeat(200));
        let feed = StaticNewsFeed::new(vec![
            long,
            "Satış baskısı sürüyor".to_string(),
            "Hisse yükseliş trendinde".to_string(),
            "Dördüncü başlık".to_string(),
        ]);
        let tool = GetNewsTool::new(Arc::new(feed));

        let mut args = ToolArgs::default();
        args.insert("company", json!("THY"));
        let result = tool.execute(&args).await.unwrap();
        let payload = result.payload().unwrap();

        let news = payload["news"].as_array().unwrap();
        assert_eq!(news.len(), 3);
        assert_eq!(news[0]["title"].as_str().unwrap().chars().count(), 80);
        assert_eq!(news[0]["language"], "en");
        assert_eq!(news[1]["language"], "tr");
        assert_eq!(payload["sentiment"], "-");
    }

    #[test]
    fn test_scrub_drops_ads_and_duplicates() {
        let titles = vec![
            "THY rekor kâr açıkladı - Bloomberg HT".to_string(),
            "Sponsorlu İçerik: En iyi bahis siteleri".to_string(),
            "THY rekor kâr açıkladı - Bloomberg".to_string(),
            "Turkish Airlines posts record profit".to_string(),
            "REKLAM | Kredi kartı kampanyası".to_string(),
        ];

        let scrubbed = scrub_headlines(titles);

        assert_eq!(
            scrubbed,
            vec![
                Headline {
                    title: "THY rekor kâr açıkladı - Bloomberg HT".to_string(),
                    language: "tr",
                },
                Headline {
                    title: "Turkish Airlines posts record profit".to_string(),
                    language: "en",
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_get_news_counts_syndicated_story_once() {
        let feed = StaticNewsFeed::new(vec![
            "Aselsan rekor büyüme açıkladı".to_string(),
            "Aselsan rekor büyüme açıkladı!".to_string(),
            "Aselsan'da düşüş".to_string(),
        ]);
        let tool = GetNewsTool::new(Arc::new(feed));

        let mut args = ToolArgs::default();
        args.insert("company", json!("Aselsan"));
        let result = tool.execute(&args).await.unwrap();
        let payload = result.payload().unwrap();

        assert_eq!(payload["news"].as_array().unwrap().len(), 2);
        // rekor + büyüme - düşüş
        assert_eq!(payload["sentiment"], "+");
    }
}
