//! Market data seam and the Yahoo Finance adapter

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Daily closes for one symbol over one range
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceHistory {
    pub symbol: String,
    pub currency: Option<String>,
    pub short_name: Option<String>,
    pub closes: Vec<f64>,
}

impl PriceHistory {
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.closes.last().copied()
    }
}

/// Valuation ratios; any of them may be unavailable
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub market_cap: Option<f64>,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Daily closes over `range` ("1mo", "5d", "1d")
    async fn history(&self, symbol: &str, range: &str) -> Result<PriceHistory>;

    async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals>;
}

/// Yahoo Finance chart and quoteSummary endpoints
pub struct YahooMarketData {
    client: Client,
    base_url: String,
}

impl YahooMarketData {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| OrchestrationError::MarketDataError(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| OrchestrationError::MarketDataError(format!("Invalid JSON from {}: {}", url, e)))?;

        if !status.is_success() {
            return Err(OrchestrationError::MarketDataError(format!(
                "{} returned {}",
                url, status
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl MarketData for YahooMarketData {
    async fn history(&self, symbol: &str, range: &str) -> Result<PriceHistory> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        debug!(symbol = %symbol, range = %range, "Fetching price history");

        let body = self.get_json(&url, &[("range", range), ("interval", "1d")]).await?;
        parse_chart(symbol, &body)
    }

    async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);
        debug!(symbol = %symbol, "Fetching fundamentals");

        let body = self
            .get_json(
                &url,
                &[("modules", "summaryDetail,defaultKeyStatistics,financialData,price")],
            )
            .await?;
        parse_quote_summary(&body)
    }
}

/// Extract closes from a `/v8/finance/chart` response. Missing closes are skipped.
pub fn parse_chart(symbol: &str, body: &Value) -> Result<PriceHistory> {
    if let Some(description) = body
        .pointer("/chart/error/description")
        .and_then(Value::as_str)
    {
        return Err(OrchestrationError::MarketDataError(format!(
            "{}: {}",
            symbol, description
        )));
    }

    let result = match body.pointer("/chart/result/0") {
        Some(result) => result,
        None => {
            return Ok(PriceHistory {
                symbol: symbol.to_string(),
                ..Default::default()
            })
        }
    };

    let meta_text = |key: &str| {
        result
            .pointer(&format!("/meta/{}", key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let closes = result
        .pointer("/indicators/quote/0/close")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    Ok(PriceHistory {
        symbol: symbol.to_string(),
        currency: meta_text("currency"),
        short_name: meta_text("shortName").or_else(|| meta_text("longName")),
        closes,
    })
}

/// Extract ratios from a `/v10/finance/quoteSummary` response
pub fn parse_quote_summary(body: &Value) -> Result<Fundamentals> {
    if let Some(description) = body
        .pointer("/quoteSummary/error/description")
        .and_then(Value::as_str)
    {
        return Err(OrchestrationError::MarketDataError(description.to_string()));
    }

    let result = body.pointer("/quoteSummary/result/0").ok_or_else(|| {
        OrchestrationError::MarketDataError("quoteSummary returned no result".to_string())
    })?;

    let raw = |path: &str| {
        result
            .pointer(&format!("{}/raw", path))
            .and_then(Value::as_f64)
    };

    Ok(Fundamentals {
        pe_ratio: raw("/summaryDetail/trailingPE"),
        price_to_book: raw("/defaultKeyStatistics/priceToBook"),
        return_on_equity: raw("/financialData/returnOnEquity"),
        dividend_yield: raw("/summaryDetail/dividendYield"),
        market_cap: raw("/price/marketCap").or_else(|| raw("/summaryDetail/marketCap")),
    })
}

/// Fixed in-memory market, used by tests and offline runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    histories: HashMap<String, PriceHistory>,
    fundamentals: HashMap<String, Fundamentals>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same closes are served for every range
    pub fn with_history(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        self.histories.insert(
            symbol.to_string(),
            PriceHistory {
                symbol: symbol.to_string(),
                currency: None,
                short_name: None,
                closes,
            },
        );
        self
    }

    pub fn with_fundamentals(mut self, symbol: &str, fundamentals: Fundamentals) -> Self {
        self.fundamentals.insert(symbol.to_string(), fundamentals);
        self
    }
}

#[async_trait]
impl MarketData for InMemoryMarketData {
    async fn history(&self, symbol: &str, _range: &str) -> Result<PriceHistory> {
        self.histories.get(symbol).cloned().ok_or_else(|| {
            OrchestrationError::MarketDataError(format!("{}: No data found", symbol))
        })
    }

    async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        self.fundamentals.get(symbol).cloned().ok_or_else(|| {
            OrchestrationError::MarketDataError(format!("{}: No fundamentals", symbol))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chart_skips_null_closes() {
        let body = json!({
            "chart": {
                "result": [{
                    "meta": { "currency": "TRY", "symbol": "THYAO.IS", "longName": "Turk Hava Yollari" },
                    "indicators": { "quote": [{ "close": [300.5, null, 310.0, 305.25] }] }
                }],
                "error": null
            }
        });

        let history = parse_chart("THYAO.IS", &body).unwrap();
        assert_eq!(history.closes, vec![300.5, 310.0, 305.25]);
        assert_eq!(history.currency.as_deref(), Some("TRY"));
        assert_eq!(history.short_name.as_deref(), Some("Turk Hava Yollari"));
        assert_eq!(history.last(), Some(305.25));
    }

    #[test]
    fn test_parse_chart_reports_provider_error() {
        let body = json!({
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
            }
        });

        let err = parse_chart("ASDFGH", &body).unwrap_err();
        assert!(err.to_string().contains("ASDFGH"));
    }

    #[test]
    fn test_parse_quote_summary() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "summaryDetail": {
                        "trailingPE": { "raw": 7.42, "fmt": "7.42" },
                        "dividendYield": { "raw": 0.031 }
                    },
                    "defaultKeyStatistics": { "priceToBook": { "raw": 1.1 } },
                    "financialData": { "returnOnEquity": { "raw": 0.18 } },
                    "price": { "marketCap": { "raw": 412000000000.0 } }
                }],
                "error": null
            }
        });

        let f = parse_quote_summary(&body).unwrap();
        assert_eq!(f.pe_ratio, Some(7.42));
        assert_eq!(f.price_to_book, Some(1.1));
        assert_eq!(f.return_on_equity, Some(0.18));
        assert_eq!(f.dividend_yield, Some(0.031));
        assert_eq!(f.market_cap, Some(412000000000.0));
    }
}
