//! Market analysis tools: single-stock analysis, sector scan, comparison,
//! portfolio allocation, forex and fundamentals.

use super::indicators::{self, round_to};
use super::market::{MarketData, PriceHistory};
use super::{ParamKind, ParamSpec, Tool, ToolArgs};
use crate::models::ToolResult;
use crate::resolver::EntityResolver;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ranges tried in order until one returns data
const HISTORY_RANGES: &[&str] = &["1mo", "5d", "1d"];
const LATEST_RANGES: &[&str] = &["1d", "5d"];
const BIST_SUFFIX: &str = ".IS";
const MAX_COMPARE: usize = 3;
const SYMBOL_HINT: &str = "use web_search to find the correct symbol";

const SECTORS: &[(&str, &[&str])] = &[
    ("banka", &["GARAN.IS", "AKBNK.IS", "YKBNK.IS", "ISCTR.IS"]),
    ("holding", &["SAHOL.IS", "KCHOL.IS", "SISE.IS"]),
    ("havacılık", &["THYAO.IS", "PGSUS.IS", "TAVHL.IS"]),
    ("enerji", &["TUPRS.IS", "PETKM.IS", "AKSEN.IS"]),
    ("perakende", &["BIMAS.IS", "MGROS.IS", "SOKM.IS"]),
    ("teknoloji", &["ASELS.IS", "LOGO.IS"]),
    ("otomotiv", &["TOASO.IS", "FROTO.IS", "DOAS.IS"]),
];

//
// ================= Helpers =================
//

async fn first_history(
    market: &dyn MarketData,
    symbol: &str,
    ranges: &[&'static str],
) -> Option<(PriceHistory, &'static str)> {
    for range in ranges {
        match market.history(symbol, range).await {
            Ok(history) if !history.is_empty() => return Some((history, *range)),
            Ok(_) => debug!(symbol = %symbol, range = %range, "Empty history"),
            Err(e) => debug!(symbol = %symbol, range = %range, error = %e, "History fetch failed"),
        }
    }
    None
}

/// Bare uppercase codes may be Borsa Istanbul listings without the suffix
fn bist_retry_candidate(symbol: &str) -> Option<String> {
    let bare = symbol.chars().any(char::is_alphabetic)
        && !symbol.chars().any(char::is_lowercase)
        && !symbol.contains(['.', '-', '=', '^']);
    bare.then(|| format!("{}{}", symbol, BIST_SUFFIX))
}

fn signed_pct(value: f64, decimals: usize) -> String {
    format!("{:+.*}%", decimals, value)
}

fn billions(value: f64) -> String {
    format!("{:.1}B", value / 1e9)
}

fn ratio_or_dash(value: Option<f64>) -> Value {
    match value {
        Some(v) if v != 0.0 => json!(round_to(v, 1)),
        _ => json!("-"),
    }
}

fn percent_or_dash(value: Option<f64>, decimals: usize) -> Value {
    match value {
        Some(v) if v != 0.0 => json!(format!("{:.*}%", decimals, v * 100.0)),
        _ => json!("-"),
    }
}

//
// ================= analyze_stock =================
//

pub struct AnalyzeStockTool {
    resolver: Arc<EntityResolver>,
    market: Arc<dyn MarketData>,
}

impl AnalyzeStockTool {
    pub fn new(resolver: Arc<EntityResolver>, market: Arc<dyn MarketData>) -> Self {
        Self { resolver, market }
    }
}

#[async_trait]
impl Tool for AnalyzeStockTool {
    fn name(&self) -> &'static str {
        "analyze_stock"
    }

    fn description(&self) -> &'static str {
        "Complete analysis of a stock, commodity, index or crypto asset: price, change, volatility, RSI and a BUY/SELL/HOLD signal. Accepts tickers or names (NVDA, Nvidia, altın, SAHOL.IS)"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("symbol", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let input = args.text("symbol")?;
        let resolution = self.resolver.resolve_with_tier(input).await;
        let mut symbol = resolution.symbol;
        info!(input = %input, symbol = %symbol, tier = %resolution.tier, "analyze_stock");

        let mut found = first_history(self.market.as_ref(), &symbol, HISTORY_RANGES).await;

        if found.is_none() {
            if let Some(candidate) = bist_retry_candidate(&symbol) {
                debug!(symbol = %symbol, candidate = %candidate, "Retrying as Borsa Istanbul listing");
                found = first_history(self.market.as_ref(), &candidate, HISTORY_RANGES).await;
                if found.is_some() {
                    symbol = candidate;
                }
            }
        }

        let (history, range) = match found {
            Some(found) => found,
            None => {
                warn!(input = %input, symbol = %symbol, "No price data");
                return Ok(ToolResult::error_with_hint(
                    format!("No data found for '{}' (symbol: {})", input, symbol),
                    SYMBOL_HINT,
                ));
            }
        };

        let closes = &history.closes;
        let price = history.last().unwrap_or_default();
        let change = indicators::percent_change(closes).unwrap_or_default();
        let volatility = indicators::volatility(closes).unwrap_or_default();
        let rsi = indicators::rsi(closes);
        let signal = indicators::signal(rsi, change);

        let mut payload = json!({
            "symbol": symbol,
            "price": round_to(price, 2),
            "change": signed_pct(change, 1),
            "volatility": format!("{:.1}%", volatility),
            "rsi": rsi.round(),
            "signal": signal.to_string(),
            "range": range,
        });

        if let Some(currency) = &history.currency {
            payload["currency"] = json!(currency);
        }
        if let Some(name) = &history.short_name {
            payload["name"] = json!(name);
        }

        // Valuation is optional for commodities, indices and crypto
        if let Ok(fundamentals) = self.market.fundamentals(&symbol).await {
            if let Some(pe) = fundamentals.pe_ratio {
                payload["pe"] = json!(round_to(pe, 1));
            }
            if let Some(market_cap) = fundamentals.market_cap {
                payload["market_cap"] = json!(billions(market_cap));
            }
        }

        Ok(ToolResult::from_json(payload))
    }
}

//
// ================= scan_sector =================
//

pub struct ScanSectorTool {
    market: Arc<dyn MarketData>,
}

impl ScanSectorTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

fn normalize_sector(name: &str) -> String {
    name.trim().to_lowercase().replace('ı', "i")
}

fn find_sector(sector: &str) -> Option<&'static [&'static str]> {
    let key = normalize_sector(sector);
    if key.is_empty() {
        return None;
    }

    SECTORS.iter().find_map(|(name, members)| {
        let name = normalize_sector(name);
        (name.contains(&key) || key.contains(&name)).then_some(*members)
    })
}

#[async_trait]
impl Tool for ScanSectorTool {
    fn name(&self) -> &'static str {
        "scan_sector"
    }

    fn description(&self) -> &'static str {
        "Scan a Borsa Istanbul sector and return the top 3 stocks by one-month change. Sectors: banka, holding, havacılık, enerji, perakende, teknoloji, otomotiv"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("sector", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let sector = args.text("sector")?;

        let members = match find_sector(sector) {
            Some(members) => members,
            None => {
                let available: Vec<&str> = SECTORS.iter().map(|(name, _)| *name).collect();
                return Ok(ToolResult::error(format!(
                    "Unknown sector '{}'. Available: {}",
                    sector,
                    available.join(", ")
                )));
            }
        };

        let mut ranked: Vec<(String, f64, f64)> = Vec::new();
        for symbol in members {
            match self.market.history(symbol, "1mo").await {
                Ok(history) => {
                    if let (Some(price), Some(change)) =
                        (history.last(), indicators::percent_change(&history.closes))
                    {
                        ranked.push((symbol.to_string(), price, change));
                    }
                }
                Err(e) => debug!(symbol = %symbol, error = %e, "Sector member skipped"),
            }
        }

        if ranked.is_empty() {
            return Ok(ToolResult::error(format!("No data for any stock in sector '{}'", sector)));
        }

        ranked.sort_by(|a, b| b.2.total_cmp(&a.2));

        let top: Vec<Value> = ranked
            .iter()
            .take(3)
            .map(|(symbol, price, change)| {
                json!({
                    "symbol": symbol,
                    "price": round_to(*price, 1),
                    "change": signed_pct(*change, 1),
                })
            })
            .collect();

        Ok(ToolResult::from_json(json!({
            "sector": sector,
            "top3": top,
            "best": ranked[0].0,
        })))
    }
}

//
// ================= compare =================
//

pub struct CompareTool {
    resolver: Arc<EntityResolver>,
    market: Arc<dyn MarketData>,
}

impl CompareTool {
    pub fn new(resolver: Arc<EntityResolver>, market: Arc<dyn MarketData>) -> Self {
        Self { resolver, market }
    }
}

#[async_trait]
impl Tool for CompareTool {
    fn name(&self) -> &'static str {
        "compare"
    }

    fn description(&self) -> &'static str {
        "Compare 2-3 stocks side by side on price, one-month change and P/E"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("symbols", ParamKind::TextList)];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let inputs = args.text_list("symbols")?;

        let mut rows: Vec<(String, f64, f64, Value)> = Vec::new();
        for input in inputs.iter().take(MAX_COMPARE) {
            let symbol = self.resolver.resolve(input).await;
            let history = match self.market.history(&symbol, "1mo").await {
                Ok(history) => history,
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "Comparison member skipped");
                    continue;
                }
            };

            let (price, change) = match (history.last(), indicators::percent_change(&history.closes)) {
                (Some(price), Some(change)) => (price, change),
                _ => continue,
            };

            let pe = self
                .market
                .fundamentals(&symbol)
                .await
                .map(|f| ratio_or_dash(f.pe_ratio))
                .unwrap_or_else(|_| json!("-"));

            rows.push((symbol, price, change, pe));
        }

        let winner = match rows.iter().max_by(|a, b| a.2.total_cmp(&b.2)) {
            Some(best) => best.0.clone(),
            None => {
                return Ok(ToolResult::error_with_hint(
                    format!("No data for any of: {}", inputs.join(", ")),
                    SYMBOL_HINT,
                ))
            }
        };

        let stocks: Vec<Value> = rows
            .into_iter()
            .map(|(symbol, price, change, pe)| {
                json!({
                    "symbol": symbol,
                    "price": round_to(price, 1),
                    "change": signed_pct(change, 1),
                    "pe": pe,
                })
            })
            .collect();

        Ok(ToolResult::from_json(json!({
            "stocks": stocks,
            "winner": winner,
        })))
    }
}

//
// ================= build_portfolio =================
//

pub struct BuildPortfolioTool {
    resolver: Arc<EntityResolver>,
    market: Arc<dyn MarketData>,
}

impl BuildPortfolioTool {
    pub fn new(resolver: Arc<EntityResolver>, market: Arc<dyn MarketData>) -> Self {
        Self { resolver, market }
    }
}

#[async_trait]
impl Tool for BuildPortfolioTool {
    fn name(&self) -> &'static str {
        "build_portfolio"
    }

    fn description(&self) -> &'static str {
        "Split an investment amount equally across stocks and buy whole shares at the last close"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("amount", ParamKind::Number),
            ParamSpec::required("symbols", ParamKind::TextList),
        ];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let amount = args.number("amount")?;
        let inputs = args.text_list("symbols")?;

        if inputs.is_empty() {
            return Ok(ToolResult::error("No symbols given"));
        }
        if amount <= 0.0 {
            return Ok(ToolResult::error(format!("Amount must be positive, got {}", amount)));
        }

        let per_position = amount / inputs.len() as f64;
        let mut invested = 0.0;
        let mut positions = Vec::with_capacity(inputs.len());

        for input in &inputs {
            let symbol = self.resolver.resolve(input).await;
            let price = first_history(self.market.as_ref(), &symbol, LATEST_RANGES)
                .await
                .and_then(|(history, _)| history.last())
                .filter(|p| *p > 0.0);

            let quantity = price.map(|p| (per_position / p).floor()).unwrap_or_default();
            let value = quantity * price.unwrap_or_default();
            invested += value;

            positions.push(json!({
                "symbol": symbol,
                "quantity": quantity as u64,
                "price": price.map(|p| round_to(p, 2)),
                "value": value.round(),
            }));
        }

        Ok(ToolResult::from_json(json!({
            "positions": positions,
            "invested": invested.round(),
            "cash": (amount - invested).round(),
        })))
    }
}

//
// ================= get_forex =================
//

pub struct GetForexTool {
    market: Arc<dyn MarketData>,
}

impl GetForexTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

fn forex_symbol(pair: &str) -> (String, String) {
    let pair: String = pair
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect();
    let pair = pair.strip_suffix('X').filter(|p| p.len() == 6).map(str::to_string).unwrap_or(pair);
    let symbol = format!("{}=X", pair);
    (pair, symbol)
}

#[async_trait]
impl Tool for GetForexTool {
    fn name(&self) -> &'static str {
        "get_forex"
    }

    fn description(&self) -> &'static str {
        "Currency exchange rate and five-day change for a pair such as USDTRY, EURTRY or GBPTRY"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::optional("pair", ParamKind::Text, "USDTRY")];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let (pair, symbol) = forex_symbol(args.text("pair")?);

        let history = match self.market.history(&symbol, "5d").await {
            Ok(history) if !history.is_empty() => history,
            Ok(_) | Err(_) => return Ok(ToolResult::error(format!("No data for {}", pair))),
        };

        let rate = history.last().unwrap_or_default();
        let change = indicators::percent_change(&history.closes).unwrap_or_default();

        Ok(ToolResult::from_json(json!({
            "pair": pair,
            "rate": round_to(rate, 4),
            "change": signed_pct(change, 2),
        })))
    }
}

//
// ================= get_fundamentals =================
//

pub struct GetFundamentalsTool {
    resolver: Arc<EntityResolver>,
    market: Arc<dyn MarketData>,
}

impl GetFundamentalsTool {
    pub fn new(resolver: Arc<EntityResolver>, market: Arc<dyn MarketData>) -> Self {
        Self { resolver, market }
    }
}

#[async_trait]
impl Tool for GetFundamentalsTool {
    fn name(&self) -> &'static str {
        "get_fundamentals"
    }

    fn description(&self) -> &'static str {
        "Valuation ratios for a stock: P/E, P/B, ROE, dividend yield and market cap"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("symbol", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let input = args.text("symbol")?;
        let symbol = self.resolver.resolve(input).await;

        let fundamentals = match self.market.fundamentals(&symbol).await {
            Ok(fundamentals) => fundamentals,
            Err(e) => {
                return Ok(ToolResult::error_with_hint(
                    format!("No fundamentals for '{}' (symbol: {}): {}", input, symbol, e),
                    SYMBOL_HINT,
                ))
            }
        };

        Ok(ToolResult::from_json(json!({
            "symbol": symbol,
            "pe": ratio_or_dash(fundamentals.pe_ratio),
            "pb": ratio_or_dash(fundamentals.price_to_book),
            "roe": percent_or_dash(fundamentals.return_on_equity, 0),
            "dividend_yield": percent_or_dash(fundamentals.dividend_yield, 1),
            "market_cap": fundamentals
                .market_cap
                .map(|m| json!(billions(m)))
                .unwrap_or_else(|| json!("-")),
        })))
    }
}
