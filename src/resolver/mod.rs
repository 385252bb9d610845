//! Entity resolver
//!
//! Maps free-text asset names ("bakır", "Türk Hava Yolları", "nvidia") to
//! market-data identifiers. Tiers are tried in a fixed order and the first
//! one that answers wins:
//!
//! 1. exact alias match
//! 2. partial alias match (longest alias first)
//! 3. input already looks like a ticker
//! 4. web search, learned into the alias table on success
//! 5. syntactic fallback (uppercase, no spaces, 6 chars)
//!
//! Resolution never fails. A meaningless symbol simply produces an empty-data
//! error from the tool that asked for it.

pub mod aliases;
pub mod store;

pub use store::{AliasStore, InMemoryAliasStore};

use crate::models::{ResolutionCacheEntry, ResolutionTier};
use crate::tools::search::WebSearch;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SEARCH_RESULTS: usize = 3;
const MAX_TICKER_LEN: usize = 6;

/// Tokens that look like tickers in search snippets but never are
const TICKER_STOP_LIST: &[&str] = &[
    "THE", "AND", "FOR", "WITH", "FROM", "THIS",
    "USD", "TRY", "EUR", "GBP", "JPY", "CHF",
    "NYSE", "BIST", "ETF", "INC", "LTD", "PLC", "CEO", "IPO",
];

lazy_static! {
    static ref SUFFIXED_TICKER: Regex =
        Regex::new(r"\b[A-Z][A-Z0-9]{1,5}\.(?:IS|L|DE|PA|AS|MI|TO|HK|NS|AX|T)\b")
            .expect("suffixed ticker pattern is valid");
    static ref BARE_TICKER: Regex =
        Regex::new(r"\b[A-Z]{3,5}\b").expect("bare ticker pattern is valid");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub symbol: String,
    pub tier: ResolutionTier,
}

pub struct EntityResolver {
    store: Arc<dyn AliasStore>,
    search: Arc<dyn WebSearch>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn AliasStore>, search: Arc<dyn WebSearch>) -> Self {
        Self { store, search }
    }

    /// Resolve a query to a symbol. Always returns something.
    pub async fn resolve(&self, query: &str) -> String {
        self.resolve_with_tier(query).await.symbol
    }

    pub async fn resolve_with_tier(&self, query: &str) -> Resolution {
        let trimmed = query.trim();
        let key = trimmed.to_lowercase();

        if key.is_empty() {
            return Resolution {
                symbol: String::new(),
                tier: ResolutionTier::Fallback,
            };
        }

        // Tier 1
        if let Some(entry) = self.store.get(&key).await {
            debug!(query = %trimmed, symbol = %entry.resolved_symbol, "Resolved from alias table");
            return Resolution {
                symbol: entry.resolved_symbol,
                tier: ResolutionTier::Exact,
            };
        }

        // Tier 2, skipped for marked symbols so "ETH-EUR" is not read as "eth"
        let entries = if has_market_marker(trimmed) {
            Vec::new()
        } else {
            self.store.entries().await
        };
        for entry in entries {
            if entry.query_key.contains(key.as_str()) || key.contains(entry.query_key.as_str()) {
                debug!(
                    query = %trimmed,
                    alias = %entry.query_key,
                    symbol = %entry.resolved_symbol,
                    "Resolved by partial alias match"
                );
                return Resolution {
                    symbol: entry.resolved_symbol,
                    tier: ResolutionTier::Partial,
                };
            }
        }

        // Tier 3
        if looks_canonical(trimmed) {
            debug!(query = %trimmed, "Query already in ticker form");
            return Resolution {
                symbol: trimmed.to_string(),
                tier: ResolutionTier::Canonical,
            };
        }

        // Tier 4
        if let Some(symbol) = self.research(trimmed).await {
            self.store
                .insert(ResolutionCacheEntry {
                    query_key: key,
                    resolved_symbol: symbol.clone(),
                    tier: ResolutionTier::Search,
                })
                .await;

            info!(query = %trimmed, symbol = %symbol, "Learned alias from web search");
            return Resolution {
                symbol,
                tier: ResolutionTier::Search,
            };
        }

        // Tier 5
        let symbol = fallback_symbol(trimmed);
        warn!(query = %trimmed, symbol = %symbol, "No confident resolution, using fallback symbol");
        Resolution {
            symbol,
            tier: ResolutionTier::Fallback,
        }
    }

    async fn research(&self, query: &str) -> Option<String> {
        let search_query = format!("{} ticker symbol", query);

        let hits = match self.search.search(&search_query, SEARCH_RESULTS).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(query = %query, error = %e, "Symbol search failed");
                return None;
            }
        };

        let combined = hits
            .iter()
            .map(|hit| format!("{} {}", hit.title, hit.snippet))
            .collect::<Vec<_>>()
            .join(" ");

        extract_ticker(&combined)
    }
}

/// Exchange-suffixed token first, then a bare uppercase token off the stop-list
pub fn extract_ticker(text: &str) -> Option<String> {
    if let Some(m) = SUFFIXED_TICKER.find(text) {
        return Some(m.as_str().to_string());
    }

    BARE_TICKER
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|token| !TICKER_STOP_LIST.contains(token))
        .map(str::to_string)
}

/// Exchange suffix, pair separator, futures/forex or index marker
pub fn has_market_marker(query: &str) -> bool {
    query.contains(['.', '-', '=', '^'])
}

/// Carries a market marker, or is a short uppercase word
pub fn looks_canonical(query: &str) -> bool {
    if has_market_marker(query) {
        return true;
    }

    query.chars().count() <= MAX_TICKER_LEN
        && query.chars().any(char::is_alphabetic)
        && !query.chars().any(|c| c.is_lowercase() || c.is_whitespace())
}

pub fn fallback_symbol(query: &str) -> String {
    query
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .take(MAX_TICKER_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchHit;
    use crate::tools::search::SearchFn;
    use crate::OrchestrationError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hit(title: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            snippet: snippet.to_string(),
            url: "https://example.com".to_string(),
        }
    }

    fn resolver_with_hits(hits: Vec<SearchHit>, calls: Arc<AtomicUsize>) -> EntityResolver {
        let search = SearchFn(move |_query: &str| -> crate::Result<Vec<SearchHit>> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(hits.clone())
        });
        EntityResolver::new(Arc::new(InMemoryAliasStore::seeded()), Arc::new(search))
    }

    fn offline_resolver() -> EntityResolver {
        resolver_with_hits(vec![], Arc::new(AtomicUsize::new(0)))
    }

    #[tokio::test]
    async fn test_exact_alias_ignores_case_and_whitespace() {
        let resolver = offline_resolver();

        for (alias, symbol) in aliases::SEED_ALIASES {
            let mut chars = alias.chars();
            let capitalized: String = chars
                .next()
                .into_iter()
                .flat_map(char::to_uppercase)
                .chain(chars)
                .collect();

            let resolution = resolver.resolve_with_tier(&format!("  {}\t", capitalized)).await;
            assert_eq!(resolution.symbol, *symbol, "alias {}", alias);
            assert_eq!(resolution.tier, ResolutionTier::Exact);

            // Full uppercase only round-trips for ASCII spellings
            if alias.is_ascii() {
                let shouted = resolver.resolve(&format!(" {} ", alias.to_uppercase())).await;
                assert_eq!(shouted, *symbol, "alias {}", alias);
            }
        }
    }

    #[tokio::test]
    async fn test_turkish_names() {
        let resolver = offline_resolver();
        assert_eq!(resolver.resolve("bakır").await, "HG=F");
        assert_eq!(resolver.resolve("tüpraş").await, "TUPRS.IS");
        assert_eq!(resolver.resolve("Türk Hava Yolları").await, "THYAO.IS");
    }

    #[tokio::test]
    async fn test_partial_match_prefers_longest_alias() {
        let resolver = offline_resolver();

        let resolution = resolver.resolve_with_tier("bimas hissesi").await;
        assert_eq!(resolution.symbol, "BIMAS.IS");
        assert_eq!(resolution.tier, ResolutionTier::Partial);

        let resolution = resolver.resolve_with_tier("garanti bankası").await;
        assert_eq!(resolution.symbol, "GARAN.IS");
    }

    #[tokio::test]
    async fn test_marked_symbols_pass_through() {
        let resolver = offline_resolver();

        for symbol in ["HG=F", "XU100.IS", "^GSPC", "USDTRY=X", "ISCTR.IS", "BTC-USD", "SAHOL.IS", "NVDA", "AAPL"] {
            assert_eq!(resolver.resolve(symbol).await, symbol);
        }

        // Marked symbols that embed a short alias must not partial-match it
        for symbol in ["ETH-EUR", "BTC-EUR", "ADANA.IS", "KOCAER.IS", "GOLD.L", "SOLAR.NS"] {
            let resolution = resolver.resolve_with_tier(symbol).await;
            assert_eq!(resolution.symbol, symbol);
            assert_eq!(resolution.tier, ResolutionTier::Canonical, "symbol {}", symbol);
        }
    }

    #[tokio::test]
    async fn test_search_hit_is_learned() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver_with_hits(
            vec![hit(
                "Ereğli Demir Çelik (EREGL.IS) stock price",
                "Live quote for EREGL.IS on Borsa Istanbul",
            )],
            calls.clone(),
        );

        let first = resolver.resolve_with_tier("ereğli demir çelik").await;
        assert_eq!(first.symbol, "EREGL.IS");
        assert_eq!(first.tier, ResolutionTier::Search);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = resolver.resolve_with_tier("Ereğli Demir Çelik").await;
        assert_eq!(second.symbol, "EREGL.IS");
        assert_eq!(second.tier, ResolutionTier::Exact);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_entry() {
        let store = Arc::new(InMemoryAliasStore::seeded());
        let seeded = store.len().await;
        let calls = Arc::new(AtomicUsize::new(0));

        let resolver = |calls: Arc<AtomicUsize>| {
            let search = SearchFn(move |_query: &str| -> crate::Result<Vec<SearchHit>> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![hit("Ereğli Demir Çelik (EREGL.IS)", "Borsa Istanbul quote")])
            });
            EntityResolver::new(store.clone(), Arc::new(search))
        };
        let first = resolver(calls.clone());
        let second = resolver(calls.clone());

        let (a, b) = tokio::join!(
            first.resolve("ereğli demir çelik"),
            second.resolve("Ereğli Demir Çelik"),
        );

        assert_eq!(a, "EREGL.IS");
        assert_eq!(b, "EREGL.IS");
        assert_eq!(store.len().await, seeded + 1);

        let entry = store.get("ereğli demir çelik").await.unwrap();
        assert_eq!(entry.resolved_symbol, "EREGL.IS");
        assert_eq!(entry.tier, ResolutionTier::Search);

        // a third resolver on the same table answers without searching
        let searched = calls.load(Ordering::SeqCst);
        assert_eq!(resolver(calls.clone()).resolve("ereğli demir çelik").await, "EREGL.IS");
        assert_eq!(calls.load(Ordering::SeqCst), searched);
    }

    #[tokio::test]
    async fn test_search_bare_ticker_skips_stop_words() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver_with_hits(
            vec![hit("THE best stocks in USD", "Coca-Cola Company (NYSE: KOF) quote")],
            calls,
        );

        assert_eq!(resolver.resolve("coca cola femsa").await, "KOF");
    }

    #[tokio::test]
    async fn test_unresolvable_query_falls_back() {
        let resolver = offline_resolver();

        let resolution = resolver.resolve_with_tier("asdfghjkl").await;
        assert_eq!(resolution.symbol, "ASDFGH");
        assert_eq!(resolution.tier, ResolutionTier::Fallback);
    }

    #[tokio::test]
    async fn test_search_failure_is_a_miss() {
        let search = SearchFn(|_query: &str| -> crate::Result<Vec<SearchHit>> {
            Err(OrchestrationError::SearchError("offline".to_string()))
        });
        let resolver = EntityResolver::new(Arc::new(InMemoryAliasStore::seeded()), Arc::new(search));

        assert_eq!(resolver.resolve("qwerty uiop").await, "QWERTY");
    }

    #[test]
    fn test_canonical_heuristic() {
        assert!(looks_canonical("THYAO"));
        assert!(looks_canonical("EURTRY=X"));
        assert!(!looks_canonical("Thyao"));
        assert!(!looks_canonical("TOOLONGX"));
        assert!(!looks_canonical("AB CD"));
        assert!(!looks_canonical("123"));
    }
}
