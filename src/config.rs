//! Runtime configuration
//!
//! Everything is read from the environment (a `.env` file is honoured by the
//! binaries through `dotenv`). Missing values fall back to defaults; values
//! that are present but unparsable are configuration errors.

use crate::error::OrchestrationError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const MIN_ITERATIONS: u32 = 3;
pub const MAX_ITERATIONS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    /// Hard cap on reasoning turns per query
    pub max_iterations: u32,
    /// Pause before every LLM call
    pub rate_limit_delay_ms: u64,
    pub llm_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub normalize_query: bool,
    pub brave_api_key: Option<String>,
    pub market_data_base_url: String,
    pub news_feed_base_url: String,
    pub api_port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash".to_string(),
            max_iterations: MAX_ITERATIONS,
            rate_limit_delay_ms: 2000,
            llm_timeout_secs: 60,
            tool_timeout_secs: 30,
            normalize_query: true,
            brave_api_key: None,
            market_data_base_url: "https://query1.finance.yahoo.com".to_string(),
            news_feed_base_url: "https://news.google.com".to_string(),
            api_port: 8080,
        }
    }
}

impl AgentConfig {
    /// Build the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let requested_iterations = parse_var("MAX_ITERATIONS", defaults.max_iterations)?;

        let config = Self {
            gemini_api_key: env::var("GEMINI_API_KEY")
                .or_else(|_| env::var("GOOGLE_API_KEY"))
                .unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            max_iterations: clamp_iterations(requested_iterations),
            rate_limit_delay_ms: parse_var("RATE_LIMIT_DELAY_MS", defaults.rate_limit_delay_ms)?,
            llm_timeout_secs: parse_var("LLM_TIMEOUT_SECS", defaults.llm_timeout_secs)?,
            tool_timeout_secs: parse_var("TOOL_TIMEOUT_SECS", defaults.tool_timeout_secs)?,
            normalize_query: parse_var("NORMALIZE_QUERY", defaults.normalize_query)?,
            brave_api_key: env::var("BRAVE_API_KEY").ok().filter(|k| !k.is_empty()),
            market_data_base_url: env::var("MARKET_DATA_BASE_URL")
                .unwrap_or(defaults.market_data_base_url),
            news_feed_base_url: env::var("NEWS_FEED_BASE_URL")
                .unwrap_or(defaults.news_feed_base_url),
            api_port: match env::var("PORT").or_else(|_| env::var("API_PORT")) {
                Ok(raw) => raw.trim().parse().map_err(|_| {
                    OrchestrationError::ConfigError(format!("PORT is not a valid port: {}", raw))
                })?,
                Err(_) => defaults.api_port,
            },
        };

        if config.gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set; reasoning calls will fail");
        }

        Ok(config)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Keep the iteration bound inside the supported 3..=5 window
pub fn clamp_iterations(requested: u32) -> u32 {
    let clamped = requested.clamp(MIN_ITERATIONS, MAX_ITERATIONS);
    if clamped != requested {
        warn!(requested, clamped, "MAX_ITERATIONS out of range, clamped");
    }
    clamped
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has an invalid value: {}", name, raw))
        }),
        _ => Ok(default),
    }
}
