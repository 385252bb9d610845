//! Tool trait and registry
//!
//! Tools are data-retrieval operations the reasoning step can request.
//! The registry is the only way the loop reaches them: `invoke` coerces
//! arguments against the tool's schema and turns every failure (unknown
//! tool, bad arguments, handler error, panic, timeout) into an error result.

pub mod analysis;
pub mod args;
pub mod indicators;
pub mod knowledge;
pub mod market;
pub mod news;
pub mod search;

pub use args::{coerce, ParamKind, ParamSpec, ToolArgs};

use crate::error::OrchestrationError;
use crate::models::{ToolArguments, ToolCallRequest, ToolResult};
use crate::resolver::EntityResolver;
use crate::Result;
use market::MarketData;
use news::NewsFeed;
use search::{PageFetcher, WebSearch};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Requests beyond this many in one reasoning turn are dropped
pub const MAX_TOOL_CALLS_PER_TURN: usize = 3;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A single data-retrieval tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Ordered parameter schema, used for both coercion and advertising
    fn parameters(&self) -> &'static [ParamSpec];
    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult>;
}

/// What the model is told about a tool
#[derive(Debug, Clone, Copy)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParamSpec],
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TOOL_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSchema {
                name: tool.name(),
                description: tool.description(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Execute one request. Never fails: every problem becomes an error result.
    pub async fn invoke(&self, request: &ToolCallRequest) -> ToolResult {
        if let ToolArguments::Malformed(fragment) = &request.arguments {
            return ToolResult::error_with_hint(
                format!("Invalid tool call syntax: `{}`", fragment),
                "Write tool calls as tool_name(arguments)",
            );
        }

        let tool = match self.get(&request.tool_name) {
            Some(tool) => tool,
            None => {
                warn!(tool_name = %request.tool_name, "Unknown tool requested");
                return ToolResult::error_with_hint(
                    OrchestrationError::ToolNotFound(request.tool_name.clone()).to_string(),
                    format!("Available tools: {}", self.list().join(", ")),
                );
            }
        };

        let args = match coerce(tool.parameters(), &request.arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(tool_name = %request.tool_name, error = %e, "Argument coercion failed");
                return ToolResult::error(e.to_string());
            }
        };

        let name = tool.name();
        let mut handle = tokio::spawn(async move { tool.execute(&args).await });

        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                warn!(tool_name = name, error = %e, "Tool failed");
                ToolResult::error(e.to_string())
            }
            Ok(Err(join_error)) => {
                error!(tool_name = name, error = %join_error, "Tool panicked");
                ToolResult::error(OrchestrationError::ToolError(format!("{} crashed", name)).to_string())
            }
            Err(_) => {
                handle.abort();
                warn!(tool_name = name, timeout_ms = self.timeout.as_millis() as u64, "Tool timed out");
                ToolResult::error(format!(
                    "Tool {} timed out after {} ms",
                    name,
                    self.timeout.as_millis()
                ))
            }
        }
    }

    /// Execute up to [`MAX_TOOL_CALLS_PER_TURN`] requests in order
    pub async fn invoke_turn(&self, requests: &[ToolCallRequest]) -> Vec<(ToolCallRequest, ToolResult)> {
        if requests.len() > MAX_TOOL_CALLS_PER_TURN {
            debug!(
                requested = requests.len(),
                dropped = requests.len() - MAX_TOOL_CALLS_PER_TURN,
                "Dropping tool calls over the per-turn cap"
            );
        }

        let mut results = Vec::with_capacity(requests.len().min(MAX_TOOL_CALLS_PER_TURN));
        for request in requests.iter().take(MAX_TOOL_CALLS_PER_TURN) {
            let result = self.invoke(request).await;
            debug!(call = %request, is_error = result.is_error(), "Tool call finished");
            results.push((request.clone(), result));
        }

        results
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Collaborators the default tools are built on
#[derive(Clone)]
pub struct ToolDeps {
    pub resolver: Arc<EntityResolver>,
    pub market: Arc<dyn MarketData>,
    pub news: Arc<dyn NewsFeed>,
    pub search: Arc<dyn WebSearch>,
    pub fetcher: Option<Arc<dyn PageFetcher>>,
}

/// Registry with the nine research tools
pub fn create_default_registry(deps: ToolDeps, timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::with_timeout(timeout);

    registry.register(Arc::new(analysis::AnalyzeStockTool::new(
        deps.resolver.clone(),
        deps.market.clone(),
    )));
    registry.register(Arc::new(analysis::ScanSectorTool::new(deps.market.clone())));
    registry.register(Arc::new(analysis::CompareTool::new(
        deps.resolver.clone(),
        deps.market.clone(),
    )));
    registry.register(Arc::new(news::GetNewsTool::new(deps.news)));
    registry.register(Arc::new(analysis::BuildPortfolioTool::new(
        deps.resolver.clone(),
        deps.market.clone(),
    )));
    registry.register(Arc::new(analysis::GetForexTool::new(deps.market.clone())));
    registry.register(Arc::new(analysis::GetFundamentalsTool::new(
        deps.resolver,
        deps.market,
    )));
    registry.register(Arc::new(knowledge::QuickAnswerTool));
    registry.register(Arc::new(search::WebSearchTool::new(deps.search, deps.fetcher)));

    registry
}
