//! Main orchestrator - implements the research loop
//!
//! NORMALIZE → REASON ⇄ TOOLS → REFLECT → (REASON | END)
//!
//! Phases and their transitions live in [`crate::state`]; this module runs
//! the side effects of each phase: model calls, tool calls, reviews.

pub mod parser;
pub mod prompt;

use crate::config::{clamp_iterations, AgentConfig};
use crate::error::OrchestrationError;
use crate::llm::{GeminiClient, LlmClient, LlmReply};
use crate::models::{AgentTurnOutput, Message, QueryReport, Verdict};
use crate::normalizer::QueryNormalizer;
use crate::reflection::{LlmReflectionGate, ReflectionGate};
use crate::resolver::{EntityResolver, InMemoryAliasStore};
use crate::state::{ConversationState, Phase};
use crate::tools::market::YahooMarketData;
use crate::tools::news::GoogleNewsRss;
use crate::tools::search::{BraveSearch, HttpPageFetcher, PageFetcher, WebSearch};
use crate::tools::{create_default_registry, ToolDeps, ToolRegistry, ToolSchema};
use crate::Result;
use parser::parse_turn;
use prompt::{system_prompt, APOLOGY_TEXT, NO_REPORT_TEXT, REVISION_PROMPT};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Main orchestrator that coordinates the research loop
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    reflection: Arc<dyn ReflectionGate>,
    normalizer: Option<QueryNormalizer>,
    max_iterations: u32,
    rate_limit_delay: Duration,
    llm_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        reflection: Arc<dyn ReflectionGate>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            reflection,
            normalizer: None,
            max_iterations: clamp_iterations(config.max_iterations),
            rate_limit_delay: config.rate_limit_delay(),
            llm_timeout: config.llm_timeout(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: QueryNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Production wiring: Gemini, Yahoo Finance, Google News and Brave Search
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.llm_timeout(),
        )?);

        let search: Arc<dyn WebSearch> =
            Arc::new(BraveSearch::new(config.brave_api_key.clone(), config.tool_timeout())?);
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(PAGE_FETCH_TIMEOUT)?);

        let resolver = Arc::new(EntityResolver::new(
            Arc::new(InMemoryAliasStore::seeded()),
            search.clone(),
        ));

        let deps = ToolDeps {
            resolver,
            market: Arc::new(YahooMarketData::new(
                &config.market_data_base_url,
                config.tool_timeout(),
            )?),
            news: Arc::new(GoogleNewsRss::new(
                &config.news_feed_base_url,
                config.tool_timeout(),
            )?),
            search,
            fetcher: Some(fetcher),
        };

        let registry = Arc::new(create_default_registry(deps, config.tool_timeout()));
        let reflection = Arc::new(LlmReflectionGate::new(llm.clone()));

        let mut orchestrator = Self::new(llm.clone(), registry, reflection, config);
        if config.normalize_query {
            orchestrator = orchestrator.with_normalizer(QueryNormalizer::new(llm, config.llm_timeout()));
        }

        info!(
            model = %config.gemini_model,
            max_iterations = orchestrator.max_iterations,
            tools = orchestrator.registry.len(),
            "Orchestrator configured"
        );

        Ok(orchestrator)
    }

    /// Answer a question. Always returns a non-empty string.
    pub async fn run_query(&self, query: &str) -> String {
        match self.run(query).await {
            Ok(report) => report.report,
            Err(e) => {
                error!(error = %e, "Query failed");
                APOLOGY_TEXT.to_string()
            }
        }
    }

    /// Run the research loop for one query
    pub async fn run(&self, query: &str) -> Result<QueryReport> {
        let start_time = Instant::now();
        let mut reasoning_trace = Vec::new();

        let query = query.trim();
        if query.is_empty() {
            return Err(OrchestrationError::ReasoningFailure("Query is empty".to_string()));
        }

        info!(query = %query, "Orchestrator: starting research");
        reasoning_trace.push("INPUT: Query received".to_string());

        let working_query = match &self.normalizer {
            Some(normalizer) => {
                self.pace().await;
                let rewritten = normalizer.normalize(query).await;
                reasoning_trace.push(format!("NORMALIZE: {}", rewritten));
                rewritten
            }
            None => query.to_string(),
        };

        let schemas = self.registry.schemas();
        let mut state = ConversationState::new(
            query,
            working_query,
            system_prompt(&schemas),
            self.max_iterations,
        );

        while !state.is_terminated() {
            match state.phase() {
                Phase::Reason => self.reason(&mut state, &schemas, &mut reasoning_trace).await?,
                Phase::Tools => self.execute_tools(&mut state, &mut reasoning_trace).await?,
                Phase::Reflect => self.reflect(&mut state, &mut reasoning_trace).await?,
                Phase::End => break,
            }
        }

        let report = state
            .final_answer()
            .filter(|answer| !answer.trim().is_empty())
            .unwrap_or(NO_REPORT_TEXT)
            .to_string();

        reasoning_trace.push(format!(
            "END: {} iteration(s), {} review(s)",
            state.iteration_count(),
            state.verdicts().len()
        ));

        info!(
            query_id = %state.query_id,
            iterations = state.iteration_count(),
            verdicts = ?state.verdicts(),
            "Research complete"
        );

        Ok(QueryReport {
            query_id: state.query_id,
            report,
            iterations: state.iteration_count(),
            verdicts: state.verdicts().to_vec(),
            reasoning_trace,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Fixed pause before every model call
    async fn pace(&self) {
        if !self.rate_limit_delay.is_zero() {
            tokio::time::sleep(self.rate_limit_delay).await;
        }
    }

    async fn call_llm(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmReply> {
        self.pace().await;
        tokio::time::timeout(self.llm_timeout, self.llm.complete(messages, tools))
            .await
            .map_err(|_| OrchestrationError::Timeout(self.llm_timeout.as_millis() as u64))?
    }

    // === REASON ===
    async fn reason(
        &self,
        state: &mut ConversationState,
        schemas: &[ToolSchema],
        trace: &mut Vec<String>,
    ) -> Result<()> {
        if state.begin_reasoning()? {
            state.push_message(Message::user(REVISION_PROMPT));
            trace.push("REASON: Revision requested by reviewer".to_string());
        }

        let iteration = state.iteration_count();
        debug!(iteration, max_iterations = state.max_iterations(), "Reasoning step");

        let reply = self
            .call_llm(state.messages(), schemas)
            .await
            .map_err(|e| OrchestrationError::ReasoningFailure(e.to_string()))?;

        let assistant = Message::assistant(reply.content.clone(), reply.tool_calls.clone());

        match parse_turn(&reply) {
            AgentTurnOutput::ToolCalls { requests, .. } if state.within_bound() => {
                trace.push(format!(
                    "REASON {}: {} tool call(s) requested",
                    iteration,
                    requests.len()
                ));
                info!(iteration, tool_calls = requests.len(), "Tool calls requested");
                state.request_tools(assistant, requests)?;
            }
            AgentTurnOutput::ToolCalls { content, .. } | AgentTurnOutput::Text { content } => {
                if !state.within_bound() {
                    debug!(iteration, "Iteration bound reached, any tool calls are ignored");
                }

                let draft = choose_draft(content, &reply.content);
                trace.push(format!("REASON {}: Draft ready ({} chars)", iteration, draft.chars().count()));
                info!(iteration, "Draft ready");
                state.set_draft(assistant, draft)?;
            }
        }

        Ok(())
    }

    // === TOOLS ===
    async fn execute_tools(&self, state: &mut ConversationState, trace: &mut Vec<String>) -> Result<()> {
        let requests = state.take_pending_requests();
        let results = self.registry.invoke_turn(&requests).await;

        for (request, result) in &results {
            let outcome = if result.is_error() { "error" } else { "ok" };
            trace.push(format!("TOOLS: {} → {}", request, outcome));
            info!(tool_name = %request.tool_name, outcome, "Tool result");
        }

        state.record_tool_results(results)?;
        Ok(())
    }

    // === REFLECT ===
    async fn reflect(&self, state: &mut ConversationState, trace: &mut Vec<String>) -> Result<()> {
        self.pace().await;

        let verdict = tokio::time::timeout(
            self.llm_timeout,
            self.reflection.review(state.original_query(), state.draft()),
        )
        .await
        .map_err(|_| OrchestrationError::Timeout(self.llm_timeout.as_millis() as u64))
        .and_then(|review| review)
        .map_err(|e| OrchestrationError::ReflectionFailure(e.to_string()))?;

        match verdict {
            Verdict::Approve => {
                trace.push("REFLECT: Approved".to_string());
                info!(iteration = state.iteration_count(), "Draft approved");
                state.approve()?;
            }
            Verdict::Revise if state.within_bound() => {
                trace.push("REFLECT: Revision requested".to_string());
                info!(iteration = state.iteration_count(), "Draft rejected, revising");
                state.request_revision()?;
            }
            Verdict::Revise => {
                trace.push("REFLECT: Rejected, iteration bound reached".to_string());
                warn!(
                    iteration = state.iteration_count(),
                    "Draft rejected with no iterations left, releasing best draft"
                );
                state.exhaust()?;
            }
        }

        Ok(())
    }
}

/// Prose without tags, else the raw reply, else a fixed notice
fn choose_draft(prose: String, raw: &str) -> String {
    if !prose.trim().is_empty() {
        prose
    } else if !raw.trim().is_empty() {
        raw.trim().to_string()
    } else {
        NO_REPORT_TEXT.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::models::{MessageRole, SearchHit, ToolCallRequest};
    use crate::tools::market::InMemoryMarketData;
    use crate::tools::news::StaticNewsFeed;
    use crate::tools::search::SearchFn;
    use async_trait::async_trait;

    fn test_config(max_iterations: u32) -> AgentConfig {
        AgentConfig {
            max_iterations,
            rate_limit_delay_ms: 0,
            llm_timeout_secs: 5,
            ..Default::default()
        }
    }

    fn test_registry() -> Arc<ToolRegistry> {
        let search = Arc::new(SearchFn(|_q: &str| -> Result<Vec<SearchHit>> { Ok(vec![]) }));
        let resolver = Arc::new(EntityResolver::new(
            Arc::new(InMemoryAliasStore::seeded()),
            search.clone(),
        ));
        let market = InMemoryMarketData::new()
            .with_history("HG=F", vec![4.0, 4.1, 4.3])
            .with_history("USDTRY=X", vec![34.1, 34.3]);

        Arc::new(create_default_registry(
            ToolDeps {
                resolver,
                market: Arc::new(market),
                news: Arc::new(StaticNewsFeed::new(vec![])),
                search,
                fetcher: None,
            },
            Duration::from_secs(5),
        ))
    }

    fn orchestrator(reasoning: Arc<ScriptedLlm>, reviewer: Arc<ScriptedLlm>, max_iterations: u32) -> Orchestrator {
        Orchestrator::new(
            reasoning,
            test_registry(),
            Arc::new(LlmReflectionGate::new(reviewer)),
            &test_config(max_iterations),
        )
    }

    fn tool_results(messages: &[Message]) -> Vec<&str> {
        messages
            .iter()
            .filter(|m| m.role == MessageRole::ToolResult)
            .map(|m| m.content.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_tool_then_approved_report() {
        let reasoning = Arc::new(ScriptedLlm::from_replies(vec![
            LlmReply::text("Checking copper.\n<tool>analyze_stock(\"bakır\")</tool>"),
            LlmReply::text("Copper (HG=F) is at 4.3, up 7.5% this month. Recommendation: BUY. Sentiment positive."),
        ]));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("APPROVED")]));

        let report = orchestrator(reasoning.clone(), reviewer, 5)
            .run("bakır alınır mı?")
            .await
            .unwrap();

        assert!(report.report.contains("BUY"));
        assert_eq!(report.iterations, 2);
        assert_eq!(report.verdicts, vec![Verdict::Approve]);

        let transcripts = reasoning.transcripts();
        let results = tool_results(&transcripts[1]);
        assert_eq!(results.len(), 1);
        assert!(results[0].contains("HG=F"), "{}", results[0]);
    }

    #[tokio::test]
    async fn test_structured_function_call_runs_tool() {
        let mut args = serde_json::Map::new();
        args.insert("pair".to_string(), serde_json::json!("USDTRY"));
        let reasoning = Arc::new(ScriptedLlm::from_replies(vec![
            LlmReply::calls(vec![ToolCallRequest::named("get_forex", args)]),
            LlmReply::text("USDTRY is 34.3, +0.6%. HOLD. Sentiment neutral."),
        ]));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("APPROVED")]));

        let report = orchestrator(reasoning.clone(), reviewer, 5)
            .run("dolar kaç TL?")
            .await
            .unwrap();

        assert_eq!(report.iterations, 2);
        let transcripts = reasoning.transcripts();
        let results = tool_results(&transcripts[1]);
        assert_eq!(results.len(), 1);
        assert!(results[0].contains("USDTRY"), "{}", results[0]);
    }

    #[tokio::test]
    async fn test_revision_reenters_reasoning() {
        let reasoning = Arc::new(ScriptedLlm::from_replies(vec![
            LlmReply::text("Gold is fine."),
            LlmReply::text("Gold at 2400 USD, +3%. HOLD. Neutral sentiment."),
        ]));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![
            LlmReply::text("Missing numbers and a recommendation."),
            LlmReply::text("APPROVED"),
        ]));

        let report = orchestrator(reasoning.clone(), reviewer.clone(), 5)
            .run("altın?")
            .await
            .unwrap();

        assert_eq!(report.verdicts, vec![Verdict::Revise, Verdict::Approve]);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.report, "Gold at 2400 USD, +3%. HOLD. Neutral sentiment.");

        let transcripts = reasoning.transcripts();
        let last = transcripts[1].last().unwrap();
        assert_eq!(last.role, MessageRole::User);
        assert_eq!(last.content, REVISION_PROMPT);

        // the reviewer judges the second draft, not a concatenation
        let reviews = reviewer.transcripts();
        assert!(!reviews[1][1].content.contains("Gold is fine."));
    }

    #[tokio::test]
    async fn test_always_tools_model_ends_at_bound() {
        let reasoning = Arc::new(ScriptedLlm::new(|_, _| {
            Ok(LlmReply::text("<tool>get_forex()</tool>"))
        }));
        let reviewer = Arc::new(ScriptedLlm::new(|_, _| Ok(LlmReply::text("Needs more work."))));

        let report = orchestrator(reasoning.clone(), reviewer.clone(), 3)
            .run("dolar ne olur?")
            .await
            .unwrap();

        assert_eq!(report.iterations, 3);
        assert_eq!(reasoning.call_count(), 3);
        assert_eq!(reviewer.call_count(), 1);
        assert_eq!(report.verdicts, vec![Verdict::Revise]);
        assert!(!report.report.trim().is_empty());

        // two tool rounds ran before the bound stopped tool execution
        let last_call = reasoning.transcripts().pop().unwrap();
        assert_eq!(tool_results(&last_call).len(), 2);
    }

    #[tokio::test]
    async fn test_always_rejected_drafts_terminate() {
        let reasoning = Arc::new(ScriptedLlm::new(|_, index| {
            Ok(LlmReply::text(format!("draft {}", index + 1)))
        }));
        let reviewer = Arc::new(ScriptedLlm::new(|_, _| Ok(LlmReply::text("no"))));

        let report = orchestrator(reasoning.clone(), reviewer, 5)
            .run("THYAO?")
            .await
            .unwrap();

        assert_eq!(report.iterations, 5);
        assert_eq!(report.verdicts.len(), 5);
        assert_eq!(report.report, "draft 5");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let reasoning = Arc::new(ScriptedLlm::from_replies(vec![
            LlmReply::text("<tool>get_weather(\"Ankara\")</tool>"),
            LlmReply::text("I can only answer financial questions."),
        ]));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("APPROVED")]));

        let report = orchestrator(reasoning.clone(), reviewer, 5)
            .run("Ankara hava durumu")
            .await
            .unwrap();

        assert_eq!(report.report, "I can only answer financial questions.");
        let transcripts = reasoning.transcripts();
        let results = tool_results(&transcripts[1]).join("\n");
        assert!(results.contains("Unknown tool: get_weather"), "{}", results);
    }

    #[tokio::test]
    async fn test_tool_calls_are_capped_per_turn() {
        let reasoning = Arc::new(ScriptedLlm::from_replies(vec![
            LlmReply::text(
                "<tool>get_forex(\"USDTRY\")</tool><tool>get_forex(\"EURTRY\")</tool>\
                 <tool>quick_answer(\"q\")</tool><tool>get_forex(\"GBPTRY\")</tool>",
            ),
            LlmReply::text("USDTRY 34.3"),
        ]));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("APPROVED")]));

        orchestrator(reasoning.clone(), reviewer, 5)
            .run("kurlar")
            .await
            .unwrap();

        let transcripts = reasoning.transcripts();
        let results = tool_results(&transcripts[1]);
        assert_eq!(results.len(), 3);
        assert!(results[0].contains("USDTRY"));
        assert!(results[1].contains("EURTRY"));
        assert!(results[2].starts_with("quick_answer"));
    }

    #[tokio::test]
    async fn test_empty_reply_yields_fixed_notice() {
        let reasoning = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("   ")]));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("APPROVED")]));

        let report = orchestrator(reasoning, reviewer.clone(), 3).run("?").await.unwrap();

        assert_eq!(report.report, NO_REPORT_TEXT);
        assert!(reviewer.transcripts()[0][1].content.contains(NO_REPORT_TEXT));
    }

    #[tokio::test]
    async fn test_llm_failure_becomes_apology() {
        let reasoning = Arc::new(ScriptedLlm::new(|_, _| {
            Err(OrchestrationError::LlmError("429 quota exceeded".to_string()))
        }));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![]));
        let orchestrator = orchestrator(reasoning, reviewer, 5);

        let err = orchestrator.run("altın?").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ReasoningFailure(_)));

        let answer = orchestrator.run_query("altın?").await;
        assert_eq!(answer, APOLOGY_TEXT);

        assert_eq!(orchestrator.run_query("   ").await, APOLOGY_TEXT);
    }

    #[tokio::test]
    async fn test_reviewer_failure_is_fatal() {
        let reasoning = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("draft")]));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![]));

        let err = orchestrator(reasoning, reviewer, 5).run("altın?").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ReflectionFailure(_)));
    }

    struct StalledLlm;

    #[async_trait]
    impl LlmClient for StalledLlm {
        async fn complete(&self, _messages: &[Message], _tools: &[ToolSchema]) -> Result<LlmReply> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(LlmReply::text("too late"))
        }
    }

    #[tokio::test]
    async fn test_llm_timeout_is_fatal() {
        let config = AgentConfig {
            llm_timeout_secs: 0,
            rate_limit_delay_ms: 0,
            ..Default::default()
        };
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![]));
        let orchestrator = Orchestrator::new(
            Arc::new(StalledLlm),
            test_registry(),
            Arc::new(LlmReflectionGate::new(reviewer)),
            &config,
        );

        let err = orchestrator.run("altın?").await.unwrap_err();
        assert!(err.to_string().contains("Timed out"), "{}", err);
    }

    #[tokio::test]
    async fn test_reviewer_sees_original_query() {
        let normalizer_llm = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text(
            "Analyze gold (GC=F) price and outlook",
        )]));
        let reasoning = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("Gold +2%, HOLD, neutral.")]));
        let reviewer = Arc::new(ScriptedLlm::from_replies(vec![LlmReply::text("APPROVED")]));

        let report = orchestrator(reasoning.clone(), reviewer.clone(), 5)
            .with_normalizer(QueryNormalizer::new(normalizer_llm, Duration::from_secs(1)))
            .run("altın ne olur?")
            .await
            .unwrap();

        assert!(report.reasoning_trace.iter().any(|t| t.starts_with("NORMALIZE")));
        assert_eq!(reasoning.transcripts()[0][1].content, "Analyze gold (GC=F) price and outlook");
        assert!(reviewer.transcripts()[0][1].content.contains("altın ne olur?"));
    }
}
