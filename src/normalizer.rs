//! Query normalizer
//!
//! Rewrites a conversational question into a short, tool-actionable
//! research task. Never fails: on any problem the original query is used.

use crate::llm::LlmClient;
use crate::models::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const INSTRUCTIONS: &str = "Rewrite the user's financial question as a short research task.
Name the assets, markets or sectors involved explicitly and state what data \
is needed. Keep the user's language. Reply with the rewritten task only.";

pub struct QueryNormalizer {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl QueryNormalizer {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub async fn normalize(&self, query: &str) -> String {
        let messages = [Message::system(INSTRUCTIONS), Message::user(query)];

        match tokio::time::timeout(self.timeout, self.llm.complete(&messages, &[])).await {
            Ok(Ok(reply)) if !reply.content.trim().is_empty() => {
                let rewritten = reply.content.trim().to_string();
                debug!(original = %query, rewritten = %rewritten, "Query normalized");
                rewritten
            }
            Ok(Ok(_)) => {
                warn!("Normalizer returned an empty reply, using original query");
                query.to_string()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Query normalization failed, using original query");
                query.to_string()
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Query normalization timed out, using original query");
                query.to_string()
            }
        }
    }
}
