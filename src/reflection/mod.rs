//! Reflection gate
//!
//! One review call per draft. The reviewer answers with a fixed approval
//! token or with feedback; anything without the token counts as a
//! revision request.

use crate::llm::LlmClient;
use crate::models::{Message, Verdict};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const APPROVAL_TOKEN: &str = "APPROVED";

const RUBRIC: &str = "You review financial research reports before they reach the user.

Approve the report only if it either:
1. contains at least one concrete number (price, percentage, ratio or rate), \
a clear directional recommendation (buy, sell, hold, avoid, accumulate) and a \
sentiment or risk assessment; or
2. is a clear, well-formed explanation that the question cannot be answered \
with the available data.

If the report qualifies, reply with the single word APPROVED.
Otherwise list in one or two sentences what is missing. Do not rewrite the report.";

#[async_trait]
pub trait ReflectionGate: Send + Sync {
    async fn review(&self, original_query: &str, draft: &str) -> Result<Verdict>;
}

/// Verdict from a reviewer reply: approval token present, case-insensitive
pub fn verdict_from_reply(reply: &str) -> Verdict {
    if reply.to_uppercase().contains(APPROVAL_TOKEN) {
        Verdict::Approve
    } else {
        Verdict::Revise
    }
}

pub struct LlmReflectionGate {
    llm: Arc<dyn LlmClient>,
}

impl LlmReflectionGate {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReflectionGate for LlmReflectionGate {
    async fn review(&self, original_query: &str, draft: &str) -> Result<Verdict> {
        let messages = [
            Message::system(RUBRIC),
            Message::user(format!(
                "User question:\n{}\n\nReport:\n{}",
                original_query, draft
            )),
        ];

        let reply = self.llm.complete(&messages, &[]).await?;
        let verdict = verdict_from_reply(&reply.content);
        let excerpt: String = reply.content.chars().take(120).collect();
        debug!(?verdict, reply = %excerpt, "Reflection verdict");

        Ok(verdict)
    }
}
