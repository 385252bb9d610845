//! Language model seam
//!
//! The loop only sees [`LlmClient`]: a conversation and the advertised tool
//! schemas go in, prose and/or structured tool calls come out.

pub mod gemini;

pub use gemini::GeminiClient;

use crate::error::OrchestrationError;
use crate::models::{Message, ToolCallRequest};
use crate::tools::ToolSchema;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmReply {
    pub content: String,
    /// Structured function calls, if the provider supports them
    pub tool_calls: Vec<ToolCallRequest>,
}

impl LlmReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmReply>;
}

type Responder = Box<dyn Fn(&[Message], usize) -> Result<LlmReply> + Send + Sync>;

/// Deterministic client for tests and dry runs.
///
/// The responder gets the conversation and the zero-based call index.
/// Every conversation it was shown is kept for inspection.
pub struct ScriptedLlm {
    responder: Responder,
    calls: AtomicUsize,
    transcripts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[Message], usize) -> Result<LlmReply> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// Replies served in order; running past the end is an error
    pub fn from_replies(replies: Vec<LlmReply>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_, index| {
            queue
                .lock()
                .map_err(|_| OrchestrationError::LlmError("script lock poisoned".to_string()))?
                .pop_front()
                .ok_or_else(|| OrchestrationError::LlmError(format!("no scripted reply for call {}", index)))
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.transcripts
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: &[Message], _tools: &[ToolSchema]) -> Result<LlmReply> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut transcripts) = self.transcripts.lock() {
            transcripts.push(messages.to_vec());
        }
        (self.responder)(messages, index)
    }
}
