//! Core data models for the research agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    ToolResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Tool calls the assistant asked for in this message, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    /// Render a tool outcome as a conversation message
    pub fn tool_result(request: &ToolCallRequest, result: &ToolResult) -> Self {
        let payload = serde_json::to_string(result).unwrap_or_else(|_| result.to_string());
        Self::new(
            MessageRole::ToolResult,
            format!("{}: {}", request, payload),
        )
    }
}

//
// ================= Tool Calls =================
//

/// Arguments of a tool call as they arrived from the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "form", content = "value")]
pub enum ToolArguments {
    /// Structured call: parameter name → value
    Named(Map<String, Value>),
    /// Inline tag call: the raw text between the parentheses
    Inline(String),
    /// Tag body that is not of the form `name(...)`
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub arguments: ToolArguments,
}

impl ToolCallRequest {
    pub fn named(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: ToolArguments::Named(arguments),
        }
    }

    pub fn inline(tool_name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: ToolArguments::Inline(arguments.into()),
        }
    }

    pub fn malformed(fragment: impl Into<String>) -> Self {
        Self {
            tool_name: String::new(),
            arguments: ToolArguments::Malformed(fragment.into()),
        }
    }
}

impl fmt::Display for ToolCallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arguments {
            ToolArguments::Named(map) => {
                write!(f, "{}({})", self.tool_name, Value::Object(map.clone()))
            }
            ToolArguments::Inline(raw) => write!(f, "{}({})", self.tool_name, raw),
            ToolArguments::Malformed(raw) => write!(f, "{}", raw),
        }
    }
}

/// Outcome of a single tool invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ToolResult {
    Success {
        payload: Map<String, Value>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
}

impl ToolResult {
    pub fn success(payload: Map<String, Value>) -> Self {
        ToolResult::Success { payload }
    }

    /// Build a success result from a `json!({...})` object literal
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(payload) => ToolResult::Success { payload },
            other => {
                let mut payload = Map::new();
                payload.insert("value".to_string(), other);
                ToolResult::Success { payload }
            }
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error {
            message: message.into(),
            hint: None,
        }
    }

    pub fn error_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        ToolResult::Error {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error { .. })
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match self {
            ToolResult::Success { payload } => Some(payload),
            ToolResult::Error { .. } => None,
        }
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolResult::Success { payload } => write!(f, "{}", Value::Object(payload.clone())),
            ToolResult::Error { message, hint: Some(hint) } => {
                write!(f, "error: {} (hint: {})", message, hint)
            }
            ToolResult::Error { message, hint: None } => write!(f, "error: {}", message),
        }
    }
}

//
// ================= Reasoning Output =================
//

/// What one reasoning step produced, independent of the calling convention
#[derive(Debug, Clone, PartialEq)]
pub enum AgentTurnOutput {
    ToolCalls {
        requests: Vec<ToolCallRequest>,
        /// Prose around the calls, tags removed
        content: String,
    },
    Text {
        content: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Approve,
    Revise,
}

//
// ================= Entity Resolution =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Exact,
    Partial,
    Canonical,
    Search,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionCacheEntry {
    pub query_key: String,
    pub resolved_symbol: String,
    pub tier: ResolutionTier,
}

/// One hit from an external web search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReport {
    pub query_id: Uuid,
    pub report: String,
    pub iterations: u32,
    pub verdicts: Vec<Verdict>,
    pub reasoning_trace: Vec<String>,
    pub execution_time_ms: u64,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionTier::Exact => "exact",
            ResolutionTier::Partial => "partial",
            ResolutionTier::Canonical => "canonical",
            ResolutionTier::Search => "search",
            ResolutionTier::Fallback => "fallback",
        };
        write!(f, "{}", s)
    }
}
