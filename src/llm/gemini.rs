//! Gemini API client
//!
//! Calls `generateContent` with the conversation and the registry's tools as
//! function declarations. Uses a long-lived reqwest::Client for connection
//! pooling.

use super::{LlmClient, LlmReply};
use crate::error::OrchestrationError;
use crate::models::{Message, MessageRole, ToolCallRequest};
use crate::tools::ToolSchema;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmReply> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let request = build_request(messages, tools);

        info!(model = %self.model, messages = messages.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let reply = reply_from_response(gemini_response)?;
        debug!(
            chars = reply.content.len(),
            tool_calls = reply.tool_calls.len(),
            "Gemini response received"
        );

        Ok(reply)
    }
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

//
// ================= Conversion =================
//

fn text_part(text: String) -> Part {
    Part {
        text: Some(text),
        function_call: None,
    }
}

/// Conversation as Gemini contents. System messages become the system
/// instruction and consecutive same-role turns are merged.
fn build_request(messages: &[Message], tools: &[ToolSchema]) -> GeminiRequest {
    let mut system = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for message in messages {
        let (role, text) = match message.role {
            MessageRole::System => {
                system.push(text_part(message.content.clone()));
                continue;
            }
            MessageRole::User | MessageRole::ToolResult => ("user", message.content.clone()),
            MessageRole::Assistant => ("model", assistant_text(message)),
        };

        if text.trim().is_empty() {
            continue;
        }

        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.push(text_part(text)),
            _ => contents.push(Content {
                role: Some(role.to_string()),
                parts: vec![text_part(text)],
            }),
        }
    }

    GeminiRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| Content {
            role: None,
            parts: system,
        }),
        tools: if tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclarations {
                function_declarations: tools.iter().map(function_declaration).collect(),
            }]
        },
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            max_output_tokens: 2048,
        },
    }
}

/// Structured calls are replayed as text so history never needs function
/// response turns
fn assistant_text(message: &Message) -> String {
    let calls: Vec<String> = message
        .tool_calls
        .iter()
        .map(|call| call.to_string())
        .filter(|call| !message.content.contains(call.as_str()))
        .collect();

    if calls.is_empty() {
        message.content.clone()
    } else {
        format!("{}\nCalled tools: {}", message.content, calls.join(", "))
            .trim()
            .to_string()
    }
}

fn function_declaration(schema: &ToolSchema) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in schema.parameters {
        let mut property = json!({ "type": param.kind.schema_type() });
        if param.kind == crate::tools::ParamKind::TextList {
            property["items"] = json!({ "type": "STRING" });
        }
        if let Some(default) = param.default {
            property["description"] = json!(format!("Defaults to {}", default));
        } else {
            required.push(param.name);
        }
        properties.insert(param.name.to_string(), property);
    }

    let mut declaration = json!({
        "name": schema.name,
        "description": schema.description,
    });
    if !properties.is_empty() {
        declaration["parameters"] = json!({
            "type": "OBJECT",
            "properties": properties,
            "required": required,
        });
    }
    declaration
}

fn reply_from_response(response: GeminiResponse) -> Result<LlmReply> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OrchestrationError::LlmError("No candidates in Gemini response".to_string()))?;

    if candidate.content.parts.is_empty() {
        return Err(OrchestrationError::LlmError(format!(
            "Empty Gemini response (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for part in candidate.content.parts {
        if let Some(text) = part.text {
            texts.push(text);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCallRequest::named(call.name, call.args));
        }
    }

    Ok(LlmReply {
        content: texts.join(""),
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolArguments;
    use crate::tools::{ParamKind, ParamSpec};

    const PARAMS: &[ParamSpec] = &[
        ParamSpec::required("amount", ParamKind::Number),
        ParamSpec::required("symbols", ParamKind::TextList),
        ParamSpec::optional("pair", ParamKind::Text, "USDTRY"),
    ];

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            Message::system("You are a research agent"),
            Message::user("Sabancı hissesi alınır mı?"),
            Message::assistant("", vec![ToolCallRequest::inline("analyze_stock", "\"SAHOL.IS\"")]),
            Message::new(MessageRole::ToolResult, "analyze_stock(\"SAHOL.IS\"): {}"),
            Message::user("Please revise"),
        ];
        let tools = [ToolSchema {
            name: "build_portfolio",
            description: "Allocate",
            parameters: PARAMS,
        }];

        let value = serde_json::to_value(build_request(&messages, &tools)).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "You are a research agent");
        let contents = value["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert!(contents[1]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("analyze_stock(\"SAHOL.IS\")"));
        // tool result and revision prompt merged into one user turn
        assert_eq!(contents[2]["parts"].as_array().unwrap().len(), 2);

        let declaration = &value["tools"][0]["functionDeclarations"][0];
        assert_eq!(declaration["parameters"]["properties"]["symbols"]["type"], "ARRAY");
        assert_eq!(declaration["parameters"]["required"], json!(["amount", "symbols"]));
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_response_with_function_call() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Checking copper." },
                        { "functionCall": { "name": "analyze_stock", "args": { "symbol": "bakır" } } }
                    ]
                },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let reply = reply_from_response(response).unwrap();
        assert_eq!(reply.content, "Checking copper.");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].tool_name, "analyze_stock");
        assert!(matches!(&reply.tool_calls[0].arguments, ToolArguments::Named(m) if m["symbol"] == "bakır"));
    }

    #[test]
    fn test_empty_candidates_is_an_error() {
        let response: GeminiResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(matches!(reply_from_response(response), Err(OrchestrationError::LlmError(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(String::new(), "gemini-2.0-flash".to_string(), Duration::from_secs(1)).unwrap();
        let result = client.complete(&[Message::user("hi")], &[]).await;
        assert!(matches!(result, Err(OrchestrationError::LlmError(_))));
    }
}
