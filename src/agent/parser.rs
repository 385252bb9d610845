//! Turns a model reply into an [`AgentTurnOutput`].
//!
//! Two calling conventions reach the same `ToolCallRequest` shape:
//! structured function calls from the provider, and inline
//! `<tool>name(args)</tool>` tags in the prose.

use crate::llm::LlmReply;
use crate::models::{AgentTurnOutput, ToolCallRequest};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOOL_TAG: Regex = Regex::new(r"(?s)<tool>(.*?)</tool>").expect("tool tag pattern is valid");
    static ref STRAY_TAG: Regex = Regex::new(r"</?tool>").expect("stray tag pattern is valid");
    static ref CALL: Regex =
        Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)$").expect("call pattern is valid");
    static ref BLANK_LINES: Regex = Regex::new(r"\n{3,}").expect("blank line pattern is valid");
}

pub fn parse_turn(reply: &LlmReply) -> AgentTurnOutput {
    let mut requests = reply.tool_calls.clone();
    requests.extend(inline_calls(&reply.content));

    let content = strip_tool_tags(&reply.content);

    if requests.is_empty() {
        AgentTurnOutput::Text { content }
    } else {
        AgentTurnOutput::ToolCalls { requests, content }
    }
}

/// Inline tag calls in order of appearance
pub fn inline_calls(text: &str) -> Vec<ToolCallRequest> {
    TOOL_TAG
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|body| {
            let body = body.as_str().trim();
            match CALL.captures(body) {
                Some(call) => ToolCallRequest::inline(&call[1], call[2].trim()),
                None => ToolCallRequest::malformed(body),
            }
        })
        .collect()
}

/// Prose with every tool tag removed
pub fn strip_tool_tags(text: &str) -> String {
    let without_calls = TOOL_TAG.replace_all(text, "");
    let without_stray = STRAY_TAG.replace_all(&without_calls, "");
    BLANK_LINES
        .replace_all(&without_stray, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolArguments;
    use serde_json::{json, Map};

    #[test]
    fn test_inline_tags_become_requests() {
        let reply = LlmReply::text(
            "Let me check.\n<tool>analyze_stock(\"bakır\")</tool>\n<tool>build_portfolio(100000, [\"SAHOL.IS\", \"GARAN.IS\"])</tool>",
        );

        match parse_turn(&reply) {
            AgentTurnOutput::ToolCalls { requests, content } => {
                assert_eq!(content, "Let me check.");
                assert_eq!(requests.len(), 2);
                assert_eq!(requests[0], ToolCallRequest::inline("analyze_stock", "\"bakır\""));
                assert_eq!(requests[1].tool_name, "build_portfolio");
                assert_eq!(
                    requests[1].arguments,
                    ToolArguments::Inline("100000, [\"SAHOL.IS\", \"GARAN.IS\"]".to_string())
                );
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn test_structured_and_inline_calls_share_a_shape() {
        let mut args = Map::new();
        args.insert("pair".to_string(), json!("EURTRY"));
        let reply = LlmReply {
            content: "<tool>get_news(\"THY\")</tool>".to_string(),
            tool_calls: vec![ToolCallRequest::named("get_forex", args)],
        };

        match parse_turn(&reply) {
            AgentTurnOutput::ToolCalls { requests, content } => {
                assert!(content.is_empty());
                assert_eq!(requests[0].tool_name, "get_forex");
                assert_eq!(requests[1].tool_name, "get_news");
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_tag_is_kept_as_request() {
        let calls = inline_calls("<tool>analyze stock please</tool>");
        assert_eq!(calls, vec![ToolCallRequest::malformed("analyze stock please")]);
    }

    #[test]
    fn test_plain_text_reply() {
        let reply = LlmReply::text("## Report\n\n\n\nGold looks strong. </tool>");
        assert_eq!(
            parse_turn(&reply),
            AgentTurnOutput::Text {
                content: "## Report\n\nGold looks strong.".to_string()
            }
        );
    }
}
