use super::{ParamKind, ParamSpec, Tool, ToolArgs};
use crate::models::ToolResult;
use crate::Result;
use async_trait::async_trait;
use serde_json::json;

/// General finance questions that need no live data
pub struct QuickAnswerTool;

#[async_trait]
impl Tool for QuickAnswerTool {
    fn name(&self) -> &'static str {
        "quick_answer"
    }

    fn description(&self) -> &'static str {
        "For general finance questions that need no live data. Returns the question so you can answer from knowledge"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("question", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        Ok(ToolResult::from_json(json!({
            "question": args.text("question")?,
            "note": "Answer from your own knowledge, no live data needed.",
        })))
    }
}
