//! Prompts for the reasoning step

use crate::tools::{ParamKind, ToolSchema};
use chrono::Utc;

pub const REVISION_PROMPT: &str = "A reviewer rejected your previous report. \
Write a new report that includes concrete figures (price, change or ratio), a clear \
recommendation and a sentiment or risk assessment. Call tools again if data is missing.";

/// Returned when the model produced nothing usable
pub const NO_REPORT_TEXT: &str =
    "No report could be produced for this question with the data that was available.";

/// Returned by `run_query` when the loop fails
pub const APOLOGY_TEXT: &str =
    "Sorry, something went wrong while researching your question. Please try again in a moment.";

fn signature(schema: &ToolSchema) -> String {
    let params: Vec<String> = schema
        .parameters
        .iter()
        .map(|p| {
            let kind = match p.kind {
                ParamKind::Text => "text",
                ParamKind::Number => "number",
                ParamKind::TextList => "list",
            };
            match p.default {
                Some(default) => format!("{}: {} = \"{}\"", p.name, kind, default),
                None => format!("{}: {}", p.name, kind),
            }
        })
        .collect();

    format!("{}({})", schema.name, params.join(", "))
}

pub fn system_prompt(tools: &[ToolSchema]) -> String {
    let catalog: Vec<String> = tools
        .iter()
        .map(|t| format!("- {}: {}", signature(t), t.description))
        .collect();

    format!(
        "You are a financial research agent. Today is {date}.

Answer the user's question with live data. Work in steps: call tools, read \
their results, then write the report.

Tools:
{catalog}

Call tools with function calls, or inline as <tool>name(arguments)</tool>, e.g. \
<tool>analyze_stock(\"THYAO.IS\")</tool> or <tool>build_portfolio(100000, [\"SAHOL.IS\", \"GARAN.IS\"])</tool>.
At most 3 tool calls per step. If a tool returns an error, read the hint and try another approach.

When you have enough data, reply without tool calls. The report must contain concrete \
figures, a clear recommendation and a sentiment assessment. If the question cannot \
be answered, say so plainly.",
        date = Utc::now().format("%Y-%m-%d"),
        catalog = catalog.join("\n"),
    )
}
