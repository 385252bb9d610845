//! Markdown report files written by the CLI

use crate::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

pub const DEFAULT_REPORT_FILE: &str = "financial_report.md";

const SLUG_CHARS: usize = 30;

pub fn render_markdown(question: &str, report: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "# Financial Research Report\n\n**Question:** {}\n\n**Generated:** {}\n\n---\n\n{}\n",
        question.trim(),
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.trim()
    )
}

/// `report_<slug>.md`, slug built from the question's alphanumerics
pub fn report_file_name(question: &str) -> String {
    let slug: String = question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(SLUG_CHARS)
        .collect();

    if slug.is_empty() {
        "report.md".to_string()
    } else {
        format!("report_{}.md", slug.trim_end_matches('_'))
    }
}

pub fn save_report(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}
