use regex::Regex;
use std::sync::LazyLock;

use crate::parser::{ResultSummary, StreamRecord};

static ANSI_CSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;:?]*[ -/]*[@-~]").unwrap());

/// Remove ANSI CSI sequences the agent emits for terminal coloring.
pub fn strip_ansi(text: &str) -> String {
    ANSI_CSI_RE.replace_all(text, "").into_owned()
}

/// Render a record as a plain text line for log-style sinks.
///
/// Returns `None` for records with nothing to show (for example an
/// assistant block that is empty after trimming).
pub fn render_plain(record: &StreamRecord) -> Option<String> {
    match record {
        StreamRecord::SessionStarted => Some("[session] started".to_string()),
        StreamRecord::AssistantText { text } => {
            let cleaned = strip_ansi(text);
            let trimmed = cleaned.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        StreamRecord::ToolUse {
            name,
            input_preview,
        } => Some(format!("[tool] {}: {}", name, input_preview)),
        StreamRecord::ToolResult { preview } => Some(format!("[result] {}", preview)),
        StreamRecord::Result(summary) => Some(render_result(summary)),
        StreamRecord::Raw { line } => Some(line.clone()),
    }
}

/// CSS classes attached to a record's HTML rendering.
pub fn html_class(record: &StreamRecord) -> &'static str {
    match record {
        StreamRecord::SessionStarted => "line line-system",
        StreamRecord::AssistantText { .. } => "line line-assistant",
        StreamRecord::ToolUse { .. } => "line line-tool",
        StreamRecord::ToolResult { .. } => "line line-tool-result",
        StreamRecord::Result(_) => "line line-terminal",
        StreamRecord::Raw { .. } => "line line-raw",
    }
}

/// Wrap already-prepared (and, upstream, already-redacted) line text into
/// an escaped HTML element.
pub fn wrap_html(class: &str, text: &str) -> String {
    format!(
        r#"<div class="{}">{}</div>"#,
        class,
        html_escape::encode_text(text)
    )
}

/// Render a record as an escaped HTML line for live viewers.
pub fn render_html(record: &StreamRecord) -> Option<String> {
    let text = render_plain(record)?;
    Some(wrap_html(html_class(record), &text))
}

fn render_result(summary: &ResultSummary) -> String {
    let cost = summary
        .cost_usd
        .map(|c| format!("${:.4}", c))
        .unwrap_or_else(|| "n/a".to_string());
    let turns = summary
        .num_turns
        .map(|t| t.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let duration = summary
        .duration_ms
        .map(|d| format!("{:.1}s", d as f64 / 1000.0))
        .unwrap_or_else(|| "n/a".to_string());

    let verdict = if summary.is_error { "failed" } else { "completed" };
    format!(
        "[session] {}: cost={} turns={} duration={}",
        verdict, cost, turns, duration
    )
}
