use crate::schema::{
    AgentRecord, AssistantBlock, ToolResultBlock, ToolResultContent, UserBlock,
};

/// Longest line the decoder will attempt to parse as JSON. Longer lines are
/// passed through verbatim.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

const TOOL_INPUT_PREVIEW_BYTES: usize = 200;
const TOOL_RESULT_PREVIEW_BYTES: usize = 300;

/// Terminal metrics captured from the agent's `result` record.
#[derive(Debug, Clone, Default)]
pub struct ResultSummary {
    pub response: Option<String>,
    pub cost_usd: Option<f64>,
    pub num_turns: Option<i64>,
    pub duration_ms: Option<i64>,
    pub is_error: bool,
}

/// Internal view of one decoded line.
///
/// `AssistantText` carries the original block text; marker extraction runs
/// on it before any ANSI stripping or trimming happens for display.
#[derive(Debug, Clone)]
pub enum StreamRecord {
    SessionStarted,
    AssistantText { text: String },
    ToolUse { name: String, input_preview: String },
    ToolResult { preview: String },
    Result(ResultSummary),
    /// Non-JSON child output, passed through verbatim.
    Raw { line: String },
}

/// Decode one newline-delimited line of agent output.
///
/// A single assistant record can fan out into several stream records (one
/// per content block). Lines that are not JSON, or that exceed
/// `MAX_LINE_BYTES`, come back as a single `Raw` record; recognized JSON
/// with nothing to display (system noise, unknown record types) comes back
/// empty. The raw line itself always goes to the session log regardless of
/// what this returns.
pub fn parse_line(line: &str) -> Vec<StreamRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.len() > MAX_LINE_BYTES || !trimmed.starts_with('{') {
        return vec![StreamRecord::Raw {
            line: trimmed.to_string(),
        }];
    }

    let record: AgentRecord = match serde_json::from_str(trimmed) {
        Ok(record) => record,
        Err(_) => {
            return vec![StreamRecord::Raw {
                line: trimmed.to_string(),
            }];
        }
    };

    match record {
        AgentRecord::System(system) => {
            if system.subtype.as_deref() == Some("init") {
                vec![StreamRecord::SessionStarted]
            } else {
                Vec::new()
            }
        }
        AgentRecord::Assistant(assistant) => assistant
            .message
            .content
            .into_iter()
            .filter_map(|block| match block {
                AssistantBlock::Text { text } => Some(StreamRecord::AssistantText { text }),
                AssistantBlock::ToolUse { name, input } => {
                    let rendered = serde_json::to_string(&input).unwrap_or_default();
                    Some(StreamRecord::ToolUse {
                        name,
                        input_preview: truncate_bytes(&rendered, TOOL_INPUT_PREVIEW_BYTES),
                    })
                }
                AssistantBlock::Unknown => None,
            })
            .collect(),
        AgentRecord::User(user) => user
            .message
            .content
            .into_iter()
            .filter_map(|block| match block {
                UserBlock::ToolResult { content } => Some(StreamRecord::ToolResult {
                    preview: truncate_bytes(
                        &tool_result_text(content),
                        TOOL_RESULT_PREVIEW_BYTES,
                    ),
                }),
                UserBlock::Unknown => None,
            })
            .collect(),
        AgentRecord::Result(result) => vec![StreamRecord::Result(ResultSummary {
            response: result.result,
            cost_usd: result.total_cost_usd,
            num_turns: result.num_turns,
            duration_ms: result.duration_ms,
            is_error: result.is_error,
        })],
        AgentRecord::Unknown => Vec::new(),
    }
}

fn tool_result_text(content: Option<ToolResultContent>) -> String {
    match content {
        Some(ToolResultContent::Text(text)) => text,
        Some(ToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|ToolResultBlock { text, .. }| text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        Some(ToolResultContent::Other(_)) | None => String::new(),
    }
}

/// Truncate to a byte budget on a char boundary, appending "..." when cut.
pub(crate) fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }

    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
