use crate::pump::StreamOutcome;

const RESPONSE_HEAD_BYTES: usize = 200;

/// Derive a one-paragraph session summary from the collected stream stats.
///
/// Deterministic and local: no second model invocation, so it can run on a
/// detached thread after finalization without cost or failure modes beyond
/// the summary write itself.
pub fn render_summary(outcome: &StreamOutcome) -> String {
    let mut parts = vec![format!(
        "{} lines, {} assistant blocks, {} tool calls",
        outcome.lines_total, outcome.assistant_blocks, outcome.tool_calls
    )];

    if outcome.events_recorded + outcome.memories_recorded + outcome.cooldowns_recorded > 0 {
        parts.push(format!(
            "{} events, {} memories, {} cooldown actions",
            outcome.events_recorded, outcome.memories_recorded, outcome.cooldowns_recorded
        ));
    }

    if let Some(result) = &outcome.result {
        if let (Some(cost), Some(turns)) = (result.cost_usd, result.num_turns) {
            parts.push(format!("${:.4} over {} turns", cost, turns));
        }
        if let Some(response) = &result.response {
            let head = response.lines().next().unwrap_or_default().trim();
            if !head.is_empty() {
                parts.push(format!("\"{}\"", truncate(head, RESPONSE_HEAD_BYTES)));
            }
        }
    }

    parts.join("; ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
