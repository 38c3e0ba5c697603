//! Builders for the NDJSON records the agent CLI emits.

use serde_json::json;
use vigil_types::{CheckResult, Handoff};

pub fn system_init() -> String {
    json!({"type": "system", "subtype": "init"}).to_string()
}

pub fn assistant_text(text: &str) -> String {
    json!({
        "type": "assistant",
        "message": {"content": [{"type": "text", "text": text}]}
    })
    .to_string()
}

pub fn tool_use(name: &str, input: serde_json::Value) -> String {
    json!({
        "type": "assistant",
        "message": {"content": [{"type": "tool_use", "name": name, "input": input}]}
    })
    .to_string()
}

pub fn tool_result(text: &str) -> String {
    json!({
        "type": "user",
        "message": {"content": [{"type": "tool_result", "content": text}]}
    })
    .to_string()
}

pub fn result_event(response: &str, cost_usd: f64, num_turns: i64, duration_ms: i64) -> String {
    json!({
        "type": "result",
        "is_error": false,
        "result": response,
        "total_cost_usd": cost_usd,
        "num_turns": num_turns,
        "duration_ms": duration_ms
    })
    .to_string()
}

pub fn result_error(response: &str) -> String {
    json!({"type": "result", "is_error": true, "result": response}).to_string()
}

/// A minimal valid handoff document requesting escalation.
pub fn handoff_json(recommended_tier: u8, services: &[&str]) -> String {
    let handoff = Handoff {
        recommended_tier,
        services_affected: services.iter().map(|s| s.to_string()).collect(),
        check_results: services
            .iter()
            .map(|s| CheckResult {
                service: s.to_string(),
                check_type: "http".to_string(),
                status: "down".to_string(),
                error: Some("HTTP 502".to_string()),
                response_time_ms: None,
            })
            .collect(),
        investigation_findings: None,
        remediation_attempted: None,
        cooldown_state: None,
    };

    serde_json::to_string(&handoff).expect("handoff serializes")
}
