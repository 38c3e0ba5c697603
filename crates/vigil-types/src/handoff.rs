use serde::{Deserialize, Serialize};

/// Outcome of a single health check the agent ran before requesting
/// escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub service: String,
    pub check_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

/// Transient escalation request written by the agent just before exit.
///
/// Lives at `<state_dir>/handoff.json`; the supervisor reads, validates, and
/// deletes it before spawning the next tier. It never survives a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub recommended_tier: u8,
    pub services_affected: Vec<String>,
    #[serde(default)]
    pub check_results: Vec<CheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_findings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_attempted: Option<String>,
    /// Opaque cooldown bookkeeping passed through between tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_state: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_deserializes_minimal_document() {
        let doc = r#"{"recommended_tier":2,"services_affected":["postgres"]}"#;
        let handoff: Handoff = serde_json::from_str(doc).unwrap();
        assert_eq!(handoff.recommended_tier, 2);
        assert_eq!(handoff.services_affected, vec!["postgres"]);
        assert!(handoff.check_results.is_empty());
        assert!(handoff.cooldown_state.is_none());
    }

    #[test]
    fn test_handoff_round_trips_check_results() {
        let handoff = Handoff {
            recommended_tier: 3,
            services_affected: vec!["jellyfin".to_string()],
            check_results: vec![CheckResult {
                service: "jellyfin".to_string(),
                check_type: "http".to_string(),
                status: "down".to_string(),
                error: Some("HTTP 502".to_string()),
                response_time_ms: Some(1800),
            }],
            investigation_findings: Some("container restarting in a loop".to_string()),
            remediation_attempted: None,
            cooldown_state: None,
        };

        let json = serde_json::to_string(&handoff).unwrap();
        let back: Handoff = serde_json::from_str(&json).unwrap();
        assert_eq!(back.check_results[0].error.as_deref(), Some("HTTP 502"));
        assert_eq!(back.check_results[0].response_time_ms, Some(1800));
    }
}
