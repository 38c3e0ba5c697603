use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder recorded in `prompt_file` for sessions whose prompt was
/// supplied inline rather than read from a prompt file.
pub const AD_HOC_PROMPT_FILE: &str = "(ad-hoc)";

/// Lifecycle state of a session.
///
/// A session is `Running` until it is finalized exactly once into one of the
/// terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Escalated,
    Failed,
    TimedOut,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Escalated => "escalated",
            SessionStatus::Failed => "failed",
            SessionStatus::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "escalated" => Ok(SessionStatus::Escalated),
            "failed" => Ok(SessionStatus::Failed),
            "timed_out" => Ok(SessionStatus::TimedOut),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// What caused a session to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
    Escalation,
    Alert,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
            Trigger::Escalation => "escalation",
            Trigger::Alert => "alert",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Trigger::Scheduled),
            "manual" => Ok(Trigger::Manual),
            "escalation" => Ok(Trigger::Escalation),
            "alert" => Ok(Trigger::Alert),
            other => Err(format!("unknown trigger: {}", other)),
        }
    }
}

/// One child-process invocation of the ops agent.
///
/// `parent_session_id` links an escalation child back to the session whose
/// handoff spawned it; children always carry a strictly greater tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub tier: u8,
    pub model: String,
    pub prompt_file: String,
    pub prompt_text: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub log_path: Option<String>,
    pub trigger: Trigger,
    pub parent_session_id: Option<i64>,
    pub response: Option<String>,
    pub cost_usd: Option<f64>,
    pub num_turns: Option<i64>,
    pub duration_ms: Option<i64>,
    pub summary: Option<String>,
}

/// Fields needed to insert a new session row (status starts as `running`).
#[derive(Debug, Clone)]
pub struct NewSession {
    pub tier: u8,
    pub model: String,
    pub prompt_file: String,
    pub prompt_text: Option<String>,
    pub trigger: Trigger,
    pub parent_session_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Escalated,
            SessionStatus::Failed,
            SessionStatus::TimedOut,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_only_running_is_non_terminal() {
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("cancelled".parse::<SessionStatus>().is_err());
    }
}
