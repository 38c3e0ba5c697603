use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an operational event reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warning,
    Critical,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warning => "warning",
            EventLevel::Critical => "critical",
        }
    }

    /// Normalize a level name written by the agent into a canonical level.
    ///
    /// Runbook authors use a variety of synonyms (`ok`, `degraded`, `fatal`,
    /// ...); unknown names yield `None` and the marker is discarded.
    pub fn from_alias(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "info" | "success" | "ok" | "healthy" | "debug" | "health-check-success" => {
                Some(EventLevel::Info)
            }
            "warning" | "warn" | "degraded" => Some(EventLevel::Warning),
            "critical" | "err" | "error" | "failed" | "fatal" => Some(EventLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(EventLevel::Info),
            "warning" => Ok(EventLevel::Warning),
            "critical" => Ok(EventLevel::Critical),
            other => Err(format!("unknown event level: {}", other)),
        }
    }
}

/// An append-only operational event extracted from agent output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub session_id: Option<i64>,
    pub level: EventLevel,
    pub service: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub session_id: Option<i64>,
    pub level: EventLevel,
    pub service: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_levels_pass_through() {
        assert_eq!(EventLevel::from_alias("info"), Some(EventLevel::Info));
        assert_eq!(EventLevel::from_alias("warning"), Some(EventLevel::Warning));
        assert_eq!(
            EventLevel::from_alias("critical"),
            Some(EventLevel::Critical)
        );
    }

    #[test]
    fn test_synonyms_normalize() {
        assert_eq!(
            EventLevel::from_alias("health-check-success"),
            Some(EventLevel::Info)
        );
        assert_eq!(EventLevel::from_alias("ok"), Some(EventLevel::Info));
        assert_eq!(EventLevel::from_alias("degraded"), Some(EventLevel::Warning));
        assert_eq!(EventLevel::from_alias("fatal"), Some(EventLevel::Critical));
        assert_eq!(EventLevel::from_alias("failed"), Some(EventLevel::Critical));
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        assert_eq!(EventLevel::from_alias("INFO"), Some(EventLevel::Info));
        assert_eq!(EventLevel::from_alias("Warn"), Some(EventLevel::Warning));
    }

    #[test]
    fn test_unknown_level_is_none() {
        assert_eq!(EventLevel::from_alias("verbose"), None);
        assert_eq!(EventLevel::from_alias(""), None);
    }
}
