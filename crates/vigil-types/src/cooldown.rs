use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of remediation the agent attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Restart,
    Redeployment,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Restart => "restart",
            ActionType::Redeployment => "redeployment",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restart" => Ok(ActionType::Restart),
            "redeployment" => Ok(ActionType::Redeployment),
            other => Err(format!("unknown action type: {}", other)),
        }
    }
}

/// Append-only record of one remediation attempt.
///
/// Windowed counts over these rows back the sliding-window retry limits the
/// agent is asked to honor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownAction {
    pub id: i64,
    pub service: String,
    pub action_type: ActionType,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub tier: u8,
    pub error: Option<String>,
    pub session_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewCooldownAction {
    pub service: String,
    pub action_type: ActionType,
    pub success: bool,
    pub tier: u8,
    pub error: Option<String>,
    pub session_id: Option<i64>,
}
