use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence assigned to a freshly observed memory.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;
/// Confidence added when an identical observation is seen again.
pub const REINFORCE_STEP: f64 = 0.1;
/// Confidence removed from an existing memory when a contradicting
/// observation arrives for the same `(service, category)`.
pub const CONTRADICT_STEP: f64 = 0.1;
/// Memories whose confidence falls below this are deactivated but kept
/// for audit.
pub const DEACTIVATE_THRESHOLD: f64 = 0.3;

/// A durable, confidence-scored operational observation.
///
/// Active memories are injected into future agent prompts, ordered by
/// confidence; inactive ones stay in the store for audit only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub service: Option<String>,
    pub category: String,
    pub observation: String,
    pub confidence: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub session_id: Option<i64>,
    pub tier: u8,
}

#[derive(Debug, Clone)]
pub struct NewMemory {
    pub service: Option<String>,
    pub category: String,
    pub observation: String,
    pub confidence: f64,
    pub session_id: Option<i64>,
    pub tier: u8,
}

/// Clamp a confidence value into the valid `[0, 1]` range.
pub fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
