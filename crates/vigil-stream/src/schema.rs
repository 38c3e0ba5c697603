use serde::Deserialize;
use serde_json::Value;

/// One NDJSON record emitted by the agent CLI.
///
/// The wire schema belongs to the agent binary and evolves without notice;
/// everything not recognized here falls into `Unknown` rather than failing
/// the stream.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum AgentRecord {
    System(SystemRecord),
    Assistant(AssistantRecord),
    User(UserRecord),
    Result(ResultRecord),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct SystemRecord {
    #[serde(default)]
    pub subtype: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct AssistantRecord {
    pub message: AssistantMessage,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<AssistantBlock>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum AssistantBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct UserRecord {
    pub message: UserMessage,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct UserMessage {
    #[serde(default)]
    pub content: Vec<UserBlock>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum UserBlock {
    ToolResult {
        #[serde(default)]
        content: Option<ToolResultContent>,
    },
    #[serde(other)]
    Unknown,
}

/// Tool results arrive either as a plain string or as a list of text blocks.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub(crate) enum ToolResultContent {
    Text(String),
    Blocks(Vec<ToolResultBlock>),
    Other(Value),
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct ToolResultBlock {
    #[serde(default, rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct ResultRecord {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub num_turns: Option<i64>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub is_error: bool,
}
