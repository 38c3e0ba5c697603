use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Resolve the vigil data directory path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. VIGIL_PATH environment variable (with tilde expansion)
/// 3. XDG data directory (recommended default)
/// 4. ~/.vigil (fallback for systems without XDG)
pub fn resolve_workspace_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("VIGIL_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("vigil"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".vigil"));
    }

    Err(Error::Config(
        "Could not determine workspace path: no HOME directory or XDG data directory found"
            .to_string(),
    ))
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

fn default_interval_secs() -> u64 {
    1800
}

fn default_max_tier() -> u8 {
    3
}

fn default_agent_binary() -> PathBuf {
    PathBuf::from("claude")
}

fn default_token_budget() -> usize {
    2000
}

fn default_decay_grace_days() -> i64 {
    30
}

fn default_decay_rate_per_week() -> f64 {
    0.1
}

fn default_memory_query_limit() -> usize {
    200
}

fn default_cred_prefix() -> String {
    vigil_stream::DEFAULT_CRED_PREFIX.to_string()
}

fn default_buffer_capacity() -> usize {
    vigil_hub::DEFAULT_BUFFER_CAPACITY
}

/// Per-tier agent launch parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub model: String,
    pub prompt_file: PathBuf,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds between scheduled chains, measured from the end of the
    /// previous chain.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_tier")]
    pub max_tier: u8,
    #[serde(default)]
    pub dry_run: bool,
    pub state_dir: PathBuf,
    pub results_dir: PathBuf,
    #[serde(default)]
    pub repos_dir: Option<PathBuf>,
    #[serde(default = "default_agent_binary")]
    pub agent_binary: PathBuf,
    #[serde(default)]
    pub notify_url: Option<String>,
    #[serde(default)]
    pub browser_origin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Estimated token budget for injected memory context.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    #[serde(default = "default_decay_grace_days")]
    pub decay_grace_days: i64,
    #[serde(default = "default_decay_rate_per_week")]
    pub decay_rate_per_week: f64,
    /// Upper bound on memories fetched per injection pass.
    #[serde(default = "default_memory_query_limit")]
    pub query_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            decay_grace_days: default_decay_grace_days(),
            decay_rate_per_week: default_decay_rate_per_week(),
            query_limit: default_memory_query_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_cred_prefix")]
    pub env_prefix: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            env_prefix: default_cred_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub supervisor: SupervisorConfig,
    /// Tier number to launch parameters; tier 1 must be present.
    /// Keys are strings because TOML table keys are strings.
    pub tiers: BTreeMap<String, TierConfig>,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

impl Config {
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(resolve_workspace_path(None)?.join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.supervisor.max_tier == 0 {
            return Err(Error::Config("max_tier must be at least 1".to_string()));
        }
        if !self.tiers.contains_key("1") {
            return Err(Error::Config("tier 1 must be configured".to_string()));
        }
        for key in self.tiers.keys() {
            let tier: u8 = key
                .parse()
                .map_err(|_| Error::Config(format!("tier key '{}' is not a number", key)))?;
            if tier == 0 || tier > self.supervisor.max_tier {
                return Err(Error::Config(format!(
                    "tier {} outside valid range 1..={}",
                    tier, self.supervisor.max_tier
                )));
            }
        }
        Ok(())
    }

    pub fn tier(&self, tier: u8) -> Option<&TierConfig> {
        self.tiers.get(&tier.to_string())
    }

    pub fn db_path(&self) -> PathBuf {
        self.supervisor.state_dir.join("vigil.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.supervisor.results_dir.join("logs")
    }

    /// Starter configuration written by `vigil init`.
    pub fn sample(root: &PathBuf) -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert(
            "1".to_string(),
            TierConfig {
                model: "agent-small".to_string(),
                prompt_file: root.join("prompts/tier1-observe.md"),
                allowed_tools: vec!["Bash(systemctl status:*)".to_string(), "Read".to_string()],
                disallowed_tools: vec!["Write".to_string()],
            },
        );
        tiers.insert(
            "2".to_string(),
            TierConfig {
                model: "agent-medium".to_string(),
                prompt_file: root.join("prompts/tier2-remediate.md"),
                allowed_tools: vec!["Bash".to_string(), "Read".to_string()],
                disallowed_tools: Vec::new(),
            },
        );
        tiers.insert(
            "3".to_string(),
            TierConfig {
                model: "agent-large".to_string(),
                prompt_file: root.join("prompts/tier3-full.md"),
                allowed_tools: Vec::new(),
                disallowed_tools: Vec::new(),
            },
        );

        Self {
            supervisor: SupervisorConfig {
                interval_secs: default_interval_secs(),
                max_tier: default_max_tier(),
                dry_run: false,
                state_dir: root.join("state"),
                results_dir: root.join("results"),
                repos_dir: None,
                agent_binary: default_agent_binary(),
                notify_url: None,
                browser_origin: None,
            },
            tiers,
            memory: MemoryConfig::default(),
            redaction: RedactionConfig::default(),
            hub: HubConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sample_config_round_trips() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config = Config::sample(&temp_dir.path().to_path_buf());
        config.save_to(&config_path)?;

        let loaded = Config::load_from(&config_path)?;
        assert_eq!(loaded.supervisor.interval_secs, 1800);
        assert_eq!(loaded.supervisor.max_tier, 3);
        assert_eq!(loaded.tiers.len(), 3);
        assert_eq!(loaded.memory.token_budget, 2000);
        assert_eq!(loaded.redaction.env_prefix, "BROWSER_CRED_");

        Ok(())
    }

    #[test]
    fn test_missing_tier_one_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();

        let mut config = Config::sample(&root);
        config.tiers.remove("1");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tier_above_max_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();

        let mut config = Config::sample(&root);
        config.supervisor.max_tier = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let toml_doc = r#"
            [supervisor]
            state_dir = "/tmp/vigil/state"
            results_dir = "/tmp/vigil/results"

            [tiers.1]
            model = "agent-small"
            prompt_file = "/tmp/vigil/prompts/observe.md"
        "#;

        let config: Config = toml::from_str(toml_doc).unwrap();
        assert_eq!(config.supervisor.interval_secs, 1800);
        assert_eq!(config.hub.buffer_capacity, 1000);
        assert_eq!(config.memory.decay_grace_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_tilde() {
        unsafe { std::env::set_var("HOME", "/home/tester") };
        assert_eq!(
            expand_tilde("~/vigil"),
            PathBuf::from("/home/tester/vigil")
        );
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }
}
