use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::config::Config;
use vigil_store::Store;
use vigil_types::{ActionType, Memory};

// Sliding-window remediation limits the agent is asked to honor. The
// supervisor reports standing against them; the agent enforces.
const RESTART_LIMIT: i64 = 2;
const RESTART_WINDOW_HOURS: i64 = 4;
const REDEPLOY_LIMIT: i64 = 1;
const REDEPLOY_WINDOW_HOURS: i64 = 24;

/// Space-separated `KEY=VALUE` tokens describing the supervisor environment.
///
/// Credential-bearing variables must never be added here; the append channel
/// bypasses the redaction filter.
pub fn environment_context(config: &Config) -> String {
    let sup = &config.supervisor;
    let mut tokens = vec![
        format!("STATE_DIR={}", sup.state_dir.display()),
        format!("RESULTS_DIR={}", sup.results_dir.display()),
    ];

    if let Some(repos_dir) = &sup.repos_dir {
        tokens.push(format!("REPOS_DIR={}", repos_dir.display()));
    }

    for (key, tier_config) in &config.tiers {
        if key != "1" {
            tokens.push(format!("TIER{}_MODEL={}", key, tier_config.model));
        }
    }

    tokens.push(format!("DRY_RUN={}", sup.dry_run));

    if let Some(notify_url) = &sup.notify_url {
        tokens.push(format!("NOTIFY_URL={}", notify_url));
    }
    if let Some(browser_origin) = &sup.browser_origin {
        tokens.push(format!("BROWSER_ORIGIN={}", browser_origin));
    }

    tokens.join(" ")
}

/// Render active memories into a prompt block, highest confidence first.
///
/// Memories are grouped by service (null service under "general") and
/// accumulated while the estimated token cost (`bytes / 4`) stays under the
/// budget; whatever does not fit is silently dropped, so confidence ordering
/// decides what survives.
pub fn memory_context(memories: &[Memory], token_budget: usize) -> Option<String> {
    if memories.is_empty() {
        return None;
    }

    let byte_budget = token_budget.saturating_mul(4);

    // Order service groups by their best memory; within a group the input
    // order (confidence descending) is preserved.
    let mut groups: Vec<(String, Vec<&Memory>)> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    for memory in memories {
        let service = memory
            .service
            .clone()
            .unwrap_or_else(|| "general".to_string());
        match index.get(&service) {
            Some(&slot) => groups[slot].1.push(memory),
            None => {
                index.insert(service.clone(), groups.len());
                groups.push((service, vec![memory]));
            }
        }
    }

    let mut body = String::new();
    let mut included = 0usize;

    'outer: for (service, group) in &groups {
        let heading = format!("\n### {}\n", service);
        if body.len() + heading.len() > byte_budget {
            break;
        }
        let mut heading_written = false;

        for memory in group {
            let line = format!(
                "- [{}] {} (confidence: {:.1})\n",
                memory.category, memory.observation, memory.confidence
            );
            let cost = line.len() + if heading_written { 0 } else { heading.len() };
            if body.len() + cost > byte_budget {
                break 'outer;
            }
            if !heading_written {
                body.push_str(&heading);
                heading_written = true;
            }
            body.push_str(&line);
            included += 1;
        }
    }

    if included == 0 {
        return None;
    }

    let header = format!(
        "## Operational Memory ({} memories, ~{} tokens)\n",
        included,
        (body.len() + 64) / 4
    );
    Some(format!("{}{}", header, body))
}

/// Render recent remediation standing per service against the sliding
/// windows, so the agent can see which actions are still available.
pub fn cooldown_context(store: &Store) -> Option<String> {
    let now = Utc::now();
    let window_start = now - Duration::hours(REDEPLOY_WINDOW_HOURS);

    let services = match store.recent_cooldown_services(window_start) {
        Ok(services) => services,
        Err(e) => {
            warn!(error = %e, "failed to load cooldown services");
            return None;
        }
    };
    if services.is_empty() {
        return None;
    }

    let mut lines = vec!["## Remediation Cooldowns".to_string()];
    for service in services {
        let restarts = store
            .count_recent_cooldown_actions(
                &service,
                ActionType::Restart,
                now - Duration::hours(RESTART_WINDOW_HOURS),
            )
            .unwrap_or(0);
        let redeploys = store
            .count_recent_cooldown_actions(&service, ActionType::Redeployment, window_start)
            .unwrap_or(0);

        lines.push(format!(
            "- {}: restarts {}/{} in {}h, redeployments {}/{} in {}h",
            service,
            restarts,
            RESTART_LIMIT,
            RESTART_WINDOW_HOURS,
            redeploys,
            REDEPLOY_LIMIT,
            REDEPLOY_WINDOW_HOURS,
        ));
    }

    Some(lines.join("\n"))
}

/// Assemble the full system-prompt append for one session.
pub fn assemble_system_prompt(
    environment: &str,
    memory: Option<&str>,
    cooldowns: Option<&str>,
    handoff: Option<&str>,
) -> String {
    let mut sections = vec![format!("## Environment\n{}", environment)];

    if let Some(memory) = memory {
        sections.push(memory.to_string());
    }
    if let Some(cooldowns) = cooldowns {
        sections.push(cooldowns.to_string());
    }
    if let Some(handoff) = handoff {
        sections.push(handoff.to_string());
    }

    sections.join("\n\n")
}
