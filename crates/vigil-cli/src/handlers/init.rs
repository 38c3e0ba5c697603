use anyhow::{Result, bail};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use vigil_runtime::Config;
use vigil_runtime::config::resolve_workspace_path;

const STUB_PROMPTS: &[(&str, &str)] = &[
    (
        "tier1-observe.md",
        "# Tier 1 — Observe\n\nCheck every service and report health.\n\
         Report findings with [EVENT:...] markers; record durable observations\n\
         with [MEMORY:...] markers. Write a handoff file if remediation is needed.\n",
    ),
    (
        "tier2-remediate.md",
        "# Tier 2 — Safe remediation\n\nInvestigate the escalated services and apply\n\
         safe remediations (service restarts). Record each attempt with a\n\
         [COOLDOWN:...] marker and honor the cooldown limits in your context.\n",
    ),
    (
        "tier3-full.md",
        "# Tier 3 — Full remediation\n\nYou have full remediation capability\n\
         (redeployments included). Fix the escalated incident and document what\n\
         you changed.\n",
    ),
];

pub fn handle(path: Option<PathBuf>, force: bool) -> Result<()> {
    let root = match path {
        Some(path) => path,
        None => resolve_workspace_path(None)?,
    };
    let config_path = root.join("config.toml");

    if config_path.exists() && !force {
        bail!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    let config = Config::sample(&root);
    config.save_to(&config_path)?;

    std::fs::create_dir_all(&config.supervisor.state_dir)?;
    std::fs::create_dir_all(config.logs_dir())?;

    let prompts_dir = root.join("prompts");
    std::fs::create_dir_all(&prompts_dir)?;
    for (file, body) in STUB_PROMPTS {
        let prompt_path = prompts_dir.join(file);
        if !prompt_path.exists() {
            std::fs::write(&prompt_path, body)?;
        }
    }

    println!(
        "{} workspace initialized at {}",
        "✓".green(),
        root.display()
    );
    println!("  config: {}", config_path.display());
    println!("  prompts: {} (edit these for your infrastructure)", prompts_dir.display());
    println!("\nStart the supervisor with: vigil run");

    Ok(())
}
