use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::sync::Arc;

use vigil_runtime::{CancelToken, CliRunner, Config, Supervisor};
use vigil_store::Store;
use vigil_types::Trigger;

/// Run a single ad-hoc chain in-process and report the outcome.
pub fn handle(config: Config, prompt: &str, tier: u8) -> Result<()> {
    let store = Store::open(&config.db_path())
        .with_context(|| format!("opening store at {}", config.db_path().display()))?;

    let runner = Arc::new(CliRunner::new(config.supervisor.agent_binary.clone()));
    let supervisor = Arc::new(Supervisor::new(config, store, runner));

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || handler_cancel.cancel())
        .context("installing interrupt handler")?;

    let last_known_id = {
        let store = supervisor.store().lock().unwrap();
        store.list_sessions(Some(1))?.first().map(|s| s.id).unwrap_or(0)
    };

    supervisor.run_single_chain(Some(prompt.to_string()), tier, Trigger::Manual, &cancel);

    let store = supervisor.store().lock().unwrap();
    let mut chain: Vec<_> = store
        .list_sessions(None)?
        .into_iter()
        .filter(|s| s.id > last_known_id)
        .collect();
    chain.reverse();

    for session in &chain {
        println!(
            "session {} (tier {}): {}",
            session.id,
            session.tier,
            session.status.as_str().bold()
        );
        if let Some(response) = &session.response {
            println!("  {}", response.lines().next().unwrap_or_default());
        }
    }

    Ok(())
}
