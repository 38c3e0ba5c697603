use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use vigil_runtime::{CancelToken, CliRunner, Config, Supervisor};
use vigil_store::Store;
use vigil_types::Trigger;

pub fn handle(config: Config, once: bool) -> Result<()> {
    let store = Store::open(&config.db_path())
        .with_context(|| format!("opening store at {}", config.db_path().display()))?;

    let runner = Arc::new(CliRunner::new(config.supervisor.agent_binary.clone()));
    let supervisor = Arc::new(Supervisor::new(config, store, runner));

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    let handler_supervisor = Arc::clone(&supervisor);
    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down after the current session");
        handler_cancel.cancel();
        handler_supervisor.shutdown();
    })
    .context("installing interrupt handler")?;

    if once {
        supervisor.run_single_chain(None, 1, Trigger::Scheduled, &cancel);
        return Ok(());
    }

    supervisor.run(&cancel)
}
