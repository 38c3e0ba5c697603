use anyhow::{Context, Result, bail};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use vigil_runtime::Config;
use vigil_store::Store;
use vigil_types::{Session, SessionStatus};

pub fn list(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let sessions = store.list_sessions(Some(limit))?;

    if sessions.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    for session in &sessions {
        println!("{}", format_row(session));
    }

    Ok(())
}

pub fn show(config: &Config, id: i64) -> Result<()> {
    let store = open_store(config)?;
    let Some(session) = store.get_session(id)? else {
        bail!("no session with id {}", id);
    };

    println!("{}", format_row(&session));
    println!("  model: {}", session.model);
    println!("  prompt: {}", session.prompt_file);
    if let Some(parent) = session.parent_session_id {
        println!("  escalated from: session {}", parent);
    }
    if let Some(log_path) = &session.log_path {
        println!("  log: {}", log_path);
    }
    if let (Some(cost), Some(turns), Some(duration)) =
        (session.cost_usd, session.num_turns, session.duration_ms)
    {
        println!(
            "  cost: ${:.4} over {} turns ({:.1}s)",
            cost,
            turns,
            duration as f64 / 1000.0
        );
    }
    if let Some(summary) = &session.summary {
        println!("  summary: {}", summary);
    }

    let events = store.events_for_session(id)?;
    if !events.is_empty() {
        println!("\nEvents:");
        for event in &events {
            let service = event.service.as_deref().unwrap_or("-");
            println!("  [{}] {} {}", event.level, service, event.message);
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.db_path())
        .with_context(|| format!("opening store at {}", config.db_path().display()))
}

fn format_row(session: &Session) -> String {
    let status = colorize_status(session.status);
    format!(
        "#{:<5} tier {}  {:<10} {}  {}",
        session.id,
        session.tier,
        status,
        session.started_at.format("%Y-%m-%d %H:%M:%S"),
        session.trigger
    )
}

fn colorize_status(status: SessionStatus) -> String {
    if !std::io::stdout().is_terminal() {
        return status.to_string();
    }

    match status {
        SessionStatus::Running => status.to_string().cyan().to_string(),
        SessionStatus::Completed => status.to_string().green().to_string(),
        SessionStatus::Escalated => status.to_string().yellow().to_string(),
        SessionStatus::Failed | SessionStatus::TimedOut => status.to_string().red().to_string(),
    }
}
