use anyhow::{Context, Result};
use clap::CommandFactory;
use std::path::PathBuf;

use crate::args::{Cli, Commands, SessionCommand};
use crate::handlers;
use vigil_runtime::Config;

pub fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Init { path, force } => handlers::init::handle(path, force),

        Commands::Run { once, dry_run } => {
            let mut config = load_config(cli.config)?;
            if dry_run {
                config.supervisor.dry_run = true;
            }
            handlers::run::handle(config, once)
        }

        Commands::Trigger { prompt, tier } => {
            let config = load_config(cli.config)?;
            handlers::trigger::handle(config, &prompt, tier)
        }

        Commands::Session { command } => {
            let config = load_config(cli.config)?;
            match command {
                SessionCommand::List { limit } => handlers::sessions::list(&config, limit),
                SessionCommand::Show { id } => handlers::sessions::show(&config, id),
            }
        }
    }
}

fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path,
        None => Config::default_path()?,
    };

    Config::load_from(&path)
        .with_context(|| format!("loading config from {} (run 'vigil init'?)", path.display()))
}
