use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Autonomous infrastructure supervisor driving an LLM ops agent through escalating tiers",
    version
)]
pub struct Cli {
    /// Path to the config file (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Initialize a vigil workspace (run once to get started)",
        long_about = "Initialize vigil — run this once to get started.

This command will:
  • Write a starter config.toml with three escalation tiers
  • Create the state, results, and prompts directories
  • Write stub prompt files you should edit for your infrastructure

After running 'init', edit the prompts and start the loop with 'vigil run'."
    )]
    Init {
        #[arg(long, help = "Workspace root (default: system data directory)")]
        path: Option<PathBuf>,

        #[arg(long, help = "Overwrite an existing config")]
        force: bool,
    },

    #[command(about = "Run the supervisor loop until interrupted")]
    Run {
        #[arg(long, help = "Run exactly one escalation chain, then exit")]
        once: bool,

        #[arg(long, help = "Observe and log, but never escalate past tier 1")]
        dry_run: bool,
    },

    #[command(about = "Run one ad-hoc chain with the given prompt, then exit")]
    Trigger {
        /// Prompt text for the agent
        prompt: String,

        #[arg(long, default_value_t = 1, help = "Tier to start the chain at")]
        tier: u8,
    },

    #[command(about = "Inspect recorded sessions")]
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    #[command(about = "List recent sessions, newest first")]
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    #[command(about = "Show one session with its events")]
    Show {
        /// Session id
        id: i64,
    },
}
