mod cancel;
pub mod config;
pub mod context;
mod error;
pub mod handoff;
pub mod pump;
pub mod runner;
pub mod summary;
mod supervisor;

pub use cancel::CancelToken;
pub use config::Config;
pub use error::{Error, Result};
pub use pump::StreamOutcome;
pub use runner::{AgentRunner, CliRunner, LaunchSpec, SpawnedAgent, WaitHandle};
pub use supervisor::{Supervisor, TriggerError};
