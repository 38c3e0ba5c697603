use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancelToken;

/// Everything needed to launch one agent invocation.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub model: String,
    pub prompt_body: String,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub system_prompt_append: String,
}

/// Handle for reaping a spawned agent.
///
/// `wait` must only be called after the paired stdout reader has reached
/// EOF; reaping first can close the pipe and discard buffered output,
/// including the terminal result record.
pub trait WaitHandle: Send {
    fn wait(&mut self) -> std::io::Result<i32>;
}

pub struct SpawnedAgent {
    pub stdout: Box<dyn Read + Send>,
    pub handle: Box<dyn WaitHandle>,
}

/// Abstraction over agent startup, so tests can substitute a scripted
/// process for the real CLI.
pub trait AgentRunner: Send + Sync {
    fn start(&self, spec: &LaunchSpec, cancel: &CancelToken) -> std::io::Result<SpawnedAgent>;
}

/// Launches the real agent CLI in streaming NDJSON mode.
///
/// The child goes into its own process group; a watchdog thread kills the
/// whole group when the cancellation token trips, which is what unblocks
/// the stream pump on shutdown.
pub struct CliRunner {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl CliRunner {
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn build_command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--model")
            .arg(&spec.model);

        if !spec.allowed_tools.is_empty() {
            cmd.arg("--allowed-tools").arg(spec.allowed_tools.join(","));
        }
        if !spec.disallowed_tools.is_empty() {
            cmd.arg("--disallowed-tools")
                .arg(spec.disallowed_tools.join(","));
        }
        if !spec.system_prompt_append.is_empty() {
            cmd.arg("--append-system-prompt")
                .arg(&spec.system_prompt_append);
        }

        cmd.args(&self.extra_args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }
}

impl AgentRunner for CliRunner {
    fn start(&self, spec: &LaunchSpec, cancel: &CancelToken) -> std::io::Result<SpawnedAgent> {
        let mut child = self.build_command(spec).spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::other("child process has no stdout pipe")
        })?;

        // Feed the prompt on stdin from a separate thread so a large prompt
        // cannot deadlock against an unread stdout pipe.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = spec.prompt_body.clone();
            std::thread::Builder::new()
                .name("agent-stdin".to_string())
                .spawn(move || {
                    if let Err(e) = stdin.write_all(prompt.as_bytes()) {
                        debug!(error = %e, "agent closed stdin before reading full prompt");
                    }
                })?;
        }

        let reaped = Arc::new(AtomicBool::new(false));
        spawn_kill_watchdog(child.id(), Arc::clone(&reaped), cancel.clone())?;

        Ok(SpawnedAgent {
            stdout: Box::new(stdout),
            handle: Box::new(CliWaitHandle { child, reaped }),
        })
    }
}

struct CliWaitHandle {
    child: Child,
    reaped: Arc<AtomicBool>,
}

impl WaitHandle for CliWaitHandle {
    fn wait(&mut self) -> std::io::Result<i32> {
        let status = self.child.wait();
        self.reaped.store(true, Ordering::SeqCst);
        // A signal-terminated child has no exit code; report the
        // conventional SIGKILL value.
        status.map(|s| s.code().unwrap_or(137))
    }
}

fn spawn_kill_watchdog(
    pid: u32,
    reaped: Arc<AtomicBool>,
    cancel: CancelToken,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("agent-watchdog".to_string())
        .spawn(move || {
            loop {
                if reaped.load(Ordering::SeqCst) {
                    return;
                }
                if cancel.wait_timeout(Duration::from_millis(200)) {
                    break;
                }
            }
            if !reaped.load(Ordering::SeqCst) {
                warn!(pid, "cancellation requested, terminating agent process group");
                kill_process_group(pid);
            }
        })?;

    Ok(())
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_includes_tool_gates() {
        let runner = CliRunner::new(PathBuf::from("agent"));
        let spec = LaunchSpec {
            model: "agent-small".to_string(),
            prompt_body: "check services".to_string(),
            allowed_tools: vec!["Read".to_string(), "Bash(systemctl:*)".to_string()],
            disallowed_tools: vec!["Write".to_string()],
            system_prompt_append: "## Environment\nDRY_RUN=false".to_string(),
        };

        let cmd = runner.build_command(&spec);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.contains(&"--model".to_string()));
        assert!(args.contains(&"agent-small".to_string()));
        assert!(args.contains(&"Read,Bash(systemctl:*)".to_string()));
        assert!(args.contains(&"Write".to_string()));
        assert!(args.contains(&"--append-system-prompt".to_string()));
    }

    #[test]
    fn test_build_command_omits_empty_gates() {
        let runner = CliRunner::new(PathBuf::from("agent"));
        let spec = LaunchSpec {
            model: "agent-small".to_string(),
            prompt_body: String::new(),
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            system_prompt_append: String::new(),
        };

        let cmd = runner.build_command(&spec);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(!args.contains(&"--allowed-tools".to_string()));
        assert!(!args.contains(&"--disallowed-tools".to_string()));
        assert!(!args.contains(&"--append-system-prompt".to_string()));
    }
}
