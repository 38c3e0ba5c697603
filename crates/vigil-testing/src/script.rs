use std::io::Read;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vigil_runtime::{AgentRunner, CancelToken, LaunchSpec, SpawnedAgent, WaitHandle};

/// One scripted action of a fake agent process.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit one line on stdout.
    Line(String),
    /// Sleep, aborting early (like a killed process) on cancellation.
    Pause(Duration),
    /// Write a file, e.g. a handoff document just before exit.
    WriteFile { path: PathBuf, content: String },
}

/// A full scripted agent run: steps, then exit.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<ScriptStep>,
    exit_code: i32,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Line(line.into()));
        self
    }

    pub fn lines(mut self, lines: impl IntoIterator<Item = String>) -> Self {
        for line in lines {
            self.steps.push(ScriptStep::Line(line));
        }
        self
    }

    pub fn pause_ms(mut self, millis: u64) -> Self {
        self.steps
            .push(ScriptStep::Pause(Duration::from_millis(millis)));
        self
    }

    pub fn write_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::WriteFile {
            path: path.into(),
            content: content.into(),
        });
        self
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }
}

/// An `AgentRunner` that replays scripts instead of spawning processes.
///
/// Consecutive launches consume consecutive scripts, so an escalation chain
/// can script each tier differently. Every launch spec is recorded for
/// assertions. Launching past the last script fails like a missing binary.
pub struct ScriptedRunner {
    scripts: Mutex<Vec<Script>>,
    next: Mutex<usize>,
    launches: Mutex<Vec<LaunchSpec>>,
}

impl ScriptedRunner {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts),
            next: Mutex::new(0),
            launches: Mutex::new(Vec::new()),
        })
    }

    pub fn single(script: Script) -> Arc<Self> {
        Self::new(vec![script])
    }

    /// Launch specs seen so far, in order.
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

impl AgentRunner for ScriptedRunner {
    fn start(&self, spec: &LaunchSpec, cancel: &CancelToken) -> std::io::Result<SpawnedAgent> {
        let script = {
            let scripts = self.scripts.lock().unwrap();
            let mut next = self.next.lock().unwrap();
            let script = scripts
                .get(*next)
                .cloned()
                .ok_or_else(|| std::io::Error::other("no script for this launch"))?;
            *next += 1;
            script
        };

        self.launches.lock().unwrap().push(spec.clone());

        let (tx, rx) = channel::<Vec<u8>>();
        let exit_slot = Arc::new(Mutex::new(None));
        let writer_slot = Arc::clone(&exit_slot);
        let cancel = cancel.clone();

        std::thread::Builder::new()
            .name("scripted-agent".to_string())
            .spawn(move || {
                run_script(&script, &tx, &cancel);
                // Record the exit code before the sender drops so a waiter
                // that observed EOF always finds it.
                *writer_slot.lock().unwrap() = Some(script.exit_code);
                drop(tx);
            })?;

        Ok(SpawnedAgent {
            stdout: Box::new(ChannelReader::new(rx)),
            handle: Box::new(ScriptedWait { exit_slot }),
        })
    }
}

fn run_script(script: &Script, tx: &Sender<Vec<u8>>, cancel: &CancelToken) {
    for step in &script.steps {
        match step {
            ScriptStep::Line(line) => {
                if tx.send(format!("{}\n", line).into_bytes()).is_err() {
                    return;
                }
            }
            ScriptStep::Pause(duration) => {
                if cancel.wait_timeout(*duration) {
                    return;
                }
            }
            ScriptStep::WriteFile { path, content } => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                let _ = std::fs::write(path, content);
            }
        }
    }
}

struct ScriptedWait {
    exit_slot: Arc<Mutex<Option<i32>>>,
}

impl WaitHandle for ScriptedWait {
    fn wait(&mut self) -> std::io::Result<i32> {
        loop {
            if let Some(code) = *self.exit_slot.lock().unwrap() {
                return Ok(code);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Adapts a byte-chunk channel into a blocking reader; EOF when the writer
/// thread finishes.
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            buf: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.buf.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }

        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
