use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::config::{Config, TierConfig};
use crate::context;
use crate::handoff;
use crate::pump::{self, PumpSinks, StreamOutcome};
use crate::runner::{AgentRunner, LaunchSpec};
use crate::summary;
use vigil_hub::Hub;
use vigil_store::Store;
use vigil_stream::Redactor;
use vigil_types::{AD_HOC_PROMPT_FILE, NewSession, SessionStatus, Trigger};

/// Rejection returned by `trigger_ad_hoc` without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerError {
    /// A session is already running; at most one child may be active.
    Busy,
    /// The single-slot trigger channel already holds a pending request.
    QueueFull,
    /// The supervisor loop is not running.
    Unavailable,
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerError::Busy => write!(f, "session already running"),
            TriggerError::QueueFull => write!(f, "trigger queue full"),
            TriggerError::Unavailable => write!(f, "supervisor unavailable"),
        }
    }
}

impl std::error::Error for TriggerError {}

struct AdHocRequest {
    prompt: String,
    start_tier: u8,
    trigger: Trigger,
    reply: SyncSender<i64>,
}

enum LoopSignal {
    AdHoc(AdHocRequest),
    Shutdown,
}

/// Parameters for one escalation chain.
struct ChainStart {
    prompt_override: Option<String>,
    start_tier: u8,
    trigger: Trigger,
    reply: Option<SyncSender<i64>>,
}

impl ChainStart {
    fn scheduled() -> Self {
        Self {
            prompt_override: None,
            start_tier: 1,
            trigger: Trigger::Scheduled,
            reply: None,
        }
    }
}

struct TierRun<'a> {
    tier: u8,
    tier_config: &'a TierConfig,
    prompt_override: Option<String>,
    trigger: Trigger,
    parent_id: Option<i64>,
    handoff_text: Option<String>,
    reply: Option<SyncSender<i64>>,
}

struct TierOutcome {
    session_id: i64,
    cancelled: bool,
    startup_failed: bool,
}

/// Clears the running flag even if the chain path unwinds.
struct RunningGuard<'a> {
    flag: &'a Mutex<bool>,
}

impl<'a> RunningGuard<'a> {
    fn set(flag: &'a Mutex<bool>) -> Self {
        *flag.lock().unwrap() = true;
        Self { flag }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock().unwrap() = false;
    }
}

/// The orchestrator: schedules chains, enforces single-writer concurrency,
/// drives tiered escalation, and attributes per-tier metrics.
///
/// One supervisor instance owns one state directory. The loop runs one
/// escalation chain at a time; `trigger_ad_hoc` is the only cross-thread
/// entry point and is rejected while a chain is active.
pub struct Supervisor {
    config: Config,
    store: Arc<Mutex<Store>>,
    hub: Hub,
    runner: Arc<dyn AgentRunner>,
    redactor: Arc<Redactor>,
    running: Mutex<bool>,
    signal_tx: SyncSender<LoopSignal>,
    signal_rx: Mutex<Option<Receiver<LoopSignal>>>,
    echo_stdout: bool,
}

impl Supervisor {
    pub fn new(config: Config, store: Store, runner: Arc<dyn AgentRunner>) -> Self {
        let hub = Hub::new(config.hub.buffer_capacity);
        let redactor = Arc::new(Redactor::from_env(&config.redaction.env_prefix));
        let (signal_tx, signal_rx) = sync_channel(1);

        Self {
            config,
            store: Arc::new(Mutex::new(store)),
            hub,
            runner,
            redactor,
            running: Mutex::new(false),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            echo_stdout: true,
        }
    }

    /// Replace the environment-derived redactor; used by tests that must
    /// not depend on process-global environment state.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Arc::new(redactor);
        self
    }

    pub fn with_echo_stdout(mut self, echo: bool) -> Self {
        self.echo_stdout = echo;
        self
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn store(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    /// Inject an ad-hoc prompt into the loop.
    ///
    /// Blocks until the loop has inserted the new session and returns its
    /// id. Fails fast with `Busy` while a chain is active and with
    /// `QueueFull` when another trigger is already queued; neither failure
    /// has side effects.
    pub fn trigger_ad_hoc(
        &self,
        prompt: &str,
        start_tier: u8,
        trigger: Trigger,
    ) -> std::result::Result<i64, TriggerError> {
        if self.is_running() {
            return Err(TriggerError::Busy);
        }

        let (reply_tx, reply_rx) = sync_channel(1);
        let request = AdHocRequest {
            prompt: prompt.to_string(),
            start_tier: start_tier.clamp(1, self.config.supervisor.max_tier),
            trigger,
            reply: reply_tx,
        };

        self.signal_tx
            .try_send(LoopSignal::AdHoc(request))
            .map_err(|e| match e {
                TrySendError::Full(_) => TriggerError::QueueFull,
                TrySendError::Disconnected(_) => TriggerError::Unavailable,
            })?;

        // The loop replies as soon as the session row exists; a long wait
        // here means no loop is consuming the channel.
        reply_rx
            .recv_timeout(Duration::from_secs(60))
            .map_err(|_| TriggerError::Unavailable)
    }

    /// Ask a running loop to return after the current chain.
    pub fn shutdown(&self) {
        let _ = self.signal_tx.try_send(LoopSignal::Shutdown);
    }

    /// The supervisor loop: one chain immediately, then wake on ad-hoc
    /// triggers, the scheduled interval (measured from the end of the
    /// previous chain), or cancellation.
    pub fn run(&self, cancel: &CancelToken) -> Result<()> {
        let signal_rx = self
            .signal_rx
            .lock()
            .unwrap()
            .take()
            .context("supervisor loop already started")?;

        let interval = Duration::from_secs(self.config.supervisor.interval_secs);
        info!(
            interval_secs = self.config.supervisor.interval_secs,
            max_tier = self.config.supervisor.max_tier,
            dry_run = self.config.supervisor.dry_run,
            "supervisor started"
        );

        self.run_chain(ChainStart::scheduled(), cancel);

        loop {
            if cancel.is_cancelled() {
                info!("supervisor cancelled");
                return Ok(());
            }

            match signal_rx.recv_timeout(interval) {
                Ok(LoopSignal::AdHoc(request)) => {
                    self.run_chain(
                        ChainStart {
                            prompt_override: Some(request.prompt),
                            start_tier: request.start_tier,
                            trigger: request.trigger,
                            reply: Some(request.reply),
                        },
                        cancel,
                    );
                }
                Ok(LoopSignal::Shutdown) => {
                    info!("supervisor shutdown requested");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.run_chain(ChainStart::scheduled(), cancel);
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Run exactly one escalation chain and return. Used by `run --once`,
    /// the in-process `trigger` command, and tests.
    pub fn run_single_chain(
        &self,
        prompt_override: Option<String>,
        start_tier: u8,
        trigger: Trigger,
        cancel: &CancelToken,
    ) {
        self.run_chain(
            ChainStart {
                prompt_override,
                start_tier: start_tier.clamp(1, self.config.supervisor.max_tier),
                trigger,
                reply: None,
            },
            cancel,
        );
    }

    fn run_chain(&self, start: ChainStart, cancel: &CancelToken) {
        let _guard = RunningGuard::set(&self.running);

        {
            let store = self.store.lock().unwrap();
            let memory = &self.config.memory;
            match store.decay_stale_memories(memory.decay_grace_days, memory.decay_rate_per_week) {
                Ok(0) => {}
                Ok(count) => info!(count, "decayed stale memories"),
                Err(e) => warn!(error = %e, "memory decay failed"),
            }
        }
        handoff::discard_stale(&self.config.supervisor.state_dir);

        let max_tier = self.config.supervisor.max_tier;
        let mut tier = start.start_tier;
        let mut trigger = start.trigger;
        let mut prompt_override = start.prompt_override;
        let mut reply = start.reply;
        let mut parent_id: Option<i64> = None;
        let mut handoff_text: Option<String> = None;
        let mut invocations = 0u8;

        while invocations < max_tier {
            invocations += 1;

            let Some(tier_config) = self.config.tier(tier) else {
                error!(tier, "no configuration for tier, stopping chain");
                break;
            };

            let outcome = match self.run_tier(
                TierRun {
                    tier,
                    tier_config,
                    prompt_override: prompt_override.take(),
                    trigger,
                    parent_id,
                    handoff_text: handoff_text.take(),
                    reply: reply.take(),
                },
                cancel,
            ) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(tier, error = %e, "tier run failed, stopping chain");
                    break;
                }
            };

            if outcome.cancelled || outcome.startup_failed {
                break;
            }

            let state_dir = &self.config.supervisor.state_dir;
            let handoff_doc = match handoff::read(state_dir) {
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "ignoring malformed handoff");
                    handoff::delete(state_dir);
                    break;
                }
                Ok(Some(doc)) => doc,
            };

            if let Err(e) = handoff::validate(&handoff_doc, max_tier) {
                warn!(error = %e, "ignoring invalid handoff");
                handoff::delete(state_dir);
                break;
            }

            // Escalation must move up: a handoff that stays at or below the
            // current tier would break the parent/child tier ordering.
            if handoff_doc.recommended_tier <= tier {
                warn!(
                    current_tier = tier,
                    recommended_tier = handoff_doc.recommended_tier,
                    "handoff does not escalate, stopping chain"
                );
                handoff::delete(state_dir);
                break;
            }

            if self.config.supervisor.dry_run {
                info!(
                    recommended_tier = handoff_doc.recommended_tier,
                    services = handoff_doc.services_affected.join(",").as_str(),
                    "dry-run: escalation requested but not performed"
                );
                handoff::delete(state_dir);
                break;
            }

            {
                let store = self.store.lock().unwrap();
                if let Err(e) =
                    store.update_session_status(outcome.session_id, SessionStatus::Escalated)
                {
                    error!(error = %e, "failed to mark session escalated, stopping chain");
                    handoff::delete(state_dir);
                    break;
                }
            }

            info!(
                from_tier = tier,
                to_tier = handoff_doc.recommended_tier,
                parent_session = outcome.session_id,
                "escalating"
            );

            handoff_text = Some(handoff::render_markdown(&handoff_doc));
            handoff::delete(state_dir);
            parent_id = Some(outcome.session_id);
            tier = handoff_doc.recommended_tier;
            trigger = Trigger::Escalation;
        }
    }

    fn run_tier(&self, run: TierRun, cancel: &CancelToken) -> Result<TierOutcome> {
        let prompt_file = if run.prompt_override.is_some() {
            AD_HOC_PROMPT_FILE.to_string()
        } else {
            run.tier_config.prompt_file.display().to_string()
        };

        let session_id = {
            let store = self.store.lock().unwrap();
            store.insert_session(&NewSession {
                tier: run.tier,
                model: run.tier_config.model.clone(),
                prompt_file,
                prompt_text: run.prompt_override.clone(),
                trigger: run.trigger,
                parent_session_id: run.parent_id,
            })?
        };
        self.hub.open(session_id);
        info!(session_id, tier = run.tier, trigger = %run.trigger, "session started");

        // Unblock the trigger_ad_hoc caller as soon as the row exists.
        if let Some(reply) = run.reply {
            let _ = reply.try_send(session_id);
        }

        let environment = context::environment_context(&self.config);
        let (memories, cooldowns) = {
            let store = self.store.lock().unwrap();
            let memories = store
                .get_active_memories(self.config.memory.query_limit)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "failed to load memories for injection");
                    Vec::new()
                });
            (memories, context::cooldown_context(&store))
        };
        let memory_block = context::memory_context(&memories, self.config.memory.token_budget);
        let system_prompt_append = context::assemble_system_prompt(
            &environment,
            memory_block.as_deref(),
            cooldowns.as_deref(),
            run.handoff_text.as_deref(),
        );

        let prompt_body = match run.prompt_override {
            Some(prompt) => prompt,
            None => match std::fs::read_to_string(&run.tier_config.prompt_file) {
                Ok(prompt) => prompt,
                Err(e) => {
                    error!(
                        path = %run.tier_config.prompt_file.display(),
                        error = %e,
                        "cannot read prompt file"
                    );
                    return Ok(self.finalize_startup_failure(session_id));
                }
            },
        };

        let spec = LaunchSpec {
            model: run.tier_config.model.clone(),
            prompt_body,
            allowed_tools: run.tier_config.allowed_tools.clone(),
            disallowed_tools: run.tier_config.disallowed_tools.clone(),
            system_prompt_append,
        };

        let agent = match self.runner.start(&spec, cancel) {
            Ok(agent) => agent,
            Err(e) => {
                error!(session_id, error = %e, "agent startup failed");
                return Ok(self.finalize_startup_failure(session_id));
            }
        };

        let logs_dir = self.config.logs_dir();
        let log_path = logs_dir.join(format!("session-{}.log", session_id));
        let log_writer: Box<dyn Write + Send> = match std::fs::create_dir_all(&logs_dir)
            .and_then(|_| File::create(&log_path))
        {
            Ok(file) => Box::new(file),
            Err(e) => {
                warn!(path = %log_path.display(), error = %e, "cannot create session log");
                Box::new(std::io::sink())
            }
        };

        let pump_store = Arc::clone(&self.store);
        let pump_hub = self.hub.clone();
        let pump_redactor = Arc::clone(&self.redactor);
        let tier_num = run.tier;
        let echo_stdout = self.echo_stdout;
        let stdout = agent.stdout;
        let mut handle = agent.handle;

        let pump_handle = std::thread::Builder::new()
            .name(format!("stream-pump-{}", session_id))
            .spawn(move || {
                pump::pump_stream(
                    stdout,
                    session_id,
                    tier_num,
                    &pump_store,
                    &pump_hub,
                    &pump_redactor,
                    PumpSinks {
                        log: log_writer,
                        echo_stdout,
                    },
                )
            })
            .context("failed to spawn stream pump")?;

        // Drain before wait: the pump must see EOF before the child is
        // reaped, or the terminal result record can be lost with the pipe.
        let outcome: StreamOutcome = match pump_handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(session_id, "stream pump panicked");
                StreamOutcome::default()
            }
        };
        let exit = handle.wait();

        let cancelled = cancel.is_cancelled();
        let (status, exit_code) = if cancelled {
            (SessionStatus::TimedOut, Some(137))
        } else {
            match exit {
                Ok(0) => (SessionStatus::Completed, Some(0)),
                Ok(code) => (SessionStatus::Failed, Some(code)),
                Err(e) => {
                    warn!(session_id, error = %e, "reaping agent failed");
                    (SessionStatus::Failed, None)
                }
            }
        };

        {
            let store = self.store.lock().unwrap();
            if let Err(e) = store.update_session_finished(
                session_id,
                status,
                Utc::now(),
                exit_code,
                Some(&log_path.display().to_string()),
            ) {
                error!(session_id, error = %e, "failed to finalize session");
            }

            if let Some(result) = &outcome.result {
                if let Err(e) = store.update_session_result(
                    session_id,
                    result.response.as_deref().unwrap_or_default(),
                    result.cost_usd,
                    result.num_turns,
                    result.duration_ms,
                ) {
                    error!(session_id, error = %e, "failed to record session result");
                }
            }
        }

        if status == SessionStatus::Completed {
            self.spawn_summary(session_id, outcome.clone());
        }

        // Close only after the DB writes above so a reconnecting viewer
        // always observes terminal state.
        self.hub.close(session_id);
        info!(session_id, status = %status, exit_code, "session finalized");

        Ok(TierOutcome {
            session_id,
            cancelled,
            startup_failed: false,
        })
    }

    fn finalize_startup_failure(&self, session_id: i64) -> TierOutcome {
        {
            let store = self.store.lock().unwrap();
            if let Err(e) = store.update_session_finished(
                session_id,
                SessionStatus::Failed,
                Utc::now(),
                None,
                None,
            ) {
                error!(session_id, error = %e, "failed to finalize startup failure");
            }
        }
        self.hub.close(session_id);

        TierOutcome {
            session_id,
            cancelled: false,
            startup_failed: true,
        }
    }

    fn spawn_summary(&self, session_id: i64, outcome: StreamOutcome) {
        let store = Arc::clone(&self.store);
        let spawned = std::thread::Builder::new()
            .name("session-summary".to_string())
            .spawn(move || {
                let text = summary::render_summary(&outcome);
                let store = store.lock().unwrap();
                if let Err(e) = store.update_session_summary(session_id, &text) {
                    warn!(session_id, error = %e, "summary write failed");
                }
            });

        if let Err(e) = spawned {
            warn!(session_id, error = %e, "could not spawn summary thread");
        }
    }
}
