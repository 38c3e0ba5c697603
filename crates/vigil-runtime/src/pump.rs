use std::io::{BufRead, BufReader, Read, Write};
use std::sync::{Arc, Mutex};
use tracing::warn;

use chrono::Utc;
use vigil_hub::Hub;
use vigil_store::Store;
use vigil_stream::{
    Marker, Redactor, ResultSummary, StreamRecord, extract_markers, html_class, parse_line,
    render_plain, timestamped_line, wrap_html,
};
use vigil_types::{
    CONTRADICT_STEP, DEACTIVATE_THRESHOLD, DEFAULT_CONFIDENCE, NewCooldownAction, NewEvent,
    NewMemory, REINFORCE_STEP, clamp_confidence,
};

/// What one session's stream produced, collected by the pump.
#[derive(Debug, Default, Clone)]
pub struct StreamOutcome {
    pub result: Option<ResultSummary>,
    pub lines_total: usize,
    pub assistant_blocks: usize,
    pub tool_calls: usize,
    pub events_recorded: usize,
    pub memories_recorded: usize,
    pub cooldowns_recorded: usize,
}

/// Where pumped lines go besides the database and the hub.
pub struct PumpSinks {
    pub log: Box<dyn Write + Send>,
    pub echo_stdout: bool,
}

/// Drain the agent's stdout to EOF, fanning each line out to every sink.
///
/// Runs on its own thread; the supervisor joins it *before* reaping the
/// child so the pipe cannot be torn down under buffered output. Per-line
/// flow: redact the raw line into the session log, decode, render, redact,
/// then stdout/hub plus marker side effects. Persistence failures are
/// logged and never abort the stream.
pub fn pump_stream(
    stdout: Box<dyn Read + Send>,
    session_id: i64,
    tier: u8,
    store: &Arc<Mutex<Store>>,
    hub: &Hub,
    redactor: &Redactor,
    mut sinks: PumpSinks,
) -> StreamOutcome {
    let mut outcome = StreamOutcome::default();
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(session_id, error = %e, "stream read failed, draining stopped");
                break;
            }
        }

        let raw = line.trim_end_matches(['\n', '\r']);
        if raw.is_empty() {
            continue;
        }
        outcome.lines_total += 1;

        let redacted_raw = redactor.redact(raw);
        if let Err(e) = writeln!(sinks.log, "{}", timestamped_line(Utc::now(), &redacted_raw)) {
            warn!(session_id, error = %e, "failed to append session log");
        }

        for record in parse_line(raw) {
            match &record {
                StreamRecord::AssistantText { text } => {
                    outcome.assistant_blocks += 1;
                    apply_markers(text, session_id, tier, store, redactor, &mut outcome);
                }
                StreamRecord::ToolUse { .. } => outcome.tool_calls += 1,
                StreamRecord::Result(summary) => outcome.result = Some(summary.clone()),
                _ => {}
            }

            let Some(plain) = render_plain(&record) else {
                continue;
            };
            let redacted = redactor.redact(&plain);

            if sinks.echo_stdout {
                println!("{}", redacted);
            }
            hub.publish(session_id, &wrap_html(html_class(&record), &redacted));
        }
    }

    if let Err(e) = sinks.log.flush() {
        warn!(session_id, error = %e, "failed to flush session log");
    }

    outcome
}

fn apply_markers(
    text: &str,
    session_id: i64,
    tier: u8,
    store: &Arc<Mutex<Store>>,
    redactor: &Redactor,
    outcome: &mut StreamOutcome,
) {
    for marker in extract_markers(text) {
        let result = match marker {
            Marker::Event {
                level,
                service,
                message,
            } => {
                let store = store.lock().unwrap();
                store
                    .insert_event(&NewEvent {
                        session_id: Some(session_id),
                        level,
                        service,
                        message: redactor.redact(&message),
                    })
                    .map(|_| outcome.events_recorded += 1)
                    .map_err(|e| format!("event insert failed: {}", e))
            }
            Marker::Memory {
                category,
                service,
                observation,
            } => {
                let store = store.lock().unwrap();
                apply_memory(
                    &store,
                    session_id,
                    tier,
                    service,
                    category,
                    redactor.redact(&observation),
                )
                .map(|_| outcome.memories_recorded += 1)
                .map_err(|e| format!("memory upsert failed: {}", e))
            }
            Marker::Cooldown {
                action_type,
                service,
                success,
                message,
            } => {
                let store = store.lock().unwrap();
                store
                    .insert_cooldown_action(&NewCooldownAction {
                        service,
                        action_type,
                        success,
                        tier,
                        error: if success {
                            None
                        } else {
                            Some(redactor.redact(&message))
                        },
                        session_id: Some(session_id),
                    })
                    .map(|_| outcome.cooldowns_recorded += 1)
                    .map_err(|e| format!("cooldown insert failed: {}", e))
            }
        };

        if let Err(msg) = result {
            warn!(session_id, "{}", msg);
        }
    }
}

/// Reinforce, contradict, or insert a memory per observation.
///
/// Exact repeats strengthen the existing memory; a different observation
/// for the same `(service, category)` weakens it (deactivating below the
/// threshold) and records the new observation at default confidence.
fn apply_memory(
    store: &Store,
    session_id: i64,
    tier: u8,
    service: Option<String>,
    category: String,
    observation: String,
) -> vigil_store::Result<()> {
    let similar = store.find_similar_memory(service.as_deref(), &category)?;

    match similar {
        Some(existing) if existing.observation == observation => {
            let reinforced = clamp_confidence(existing.confidence + REINFORCE_STEP);
            store.update_memory(existing.id, reinforced, true)
        }
        Some(existing) => {
            let weakened = clamp_confidence(existing.confidence - CONTRADICT_STEP);
            store.update_memory(existing.id, weakened, weakened >= DEACTIVATE_THRESHOLD)?;
            store
                .insert_memory(&NewMemory {
                    service,
                    category,
                    observation,
                    confidence: DEFAULT_CONFIDENCE,
                    session_id: Some(session_id),
                    tier,
                })
                .map(|_| ())
        }
        None => store
            .insert_memory(&NewMemory {
                service,
                category,
                observation,
                confidence: DEFAULT_CONFIDENCE,
                session_id: Some(session_id),
                tier,
            })
            .map(|_| ()),
    }
}
