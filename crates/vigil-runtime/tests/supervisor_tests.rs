//! End-to-end supervisor behavior against scripted agent processes.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use vigil_runtime::{CancelToken, Config, Supervisor, TriggerError, handoff};
use vigil_store::Store;
use vigil_stream::{Redactor, parse_timestamped_log_line};
use vigil_testing::{Script, ScriptedRunner, fixtures};
use vigil_types::{EventLevel, SessionStatus, Trigger};

fn setup_config(root: &Path) -> Config {
    let config = Config::sample(&root.to_path_buf());

    std::fs::create_dir_all(root.join("prompts")).unwrap();
    for (file, body) in [
        ("tier1-observe.md", "Observe all services."),
        ("tier2-remediate.md", "Remediate safely."),
        ("tier3-full.md", "Remediate fully."),
    ] {
        std::fs::write(root.join("prompts").join(file), body).unwrap();
    }
    std::fs::create_dir_all(&config.supervisor.state_dir).unwrap();
    std::fs::create_dir_all(&config.supervisor.results_dir).unwrap();

    config
}

fn supervisor_with(config: Config, scripts: Vec<Script>) -> (Arc<Supervisor>, Arc<ScriptedRunner>) {
    let runner = ScriptedRunner::new(scripts);
    let supervisor = Supervisor::new(config, Store::open_in_memory().unwrap(), runner.clone())
        .with_echo_stdout(false)
        .with_redactor(Redactor::default());

    (Arc::new(supervisor), runner)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn healthy_tier_one() -> Script {
    Script::new()
        .line(fixtures::system_init())
        .line(fixtures::assistant_text("All healthy"))
        .line(fixtures::assistant_text(
            "[EVENT:health-check-success] 46 services healthy",
        ))
        .line(fixtures::result_event("All healthy", 0.012, 3, 45_000))
        .exit(0)
}

#[test]
fn test_clean_scheduled_cycle_records_session_and_event() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());
    let (supervisor, runner) = supervisor_with(config, vec![healthy_tier_one()]);

    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    assert_eq!(runner.launch_count(), 1);

    let store = supervisor.store().lock().unwrap();
    let sessions = store.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 1);

    let session = &sessions[0];
    assert_eq!(session.tier, 1);
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.trigger, Trigger::Scheduled);
    assert_eq!(session.exit_code, Some(0));
    assert_eq!(session.cost_usd, Some(0.012));
    assert_eq!(session.num_turns, Some(3));
    assert_eq!(session.duration_ms, Some(45_000));
    assert_eq!(session.response.as_deref(), Some("All healthy"));
    assert!(session.ended_at.is_some());
    assert!(session.parent_session_id.is_none());

    let events = store.events_for_session(session.id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, EventLevel::Info);
    assert_eq!(events[0].service, None);
    assert_eq!(events[0].message, "46 services healthy");

    assert!(store.recent_cooldown_actions(10).unwrap().is_empty());
    assert!(!supervisor.hub().is_active(session.id));
}

#[test]
fn test_session_log_file_is_timestamped() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());
    let (supervisor, _runner) = supervisor_with(config, vec![healthy_tier_one()]);

    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    let log_path = {
        let store = supervisor.store().lock().unwrap();
        store.list_sessions(None).unwrap()[0]
            .log_path
            .clone()
            .unwrap()
    };

    let content = std::fs::read_to_string(&log_path).unwrap();
    let first_line = content.lines().next().unwrap();
    let (timestamp, payload) = parse_timestamped_log_line(first_line);
    assert!(timestamp.is_some());
    assert!(payload.contains("system"));
    assert_eq!(content.lines().count(), 4);
}

#[test]
fn test_escalation_to_tier_two_links_sessions_and_renders_context() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());
    let handoff_file = handoff::handoff_path(&config.supervisor.state_dir);

    let tier_one = Script::new()
        .line(fixtures::system_init())
        .line(fixtures::assistant_text("postgres is down, escalating"))
        .line(fixtures::result_event("escalating", 0.01, 2, 10_000))
        .write_file(&handoff_file, fixtures::handoff_json(2, &["postgres"]))
        .exit(0);
    let tier_two = Script::new()
        .line(fixtures::system_init())
        .line(fixtures::result_event("fixed", 0.05, 4, 20_000))
        .exit(0);

    let (supervisor, runner) = supervisor_with(config, vec![tier_one, tier_two]);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    assert_eq!(runner.launch_count(), 2);

    let store = supervisor.store().lock().unwrap();
    let sessions = store.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 2);

    let child = &sessions[0];
    let parent = &sessions[1];
    assert_eq!(parent.status, SessionStatus::Escalated);
    assert_eq!(child.tier, 2);
    assert_eq!(child.parent_session_id, Some(parent.id));
    assert_eq!(child.trigger, Trigger::Escalation);
    assert!(parent.tier < child.tier);
    assert_eq!(child.status, SessionStatus::Completed);

    // The tier 2 launch received the rendered escalation context.
    let launches = runner.launches();
    let append = &launches[1].system_prompt_append;
    assert!(append.contains("## Escalation Context"));
    assert!(append.contains("postgres"));
    assert!(append.contains("http"));
    assert!(append.contains("down"));
    assert!(append.contains("HTTP 502"));
    assert!(!launches[0].system_prompt_append.contains("Escalation Context"));

    // The handoff was consumed.
    assert!(!handoff_file.exists());
}

#[test]
fn test_drain_before_wait_attributes_cost_despite_gap_before_result() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());

    let script = Script::new()
        .line(fixtures::system_init())
        .line(fixtures::assistant_text("working"))
        .pause_ms(150)
        .line(fixtures::result_event("late result", 0.02, 5, 60_000))
        .exit(0);

    let (supervisor, _runner) = supervisor_with(config, vec![script]);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    let store = supervisor.store().lock().unwrap();
    let session = &store.list_sessions(None).unwrap()[0];
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.cost_usd, Some(0.02));
    assert_eq!(session.num_turns, Some(5));
    assert_eq!(session.duration_ms, Some(60_000));
    assert_eq!(session.response.as_deref(), Some("late result"));
}

#[test]
fn test_ad_hoc_trigger_wakes_loop_and_returns_session_id() {
    let dir = TempDir::new().unwrap();
    let mut config = setup_config(dir.path());
    config.supervisor.interval_secs = 3600;

    let ad_hoc = Script::new()
        .line(fixtures::system_init())
        .line(fixtures::result_event("restarted jellyfin", 0.01, 2, 5_000))
        .exit(0);
    let (supervisor, _runner) = supervisor_with(config, vec![healthy_tier_one(), ad_hoc]);

    let cancel = CancelToken::new();
    let loop_supervisor = Arc::clone(&supervisor);
    let loop_cancel = cancel.clone();
    let loop_handle = std::thread::spawn(move || loop_supervisor.run(&loop_cancel).unwrap());

    // Wait out the immediate startup chain.
    assert!(wait_until(Duration::from_secs(5), || {
        let store = supervisor.store().lock().unwrap();
        store.list_sessions(None).unwrap().len() == 1 && !supervisor.is_running()
    }));

    let session_id = supervisor
        .trigger_ad_hoc("restart jellyfin", 1, Trigger::Manual)
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        !supervisor.is_running()
    }));

    {
        let store = supervisor.store().lock().unwrap();
        let session = store.get_session(session_id).unwrap().unwrap();
        assert_eq!(session.prompt_text.as_deref(), Some("restart jellyfin"));
        assert_eq!(session.prompt_file, "(ad-hoc)");
        assert_eq!(session.trigger, Trigger::Manual);
    }

    cancel.cancel();
    supervisor.shutdown();
    loop_handle.join().unwrap();
}

#[test]
fn test_trigger_while_busy_is_rejected_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());

    let slow = Script::new()
        .line(fixtures::system_init())
        .pause_ms(10_000)
        .exit(0);
    let (supervisor, _runner) = supervisor_with(config, vec![slow]);

    let cancel = CancelToken::new();
    let chain_supervisor = Arc::clone(&supervisor);
    let chain_cancel = cancel.clone();
    let chain_handle = std::thread::spawn(move || {
        chain_supervisor.run_single_chain(None, 1, Trigger::Scheduled, &chain_cancel);
    });

    assert!(wait_until(Duration::from_secs(5), || supervisor.is_running()));

    let err = supervisor
        .trigger_ad_hoc("x", 1, Trigger::Manual)
        .unwrap_err();
    assert_eq!(err, TriggerError::Busy);

    cancel.cancel();
    chain_handle.join().unwrap();

    // Only the in-flight session exists; the rejected trigger left nothing.
    let store = supervisor.store().lock().unwrap();
    assert_eq!(store.list_sessions(None).unwrap().len(), 1);
}

#[test]
fn test_cancellation_finalizes_as_timed_out() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());

    let hanging = Script::new()
        .line(fixtures::system_init())
        .pause_ms(30_000)
        .line(fixtures::result_event("never", 0.5, 9, 1))
        .exit(0);
    let (supervisor, _runner) = supervisor_with(config, vec![hanging]);

    let cancel = CancelToken::new();
    let chain_supervisor = Arc::clone(&supervisor);
    let chain_cancel = cancel.clone();
    let chain_handle = std::thread::spawn(move || {
        chain_supervisor.run_single_chain(None, 1, Trigger::Scheduled, &chain_cancel);
    });

    assert!(wait_until(Duration::from_secs(5), || supervisor.is_running()));
    cancel.cancel();
    chain_handle.join().unwrap();

    let store = supervisor.store().lock().unwrap();
    let session = &store.list_sessions(None).unwrap()[0];
    assert_eq!(session.status, SessionStatus::TimedOut);
    assert_eq!(session.exit_code, Some(137));
    // The result record never arrived, so no metrics were attributed.
    assert!(session.cost_usd.is_none());
}

#[test]
fn test_credential_redaction_reaches_hub_and_log() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());

    let leaky = Script::new()
        .line(fixtures::system_init())
        .line(fixtures::assistant_text("connected with hunter2"))
        .line(fixtures::result_event("done", 0.01, 1, 1_000))
        .exit(0);

    let runner = ScriptedRunner::new(vec![leaky]);
    let supervisor = Arc::new(
        Supervisor::new(config, Store::open_in_memory().unwrap(), runner)
            .with_echo_stdout(false)
            .with_redactor(Redactor::from_vars(
                "BROWSER_CRED_",
                [("BROWSER_CRED_DB_PASS".to_string(), "hunter2".to_string())],
            )),
    );

    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    let (session_id, log_path) = {
        let store = supervisor.store().lock().unwrap();
        let session = &store.list_sessions(None).unwrap()[0];
        (session.id, session.log_path.clone().unwrap())
    };

    let log_content = std::fs::read_to_string(&log_path).unwrap();
    assert!(!log_content.contains("hunter2"));
    assert!(log_content.contains("[REDACTED:BROWSER_CRED_DB_PASS]"));

    let subscription = supervisor.hub().subscribe(session_id).unwrap();
    let hub_lines: Vec<String> = subscription.iter().collect();
    assert!(!hub_lines.is_empty());
    assert!(hub_lines.iter().all(|line| !line.contains("hunter2")));
    assert!(
        hub_lines
            .iter()
            .any(|line| line.contains("[REDACTED:BROWSER_CRED_DB_PASS]"))
    );
}

#[test]
fn test_memory_contradiction_across_sessions() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());

    let first = Script::new()
        .line(fixtures::assistant_text("[MEMORY:timing:jellyfin] Takes 60s to start"))
        .line(fixtures::result_event("noted", 0.01, 1, 1_000))
        .exit(0);
    let second = Script::new()
        .line(fixtures::assistant_text("[MEMORY:timing:jellyfin] Takes 30s to start"))
        .line(fixtures::result_event("noted", 0.01, 1, 1_000))
        .exit(0);

    let (supervisor, _runner) = supervisor_with(config, vec![first, second]);
    let cancel = CancelToken::new();
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &cancel);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &cancel);

    let store = supervisor.store().lock().unwrap();
    let newest = store
        .find_similar_memory(Some("jellyfin"), "timing")
        .unwrap()
        .unwrap();
    assert_eq!(newest.observation, "Takes 30s to start");
    assert!((newest.confidence - 0.7).abs() < 1e-9);

    let original = store.get_memory(1).unwrap().unwrap();
    assert_eq!(original.observation, "Takes 60s to start");
    assert!((original.confidence - 0.6).abs() < 1e-9);
    assert!(original.active);
}

#[test]
fn test_stale_handoff_is_discarded_at_chain_start() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());
    let handoff_file = handoff::handoff_path(&config.supervisor.state_dir);

    // Leftover from a previous cycle; must not cause an escalation now.
    std::fs::write(&handoff_file, fixtures::handoff_json(3, &["postgres"])).unwrap();

    let (supervisor, runner) = supervisor_with(config, vec![healthy_tier_one()]);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    assert!(!handoff_file.exists());
    assert_eq!(runner.launch_count(), 1);

    let store = supervisor.store().lock().unwrap();
    let sessions = store.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Completed);
}

#[test]
fn test_invalid_handoff_stops_chain_without_escalation() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());
    let handoff_file = handoff::handoff_path(&config.supervisor.state_dir);

    // Tier 5 exceeds max_tier 3.
    let script = Script::new()
        .line(fixtures::result_event("escalate hard", 0.01, 1, 1_000))
        .write_file(&handoff_file, fixtures::handoff_json(5, &["postgres"]))
        .exit(0);

    let (supervisor, runner) = supervisor_with(config, vec![script, healthy_tier_one()]);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    assert_eq!(runner.launch_count(), 1);
    assert!(!handoff_file.exists());

    let store = supervisor.store().lock().unwrap();
    let sessions = store.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Completed);
}

#[test]
fn test_malformed_handoff_stops_chain() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());
    let handoff_file = handoff::handoff_path(&config.supervisor.state_dir);

    let script = Script::new()
        .line(fixtures::result_event("done", 0.01, 1, 1_000))
        .write_file(&handoff_file, "{truncated")
        .exit(0);

    let (supervisor, runner) = supervisor_with(config, vec![script, healthy_tier_one()]);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    assert_eq!(runner.launch_count(), 1);
    assert!(!handoff_file.exists());

    let store = supervisor.store().lock().unwrap();
    assert_eq!(
        store.list_sessions(None).unwrap()[0].status,
        SessionStatus::Completed
    );
}

#[test]
fn test_dry_run_logs_intent_but_does_not_escalate() {
    let dir = TempDir::new().unwrap();
    let mut config = setup_config(dir.path());
    config.supervisor.dry_run = true;
    let handoff_file = handoff::handoff_path(&config.supervisor.state_dir);

    let script = Script::new()
        .line(fixtures::result_event("wants escalation", 0.01, 1, 1_000))
        .write_file(&handoff_file, fixtures::handoff_json(2, &["postgres"]))
        .exit(0);

    let (supervisor, runner) = supervisor_with(config, vec![script, healthy_tier_one()]);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    assert_eq!(runner.launch_count(), 1);
    assert!(!handoff_file.exists());

    let store = supervisor.store().lock().unwrap();
    let sessions = store.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Completed);
}

#[test]
fn test_failed_exit_records_code_and_stops_without_handoff() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());

    let script = Script::new()
        .line(fixtures::system_init())
        .line(fixtures::result_error("agent crashed"))
        .exit(2);

    let (supervisor, runner) = supervisor_with(config, vec![script, healthy_tier_one()]);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    assert_eq!(runner.launch_count(), 1);

    let store = supervisor.store().lock().unwrap();
    let session = &store.list_sessions(None).unwrap()[0];
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.exit_code, Some(2));
}

#[test]
fn test_failed_exit_with_valid_handoff_still_escalates() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());
    let handoff_file = handoff::handoff_path(&config.supervisor.state_dir);

    let failing_tier_one = Script::new()
        .line(fixtures::assistant_text("found it, but I lack permissions"))
        .write_file(&handoff_file, fixtures::handoff_json(2, &["postgres"]))
        .exit(1);
    let tier_two = Script::new()
        .line(fixtures::result_event("fixed", 0.05, 4, 20_000))
        .exit(0);

    let (supervisor, runner) = supervisor_with(config, vec![failing_tier_one, tier_two]);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    assert_eq!(runner.launch_count(), 2);

    let store = supervisor.store().lock().unwrap();
    let sessions = store.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[1].status, SessionStatus::Escalated);
    assert_eq!(sessions[0].tier, 2);
    assert_eq!(sessions[0].parent_session_id, Some(sessions[1].id));
}

#[test]
fn test_summary_is_written_after_completion() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());
    let (supervisor, _runner) = supervisor_with(config, vec![healthy_tier_one()]);

    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &CancelToken::new());

    // The summary is written on a detached thread after finalization.
    assert!(wait_until(Duration::from_secs(5), || {
        let store = supervisor.store().lock().unwrap();
        store.list_sessions(None).unwrap()[0].summary.is_some()
    }));

    let store = supervisor.store().lock().unwrap();
    let summary = store.list_sessions(None).unwrap()[0].summary.clone().unwrap();
    assert!(summary.contains("tool calls"));
    assert!(summary.contains("All healthy"));
}

#[test]
fn test_memory_context_is_injected_into_later_sessions() {
    let dir = TempDir::new().unwrap();
    let config = setup_config(dir.path());

    let first = Script::new()
        .line(fixtures::assistant_text("[MEMORY:timing:jellyfin] Takes 60s to start"))
        .line(fixtures::result_event("noted", 0.01, 1, 1_000))
        .exit(0);
    let second = healthy_tier_one();

    let (supervisor, runner) = supervisor_with(config, vec![first, second]);
    let cancel = CancelToken::new();
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &cancel);
    supervisor.run_single_chain(None, 1, Trigger::Scheduled, &cancel);

    let launches = runner.launches();
    assert!(!launches[0].system_prompt_append.contains("Operational Memory"));
    let second_append = &launches[1].system_prompt_append;
    assert!(second_append.contains("## Operational Memory (1 memories"));
    assert!(second_append.contains("- [timing] Takes 60s to start (confidence: 0.7)"));
    assert!(second_append.contains("### jellyfin"));
    assert!(second_append.contains("## Environment"));
}
