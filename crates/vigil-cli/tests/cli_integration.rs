use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn vigil(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vigil").unwrap();
    cmd.env("VIGIL_PATH", data_dir.path());
    cmd.env("VIGIL_LOG", "error");
    cmd
}

#[test]
fn test_help_mentions_supervisor() {
    let dir = TempDir::new().unwrap();
    vigil(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("supervisor"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_init_creates_workspace() {
    let dir = TempDir::new().unwrap();
    vigil(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("workspace initialized"));

    assert!(dir.path().join("config.toml").exists());
    assert!(dir.path().join("prompts/tier1-observe.md").exists());
    assert!(dir.path().join("prompts/tier3-full.md").exists());
    assert!(dir.path().join("state").exists());
}

#[test]
fn test_init_refuses_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    vigil(&dir).arg("init").assert().success();

    vigil(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    vigil(&dir).args(["init", "--force"]).assert().success();
}

#[test]
fn test_session_list_on_fresh_workspace() {
    let dir = TempDir::new().unwrap();
    vigil(&dir).arg("init").assert().success();

    vigil(&dir)
        .args(["session", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions recorded yet."));
}

#[test]
fn test_run_without_config_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    vigil(&dir)
        .args(["run", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("vigil init"));
}

#[test]
fn test_session_show_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    vigil(&dir).arg("init").assert().success();

    vigil(&dir)
        .args(["session", "show", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no session with id 42"));
}
