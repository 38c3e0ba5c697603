use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};
use vigil_types::Handoff;

/// Fixed file name the agent writes inside the state directory to request
/// escalation.
pub const HANDOFF_FILE: &str = "handoff.json";

pub fn handoff_path(state_dir: &Path) -> PathBuf {
    state_dir.join(HANDOFF_FILE)
}

/// Read the handoff file if present.
///
/// Absent file means no escalation was requested. A present-but-unparsable
/// file is an error; the caller logs it, deletes the file, and stops the
/// chain. A partially written file (the agent is expected to write via
/// temp-file-then-rename, but may not) fails JSON parsing and lands here too.
pub fn read(state_dir: &Path) -> Result<Option<Handoff>> {
    let path = handoff_path(state_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    let handoff: Handoff = serde_json::from_str(&content)
        .map_err(|e| Error::Handoff(format!("malformed {}: {}", path.display(), e)))?;

    Ok(Some(handoff))
}

/// Structural validation before a handoff may drive escalation.
///
/// Tier 1 is never a handoff target, and the recommendation cannot exceed
/// the configured ceiling; an escalation with no affected services carries
/// no actionable signal.
pub fn validate(handoff: &Handoff, max_tier: u8) -> Result<()> {
    if handoff.recommended_tier < 2 || handoff.recommended_tier > max_tier {
        return Err(Error::Handoff(format!(
            "recommended_tier {} outside valid range 2..={}",
            handoff.recommended_tier, max_tier
        )));
    }

    if handoff.services_affected.is_empty() {
        return Err(Error::Handoff(
            "services_affected must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Best-effort delete; a missing file is fine.
pub fn delete(state_dir: &Path) {
    let path = handoff_path(state_dir);
    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to delete handoff file"),
    }
}

/// Remove any handoff left over from an earlier cycle. Called at chain
/// start; a handoff never survives the cycle that produced it.
pub fn discard_stale(state_dir: &Path) {
    let path = handoff_path(state_dir);
    if path.exists() {
        info!(path = %path.display(), "discarding stale handoff file");
        delete(state_dir);
    }
}

/// Render the handoff into the next tier's system-prompt append.
pub fn render_markdown(handoff: &Handoff) -> String {
    let mut out = String::from("## Escalation Context\n\n");

    out.push_str(&format!(
        "Services affected: {}\n",
        handoff.services_affected.join(", ")
    ));

    if !handoff.check_results.is_empty() {
        out.push_str("\nCheck results:\n");
        for check in &handoff.check_results {
            out.push_str(&format!(
                "- {} [{}]: {}",
                check.service, check.check_type, check.status
            ));
            if let Some(error) = &check.error {
                out.push_str(&format!(" — {}", error));
            }
            if let Some(ms) = check.response_time_ms {
                out.push_str(&format!(" ({}ms)", ms));
            }
            out.push('\n');
        }
    }

    if let Some(findings) = &handoff.investigation_findings {
        out.push_str(&format!("\nInvestigation Findings:\n{}\n", findings));
    }

    if let Some(remediation) = &handoff.remediation_attempted {
        out.push_str(&format!("\nRemediation Already Attempted:\n{}\n", remediation));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vigil_types::CheckResult;

    fn sample_handoff() -> Handoff {
        Handoff {
            recommended_tier: 2,
            services_affected: vec!["postgres".to_string()],
            check_results: vec![CheckResult {
                service: "postgres".to_string(),
                check_type: "http".to_string(),
                status: "down".to_string(),
                error: Some("HTTP 502".to_string()),
                response_time_ms: None,
            }],
            investigation_findings: None,
            remediation_attempted: None,
            cooldown_state: None,
        }
    }

    #[test]
    fn test_read_absent_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_read_write_delete_cycle() {
        let dir = TempDir::new().unwrap();
        let json = serde_json::to_string(&sample_handoff()).unwrap();
        std::fs::write(handoff_path(dir.path()), json).unwrap();

        let handoff = read(dir.path()).unwrap().unwrap();
        assert_eq!(handoff.recommended_tier, 2);

        delete(dir.path());
        assert!(read(dir.path()).unwrap().is_none());
        // Deleting again is tolerated.
        delete(dir.path());
    }

    #[test]
    fn test_read_malformed_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(handoff_path(dir.path()), "{not json").unwrap();
        assert!(read(dir.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_tier_one_and_overflow() {
        let mut handoff = sample_handoff();
        handoff.recommended_tier = 1;
        assert!(validate(&handoff, 3).is_err());

        handoff.recommended_tier = 4;
        assert!(validate(&handoff, 3).is_err());

        handoff.recommended_tier = 3;
        assert!(validate(&handoff, 3).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_services() {
        let mut handoff = sample_handoff();
        handoff.services_affected.clear();
        assert!(validate(&handoff, 3).is_err());
    }

    #[test]
    fn test_discard_stale_removes_leftover() {
        let dir = TempDir::new().unwrap();
        std::fs::write(handoff_path(dir.path()), "{}").unwrap();

        discard_stale(dir.path());
        assert!(!handoff_path(dir.path()).exists());
        // No-op when nothing is there.
        discard_stale(dir.path());
    }

    #[test]
    fn test_render_includes_checks_and_error() {
        let mut handoff = sample_handoff();
        handoff.investigation_findings = Some("connection pool exhausted".to_string());
        handoff.remediation_attempted = Some("restarted pgbouncer".to_string());

        let rendered = render_markdown(&handoff);
        assert!(rendered.starts_with("## Escalation Context"));
        assert!(rendered.contains("Services affected: postgres"));
        assert!(rendered.contains("- postgres [http]: down — HTTP 502"));
        assert!(rendered.contains("Investigation Findings:\nconnection pool exhausted"));
        assert!(rendered.contains("Remediation Already Attempted:\nrestarted pgbouncer"));
    }
}
