use regex::Regex;
use std::sync::LazyLock;
use vigil_types::{ActionType, EventLevel};

// Marker grammars are a stable contract with runbook authors; changing them
// silently breaks every prompt that teaches the agent to report.
static EVENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[EVENT:([A-Za-z0-9_-]+)(?::([A-Za-z0-9._-]+))?\][ \t]+(\S.*?)[ \t]*$")
        .unwrap()
});

static MEMORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[MEMORY:([A-Za-z0-9_-]+)(?::([A-Za-z0-9._-]+))?\][ \t]+(\S.*?)[ \t]*$")
        .unwrap()
});

static COOLDOWN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\[COOLDOWN:(restart|redeployment):([A-Za-z0-9._-]+)\][ \t]+(success|failure)[ \t]*[-\u{2013}\u{2014}][ \t]*(.*?)[ \t]*$",
    )
    .unwrap()
});

/// A typed marker extracted from an assistant text block.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Event {
        level: EventLevel,
        service: Option<String>,
        message: String,
    },
    Memory {
        category: String,
        service: Option<String>,
        observation: String,
    },
    Cooldown {
        action_type: ActionType,
        service: String,
        success: bool,
        message: String,
    },
}

/// Extract all markers from one assistant text block.
///
/// Runs on the original block text (before ANSI stripping); each marker must
/// start its own line. Event levels are normalized through the synonym
/// table; an unknown level drops the marker entirely rather than guessing.
pub fn extract_markers(text: &str) -> Vec<Marker> {
    let mut markers = Vec::new();

    for caps in EVENT_RE.captures_iter(text) {
        let Some(level) = EventLevel::from_alias(&caps[1]) else {
            continue;
        };
        markers.push(Marker::Event {
            level,
            service: caps.get(2).map(|m| m.as_str().to_string()),
            message: caps[3].to_string(),
        });
    }

    for caps in MEMORY_RE.captures_iter(text) {
        markers.push(Marker::Memory {
            category: caps[1].to_ascii_lowercase(),
            service: caps.get(2).map(|m| m.as_str().to_string()),
            observation: caps[3].to_string(),
        });
    }

    for caps in COOLDOWN_RE.captures_iter(text) {
        // The alternation only admits the two known action types.
        let action_type: ActionType = caps[1].parse().unwrap_or(ActionType::Restart);
        markers.push(Marker::Cooldown {
            action_type,
            service: caps[2].to_string(),
            success: &caps[3] == "success",
            message: caps[4].to_string(),
        });
    }

    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_marker_with_service() {
        let markers = extract_markers("[EVENT:warning:postgres] connection pool exhausted");
        assert_eq!(
            markers,
            vec![Marker::Event {
                level: EventLevel::Warning,
                service: Some("postgres".to_string()),
                message: "connection pool exhausted".to_string(),
            }]
        );
    }

    #[test]
    fn test_event_marker_without_service() {
        let markers = extract_markers("[EVENT:health-check-success] 46 services healthy");
        assert_eq!(
            markers,
            vec![Marker::Event {
                level: EventLevel::Info,
                service: None,
                message: "46 services healthy".to_string(),
            }]
        );
    }

    #[test]
    fn test_event_level_synonyms_normalize() {
        for (alias, level) in [
            ("ok", EventLevel::Info),
            ("degraded", EventLevel::Warning),
            ("fatal", EventLevel::Critical),
            ("ERROR", EventLevel::Critical),
        ] {
            let markers = extract_markers(&format!("[EVENT:{}:svc] something", alias));
            assert_eq!(
                markers,
                vec![Marker::Event {
                    level,
                    service: Some("svc".to_string()),
                    message: "something".to_string(),
                }]
            );
        }
    }

    #[test]
    fn test_unknown_event_level_is_dropped() {
        assert!(extract_markers("[EVENT:verbose] noisy detail").is_empty());
    }

    #[test]
    fn test_markers_must_be_line_anchored() {
        assert!(extract_markers("note: [EVENT:info] inline mention").is_empty());
        assert!(!extract_markers("prose\n[EVENT:info] on its own line").is_empty());
    }

    #[test]
    fn test_marker_body_must_share_the_line() {
        assert!(extract_markers("[EVENT:info]\norphan body").is_empty());
    }

    #[test]
    fn test_memory_marker_category_lowercased() {
        let markers = extract_markers("[MEMORY:Timing:jellyfin] Takes 60s to start");
        assert_eq!(
            markers,
            vec![Marker::Memory {
                category: "timing".to_string(),
                service: Some("jellyfin".to_string()),
                observation: "Takes 60s to start".to_string(),
            }]
        );
    }

    #[test]
    fn test_cooldown_marker_success() {
        let markers = extract_markers("[COOLDOWN:restart:jellyfin] success - unit restarted");
        assert_eq!(
            markers,
            vec![Marker::Cooldown {
                action_type: ActionType::Restart,
                service: "jellyfin".to_string(),
                success: true,
                message: "unit restarted".to_string(),
            }]
        );
    }

    #[test]
    fn test_cooldown_marker_accepts_all_three_dashes() {
        for dash in ['-', '\u{2013}', '\u{2014}'] {
            let text = format!(
                "[COOLDOWN:redeployment:registry] failure {} image pull timed out",
                dash
            );
            let markers = extract_markers(&text);
            assert_eq!(
                markers,
                vec![Marker::Cooldown {
                    action_type: ActionType::Redeployment,
                    service: "registry".to_string(),
                    success: false,
                    message: "image pull timed out".to_string(),
                }],
                "dash {:?} should parse",
                dash
            );
        }
    }

    #[test]
    fn test_cooldown_unknown_action_is_dropped() {
        assert!(extract_markers("[COOLDOWN:reboot:host] success - done").is_empty());
    }

    #[test]
    fn test_multiple_markers_in_one_block() {
        let text = "Investigation done.\n\
                    [EVENT:critical:postgres] replication halted\n\
                    [MEMORY:replication:postgres] WAL segment retention too low\n\
                    [COOLDOWN:restart:postgres] failure - still halted";

        let markers = extract_markers(text);
        assert_eq!(markers.len(), 3);
    }
}
