use chrono::{DateTime, SecondsFormat, Utc};

// Session logs predating the timestamp format have no leading field, so the
// parser must keep accepting bare lines.
const TIMESTAMP_SCAN_BYTES: usize = 40;

/// Format one session-log record: `<RFC3339Nano>\t<line>`.
pub fn timestamped_line(now: DateTime<Utc>, line: &str) -> String {
    format!(
        "{}\t{}",
        now.to_rfc3339_opts(SecondsFormat::Nanos, true),
        line
    )
}

/// Split a session-log record back into timestamp and payload.
///
/// Looks for a tab within the first 40 bytes and attempts an RFC 3339 parse
/// of the prefix; legacy lines without a timestamp come back unchanged with
/// no timestamp.
pub fn parse_timestamped_log_line(line: &str) -> (Option<DateTime<Utc>>, &str) {
    let scan_end = line.len().min(TIMESTAMP_SCAN_BYTES);
    let Some(tab_idx) = line[..scan_end].find('\t') else {
        return (None, line);
    };

    let (prefix, rest) = line.split_at(tab_idx);
    match DateTime::parse_from_rfc3339(prefix) {
        Ok(ts) => (Some(ts.with_timezone(&Utc)), &rest[1..]),
        Err(_) => (None, line),
    }
}
