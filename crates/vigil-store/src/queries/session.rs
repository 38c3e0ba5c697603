use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_opt_ts, parse_ts, to_ts};
use crate::{Error, Result};
use vigil_types::{NewSession, Session, SessionStatus};

const SESSION_COLUMNS: &str = r#"
    id, tier, model, prompt_file, prompt_text, status, started_at, ended_at,
    exit_code, log_path, "trigger", parent_session_id, response, cost_usd,
    num_turns, duration_ms, summary
"#;

struct RawSession {
    id: i64,
    tier: u8,
    model: String,
    prompt_file: String,
    prompt_text: Option<String>,
    status: String,
    started_at: String,
    ended_at: Option<String>,
    exit_code: Option<i32>,
    log_path: Option<String>,
    trigger: String,
    parent_session_id: Option<i64>,
    response: Option<String>,
    cost_usd: Option<f64>,
    num_turns: Option<i64>,
    duration_ms: Option<i64>,
    summary: Option<String>,
}

fn map_row(row: &Row) -> rusqlite::Result<RawSession> {
    Ok(RawSession {
        id: row.get(0)?,
        tier: row.get(1)?,
        model: row.get(2)?,
        prompt_file: row.get(3)?,
        prompt_text: row.get(4)?,
        status: row.get(5)?,
        started_at: row.get(6)?,
        ended_at: row.get(7)?,
        exit_code: row.get(8)?,
        log_path: row.get(9)?,
        trigger: row.get(10)?,
        parent_session_id: row.get(11)?,
        response: row.get(12)?,
        cost_usd: row.get(13)?,
        num_turns: row.get(14)?,
        duration_ms: row.get(15)?,
        summary: row.get(16)?,
    })
}

fn from_raw(raw: RawSession) -> Result<Session> {
    Ok(Session {
        id: raw.id,
        tier: raw.tier,
        model: raw.model,
        prompt_file: raw.prompt_file,
        prompt_text: raw.prompt_text,
        status: raw.status.parse().map_err(Error::Query)?,
        started_at: parse_ts(&raw.started_at)?,
        ended_at: parse_opt_ts(raw.ended_at)?,
        exit_code: raw.exit_code,
        log_path: raw.log_path,
        trigger: raw.trigger.parse().map_err(Error::Query)?,
        parent_session_id: raw.parent_session_id,
        response: raw.response,
        cost_usd: raw.cost_usd,
        num_turns: raw.num_turns,
        duration_ms: raw.duration_ms,
        summary: raw.summary,
    })
}

pub fn insert(conn: &Connection, session: &NewSession, started_at: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO sessions
            (tier, model, prompt_file, prompt_text, status, started_at, "trigger",
             parent_session_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            session.tier,
            &session.model,
            &session.prompt_file,
            &session.prompt_text,
            SessionStatus::Running.as_str(),
            to_ts(&started_at),
            session.trigger.as_str(),
            session.parent_session_id,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Session>> {
    let query = format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS);
    let raw = conn
        .query_row(&query, params![id], map_row)
        .optional()?;

    raw.map(from_raw).transpose()
}

pub fn list(conn: &Connection, limit: Option<usize>) -> Result<Vec<Session>> {
    let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();
    let query = format!(
        "SELECT {} FROM sessions ORDER BY id DESC {}",
        SESSION_COLUMNS, limit_clause
    );

    let mut stmt = conn.prepare(&query)?;
    let raws = stmt
        .query_map([], map_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    raws.into_iter().map(from_raw).collect()
}

pub fn finish(
    conn: &Connection,
    id: i64,
    status: SessionStatus,
    ended_at: DateTime<Utc>,
    exit_code: Option<i32>,
    log_path: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE sessions
        SET status = ?2, ended_at = ?3, exit_code = ?4, log_path = COALESCE(?5, log_path)
        WHERE id = ?1
        "#,
        params![id, status.as_str(), to_ts(&ended_at), exit_code, log_path],
    )?;

    Ok(())
}

pub fn set_status(conn: &Connection, id: i64, status: SessionStatus) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )?;

    Ok(())
}

pub fn set_result(
    conn: &Connection,
    id: i64,
    response: &str,
    cost_usd: Option<f64>,
    num_turns: Option<i64>,
    duration_ms: Option<i64>,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE sessions
        SET response = ?2, cost_usd = ?3, num_turns = ?4, duration_ms = ?5
        WHERE id = ?1
        "#,
        params![id, response, cost_usd, num_turns, duration_ms],
    )?;

    Ok(())
}

pub fn set_summary(conn: &Connection, id: i64, summary: &str) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET summary = ?2 WHERE id = ?1",
        params![id, summary],
    )?;

    Ok(())
}
