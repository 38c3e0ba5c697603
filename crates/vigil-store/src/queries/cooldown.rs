use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use super::{parse_ts, to_ts};
use crate::{Error, Result};
use vigil_types::{ActionType, CooldownAction, NewCooldownAction};

struct RawAction {
    id: i64,
    service: String,
    action_type: String,
    timestamp: String,
    success: bool,
    tier: u8,
    error: Option<String>,
    session_id: Option<i64>,
}

fn map_row(row: &Row) -> rusqlite::Result<RawAction> {
    Ok(RawAction {
        id: row.get(0)?,
        service: row.get(1)?,
        action_type: row.get(2)?,
        timestamp: row.get(3)?,
        success: row.get(4)?,
        tier: row.get(5)?,
        error: row.get(6)?,
        session_id: row.get(7)?,
    })
}

fn from_raw(raw: RawAction) -> Result<CooldownAction> {
    Ok(CooldownAction {
        id: raw.id,
        service: raw.service,
        action_type: raw.action_type.parse().map_err(Error::Query)?,
        timestamp: parse_ts(&raw.timestamp)?,
        success: raw.success,
        tier: raw.tier,
        error: raw.error,
        session_id: raw.session_id,
    })
}

pub fn insert(
    conn: &Connection,
    action: &NewCooldownAction,
    timestamp: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO cooldown_actions
            (service, action_type, timestamp, success, tier, error, session_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            &action.service,
            action.action_type.as_str(),
            to_ts(&timestamp),
            action.success,
            action.tier,
            &action.error,
            action.session_id,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn count_recent(
    conn: &Connection,
    service: &str,
    action_type: ActionType,
    since: DateTime<Utc>,
) -> Result<i64> {
    let count = conn.query_row(
        r#"
        SELECT COUNT(*)
        FROM cooldown_actions
        WHERE service = ?1 AND action_type = ?2 AND timestamp >= ?3
        "#,
        params![service, action_type.as_str(), to_ts(&since)],
        |row| row.get(0),
    )?;

    Ok(count)
}

pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<CooldownAction>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, service, action_type, timestamp, success, tier, error, session_id
        FROM cooldown_actions
        ORDER BY id DESC
        LIMIT ?1
        "#,
    )?;

    let raws = stmt
        .query_map(params![limit as i64], map_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    raws.into_iter().map(from_raw).collect()
}

/// Services with any recorded action since the cutoff, for context rendering.
pub fn recent_services(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT DISTINCT service
        FROM cooldown_actions
        WHERE timestamp >= ?1
        ORDER BY service ASC
        "#,
    )?;

    let services = stmt
        .query_map(params![to_ts(&since)], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, rusqlite::Error>>()?;

    Ok(services)
}
