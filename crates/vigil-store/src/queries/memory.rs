use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts, to_ts};
use crate::Result;
use vigil_types::{DEACTIVATE_THRESHOLD, Memory, NewMemory, clamp_confidence};

const MEMORY_COLUMNS: &str = r#"
    id, service, category, observation, confidence, active, created_at,
    updated_at, session_id, tier
"#;

struct RawMemory {
    id: i64,
    service: Option<String>,
    category: String,
    observation: String,
    confidence: f64,
    active: bool,
    created_at: String,
    updated_at: String,
    session_id: Option<i64>,
    tier: u8,
}

fn map_row(row: &Row) -> rusqlite::Result<RawMemory> {
    Ok(RawMemory {
        id: row.get(0)?,
        service: row.get(1)?,
        category: row.get(2)?,
        observation: row.get(3)?,
        confidence: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        session_id: row.get(8)?,
        tier: row.get(9)?,
    })
}

fn from_raw(raw: RawMemory) -> Result<Memory> {
    Ok(Memory {
        id: raw.id,
        service: raw.service,
        category: raw.category,
        observation: raw.observation,
        confidence: raw.confidence,
        active: raw.active,
        created_at: parse_ts(&raw.created_at)?,
        updated_at: parse_ts(&raw.updated_at)?,
        session_id: raw.session_id,
        tier: raw.tier,
    })
}

pub fn insert(conn: &Connection, memory: &NewMemory, now: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO memories
            (service, category, observation, confidence, active, created_at,
             updated_at, session_id, tier)
        VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, ?6, ?7)
        "#,
        params![
            &memory.service,
            &memory.category,
            &memory.observation,
            clamp_confidence(memory.confidence),
            to_ts(&now),
            memory.session_id,
            memory.tier,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn update(
    conn: &Connection,
    id: i64,
    confidence: f64,
    active: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE memories
        SET confidence = ?2, active = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
        params![id, clamp_confidence(confidence), active, to_ts(&now)],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Memory>> {
    let query = format!("SELECT {} FROM memories WHERE id = ?1", MEMORY_COLUMNS);
    let raw = conn.query_row(&query, params![id], map_row).optional()?;
    raw.map(from_raw).transpose()
}

/// Find the memory a new observation should reinforce or contradict.
///
/// At most one row per `(service, category)` is considered "similar"; when
/// history has produced several, the most recently updated one wins.
pub fn find_similar(
    conn: &Connection,
    service: Option<&str>,
    category: &str,
) -> Result<Option<Memory>> {
    let query = format!(
        r#"
        SELECT {}
        FROM memories
        WHERE category = ?1
          AND ((?2 IS NULL AND service IS NULL) OR service = ?2)
          AND active = 1
        ORDER BY updated_at DESC, id DESC
        LIMIT 1
        "#,
        MEMORY_COLUMNS
    );

    let raw = conn
        .query_row(&query, params![category, service], map_row)
        .optional()?;

    raw.map(from_raw).transpose()
}

pub fn active(conn: &Connection, limit: usize) -> Result<Vec<Memory>> {
    let query = format!(
        r#"
        SELECT {}
        FROM memories
        WHERE active = 1
        ORDER BY confidence DESC, updated_at DESC
        LIMIT ?1
        "#,
        MEMORY_COLUMNS
    );

    let mut stmt = conn.prepare(&query)?;
    let raws = stmt
        .query_map(params![limit as i64], map_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    raws.into_iter().map(from_raw).collect()
}

/// Decay active memories that have not been updated within the grace period.
///
/// Confidence drops by `rate_per_week` for each week elapsed beyond the
/// grace window; rows falling below the activity threshold are deactivated
/// but kept for audit. Each decayed row's `updated_at` is bumped so one
/// stale period is charged once. Returns the number of rows touched.
pub fn decay_stale(
    conn: &Connection,
    now: DateTime<Utc>,
    grace_days: i64,
    rate_per_week: f64,
) -> Result<usize> {
    let cutoff = now - Duration::days(grace_days);

    let stale: Vec<Memory> = {
        let query = format!(
            r#"
            SELECT {}
            FROM memories
            WHERE active = 1 AND updated_at < ?1
            "#,
            MEMORY_COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let raws = stmt
            .query_map(params![to_ts(&cutoff)], map_row)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        raws.into_iter().map(from_raw).collect::<Result<Vec<_>>>()?
    };

    for memory in &stale {
        let weeks_beyond_grace =
            (now - memory.updated_at - Duration::days(grace_days)).num_seconds() as f64
                / (7.0 * 86_400.0);
        let decayed = clamp_confidence(memory.confidence - rate_per_week * weeks_beyond_grace);
        let active = decayed >= DEACTIVATE_THRESHOLD;
        update(conn, memory.id, decayed, active, now)?;
    }

    Ok(stale.len())
}
