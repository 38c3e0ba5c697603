use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use super::{parse_ts, to_ts};
use crate::{Error, Result};
use vigil_types::{Event, NewEvent};

fn map_row(row: &Row) -> rusqlite::Result<(i64, Option<i64>, String, Option<String>, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn from_raw(raw: (i64, Option<i64>, String, Option<String>, String, String)) -> Result<Event> {
    let (id, session_id, level, service, message, created_at) = raw;
    let level = level.parse().map_err(Error::Query)?;
    Ok(Event {
        id,
        session_id,
        level,
        service,
        message,
        created_at: parse_ts(&created_at)?,
    })
}

pub fn insert(conn: &Connection, event: &NewEvent, created_at: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO events (session_id, level, service, message, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            event.session_id,
            event.level.as_str(),
            &event.service,
            &event.message,
            to_ts(&created_at),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn list_for_session(conn: &Connection, session_id: i64) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, session_id, level, service, message, created_at
        FROM events
        WHERE session_id = ?1
        ORDER BY id ASC
        "#,
    )?;

    let raws = stmt
        .query_map(params![session_id], map_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    raws.into_iter().map(from_raw).collect()
}

pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, session_id, level, service, message, created_at
        FROM events
        ORDER BY id DESC
        LIMIT ?1
        "#,
    )?;

    let raws = stmt
        .query_map(params![limit as i64], map_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    raws.into_iter().map(from_raw).collect()
}

#[cfg(test)]
mod tests {
    use crate::Store;
    use vigil_types::{EventLevel, NewEvent};

    #[test]
    fn test_events_are_append_only_in_order() {
        let store = Store::open_in_memory().unwrap();

        for message in ["first", "second", "third"] {
            store
                .insert_event(&NewEvent {
                    session_id: None,
                    level: EventLevel::Info,
                    service: None,
                    message: message.to_string(),
                })
                .unwrap();
        }

        let events = store.recent_events(10).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "third");
        assert_eq!(events[2].message, "first");
    }

    #[test]
    fn test_events_filter_by_session() {
        let store = Store::open_in_memory().unwrap();
        let session = store
            .insert_session(&vigil_types::NewSession {
                tier: 1,
                model: "agent-small".to_string(),
                prompt_file: "prompts/observe.md".to_string(),
                prompt_text: None,
                trigger: vigil_types::Trigger::Scheduled,
                parent_session_id: None,
            })
            .unwrap();

        store
            .insert_event(&NewEvent {
                session_id: Some(session),
                level: EventLevel::Warning,
                service: Some("postgres".to_string()),
                message: "slow queries".to_string(),
            })
            .unwrap();
        store
            .insert_event(&NewEvent {
                session_id: None,
                level: EventLevel::Info,
                service: None,
                message: "unrelated".to_string(),
            })
            .unwrap();

        let events = store.events_for_session(session).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, EventLevel::Warning);
        assert_eq!(events[0].service.as_deref(), Some("postgres"));
    }
}
