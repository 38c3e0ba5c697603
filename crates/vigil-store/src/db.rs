use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

use crate::queries;
use crate::schema;
use crate::{Error, Result};
use vigil_types::{
    ActionType, CooldownAction, Event, Memory, NewCooldownAction, NewEvent, NewMemory, NewSession,
    Session, SessionStatus,
};

/// Typed facade over the supervisor's SQLite database.
///
/// One `Store` wraps one connection; the supervisor shares it across the
/// loop thread and the stream pump behind a mutex, so every method takes
/// `&self` and issues a single statement or a short statement sequence.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).map_err(Error::Database)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        schema::init_schema(&self.conn)
    }

    // Sessions

    pub fn insert_session(&self, session: &NewSession) -> Result<i64> {
        queries::session::insert(&self.conn, session, Utc::now())
    }

    pub fn get_session(&self, id: i64) -> Result<Option<Session>> {
        queries::session::get(&self.conn, id)
    }

    pub fn list_sessions(&self, limit: Option<usize>) -> Result<Vec<Session>> {
        queries::session::list(&self.conn, limit)
    }

    pub fn update_session_finished(
        &self,
        id: i64,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        exit_code: Option<i32>,
        log_path: Option<&str>,
    ) -> Result<()> {
        queries::session::finish(&self.conn, id, status, ended_at, exit_code, log_path)
    }

    pub fn update_session_status(&self, id: i64, status: SessionStatus) -> Result<()> {
        queries::session::set_status(&self.conn, id, status)
    }

    pub fn update_session_result(
        &self,
        id: i64,
        response: &str,
        cost_usd: Option<f64>,
        num_turns: Option<i64>,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        queries::session::set_result(&self.conn, id, response, cost_usd, num_turns, duration_ms)
    }

    pub fn update_session_summary(&self, id: i64, summary: &str) -> Result<()> {
        queries::session::set_summary(&self.conn, id, summary)
    }

    // Events

    pub fn insert_event(&self, event: &NewEvent) -> Result<i64> {
        queries::event::insert(&self.conn, event, Utc::now())
    }

    pub fn events_for_session(&self, session_id: i64) -> Result<Vec<Event>> {
        queries::event::list_for_session(&self.conn, session_id)
    }

    pub fn recent_events(&self, limit: usize) -> Result<Vec<Event>> {
        queries::event::recent(&self.conn, limit)
    }

    // Memories

    pub fn insert_memory(&self, memory: &NewMemory) -> Result<i64> {
        queries::memory::insert(&self.conn, memory, Utc::now())
    }

    pub fn update_memory(&self, id: i64, confidence: f64, active: bool) -> Result<()> {
        queries::memory::update(&self.conn, id, confidence, active, Utc::now())
    }

    pub fn get_memory(&self, id: i64) -> Result<Option<Memory>> {
        queries::memory::get(&self.conn, id)
    }

    pub fn find_similar_memory(
        &self,
        service: Option<&str>,
        category: &str,
    ) -> Result<Option<Memory>> {
        queries::memory::find_similar(&self.conn, service, category)
    }

    pub fn get_active_memories(&self, limit: usize) -> Result<Vec<Memory>> {
        queries::memory::active(&self.conn, limit)
    }

    pub fn decay_stale_memories(&self, grace_days: i64, rate_per_week: f64) -> Result<usize> {
        self.decay_stale_memories_at(Utc::now(), grace_days, rate_per_week)
    }

    /// Decay with an explicit clock, used by the scheduler and by tests.
    pub fn decay_stale_memories_at(
        &self,
        now: DateTime<Utc>,
        grace_days: i64,
        rate_per_week: f64,
    ) -> Result<usize> {
        queries::memory::decay_stale(&self.conn, now, grace_days, rate_per_week)
    }

    // Cooldown actions

    pub fn insert_cooldown_action(&self, action: &NewCooldownAction) -> Result<i64> {
        queries::cooldown::insert(&self.conn, action, Utc::now())
    }

    pub fn count_recent_cooldown_actions(
        &self,
        service: &str,
        action_type: ActionType,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        queries::cooldown::count_recent(&self.conn, service, action_type, since)
    }

    pub fn recent_cooldown_actions(&self, limit: usize) -> Result<Vec<CooldownAction>> {
        queries::cooldown::recent(&self.conn, limit)
    }

    pub fn recent_cooldown_services(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        queries::cooldown::recent_services(&self.conn, since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("state").join("vigil.db");

        let store = Store::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert!(store.list_sessions(None).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_preserves_rows() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("vigil.db");

        let id = {
            let store = Store::open(&db_path).unwrap();
            store
                .insert_session(&NewSession {
                    tier: 1,
                    model: "agent-small".to_string(),
                    prompt_file: "prompts/observe.md".to_string(),
                    prompt_text: None,
                    trigger: vigil_types::Trigger::Scheduled,
                    parent_session_id: None,
                })
                .unwrap()
        };

        let store = Store::open(&db_path).unwrap();
        assert!(store.get_session(id).unwrap().is_some());
    }
}
