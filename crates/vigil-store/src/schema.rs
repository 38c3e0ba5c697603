use crate::Result;
use rusqlite::Connection;

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tier INTEGER NOT NULL,
            model TEXT NOT NULL,
            prompt_file TEXT NOT NULL,
            prompt_text TEXT,
            status TEXT NOT NULL
                CHECK (status IN ('running', 'completed', 'escalated', 'failed', 'timed_out')),
            started_at TEXT NOT NULL,
            ended_at TEXT,
            exit_code INTEGER,
            log_path TEXT,
            "trigger" TEXT NOT NULL,
            parent_session_id INTEGER REFERENCES sessions(id),
            response TEXT,
            cost_usd REAL,
            num_turns INTEGER,
            duration_ms INTEGER,
            summary TEXT
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER REFERENCES sessions(id),
            level TEXT NOT NULL,
            service TEXT,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service TEXT,
            category TEXT NOT NULL,
            observation TEXT NOT NULL,
            confidence REAL NOT NULL,
            active BOOLEAN NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            session_id INTEGER REFERENCES sessions(id),
            tier INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS cooldown_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service TEXT NOT NULL,
            action_type TEXT NOT NULL CHECK (action_type IN ('restart', 'redeployment')),
            timestamp TEXT NOT NULL,
            success BOOLEAN NOT NULL,
            tier INTEGER NOT NULL,
            error TEXT,
            session_id INTEGER REFERENCES sessions(id)
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_sessions_parent ON sessions(parent_session_id);
        CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
        CREATE INDEX IF NOT EXISTS idx_memories_similar ON memories(service, category);
        CREATE INDEX IF NOT EXISTS idx_cooldown_window
            ON cooldown_actions(service, action_type, timestamp);
        "#,
    )?;

    Ok(())
}
