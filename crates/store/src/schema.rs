use rusqlite::Connection;

use zipsa_domain::error::{Error, Result};

// Schema version (increment when changing table definitions).
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| Error::Store(e.to_string()))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        return Err(Error::Store(format!(
            "database schema version {current_version} is incompatible with {SCHEMA_VERSION}"
        )));
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            user_id TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            last_activity TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS chat_sessions (
            session_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            structured_data TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(session_id)
        );

        CREATE TABLE IF NOT EXISTS checkpoints (
            session_id TEXT NOT NULL,
            checkpoint_id TEXT NOT NULL,
            parent_checkpoint_id TEXT,
            state BLOB NOT NULL,
            metadata BLOB,
            created_at TEXT NOT NULL,
            PRIMARY KEY (session_id, checkpoint_id)
        );

        CREATE TABLE IF NOT EXISTS conversation_memories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            tier TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id, last_activity DESC);
        CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_memories_user ON conversation_memories(user_id, created_at DESC);
        "#,
    )
    .map_err(|e| Error::Store(e.to_string()))?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])
        .map_err(|e| Error::Store(e.to_string()))?;

    Ok(())
}
