use rusqlite::Connection;

use crate::error::StorageError;

// Bump and widen init_schema's drop-and-recreate path whenever a table
// definition changes; there is no in-place migration path yet.
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            workspace_id TEXT,
            title TEXT,
            description TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS responses (
            id TEXT PRIMARY KEY,
            round_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rounds (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            round_index INTEGER NOT NULL,
            request_id TEXT NOT NULL UNIQUE,
            response_id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE,
            FOREIGN KEY (request_id) REFERENCES requests(id) ON DELETE CASCADE,
            FOREIGN KEY (response_id) REFERENCES responses(id) ON DELETE CASCADE,
            UNIQUE (session_id, round_index)
        );

        CREATE TABLE IF NOT EXISTS turns (
            id TEXT PRIMARY KEY,
            response_id TEXT NOT NULL,
            turn_index INTEGER NOT NULL,
            raw_response TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '[]',
            tool_calls TEXT NOT NULL DEFAULT '[]',
            metrics_input INTEGER NOT NULL DEFAULT 0,
            metrics_output INTEGER NOT NULL DEFAULT 0,
            metrics_cache_read INTEGER,
            metrics_cache_write INTEGER,
            metrics_cost TEXT NOT NULL DEFAULT '0',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (response_id) REFERENCES responses(id) ON DELETE CASCADE,
            UNIQUE (response_id, turn_index)
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_workspace ON sessions(workspace_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_rounds_session ON rounds(session_id, round_index);
        CREATE INDEX IF NOT EXISTS idx_turns_response ON turns(response_id, turn_index);
        "#,
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS turns;
        DROP TABLE IF EXISTS rounds;
        DROP TABLE IF EXISTS responses;
        DROP TABLE IF EXISTS requests;
        DROP TABLE IF EXISTS sessions;
        "#,
    )?;
    Ok(())
}
