//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- Event tables (append-mostly)
    -- ============================================

    CREATE TABLE IF NOT EXISTS shell_commands (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id   TEXT NOT NULL,
        session_name      TEXT,
        command           TEXT NOT NULL,
        description       TEXT,
        working_directory TEXT NOT NULL DEFAULT '',
        git_branch        TEXT,
        model_provider    TEXT NOT NULL DEFAULT 'Unknown',
        model_name        TEXT NOT NULL DEFAULT 'Unknown',
        exit_code         INTEGER,
        stdout            TEXT NOT NULL DEFAULT '',
        stderr            TEXT NOT NULL DEFAULT '',
        duration_ms       INTEGER,
        executed_at       TEXT NOT NULL,
        created_at        TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_shell_commands_conversation
        ON shell_commands(conversation_id, executed_at DESC);
    CREATE INDEX IF NOT EXISTS idx_shell_commands_executed_at
        ON shell_commands(executed_at DESC);
    CREATE INDEX IF NOT EXISTS idx_shell_commands_model
        ON shell_commands(model_provider, model_name);

    CREATE TABLE IF NOT EXISTS claude_commands (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id   TEXT NOT NULL,
        session_name      TEXT,
        tool_name         TEXT NOT NULL,
        parameters        TEXT NOT NULL DEFAULT '',
        result            TEXT NOT NULL DEFAULT '',
        working_directory TEXT NOT NULL DEFAULT '',
        git_branch        TEXT,
        model_provider    TEXT NOT NULL DEFAULT 'Unknown',
        model_name        TEXT NOT NULL DEFAULT 'Unknown',
        success           INTEGER NOT NULL,
        error_message     TEXT,
        duration_ms       INTEGER,
        executed_at       TEXT NOT NULL,
        created_at        TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_claude_commands_conversation
        ON claude_commands(conversation_id, executed_at DESC);
    CREATE INDEX IF NOT EXISTS idx_claude_commands_executed_at
        ON claude_commands(executed_at DESC);
    CREATE INDEX IF NOT EXISTS idx_claude_commands_tool
        ON claude_commands(tool_name, executed_at DESC);
    CREATE INDEX IF NOT EXISTS idx_claude_commands_model
        ON claude_commands(model_provider, model_name);

    CREATE TABLE IF NOT EXISTS user_messages (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id   TEXT NOT NULL,
        session_name      TEXT,
        message           TEXT NOT NULL,
        working_directory TEXT NOT NULL DEFAULT '',
        git_branch        TEXT,
        model_provider    TEXT NOT NULL DEFAULT 'Unknown',
        model_name        TEXT NOT NULL DEFAULT 'Unknown',
        message_length    INTEGER NOT NULL,
        submitted_at      TEXT NOT NULL,
        created_at        TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_user_messages_conversation
        ON user_messages(conversation_id, submitted_at DESC);
    CREATE INDEX IF NOT EXISTS idx_user_messages_submitted_at
        ON user_messages(submitted_at DESC);
    CREATE INDEX IF NOT EXISTS idx_user_messages_model
        ON user_messages(model_provider, model_name);

    CREATE TABLE IF NOT EXISTS notifications (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id   TEXT NOT NULL,
        session_name      TEXT,
        notification_type TEXT NOT NULL,
        message           TEXT NOT NULL,
        tool_name         TEXT,
        command_details   TEXT,
        working_directory TEXT NOT NULL DEFAULT '',
        git_branch        TEXT,
        model_provider    TEXT NOT NULL DEFAULT 'Unknown',
        model_name        TEXT NOT NULL DEFAULT 'Unknown',
        notified_at       TEXT NOT NULL,
        created_at        TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_notifications_conversation
        ON notifications(conversation_id, notified_at DESC);
    CREATE INDEX IF NOT EXISTS idx_notifications_notified_at
        ON notifications(notified_at DESC);
    CREATE INDEX IF NOT EXISTS idx_notifications_type
        ON notifications(notification_type, notified_at DESC);
    CREATE INDEX IF NOT EXISTS idx_notifications_tool
        ON notifications(tool_name, notified_at DESC) WHERE tool_name IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_notifications_model
        ON notifications(model_provider, model_name);

    -- ============================================
    -- Aggregates (derived, regenerable)
    -- ============================================

    CREATE TABLE IF NOT EXISTS conversations (
        id                   TEXT PRIMARY KEY,
        project_path         TEXT,
        model_provider       TEXT NOT NULL DEFAULT 'Unknown',
        model_name           TEXT NOT NULL DEFAULT 'Unknown',
        started_at           TEXT NOT NULL,
        last_activity_at     TEXT NOT NULL,
        total_commands       INTEGER NOT NULL DEFAULT 0,
        total_shell_commands INTEGER NOT NULL DEFAULT 0,
        total_tokens         INTEGER NOT NULL DEFAULT 0,
        status               TEXT NOT NULL DEFAULT 'active',
        created_at           TEXT NOT NULL,
        updated_at           TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversations_last_activity
        ON conversations(last_activity_at DESC);
    CREATE INDEX IF NOT EXISTS idx_conversations_model
        ON conversations(model_provider, model_name);

    CREATE TABLE IF NOT EXISTS command_stats (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        command_type     TEXT NOT NULL,
        command_name     TEXT NOT NULL,
        execution_count  INTEGER NOT NULL DEFAULT 0,
        success_count    INTEGER NOT NULL DEFAULT 0,
        failure_count    INTEGER NOT NULL DEFAULT 0,
        avg_duration_ms  REAL NOT NULL DEFAULT 0,
        last_executed_at TEXT NOT NULL,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL,

        UNIQUE(command_type, command_name)
    );

    CREATE INDEX IF NOT EXISTS idx_command_stats_count
        ON command_stats(execution_count DESC);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "shell_commands",
            "claude_commands",
            "user_messages",
            "notifications",
            "conversations",
            "command_stats",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_command_stats_key_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = "INSERT INTO command_stats (command_type, command_name, last_executed_at, created_at, updated_at)
                      VALUES ('shell', 'git', 'x', 'x', 'x')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
