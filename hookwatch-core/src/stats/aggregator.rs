//! Aggregate SQL
//!
//! Both updates are single statements so that concurrent writers for the same
//! key can never lose an increment: command stats use an incremental-average
//! upsert, conversation totals are recomputed with `COUNT(*)` inside the
//! upsert itself.

use crate::error::Result;
use crate::types::{to_db_time, CommandType, UNKNOWN_MODEL};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

/// Rough characters-per-token ratio used for the token estimate.
pub const CHARS_PER_TOKEN: i64 = 4;

/// Fold one execution into the `(command_type, command_name)` row.
///
/// A missing duration counts as 0 towards the average.
pub fn upsert_command_stat(
    conn: &Connection,
    command_type: CommandType,
    command_name: &str,
    success: bool,
    duration_ms: Option<i64>,
    at: &DateTime<Utc>,
) -> Result<()> {
    let at = to_db_time(at);
    let duration = duration_ms.unwrap_or(0) as f64;
    let (successes, failures) = if success { (1, 0) } else { (0, 1) };

    conn.execute(
        r#"
        INSERT INTO command_stats (
            command_type, command_name, execution_count, success_count, failure_count,
            avg_duration_ms, last_executed_at, created_at, updated_at
        ) VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?6, ?6)
        ON CONFLICT(command_type, command_name) DO UPDATE SET
            avg_duration_ms = (command_stats.avg_duration_ms * command_stats.execution_count
                               + excluded.avg_duration_ms)
                              / (command_stats.execution_count + 1.0),
            execution_count = command_stats.execution_count + 1,
            success_count = command_stats.success_count + excluded.success_count,
            failure_count = command_stats.failure_count + excluded.failure_count,
            last_executed_at = MAX(command_stats.last_executed_at, excluded.last_executed_at),
            updated_at = excluded.updated_at
        "#,
        params![
            command_type.as_str(),
            command_name,
            successes,
            failures,
            duration,
            at
        ],
    )?;
    Ok(())
}

/// Insert or refresh the conversation aggregate for `conversation_id`.
///
/// Totals come from `COUNT(*)` over the child tables. The first/last activity
/// window only ever widens, an empty `cwd` never overwrites a known project
/// path, and an `Unknown` model never overwrites a known one. Any activity
/// marks the conversation active again.
///
/// `total_tokens` is estimated as the stored text length over
/// [`CHARS_PER_TOKEN`]. It never decreases, so an externally reported count
/// that is larger than the estimate is kept.
pub fn refresh_conversation(
    conn: &Connection,
    conversation_id: &str,
    cwd: &str,
    model_provider: &str,
    model_name: &str,
    at: &DateTime<Utc>,
) -> Result<()> {
    let at = to_db_time(at);
    let now = to_db_time(&Utc::now());

    conn.execute(
        r#"
        INSERT INTO conversations (
            id, project_path, model_provider, model_name, started_at, last_activity_at,
            total_commands, total_shell_commands, total_tokens, status, created_at, updated_at
        ) VALUES (
            ?1, NULLIF(?2, ''), ?3, ?4, ?5, ?5,
            (SELECT COUNT(*) FROM claude_commands WHERE conversation_id = ?1),
            (SELECT COUNT(*) FROM shell_commands WHERE conversation_id = ?1),
            (
                COALESCE((SELECT SUM(LENGTH(command) + LENGTH(stdout) + LENGTH(stderr))
                          FROM shell_commands WHERE conversation_id = ?1), 0)
              + COALESCE((SELECT SUM(LENGTH(parameters) + LENGTH(result)
                                     + LENGTH(COALESCE(error_message, '')))
                          FROM claude_commands WHERE conversation_id = ?1), 0)
              + COALESCE((SELECT SUM(LENGTH(message))
                          FROM user_messages WHERE conversation_id = ?1), 0)
              + COALESCE((SELECT SUM(LENGTH(message))
                          FROM notifications WHERE conversation_id = ?1), 0)
            ) / ?8,
            'active', ?6, ?6
        )
        ON CONFLICT(id) DO UPDATE SET
            project_path = COALESCE(excluded.project_path, conversations.project_path),
            model_provider = CASE WHEN excluded.model_provider = ?7
                                  THEN conversations.model_provider
                                  ELSE excluded.model_provider END,
            model_name = CASE WHEN excluded.model_name = ?7
                              THEN conversations.model_name
                              ELSE excluded.model_name END,
            started_at = MIN(conversations.started_at, excluded.started_at),
            last_activity_at = MAX(conversations.last_activity_at, excluded.last_activity_at),
            total_commands = excluded.total_commands,
            total_shell_commands = excluded.total_shell_commands,
            total_tokens = MAX(conversations.total_tokens, excluded.total_tokens),
            status = 'active',
            updated_at = excluded.updated_at
        "#,
        params![
            conversation_id,
            cwd,
            model_provider,
            model_name,
            at,
            now,
            UNKNOWN_MODEL,
            CHARS_PER_TOKEN
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::run_migrations;
    use chrono::TimeZone;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn stat_row(conn: &Connection, name: &str) -> (i64, i64, i64, f64) {
        conn.query_row(
            "SELECT execution_count, success_count, failure_count, avg_duration_ms
             FROM command_stats WHERE command_type = 'shell' AND command_name = ?",
            [name],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap()
    }

    #[test]
    fn test_first_execution_inserts() {
        let conn = conn();
        upsert_command_stat(&conn, CommandType::Shell, "git", true, Some(120), &Utc::now())
            .unwrap();
        assert_eq!(stat_row(&conn, "git"), (1, 1, 0, 120.0));
    }

    #[test]
    fn test_running_average_is_the_mean() {
        let conn = conn();
        let durations = [Some(100), Some(200), None, Some(50), Some(650)];
        for (i, d) in durations.iter().enumerate() {
            upsert_command_stat(&conn, CommandType::Shell, "cargo", i % 2 == 0, *d, &Utc::now())
                .unwrap();
        }

        let (exec, ok, failed, avg) = stat_row(&conn, "cargo");
        assert_eq!(exec, 5);
        assert_eq!(ok + failed, exec);
        assert_eq!(ok, 3);
        assert!((avg - 200.0).abs() < 1e-9, "avg was {}", avg);
    }

    #[test]
    fn test_stats_keyed_by_type() {
        let conn = conn();
        let now = Utc::now();
        upsert_command_stat(&conn, CommandType::Shell, "Bash", true, None, &now).unwrap();
        upsert_command_stat(&conn, CommandType::Claude, "Bash", false, None, &now).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM command_stats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_conversation_totals_recomputed() {
        let conn = conn();
        let at = to_db_time(&Utc::now());
        for _ in 0..3 {
            conn.execute(
                "INSERT INTO shell_commands (conversation_id, command, executed_at, created_at)
                 VALUES ('c1', 'ls', ?1, ?1)",
                [&at],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO claude_commands (conversation_id, tool_name, success, executed_at, created_at)
             VALUES ('c1', 'Read', 1, ?1, ?1)",
            [&at],
        )
        .unwrap();

        refresh_conversation(&conn, "c1", "/work", "anthropic", "opus", &Utc::now()).unwrap();
        // a second refresh must not double count
        refresh_conversation(&conn, "c1", "", UNKNOWN_MODEL, UNKNOWN_MODEL, &Utc::now())
            .unwrap();

        let (commands, shell, path, model): (i64, i64, Option<String>, String) = conn
            .query_row(
                "SELECT total_commands, total_shell_commands, project_path, model_name
                 FROM conversations WHERE id = 'c1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(commands, 1);
        assert_eq!(shell, 3);
        assert_eq!(path.as_deref(), Some("/work"));
        assert_eq!(model, "opus");
    }

    fn tokens(conn: &Connection, id: &str) -> i64 {
        conn.query_row(
            "SELECT total_tokens FROM conversations WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_tokens_estimated_from_stored_text() {
        let conn = conn();
        let at = to_db_time(&Utc::now());
        // 40 characters of prompt
        conn.execute(
            "INSERT INTO user_messages (conversation_id, message, message_length, submitted_at, created_at)
             VALUES ('c', ?1, 40, ?2, ?2)",
            params!["x".repeat(40), at],
        )
        .unwrap();
        refresh_conversation(&conn, "c", "", UNKNOWN_MODEL, UNKNOWN_MODEL, &Utc::now()).unwrap();
        assert_eq!(tokens(&conn, "c"), 10);

        // "cargo build" + 9 chars of stdout = 20 characters
        conn.execute(
            "INSERT INTO shell_commands (conversation_id, command, stdout, executed_at, created_at)
             VALUES ('c', 'cargo build', 'Compiling', ?1, ?1)",
            [&at],
        )
        .unwrap();
        refresh_conversation(&conn, "c", "", UNKNOWN_MODEL, UNKNOWN_MODEL, &Utc::now()).unwrap();
        assert_eq!(tokens(&conn, "c"), 15);
    }

    #[test]
    fn test_reported_tokens_are_not_lowered_by_estimate() {
        let conn = conn();
        refresh_conversation(&conn, "c", "", UNKNOWN_MODEL, UNKNOWN_MODEL, &Utc::now()).unwrap();
        assert_eq!(tokens(&conn, "c"), 0);

        conn.execute("UPDATE conversations SET total_tokens = 5000 WHERE id = 'c'", [])
            .unwrap();
        refresh_conversation(&conn, "c", "", UNKNOWN_MODEL, UNKNOWN_MODEL, &Utc::now()).unwrap();
        assert_eq!(tokens(&conn, "c"), 5000);
    }

    #[test]
    fn test_activity_window_only_widens() {
        let conn = conn();
        let early = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap();
        let middle = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        for at in [middle, late, early, middle] {
            refresh_conversation(&conn, "c", "", UNKNOWN_MODEL, UNKNOWN_MODEL, &at).unwrap();
        }

        let (started, last): (String, String) = conn
            .query_row(
                "SELECT started_at, last_activity_at FROM conversations WHERE id = 'c'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(started, to_db_time(&early));
        assert_eq!(last, to_db_time(&late));
    }
}
