//! Repository: every read and write of the event and aggregate tables
//!
//! Inserts are synchronous and return the new row id. The aggregate updates an
//! insert implies (conversation totals, command stats) are handed to the
//! [`AggregateQueue`] and applied in the background.

use super::Database;
use crate::error::{Error, Result};
use crate::stats::{AggregateJob, AggregateQueue};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of prompts included in a session resume
const RESUME_PROMPTS: usize = 10;

/// Filters and pagination shared by every history query.
///
/// Filters that do not apply to a table (e.g. `tool_name` on prompts) exclude
/// that table from the unified feed and are ignored by its own getter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub conversation_id: Option<String>,
    pub tool_name: Option<String>,
    pub notification_type: Option<NotificationType>,
    /// Inclusive lower bound on the event time
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the event time
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Kind tag of a [`HistoryItem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Shell,
    Claude,
    Prompt,
    Notification,
}

/// Full row behind a [`HistoryItem`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HistoryContent {
    Shell(ShellCommand),
    Claude(ClaudeCommand),
    Prompt(UserMessage),
    Notification(Notification),
}

/// One entry of the unified history feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub id: i64,
    pub conversation_id: String,
    pub session_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub working_directory: String,
    pub git_branch: Option<String>,
    pub content: HistoryContent,
}

impl From<ShellCommand> for HistoryItem {
    fn from(cmd: ShellCommand) -> Self {
        Self {
            kind: HistoryKind::Shell,
            id: cmd.id,
            conversation_id: cmd.conversation_id.clone(),
            session_name: cmd.session_name.clone(),
            timestamp: cmd.executed_at,
            working_directory: cmd.working_directory.clone(),
            git_branch: cmd.git_branch.clone(),
            content: HistoryContent::Shell(cmd),
        }
    }
}

impl From<ClaudeCommand> for HistoryItem {
    fn from(cmd: ClaudeCommand) -> Self {
        Self {
            kind: HistoryKind::Claude,
            id: cmd.id,
            conversation_id: cmd.conversation_id.clone(),
            session_name: cmd.session_name.clone(),
            timestamp: cmd.executed_at,
            working_directory: cmd.working_directory.clone(),
            git_branch: cmd.git_branch.clone(),
            content: HistoryContent::Claude(cmd),
        }
    }
}

impl From<UserMessage> for HistoryItem {
    fn from(msg: UserMessage) -> Self {
        Self {
            kind: HistoryKind::Prompt,
            id: msg.id,
            conversation_id: msg.conversation_id.clone(),
            session_name: msg.session_name.clone(),
            timestamp: msg.submitted_at,
            working_directory: msg.working_directory.clone(),
            git_branch: msg.git_branch.clone(),
            content: HistoryContent::Prompt(msg),
        }
    }
}

impl From<Notification> for HistoryItem {
    fn from(n: Notification) -> Self {
        Self {
            kind: HistoryKind::Notification,
            id: n.id,
            conversation_id: n.conversation_id.clone(),
            session_name: n.session_name.clone(),
            timestamp: n.notified_at,
            working_directory: n.working_directory.clone(),
            git_branch: n.git_branch.clone(),
            content: HistoryContent::Notification(n),
        }
    }
}

/// Notification counters for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationStats {
    pub total: i64,
    pub permission_requests: i64,
    pub idle_alerts: i64,
    /// Tool named most often in permission requests
    pub most_requested_tool: Option<String>,
    pub most_requested_tool_count: i64,
}

/// Prompt counters for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromptStats {
    pub total_prompts: i64,
    /// Mean prompt length in characters, truncated
    pub avg_prompt_length: i64,
    pub unique_conversations: i64,
    pub unique_branches: i64,
}

/// One conversation seen in the prompt log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub conversation_id: String,
    pub session_name: Option<String>,
    pub prompt_count: i64,
    /// Most recent non-empty working directory
    pub working_directory: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// What a client needs to pick a session back up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResume {
    pub conversation_id: String,
    pub session_name: Option<String>,
    pub working_directory: Option<String>,
    /// Recent prompts rendered as plain text
    pub context: String,
    pub total_prompts: i64,
    pub last_activity: DateTime<Utc>,
    /// Most recent prompts, oldest first
    pub messages: Vec<UserMessage>,
}

/// Raw cumulative totals across all conversations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityTotals {
    pub total_tokens: i64,
    pub total_conversations: i64,
    pub active_conversations: i64,
}

/// Outcome of a bulk history clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryClearReport {
    pub rows_deleted: usize,
    pub size_before: u64,
    pub size_after: u64,
    pub vacuumed: bool,
}

/// SQLite integers are signed 64-bit; larger page bounds mean "everything".
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Derive the command family used for statistics: the first
/// whitespace-delimited token (`"git status"` → `"git"`).
pub fn extract_command_name(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn model_or_unknown(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() {
        UNKNOWN_MODEL
    } else {
        value
    }
}

/// Description of one event table for the shared history query builder
struct EventTable {
    name: &'static str,
    time_column: &'static str,
    has_tool: bool,
    has_type: bool,
}

const SHELL_COMMANDS: EventTable = EventTable {
    name: "shell_commands",
    time_column: "executed_at",
    has_tool: false,
    has_type: false,
};

const CLAUDE_COMMANDS: EventTable = EventTable {
    name: "claude_commands",
    time_column: "executed_at",
    has_tool: true,
    has_type: false,
};

const USER_MESSAGES: EventTable = EventTable {
    name: "user_messages",
    time_column: "submitted_at",
    has_tool: false,
    has_type: false,
};

const NOTIFICATIONS: EventTable = EventTable {
    name: "notifications",
    time_column: "notified_at",
    has_tool: true,
    has_type: true,
};

impl EventTable {
    /// Whether every filter in `query` can be evaluated against this table
    fn supports(&self, query: &HistoryQuery) -> bool {
        (query.tool_name.is_none() || self.has_tool)
            && (query.notification_type.is_none() || self.has_type)
    }

    fn select(&self, query: &HistoryQuery) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = format!("SELECT * FROM {} WHERE 1=1", self.name);
        let mut params: Vec<Box<dyn ToSql>> = vec![];

        if let Some(conversation_id) = &query.conversation_id {
            sql.push_str(" AND conversation_id = ?");
            params.push(Box::new(conversation_id.clone()));
        }

        if let (true, Some(tool_name)) = (self.has_tool, &query.tool_name) {
            sql.push_str(" AND tool_name = ?");
            params.push(Box::new(tool_name.clone()));
        }

        if let (true, Some(kind)) = (self.has_type, &query.notification_type) {
            sql.push_str(" AND notification_type = ?");
            params.push(Box::new(kind.as_str().to_string()));
        }

        if let Some(since) = &query.since {
            sql.push_str(&format!(" AND {} >= ?", self.time_column));
            params.push(Box::new(to_db_time(since)));
        }

        if let Some(until) = &query.until {
            sql.push_str(&format!(" AND {} <= ?", self.time_column));
            params.push(Box::new(to_db_time(until)));
        }

        sql.push_str(&format!(" ORDER BY {} DESC, id DESC", self.time_column));

        match (query.limit, query.offset) {
            (Some(limit), offset) => sql.push_str(&format!(
                " LIMIT {} OFFSET {}",
                sql_count(limit),
                sql_count(offset.unwrap_or(0))
            )),
            (None, Some(offset)) => {
                sql.push_str(&format!(" LIMIT -1 OFFSET {}", sql_count(offset)))
            }
            (None, None) => {}
        }

        (sql, params)
    }
}

/// Repository over a shared [`Database`]
///
/// Cheap to clone; clones share the database and the aggregate queue.
#[derive(Clone)]
pub struct Repository {
    db: Arc<Database>,
    queue: AggregateQueue,
}

impl Repository {
    pub fn new(db: Arc<Database>, queue: AggregateQueue) -> Self {
        Self { db, queue }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn queue(&self) -> &AggregateQueue {
        &self.queue
    }

    fn schedule_conversation(
        &self,
        conversation_id: &str,
        cwd: &str,
        model_provider: &str,
        model_name: &str,
        at: DateTime<Utc>,
    ) {
        self.queue.enqueue(AggregateJob::ConversationTotals {
            conversation_id: conversation_id.to_string(),
            cwd: cwd.to_string(),
            model_provider: model_or_unknown(model_provider).to_string(),
            model_name: model_or_unknown(model_name).to_string(),
            at,
        });
    }

    fn query_events<T>(
        &self,
        table: &EventTable,
        query: &HistoryQuery,
        map: fn(&Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let (sql, params) = table.select(query);
        self.db.read(|conn| {
            let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_refs.as_slice(), map)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // ============================================
    // Shell commands
    // ============================================

    /// Insert a shell command and schedule its aggregates
    pub fn record_shell_command(&self, cmd: &ShellCommand) -> Result<i64> {
        let created_at = to_db_time(&Utc::now());
        let id = self.db.write(|conn| {
            conn.execute(
                r#"
                INSERT INTO shell_commands (
                    conversation_id, session_name, command, description, working_directory,
                    git_branch, model_provider, model_name, exit_code, stdout, stderr,
                    duration_ms, executed_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    cmd.conversation_id,
                    cmd.session_name,
                    cmd.command,
                    cmd.description,
                    cmd.working_directory,
                    cmd.git_branch,
                    model_or_unknown(&cmd.model_provider),
                    model_or_unknown(&cmd.model_name),
                    cmd.exit_code,
                    cmd.stdout,
                    cmd.stderr,
                    cmd.duration_ms,
                    to_db_time(&cmd.executed_at),
                    created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        tracing::debug!(id, conversation_id = %cmd.conversation_id, "Recorded shell command");

        self.schedule_conversation(
            &cmd.conversation_id,
            &cmd.working_directory,
            &cmd.model_provider,
            &cmd.model_name,
            cmd.executed_at,
        );

        let command_name = extract_command_name(&cmd.command);
        if !command_name.is_empty() {
            self.queue.enqueue(AggregateJob::CommandStat {
                command_type: CommandType::Shell,
                command_name,
                success: cmd.succeeded(),
                duration_ms: cmd.duration_ms,
                at: cmd.executed_at,
            });
        }

        Ok(id)
    }

    /// Shell commands, newest first
    pub fn get_shell_commands(&self, query: &HistoryQuery) -> Result<Vec<ShellCommand>> {
        self.query_events(&SHELL_COMMANDS, query, Self::row_to_shell_command)
    }

    fn row_to_shell_command(row: &Row) -> rusqlite::Result<ShellCommand> {
        Ok(ShellCommand {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            session_name: row.get("session_name")?,
            command: row.get("command")?,
            description: row.get("description")?,
            working_directory: row.get("working_directory")?,
            git_branch: row.get("git_branch")?,
            model_provider: row.get("model_provider")?,
            model_name: row.get("model_name")?,
            exit_code: row.get("exit_code")?,
            stdout: row.get("stdout")?,
            stderr: row.get("stderr")?,
            duration_ms: row.get("duration_ms")?,
            executed_at: from_db_time(&row.get::<_, String>("executed_at")?),
            created_at: from_db_time(&row.get::<_, String>("created_at")?),
        })
    }

    // ============================================
    // Tool invocations
    // ============================================

    /// Insert a tool invocation and schedule its aggregates
    pub fn record_claude_command(&self, cmd: &ClaudeCommand) -> Result<i64> {
        let created_at = to_db_time(&Utc::now());
        let id = self.db.write(|conn| {
            conn.execute(
                r#"
                INSERT INTO claude_commands (
                    conversation_id, session_name, tool_name, parameters, result,
                    working_directory, git_branch, model_provider, model_name, success,
                    error_message, duration_ms, executed_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    cmd.conversation_id,
                    cmd.session_name,
                    cmd.tool_name,
                    cmd.parameters,
                    cmd.result,
                    cmd.working_directory,
                    cmd.git_branch,
                    model_or_unknown(&cmd.model_provider),
                    model_or_unknown(&cmd.model_name),
                    cmd.success,
                    cmd.error_message,
                    cmd.duration_ms,
                    to_db_time(&cmd.executed_at),
                    created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        tracing::debug!(
            id,
            conversation_id = %cmd.conversation_id,
            tool = %cmd.tool_name,
            "Recorded tool invocation"
        );

        self.schedule_conversation(
            &cmd.conversation_id,
            &cmd.working_directory,
            &cmd.model_provider,
            &cmd.model_name,
            cmd.executed_at,
        );
        self.queue.enqueue(AggregateJob::CommandStat {
            command_type: CommandType::Claude,
            command_name: cmd.tool_name.clone(),
            success: cmd.success,
            duration_ms: cmd.duration_ms,
            at: cmd.executed_at,
        });

        Ok(id)
    }

    /// Tool invocations, newest first
    pub fn get_claude_commands(&self, query: &HistoryQuery) -> Result<Vec<ClaudeCommand>> {
        self.query_events(&CLAUDE_COMMANDS, query, Self::row_to_claude_command)
    }

    fn row_to_claude_command(row: &Row) -> rusqlite::Result<ClaudeCommand> {
        Ok(ClaudeCommand {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            session_name: row.get("session_name")?,
            tool_name: row.get("tool_name")?,
            parameters: row.get("parameters")?,
            result: row.get("result")?,
            working_directory: row.get("working_directory")?,
            git_branch: row.get("git_branch")?,
            model_provider: row.get("model_provider")?,
            model_name: row.get("model_name")?,
            success: row.get("success")?,
            error_message: row.get("error_message")?,
            duration_ms: row.get("duration_ms")?,
            executed_at: from_db_time(&row.get::<_, String>("executed_at")?),
            created_at: from_db_time(&row.get::<_, String>("created_at")?),
        })
    }

    // ============================================
    // Prompts
    // ============================================

    /// Insert a prompt and schedule the conversation refresh
    pub fn record_user_message(&self, msg: &UserMessage) -> Result<i64> {
        let created_at = to_db_time(&Utc::now());
        let id = self.db.write(|conn| {
            conn.execute(
                r#"
                INSERT INTO user_messages (
                    conversation_id, session_name, message, working_directory, git_branch,
                    model_provider, model_name, message_length, submitted_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    msg.conversation_id,
                    msg.session_name,
                    msg.message,
                    msg.working_directory,
                    msg.git_branch,
                    model_or_unknown(&msg.model_provider),
                    model_or_unknown(&msg.model_name),
                    msg.message_length,
                    to_db_time(&msg.submitted_at),
                    created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        tracing::debug!(id, conversation_id = %msg.conversation_id, "Recorded prompt");

        self.schedule_conversation(
            &msg.conversation_id,
            &msg.working_directory,
            &msg.model_provider,
            &msg.model_name,
            msg.submitted_at,
        );

        Ok(id)
    }

    /// Prompts, newest first
    pub fn get_user_messages(&self, query: &HistoryQuery) -> Result<Vec<UserMessage>> {
        self.query_events(&USER_MESSAGES, query, Self::row_to_user_message)
    }

    fn row_to_user_message(row: &Row) -> rusqlite::Result<UserMessage> {
        Ok(UserMessage {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            session_name: row.get("session_name")?,
            message: row.get("message")?,
            working_directory: row.get("working_directory")?,
            git_branch: row.get("git_branch")?,
            model_provider: row.get("model_provider")?,
            model_name: row.get("model_name")?,
            message_length: row.get("message_length")?,
            submitted_at: from_db_time(&row.get::<_, String>("submitted_at")?),
            created_at: from_db_time(&row.get::<_, String>("created_at")?),
        })
    }

    /// Aggregate prompt counters
    pub fn get_prompt_stats(&self) -> Result<PromptStats> {
        self.db.read(|conn| {
            Ok(conn.query_row(
                r#"
                SELECT COUNT(*),
                       CAST(COALESCE(AVG(message_length), 0) AS INTEGER),
                       COUNT(DISTINCT NULLIF(conversation_id, '')),
                       COUNT(DISTINCT NULLIF(git_branch, ''))
                FROM user_messages
                "#,
                [],
                |r| {
                    Ok(PromptStats {
                        total_prompts: r.get(0)?,
                        avg_prompt_length: r.get(1)?,
                        unique_conversations: r.get(2)?,
                        unique_branches: r.get(3)?,
                    })
                },
            )?)
        })
    }

    /// One row per conversation seen in the prompt log, most recent first
    pub fn get_unique_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT m.conversation_id,
                       COUNT(*) AS prompt_count,
                       MAX(m.submitted_at) AS last_activity,
                       (SELECT s.session_name FROM user_messages s
                         WHERE s.conversation_id = m.conversation_id
                           AND s.session_name IS NOT NULL AND s.session_name <> ''
                         ORDER BY s.submitted_at DESC, s.id DESC LIMIT 1) AS session_name,
                       (SELECT w.working_directory FROM user_messages w
                         WHERE w.conversation_id = m.conversation_id
                           AND w.working_directory <> ''
                         ORDER BY w.submitted_at DESC, w.id DESC LIMIT 1) AS working_directory
                FROM user_messages m
                GROUP BY m.conversation_id
                ORDER BY last_activity DESC
                "#,
            )?;
            let sessions = stmt
                .query_map([], |row| {
                    Ok(SessionSummary {
                        conversation_id: row.get("conversation_id")?,
                        session_name: row.get("session_name")?,
                        prompt_count: row.get("prompt_count")?,
                        working_directory: row.get("working_directory")?,
                        last_activity: from_db_time(&row.get::<_, String>("last_activity")?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
    }

    /// Resume data for one conversation, `None` when it has no prompts
    pub fn get_session_resume(&self, conversation_id: &str) -> Result<Option<SessionResume>> {
        let query = HistoryQuery {
            conversation_id: Some(conversation_id.to_string()),
            limit: Some(RESUME_PROMPTS),
            ..Default::default()
        };
        let mut messages = self.get_user_messages(&query)?;
        if messages.is_empty() {
            return Ok(None);
        }
        messages.reverse();

        let total_prompts: i64 = self.db.read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM user_messages WHERE conversation_id = ?",
                [conversation_id],
                |r| r.get(0),
            )?)
        })?;

        let working_directory = messages
            .iter()
            .rev()
            .map(|m| m.working_directory.as_str())
            .find(|wd| !wd.is_empty())
            .map(String::from);
        let session_name = messages.iter().rev().find_map(|m| m.session_name.clone());
        let last_activity = messages
            .last()
            .map(|m| m.submitted_at)
            .unwrap_or_default();

        let mut context = String::from("Previous conversation history:\n\n");
        for msg in &messages {
            context.push_str(&format!("User: {}\n", msg.message));
            context.push_str(&format!("(at {})\n\n", msg.submitted_at.format("%-I:%M %p")));
        }

        Ok(Some(SessionResume {
            conversation_id: conversation_id.to_string(),
            session_name,
            working_directory,
            context,
            total_prompts,
            last_activity,
            messages,
        }))
    }

    // ============================================
    // Notifications
    // ============================================

    /// Insert a notification and schedule the conversation refresh
    pub fn record_notification(&self, n: &Notification) -> Result<i64> {
        let created_at = to_db_time(&Utc::now());
        let id = self.db.write(|conn| {
            conn.execute(
                r#"
                INSERT INTO notifications (
                    conversation_id, session_name, notification_type, message, tool_name,
                    command_details, working_directory, git_branch, model_provider,
                    model_name, notified_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    n.conversation_id,
                    n.session_name,
                    n.notification_type.as_str(),
                    n.message,
                    n.tool_name,
                    n.command_details,
                    n.working_directory,
                    n.git_branch,
                    model_or_unknown(&n.model_provider),
                    model_or_unknown(&n.model_name),
                    to_db_time(&n.notified_at),
                    created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        tracing::debug!(
            id,
            conversation_id = %n.conversation_id,
            kind = n.notification_type.as_str(),
            "Recorded notification"
        );

        self.schedule_conversation(
            &n.conversation_id,
            &n.working_directory,
            &n.model_provider,
            &n.model_name,
            n.notified_at,
        );

        Ok(id)
    }

    /// Notifications, newest first
    pub fn get_notifications(&self, query: &HistoryQuery) -> Result<Vec<Notification>> {
        self.query_events(&NOTIFICATIONS, query, Self::row_to_notification)
    }

    fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
        let kind: String = row.get("notification_type")?;
        Ok(Notification {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            session_name: row.get("session_name")?,
            notification_type: NotificationType::parse_lenient(&kind),
            message: row.get("message")?,
            tool_name: row.get("tool_name")?,
            command_details: row.get("command_details")?,
            working_directory: row.get("working_directory")?,
            git_branch: row.get("git_branch")?,
            model_provider: row.get("model_provider")?,
            model_name: row.get("model_name")?,
            notified_at: from_db_time(&row.get::<_, String>("notified_at")?),
            created_at: from_db_time(&row.get::<_, String>("created_at")?),
        })
    }

    /// Permission/idle totals and the most requested tool
    pub fn get_notification_stats(&self) -> Result<NotificationStats> {
        self.db.read(|conn| {
            let (total, permission_requests, idle_alerts) = conn.query_row(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(notification_type = 'permission_request'), 0),
                       COALESCE(SUM(notification_type = 'idle_alert'), 0)
                FROM notifications
                "#,
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;

            let top: Option<(String, i64)> = conn
                .query_row(
                    r#"
                    SELECT tool_name, COUNT(*) AS requests
                    FROM notifications
                    WHERE notification_type = 'permission_request'
                      AND tool_name IS NOT NULL AND tool_name <> ''
                    GROUP BY tool_name
                    ORDER BY requests DESC, tool_name ASC
                    LIMIT 1
                    "#,
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;

            let (most_requested_tool, most_requested_tool_count) = match top {
                Some((tool, count)) => (Some(tool), count),
                None => (None, 0),
            };

            Ok(NotificationStats {
                total,
                permission_requests,
                idle_alerts,
                most_requested_tool,
                most_requested_tool_count,
            })
        })
    }

    /// Remove every notification. Returns the number of rows deleted.
    pub fn delete_all_notifications(&self) -> Result<usize> {
        let deleted = self
            .db
            .write(|conn| Ok(conn.execute("DELETE FROM notifications", [])?))?;
        tracing::info!(deleted, "Deleted all notifications");
        Ok(deleted)
    }

    // ============================================
    // Unified feed
    // ============================================

    /// All four event kinds merged into one newest-first feed.
    ///
    /// Each table is read up to `offset + limit` rows, then the merged feed is
    /// paginated, so pages are consistent across kinds.
    pub fn get_all_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryItem>> {
        let offset = query.offset.unwrap_or(0);
        let window = HistoryQuery {
            limit: query.limit.map(|limit| limit.saturating_add(offset)),
            offset: None,
            ..query.clone()
        };

        let mut items: Vec<HistoryItem> = Vec::new();
        if SHELL_COMMANDS.supports(query) {
            items.extend(self.get_shell_commands(&window)?.into_iter().map(HistoryItem::from));
        }
        if CLAUDE_COMMANDS.supports(query) {
            items.extend(self.get_claude_commands(&window)?.into_iter().map(HistoryItem::from));
        }
        if USER_MESSAGES.supports(query) {
            items.extend(self.get_user_messages(&window)?.into_iter().map(HistoryItem::from));
        }
        if NOTIFICATIONS.supports(query) {
            items.extend(self.get_notifications(&window)?.into_iter().map(HistoryItem::from));
        }

        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        Ok(items
            .into_iter()
            .skip(offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    // ============================================
    // Command stats
    // ============================================

    /// Command stats ordered by execution count, optionally for one type
    pub fn get_command_stats(
        &self,
        command_type: Option<CommandType>,
        limit: Option<usize>,
    ) -> Result<Vec<CommandStat>> {
        let mut sql = String::from("SELECT * FROM command_stats WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = vec![];

        if let Some(command_type) = command_type {
            sql.push_str(" AND command_type = ?");
            params.push(Box::new(command_type.as_str().to_string()));
        }

        sql.push_str(" ORDER BY execution_count DESC, command_name ASC");

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", sql_count(limit)));
        }

        self.db.read(|conn| {
            let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let stats = stmt
                .query_map(params_refs.as_slice(), Self::row_to_command_stat)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(stats)
        })
    }

    fn row_to_command_stat(row: &Row) -> rusqlite::Result<CommandStat> {
        let command_type: String = row.get("command_type")?;
        Ok(CommandStat {
            id: row.get("id")?,
            command_type: command_type.parse().unwrap_or(CommandType::Shell),
            command_name: row.get("command_name")?,
            execution_count: row.get("execution_count")?,
            success_count: row.get("success_count")?,
            failure_count: row.get("failure_count")?,
            avg_duration_ms: row.get("avg_duration_ms")?,
            last_executed_at: from_db_time(&row.get::<_, String>("last_executed_at")?),
            created_at: from_db_time(&row.get::<_, String>("created_at")?),
            updated_at: from_db_time(&row.get::<_, String>("updated_at")?),
        })
    }

    // ============================================
    // Conversations
    // ============================================

    /// Get a conversation aggregate by id
    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.db.read(|conn| {
            conn.query_row(
                "SELECT * FROM conversations WHERE id = ?",
                [id],
                Self::row_to_conversation,
            )
            .optional()
            .map_err(Error::from)
        })
    }

    /// All conversation aggregates, most recently active first
    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.db.read(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM conversations ORDER BY last_activity_at DESC, id")?;
            let conversations = stmt
                .query_map([], Self::row_to_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
    }

    fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
        let status: String = row.get("status")?;
        Ok(Conversation {
            id: row.get("id")?,
            project_path: row.get("project_path")?,
            model_provider: row.get("model_provider")?,
            model_name: row.get("model_name")?,
            started_at: from_db_time(&row.get::<_, String>("started_at")?),
            last_activity_at: from_db_time(&row.get::<_, String>("last_activity_at")?),
            total_commands: row.get("total_commands")?,
            total_shell_commands: row.get("total_shell_commands")?,
            total_tokens: row.get("total_tokens")?,
            status: status.parse().unwrap_or(ConversationStatus::Active),
            created_at: from_db_time(&row.get::<_, String>("created_at")?),
            updated_at: from_db_time(&row.get::<_, String>("updated_at")?),
        })
    }

    /// Raw cumulative totals, before any reset baseline is applied
    pub fn get_activity_totals(&self) -> Result<ActivityTotals> {
        self.db.read(|conn| {
            Ok(conn.query_row(
                r#"
                SELECT COALESCE(SUM(total_tokens), 0),
                       COUNT(*),
                       COALESCE(SUM(status = 'active'), 0)
                FROM conversations
                "#,
                [],
                |r| {
                    Ok(ActivityTotals {
                        total_tokens: r.get(0)?,
                        total_conversations: r.get(1)?,
                        active_conversations: r.get(2)?,
                    })
                },
            )?)
        })
    }

    /// Record an externally computed token total on a conversation
    pub fn set_conversation_tokens(&self, id: &str, total_tokens: i64) -> Result<()> {
        let updated = self.db.write(|conn| {
            Ok(conn.execute(
                "UPDATE conversations SET total_tokens = ?1, updated_at = ?2 WHERE id = ?3",
                params![total_tokens, to_db_time(&Utc::now()), id],
            )?)
        })?;
        if updated == 0 {
            return Err(Error::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Mark every conversation archived. Returns the number affected.
    pub fn archive_conversations(&self) -> Result<usize> {
        let archived = self.db.write(|conn| {
            Ok(conn.execute(
                "UPDATE conversations SET status = 'archived', updated_at = ?1
                 WHERE status <> 'archived'",
                [to_db_time(&Utc::now())],
            )?)
        })?;
        tracing::info!(archived, "Archived conversations");
        Ok(archived)
    }

    /// Remove every conversation aggregate; event rows are kept.
    pub fn delete_conversations(&self) -> Result<usize> {
        let deleted = self
            .db
            .write(|conn| Ok(conn.execute("DELETE FROM conversations", [])?))?;
        tracing::info!(deleted, "Deleted conversation aggregates");
        Ok(deleted)
    }

    /// Delete every event row and aggregate, then reclaim disk space.
    ///
    /// A failed vacuum is logged and reported but does not fail the clear.
    pub fn delete_all_history(&self) -> Result<HistoryClearReport> {
        let size_before = self.db.size_bytes();

        let rows_deleted = self.db.transaction(|tx| {
            let mut deleted = 0;
            for table in [
                "shell_commands",
                "claude_commands",
                "user_messages",
                "notifications",
                "command_stats",
                "conversations",
            ] {
                deleted += tx.execute(&format!("DELETE FROM {}", table), [])?;
            }
            Ok(deleted)
        })?;

        let vacuumed = match self.db.vacuum() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Vacuum after history clear failed");
                false
            }
        };
        let size_after = self.db.size_bytes();

        tracing::info!(rows_deleted, size_before, size_after, "Cleared all history");

        Ok(HistoryClearReport {
            rows_deleted,
            size_before,
            size_after,
            vacuumed,
        })
    }
}
