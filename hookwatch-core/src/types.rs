//! Core domain types for hookwatch
//!
//! These types mirror the persisted tables. Every event row belongs to a
//! conversation (the assistant's opaque session id) and carries a display
//! session name derived from it (see [`crate::naming`]).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Conversation** | One logical session between a human and the assistant |
//! | **Shell command** | A command line the assistant ran through its shell tool |
//! | **Claude command** | Any tool invocation (Read, Edit, Bash, ...) |
//! | **User message** | A prompt the human submitted |
//! | **Notification** | A permission request or idle alert raised by the assistant |
//! | **Command stat** | Rolling counters keyed by command type and name |

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder stored when a producer does not report model information.
pub const UNKNOWN_MODEL: &str = "Unknown";

// ============================================
// Timestamps
// ============================================

/// Formats a timestamp for storage.
///
/// Fixed-width RFC 3339 with microseconds and a `Z` suffix, so lexical
/// ordering in SQL matches chronological ordering.
pub fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp, falling back to the epoch on malformed input.
pub fn from_db_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

// ============================================
// Command types
// ============================================

/// Which family a [`CommandStat`] row aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Shell command lines, keyed by program name
    Shell,
    /// Tool invocations, keyed by tool name
    Claude,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Shell => "shell",
            CommandType::Claude => "claude",
        }
    }
}

impl std::str::FromStr for CommandType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shell" => Ok(CommandType::Shell),
            "claude" => Ok(CommandType::Claude),
            _ => Err(format!("unknown command type: {}", s)),
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Events
// ============================================

/// A shell command executed by the assistant.
///
/// Immutable once inserted; removed only by a bulk history clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellCommand {
    /// Row id (0 before insert)
    pub id: i64,
    pub conversation_id: String,
    pub session_name: Option<String>,
    pub command: String,
    pub description: Option<String>,
    pub working_directory: String,
    pub git_branch: Option<String>,
    pub model_provider: String,
    pub model_name: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: Option<i64>,
    pub executed_at: DateTime<Utc>,
    /// Row creation time (assigned by the repository)
    pub created_at: DateTime<Utc>,
}

impl ShellCommand {
    /// A missing exit code counts as success.
    pub fn succeeded(&self) -> bool {
        self.exit_code.map_or(true, |code| code == 0)
    }
}

/// A tool invocation made by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeCommand {
    /// Row id (0 before insert)
    pub id: i64,
    pub conversation_id: String,
    pub session_name: Option<String>,
    pub tool_name: String,
    /// Serialized JSON parameters
    pub parameters: String,
    /// Serialized JSON result
    pub result: String,
    pub working_directory: String,
    pub git_branch: Option<String>,
    pub model_provider: String,
    pub model_name: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub executed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A prompt submitted by the human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Row id (0 before insert)
    pub id: i64,
    pub conversation_id: String,
    pub session_name: Option<String>,
    pub message: String,
    pub working_directory: String,
    pub git_branch: Option<String>,
    pub model_provider: String,
    pub model_name: String,
    /// Length of `message` in characters
    pub message_length: i64,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Category of a captured notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// The assistant is asking to use a tool
    PermissionRequest,
    /// The assistant is waiting for human input
    IdleAlert,
    /// Anything else
    Other,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::PermissionRequest => "permission_request",
            NotificationType::IdleAlert => "idle_alert",
            NotificationType::Other => "other",
        }
    }

    /// Lenient parse used for stored rows and producer hints.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(NotificationType::Other)
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permission_request" => Ok(NotificationType::PermissionRequest),
            "idle_alert" => Ok(NotificationType::IdleAlert),
            "other" => Ok(NotificationType::Other),
            _ => Err(format!("unknown notification type: {}", s)),
        }
    }
}

/// A permission request or idle alert raised during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Row id (0 before insert)
    pub id: i64,
    pub conversation_id: String,
    pub session_name: Option<String>,
    pub notification_type: NotificationType,
    pub message: String,
    pub tool_name: Option<String>,
    /// Free-form extra detail (e.g. the command awaiting approval)
    pub command_details: Option<String>,
    pub working_directory: String,
    pub git_branch: Option<String>,
    pub model_provider: String,
    pub model_name: String,
    pub notified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Aggregates
// ============================================

/// Lifecycle status of a conversation aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Archived,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "archived" => Ok(ConversationStatus::Archived),
            _ => Err(format!("unknown conversation status: {}", s)),
        }
    }
}

/// Per-conversation totals.
///
/// Command totals are always recomputed with `COUNT(*)` over the child
/// tables, never incremented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub project_path: Option<String>,
    pub model_provider: String,
    pub model_name: String,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Tool invocations recorded for this conversation
    pub total_commands: i64,
    /// Shell commands recorded for this conversation
    pub total_shell_commands: i64,
    pub total_tokens: i64,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rolling execution statistics for one (type, name) key.
///
/// Invariant: `success_count + failure_count == execution_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStat {
    pub id: i64,
    pub command_type: CommandType,
    pub command_name: String,
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    /// Arithmetic mean of every recorded duration (missing durations count as 0)
    pub avg_duration_ms: f64,
    pub last_executed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_time_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1500);
        assert_eq!(to_db_time(&a), "2025-01-02T03:04:05.000000Z");
        assert_eq!(to_db_time(&a).len(), to_db_time(&b).len());
        assert!(to_db_time(&a) < to_db_time(&b));
        assert_eq!(from_db_time(&to_db_time(&b)), b);
    }

    #[test]
    fn test_notification_type_lenient_parse() {
        assert_eq!(
            NotificationType::parse_lenient("permission_request"),
            NotificationType::PermissionRequest
        );
        assert_eq!(
            NotificationType::parse_lenient("something_new"),
            NotificationType::Other
        );
    }

    #[test]
    fn test_shell_command_success_defaults_true() {
        let now = Utc::now();
        let mut cmd = ShellCommand {
            id: 0,
            conversation_id: "c".to_string(),
            session_name: None,
            command: "ls".to_string(),
            description: None,
            working_directory: "/tmp".to_string(),
            git_branch: None,
            model_provider: UNKNOWN_MODEL.to_string(),
            model_name: UNKNOWN_MODEL.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: None,
            executed_at: now,
            created_at: now,
        };
        assert!(cmd.succeeded());
        cmd.exit_code = Some(2);
        assert!(!cmd.succeeded());
    }
}
