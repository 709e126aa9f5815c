//! Ingestion service: validation → persistence → broadcast
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Hook scripts │ ──► │   Ingestor   │ ──► │  Repository  │ ──► AggregateQueue
//! │  (producers) │     │              │     └──────────────┘          │
//! └──────────────┘     │  classify    │                               ▼
//!                      │  naming      │ ──► Hub ◄──────────── stats_updated
//!                      └──────────────┘      │
//!                                            ▼
//!                                     dashboard clients
//! ```
//!
//! Producers are fire-and-forget: a payload missing its correlation fields is
//! discarded with [`IngestOutcome::Discarded`], never an error. Only a failure
//! to persist the primary row is returned as `Err`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hookwatch_core::{Config, Ingestor};
//! use hookwatch_core::ingest::ShellCommandRequest;
//!
//! let ingestor = Ingestor::open(&config, &Config::database_path(), &Config::reset_point_path())?;
//! let outcome = ingestor.record_shell_command(request)?;
//! ```

mod provider;
mod request;

pub use provider::{provider_for_url, resolve_provider};
pub use request::{NotificationRequest, PromptRequest, ShellCommandRequest, ToolInvocationRequest};

use request::{json_text, present};

use crate::broadcast::{EventKind, Hub};
use crate::classify::classify_with_hints;
use crate::config::Config;
use crate::db::{Database, HistoryClearReport, Repository};
use crate::error::{Error, Result};
use crate::naming::NameScheme;
use crate::process::{correlate, CorrelatedProcess, ProcessCorrelator, ProcessStats};
use crate::reset::{ResetPoint, ResetTracker};
use crate::stats::AggregateQueue;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_SOFT_RESET_REASON: &str = "Manual soft reset";

/// Result of handing one event to the [`Ingestor`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Persisted with this row id
    Recorded { id: i64 },
    /// Dropped because required correlation fields were missing
    Discarded { reason: &'static str },
}

impl IngestOutcome {
    pub fn id(&self) -> Option<i64> {
        match self {
            IngestOutcome::Recorded { id } => Some(*id),
            IngestOutcome::Discarded { .. } => None,
        }
    }
}

/// Displayed cumulative metrics, rebased by the reset baseline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_conversations: i64,
    pub active_conversations: i64,
    pub total_tokens: i64,
    pub avg_tokens: i64,
    pub reset_active: bool,
    pub reset_timestamp: Option<DateTime<Utc>>,
    pub reset_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Detected processes with their likely conversations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessReport {
    pub processes: Vec<CorrelatedProcess>,
    pub stats: ProcessStats,
}

/// Entry point for every producer event and dashboard admin action.
///
/// Owns the wiring between repository, broadcast hub, reset baseline and
/// process correlator. Cheap to share behind an `Arc`.
pub struct Ingestor {
    repo: Repository,
    hub: Hub,
    reset: ResetTracker,
    processes: ProcessCorrelator,
    names: NameScheme,
}

impl Ingestor {
    pub fn new(
        repo: Repository,
        hub: Hub,
        reset: ResetTracker,
        processes: ProcessCorrelator,
    ) -> Self {
        Self {
            repo,
            hub,
            reset,
            processes,
            names: NameScheme::V1,
        }
    }

    /// Open the database, run migrations and start the background pieces.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &Config, database_path: &Path, reset_path: &Path) -> Result<Self> {
        let db = Database::open(database_path)?;
        db.migrate()?;
        Self::with_database(config, Arc::new(db), reset_path)
    }

    /// Wire an ingestor around an already migrated database
    pub fn with_database(config: &Config, db: Arc<Database>, reset_path: &Path) -> Result<Self> {
        let hub = Hub::new(config.broadcast.subscriber_buffer);
        let queue = AggregateQueue::start(Arc::clone(&db), Some(hub.clone()), &config.aggregates)?;
        let reset = ResetTracker::load(reset_path)?;
        let processes = ProcessCorrelator::system(&config.process);
        Ok(Self::new(Repository::new(db, queue), hub, reset, processes))
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn reset_tracker(&self) -> &ResetTracker {
        &self.reset
    }

    pub fn process_correlator(&self) -> &ProcessCorrelator {
        &self.processes
    }

    /// Wait for background aggregate updates to land
    pub async fn settle(&self) {
        self.repo.queue().settle().await;
    }

    fn discard(&self, kind: &'static str, reason: &'static str) -> IngestOutcome {
        tracing::debug!(kind, reason, "Discarding incomplete event");
        IngestOutcome::Discarded { reason }
    }

    /// Producer-supplied session name, or the scheme's name for the id.
    fn session_name(&self, session_id: &str, provided: &Option<String>) -> String {
        let derived = self.names.name(session_id);
        match present(provided) {
            Some(name) => {
                if name != derived {
                    tracing::debug!(
                        session_id,
                        provided = name,
                        derived,
                        scheme = self.names.version,
                        hash_prefix = %NameScheme::hash_prefix(session_id),
                        "Producer session name differs from naming scheme"
                    );
                }
                name.to_string()
            }
            None => derived.to_string(),
        }
    }

    fn model(provider: &Option<String>, name: &Option<String>) -> (String, String) {
        let model_name = present(name).unwrap_or(UNKNOWN_MODEL).to_string();
        let provider = resolve_provider(provider.as_deref(), name.as_deref());
        (provider, model_name)
    }

    // ============================================
    // Recording
    // ============================================

    /// Record a shell command the assistant ran
    pub fn record_shell_command(&self, req: ShellCommandRequest) -> Result<IngestOutcome> {
        let Some(session_id) = present(&req.session_id) else {
            return Ok(self.discard("shell_command", "missing session_id"));
        };
        let Some(command) = present(&req.command) else {
            return Ok(self.discard("shell_command", "missing command"));
        };

        let now = Utc::now();
        let (model_provider, model_name) = Self::model(&req.model_provider, &req.model_name);
        let mut cmd = ShellCommand {
            id: 0,
            conversation_id: session_id.to_string(),
            session_name: Some(self.session_name(session_id, &req.session_name)),
            command: command.to_string(),
            description: present(&req.description).map(String::from),
            working_directory: present(&req.cwd).unwrap_or_default().to_string(),
            git_branch: present(&req.branch).map(String::from),
            model_provider,
            model_name,
            exit_code: req.exit_code,
            stdout: req.stdout.unwrap_or_default(),
            stderr: req.stderr.unwrap_or_default(),
            duration_ms: req.duration_ms,
            executed_at: now,
            created_at: now,
        };

        cmd.id = self.repo.record_shell_command(&cmd)?;
        self.hub.publish(
            EventKind::CommandRecorded,
            &json!({ "type": CommandType::Shell, "data": cmd }),
        );
        Ok(IngestOutcome::Recorded { id: cmd.id })
    }

    /// Record a tool invocation
    pub fn record_tool_invocation(&self, req: ToolInvocationRequest) -> Result<IngestOutcome> {
        let Some(session_id) = present(&req.session_id) else {
            return Ok(self.discard("tool_invocation", "missing session_id"));
        };
        let Some(tool_name) = present(&req.tool_name) else {
            return Ok(self.discard("tool_invocation", "missing tool_name"));
        };

        let now = Utc::now();
        let error_message = present(&req.error_message).map(String::from);
        let (model_provider, model_name) = Self::model(&req.model_provider, &req.model_name);
        let mut cmd = ClaudeCommand {
            id: 0,
            conversation_id: session_id.to_string(),
            session_name: Some(self.session_name(session_id, &req.session_name)),
            tool_name: tool_name.to_string(),
            parameters: json_text(&req.parameters),
            result: json_text(&req.result),
            working_directory: present(&req.cwd).unwrap_or_default().to_string(),
            git_branch: present(&req.branch).map(String::from),
            model_provider,
            model_name,
            success: req.success.unwrap_or(error_message.is_none()),
            error_message,
            duration_ms: req.duration_ms,
            executed_at: now,
            created_at: now,
        };

        cmd.id = self.repo.record_claude_command(&cmd)?;
        self.hub.publish(
            EventKind::CommandRecorded,
            &json!({ "type": CommandType::Claude, "data": cmd }),
        );
        Ok(IngestOutcome::Recorded { id: cmd.id })
    }

    /// Record a prompt the human submitted
    pub fn record_prompt(&self, req: PromptRequest) -> Result<IngestOutcome> {
        let Some(session_id) = present(&req.session_id) else {
            return Ok(self.discard("prompt", "missing session_id"));
        };
        // Prompts keep their whitespace; only an all-blank prompt is missing
        let Some(prompt) = req.prompt.as_deref().filter(|p| !p.trim().is_empty()) else {
            return Ok(self.discard("prompt", "missing prompt"));
        };

        let now = Utc::now();
        let (model_provider, model_name) = Self::model(&req.model_provider, &req.model_name);
        let mut msg = UserMessage {
            id: 0,
            conversation_id: session_id.to_string(),
            session_name: Some(self.session_name(session_id, &req.session_name)),
            message: prompt.to_string(),
            working_directory: present(&req.cwd).unwrap_or_default().to_string(),
            git_branch: present(&req.branch).map(String::from),
            model_provider,
            model_name,
            message_length: prompt.chars().count() as i64,
            submitted_at: now,
            created_at: now,
        };

        msg.id = self.repo.record_user_message(&msg)?;
        self.hub.publish(EventKind::PromptRecorded, &msg);
        Ok(IngestOutcome::Recorded { id: msg.id })
    }

    /// Classify and record a notification
    pub fn record_notification(&self, req: NotificationRequest) -> Result<IngestOutcome> {
        let Some(session_id) = present(&req.session_id) else {
            return Ok(self.discard("notification", "missing session_id"));
        };
        let Some(message) = present(&req.message) else {
            return Ok(self.discard("notification", "missing message"));
        };

        let classification = classify_with_hints(
            message,
            present(&req.notification_type),
            present(&req.tool_name),
        );

        let now = Utc::now();
        let (model_provider, model_name) = Self::model(&req.model_provider, &req.model_name);
        let mut notification = Notification {
            id: 0,
            conversation_id: session_id.to_string(),
            session_name: Some(self.session_name(session_id, &req.session_name)),
            notification_type: classification.kind,
            message: message.to_string(),
            tool_name: classification.tool_name,
            command_details: present(&req.command_details).map(String::from),
            working_directory: present(&req.cwd).unwrap_or_default().to_string(),
            git_branch: present(&req.branch).map(String::from),
            model_provider,
            model_name,
            notified_at: now,
            created_at: now,
        };

        notification.id = self.repo.record_notification(&notification)?;
        self.hub
            .publish(EventKind::NotificationRecorded, &notification);
        Ok(IngestOutcome::Recorded {
            id: notification.id,
        })
    }

    // ============================================
    // Dashboard queries
    // ============================================

    /// Cumulative metrics after applying the reset baseline
    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        let totals = self.repo.get_activity_totals()?;
        let (total_tokens, total_conversations) = self
            .reset
            .apply_delta(totals.total_tokens, totals.total_conversations);
        let avg_tokens = if total_conversations > 0 {
            total_tokens / total_conversations
        } else {
            0
        };
        let reset = self.reset.reset_point();

        Ok(DashboardStats {
            total_conversations,
            active_conversations: totals.active_conversations,
            total_tokens,
            avg_tokens,
            reset_active: reset.is_some(),
            reset_timestamp: reset.as_ref().map(|r| r.timestamp),
            reset_reason: reset.map(|r| r.reason),
            timestamp: Utc::now(),
        })
    }

    /// Running assistant processes paired with recorded conversations
    pub async fn processes(self: &Arc<Self>) -> Result<ProcessReport> {
        let detected = self.processes.detect().await?;
        let conversations = self.run_blocking(|i| i.repo.list_conversations()).await?;
        Ok(ProcessReport {
            stats: ProcessStats::from_processes(&detected),
            processes: correlate(&detected, &conversations),
        })
    }

    // ============================================
    // Admin actions
    // ============================================
    //
    // Destructive actions wait for pending aggregates first, so a queued
    // upsert cannot resurrect what was just removed. The SQLite and reset
    // file work then runs on the blocking pool.

    /// Run `f` on the blocking pool with a handle to this ingestor.
    async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&Ingestor) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let ingestor = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&ingestor))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }

    /// Rebase displayed totals to zero without deleting anything
    pub async fn soft_reset(self: &Arc<Self>, reason: Option<&str>) -> Result<ResetPoint> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_SOFT_RESET_REASON)
            .to_string();
        self.settle().await;
        self.run_blocking(move |i| i.apply_soft_reset(&reason)).await
    }

    fn apply_soft_reset(&self, reason: &str) -> Result<ResetPoint> {
        let totals = self.repo.get_activity_totals()?;
        let point =
            self.reset
                .set_reset_point(totals.total_tokens, totals.total_conversations, reason)?;

        self.hub.publish(
            EventKind::ResetSoft,
            &json!({
                "action": "soft",
                "message": "Soft reset applied",
                "previous_tokens": point.token_delta,
                "previous_conversations": point.conversation_delta,
            }),
        );
        Ok(point)
    }

    /// Drop the reset baseline. Returns false when none was active.
    pub fn clear_reset(&self) -> Result<bool> {
        if !self.reset.clear_reset_point()? {
            return Ok(false);
        }
        self.hub.publish(
            EventKind::ResetCleared,
            &json!({
                "action": "cleared",
                "message": "Reset point cleared - showing original counts",
            }),
        );
        Ok(true)
    }

    /// Archive every conversation aggregate
    pub async fn archive_reset(self: &Arc<Self>) -> Result<usize> {
        self.settle().await;
        self.run_blocking(|i| i.apply_archive()).await
    }

    fn apply_archive(&self) -> Result<usize> {
        let archived = self.repo.archive_conversations()?;
        self.processes.clear_cache();
        self.hub.publish(
            EventKind::ResetArchive,
            &json!({
                "action": "archive",
                "message": "All conversations have been archived",
                "archived": archived,
            }),
        );
        Ok(archived)
    }

    /// Delete every conversation aggregate and the reset baseline
    pub async fn clear_reset_hard(self: &Arc<Self>) -> Result<usize> {
        self.settle().await;
        self.run_blocking(|i| i.apply_hard_clear()).await
    }

    fn apply_hard_clear(&self) -> Result<usize> {
        let deleted = self.repo.delete_conversations()?;
        self.reset.clear_reset_point()?;
        self.processes.clear_cache();
        self.hub.publish(
            EventKind::ResetClear,
            &json!({
                "action": "clear",
                "message": "All conversations have been permanently deleted",
                "deleted": deleted,
            }),
        );
        Ok(deleted)
    }

    /// Delete all recorded history and vacuum the database
    pub async fn clear_history(self: &Arc<Self>) -> Result<HistoryClearReport> {
        self.settle().await;
        self.run_blocking(|i| i.apply_history_clear()).await
    }

    fn apply_history_clear(&self) -> Result<HistoryClearReport> {
        let report = self.repo.delete_all_history()?;
        self.hub.publish(
            EventKind::HistoryCleared,
            &json!({
                "message": "All history deleted and database vacuumed",
                "rows_deleted": report.rows_deleted,
            }),
        );
        Ok(report)
    }

    /// Delete all notifications
    pub fn clear_notifications(&self) -> Result<usize> {
        let deleted = self.repo.delete_all_notifications()?;
        self.hub.publish(
            EventKind::NotificationsCleared,
            &json!({ "message": "All notifications deleted", "deleted": deleted }),
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Subscription;
    use crate::db::HistoryQuery;
    use crate::naming::session_name;
    use crate::process::{ProcessSource, RawProcess};

    struct SingleProcess;

    impl ProcessSource for SingleProcess {
        fn list(&self) -> Result<Vec<RawProcess>> {
            Ok(vec![RawProcess {
                pid: 7,
                argv: vec!["claude".into(), "--cwd".into(), "/work/app".into()],
                ..Default::default()
            }])
        }
    }

    fn ingestor() -> (tempfile::TempDir, Arc<Ingestor>, Subscription) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let db = Arc::new(db);

        let hub = Hub::new(64);
        let queue = AggregateQueue::start(Arc::clone(&db), None, &config.aggregates).unwrap();
        let reset = ResetTracker::load(&dir.path().join("reset_point.json")).unwrap();
        let processes = ProcessCorrelator::new(Arc::new(SingleProcess), &config.process);
        let sub = hub.register();

        let ingestor = Ingestor::new(Repository::new(db, queue), hub, reset, processes);
        (dir, Arc::new(ingestor), sub)
    }

    fn shell_request(session: &str, command: &str) -> ShellCommandRequest {
        ShellCommandRequest {
            session_id: Some(session.to_string()),
            command: Some(command.to_string()),
            cwd: Some("/work/app".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_fields_are_discarded() {
        let (_dir, ingestor, mut sub) = ingestor();

        let outcome = ingestor
            .record_shell_command(ShellCommandRequest {
                command: Some("ls".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Discarded {
                reason: "missing session_id"
            }
        );

        let outcome = ingestor
            .record_notification(NotificationRequest {
                session_id: Some("s1".into()),
                message: Some("   ".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(outcome.id(), None);

        assert!(sub.try_recv().is_none());
        let counts = ingestor.repo().database().table_counts().unwrap();
        assert_eq!(counts.shell_commands + counts.notifications, 0);
    }

    #[tokio::test]
    async fn test_shell_command_recorded_and_broadcast() {
        let (_dir, ingestor, mut sub) = ingestor();

        let outcome = ingestor
            .record_shell_command(shell_request("sess-1", "git status"))
            .unwrap();
        let id = outcome.id().unwrap();

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.event, EventKind::CommandRecorded);
        assert_eq!(envelope.data["type"], "shell");
        assert_eq!(envelope.data["data"]["id"], id);
        assert_eq!(envelope.data["data"]["session_name"], session_name("sess-1"));
        assert_eq!(envelope.data["data"]["model_provider"], UNKNOWN_MODEL);

        ingestor.settle().await;
        let conversation = ingestor.repo().get_conversation("sess-1").unwrap().unwrap();
        assert_eq!(conversation.total_shell_commands, 1);
    }

    #[tokio::test]
    async fn test_producer_session_name_wins() {
        let (_dir, ingestor, _sub) = ingestor();
        ingestor
            .record_prompt(PromptRequest {
                session_id: Some("sess-9".into()),
                session_name: Some("Custom".into()),
                prompt: Some("  hello  ".into()),
                ..Default::default()
            })
            .unwrap();

        let prompts = ingestor.repo().get_user_messages(&HistoryQuery::default()).unwrap();
        assert_eq!(prompts[0].session_name.as_deref(), Some("Custom"));
        assert_eq!(prompts[0].message, "  hello  ");
        assert_eq!(prompts[0].message_length, 9);
        ingestor.settle().await;
    }

    #[tokio::test]
    async fn test_tool_success_defaults() {
        let (_dir, ingestor, _sub) = ingestor();
        let base = ToolInvocationRequest {
            session_id: Some("s".into()),
            tool_name: Some("Edit".into()),
            ..Default::default()
        };
        ingestor.record_tool_invocation(base.clone()).unwrap();
        ingestor
            .record_tool_invocation(ToolInvocationRequest {
                error_message: Some("file not found".into()),
                ..base
            })
            .unwrap();
        ingestor.settle().await;

        let stats = ingestor
            .repo()
            .get_command_stats(Some(CommandType::Claude), None)
            .unwrap();
        assert_eq!(stats[0].execution_count, 2);
        assert_eq!(stats[0].success_count, 1);
        assert_eq!(stats[0].failure_count, 1);
    }

    #[tokio::test]
    async fn test_notification_is_classified() {
        let (_dir, ingestor, mut sub) = ingestor();
        ingestor
            .record_notification(NotificationRequest {
                session_id: Some("s".into()),
                message: Some("Claude needs your permission to use Bash".into()),
                ..Default::default()
            })
            .unwrap();

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.event, EventKind::NotificationRecorded);
        assert_eq!(envelope.data["notification_type"], "permission_request");
        assert_eq!(envelope.data["tool_name"], "Bash");

        let stats = ingestor.repo().get_notification_stats().unwrap();
        assert_eq!(stats.most_requested_tool.as_deref(), Some("Bash"));
        ingestor.settle().await;
    }

    #[tokio::test]
    async fn test_soft_reset_rebases_dashboard() {
        let (_dir, ingestor, mut sub) = ingestor();
        ingestor.record_shell_command(shell_request("a", "ls")).unwrap();
        ingestor.record_shell_command(shell_request("b", "ls")).unwrap();
        ingestor.settle().await;
        ingestor.repo().set_conversation_tokens("a", 500).unwrap();

        let before = ingestor.dashboard_stats().unwrap();
        assert_eq!(before.total_conversations, 2);
        assert_eq!(before.total_tokens, 500);
        assert_eq!(before.avg_tokens, 250);
        assert!(!before.reset_active);

        let point = ingestor.soft_reset(None).await.unwrap();
        assert_eq!(point.reason, DEFAULT_SOFT_RESET_REASON);

        let after = ingestor.dashboard_stats().unwrap();
        assert_eq!(after.total_conversations, 0);
        assert_eq!(after.total_tokens, 0);
        assert!(after.reset_active);

        ingestor.record_shell_command(shell_request("c", "ls")).unwrap();
        ingestor.settle().await;
        assert_eq!(ingestor.dashboard_stats().unwrap().total_conversations, 1);

        assert!(ingestor.clear_reset().unwrap());
        assert!(!ingestor.clear_reset().unwrap());
        assert_eq!(ingestor.dashboard_stats().unwrap().total_conversations, 3);

        let events: Vec<EventKind> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| e.event)
            .filter(|e| *e != EventKind::CommandRecorded)
            .collect();
        assert_eq!(events, vec![EventKind::ResetSoft, EventKind::ResetCleared]);
    }

    #[tokio::test]
    async fn test_admin_clears() {
        let (_dir, ingestor, mut sub) = ingestor();
        ingestor.record_shell_command(shell_request("a", "ls")).unwrap();
        ingestor
            .record_notification(NotificationRequest {
                session_id: Some("a".into()),
                message: Some("build finished".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(ingestor.archive_reset().await.unwrap(), 1);
        assert_eq!(ingestor.clear_notifications().unwrap(), 1);
        assert_eq!(ingestor.clear_reset_hard().await.unwrap(), 1);
        let report = ingestor.clear_history().await.unwrap();
        assert_eq!(report.rows_deleted, 2); // shell row + its command stat

        let events: Vec<EventKind> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| e.event)
            .skip(2)
            .collect();
        assert_eq!(
            events,
            vec![
                EventKind::ResetArchive,
                EventKind::NotificationsCleared,
                EventKind::ResetClear,
                EventKind::HistoryCleared,
            ]
        );
    }

    #[tokio::test]
    async fn test_admin_actions_do_not_stall_the_runtime() {
        let (_dir, ingestor, _sub) = ingestor();
        ingestor.record_shell_command(shell_request("a", "ls")).unwrap();
        ingestor.settle().await;

        // Hold the database from another thread so the clear has to wait on it
        let db = Arc::clone(ingestor.repo().database());
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            db.write(|_| {
                held_tx.send(()).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(300));
                Ok(())
            })
            .unwrap();
        });
        held_rx.recv().unwrap();

        let clearing = Arc::clone(&ingestor);
        let clear = tokio::spawn(async move { clearing.clear_history().await });

        // The current-thread runtime keeps ticking while the clear is blocked
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!clear.is_finished());

        let report = clear.await.unwrap().unwrap();
        // shell row, its command stat and the conversation
        assert_eq!(report.rows_deleted, 3);
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn test_processes_are_correlated() {
        let (_dir, ingestor, _sub) = ingestor();
        ingestor.record_shell_command(shell_request("a", "ls")).unwrap();
        ingestor.settle().await;

        let report = ingestor.processes().await.unwrap();
        assert_eq!(report.stats.total, 1);
        assert_eq!(report.processes[0].process.pid, 7);
        assert_eq!(report.processes[0].conversation_id.as_deref(), Some("a"));
    }
}
