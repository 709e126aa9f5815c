//! Integration tests for the ingestion pipeline
//!
//! These tests drive a file-backed [`Ingestor`] end to end: producer payloads
//! in, event rows and aggregates in SQLite, envelopes out through the hub.

use hookwatch_core::classify::classify;
use hookwatch_core::ingest::{NotificationRequest, PromptRequest, ShellCommandRequest};
use hookwatch_core::reset::ResetTracker;
use hookwatch_core::{
    CommandType, Config, EventKind, HistoryQuery, IngestOutcome, Ingestor, NotificationType,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Open an ingestor over a fresh database in a temp directory
fn open_ingestor() -> (TempDir, Arc<Ingestor>) {
    hookwatch_core::logging::init_test();
    let dir = TempDir::new().unwrap();
    let ingestor = Ingestor::open(
        &Config::default(),
        &dir.path().join("hookwatch.db"),
        &dir.path().join("reset_point.json"),
    )
    .expect("ingestor should open");
    (dir, Arc::new(ingestor))
}

fn shell(session: &str, command: &str, exit_code: i32) -> ShellCommandRequest {
    ShellCommandRequest {
        session_id: Some(session.to_string()),
        command: Some(command.to_string()),
        cwd: Some("/work/project".to_string()),
        exit_code: Some(exit_code),
        duration_ms: Some(10),
        ..Default::default()
    }
}

// ============================================
// Aggregation
// ============================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_keep_totals_exact() {
    let (_dir, ingestor) = open_ingestor();

    let mut producers = Vec::new();
    for producer in 0..10 {
        let ingestor = Arc::clone(&ingestor);
        producers.push(tokio::spawn(async move {
            for n in 0..100 {
                let exit_code = if (producer * 100 + n) % 7 == 0 { 1 } else { 0 };
                let outcome = ingestor
                    .record_shell_command(shell("sess-load", "git status", exit_code))
                    .unwrap();
                assert!(matches!(outcome, IngestOutcome::Recorded { .. }));
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    ingestor.settle().await;

    let conversation = ingestor
        .repo()
        .get_conversation("sess-load")
        .unwrap()
        .expect("conversation aggregate should exist");
    assert_eq!(conversation.total_shell_commands, 1000);
    assert_eq!(conversation.total_commands, 0);
    assert_eq!(conversation.project_path.as_deref(), Some("/work/project"));

    let stats = ingestor
        .repo()
        .get_command_stats(Some(CommandType::Shell), None)
        .unwrap();
    assert_eq!(stats.len(), 1);
    let git = &stats[0];
    assert_eq!(git.command_name, "git");
    assert_eq!(git.execution_count, 1000);
    assert_eq!(git.failure_count, 143);
    assert_eq!(git.success_count + git.failure_count, git.execution_count);
    assert!((git.avg_duration_ms - 10.0).abs() < 1e-6);

    let queue = ingestor.repo().queue().stats();
    assert_eq!(queue.failed, 0);
    assert_eq!(ingestor.repo().queue().pending(), 0);
}

#[tokio::test]
async fn test_unified_history_is_newest_first() {
    let (_dir, ingestor) = open_ingestor();

    ingestor.record_shell_command(shell("s1", "ls", 0)).unwrap();
    ingestor
        .record_prompt(PromptRequest {
            session_id: Some("s1".into()),
            prompt: Some("fix the tests".into()),
            ..Default::default()
        })
        .unwrap();
    ingestor
        .record_notification(NotificationRequest {
            session_id: Some("s2".into()),
            message: Some("Claude is waiting for your input".into()),
            ..Default::default()
        })
        .unwrap();
    ingestor.settle().await;

    let history = ingestor
        .repo()
        .get_all_history(&HistoryQuery::default())
        .unwrap();
    assert_eq!(history.len(), 3);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));

    let only_s1 = ingestor
        .repo()
        .get_all_history(&HistoryQuery {
            conversation_id: Some("s1".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(only_s1.len(), 2);

    let resume = ingestor.repo().get_session_resume("s1").unwrap().unwrap();
    assert_eq!(resume.total_prompts, 1);
    assert!(resume.context.starts_with("Previous conversation history:"));
    assert!(resume.context.contains("User: fix the tests"));
}

// ============================================
// Reset baseline
// ============================================

#[tokio::test]
async fn test_soft_reset_survives_restart() {
    let (dir, ingestor) = open_ingestor();

    for session in ["a", "b", "c"] {
        ingestor.record_shell_command(shell(session, "ls", 0)).unwrap();
    }
    ingestor.settle().await;

    ingestor.soft_reset(Some("sprint start")).await.unwrap();
    assert_eq!(ingestor.dashboard_stats().unwrap().total_conversations, 0);

    let reloaded = ResetTracker::load(&dir.path().join("reset_point.json")).unwrap();
    let point = reloaded.reset_point().expect("reset point should persist");
    assert_eq!(point.conversation_delta, 3);
    assert_eq!(point.reason, "sprint start");
    assert_eq!(reloaded.apply_delta(0, 5), (0, 2));

    // Hard clear drops both the aggregates and the baseline
    assert_eq!(ingestor.clear_reset_hard().await.unwrap(), 3);
    let stats = ingestor.dashboard_stats().unwrap();
    assert!(!stats.reset_active);
    assert_eq!(stats.total_conversations, 0);
    assert!(!dir.path().join("reset_point.json").exists());
}

#[tokio::test]
async fn test_history_clear_resets_everything() {
    let (_dir, ingestor) = open_ingestor();
    ingestor.record_shell_command(shell("a", "cargo test", 0)).unwrap();
    ingestor
        .record_notification(NotificationRequest {
            session_id: Some("a".into()),
            message: Some("Claude needs your permission to use Bash".into()),
            ..Default::default()
        })
        .unwrap();

    let report = ingestor.clear_history().await.unwrap();
    assert!(report.rows_deleted >= 3);
    assert!(report.vacuumed);

    let counts = ingestor.repo().database().table_counts().unwrap();
    assert_eq!(counts.total(), 0);
}

// ============================================
// Broadcast
// ============================================

#[tokio::test]
async fn test_subscribers_receive_until_unregistered() {
    let (_dir, ingestor) = open_ingestor();
    let mut first = ingestor.hub().register();
    let mut second = ingestor.hub().register();

    ingestor
        .record_prompt(PromptRequest {
            session_id: Some("s".into()),
            prompt: Some("hello".into()),
            ..Default::default()
        })
        .unwrap();

    for sub in [&mut first, &mut second] {
        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.event, EventKind::PromptRecorded);
        assert_eq!(envelope.data["message"], "hello");
    }

    assert!(ingestor.hub().unregister(second.id()));
    ingestor.clear_notifications().unwrap();

    let envelope = first.recv().await.unwrap();
    assert_eq!(envelope.event, EventKind::NotificationsCleared);
    // Unregistering closes the channel
    assert!(second.recv().await.is_none());
}

// ============================================
// Classification
// ============================================

#[test]
fn test_classification_examples() {
    let c = classify("Claude needs your permission to use Bash");
    assert_eq!(c.kind, NotificationType::PermissionRequest);
    assert_eq!(c.tool_name.as_deref(), Some("Bash"));

    let c = classify("Claude is waiting for your input");
    assert_eq!(c.kind, NotificationType::IdleAlert);
    assert_eq!(c.tool_name, None);

    let c = classify("Task completed");
    assert_eq!(c.kind, NotificationType::Other);
    assert_eq!(c.tool_name, None);
}
