//! HTTP API
//!
//! Producers POST events; dashboards GET history, aggregates and admin
//! status. Every route shares one [`Ingestor`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use hookwatch_core::db::{HistoryItem, NotificationStats, PromptStats, SessionResume, SessionSummary};
use hookwatch_core::ingest::{
    NotificationRequest, PromptRequest, ShellCommandRequest, ToolInvocationRequest,
};
use hookwatch_core::{
    ClaudeCommand, CommandStat, CommandType, DashboardStats, HistoryQuery, IngestOutcome, Ingestor,
    Notification, ProcessReport, ShellCommand, UserMessage,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ws::ws_handler;

const DEFAULT_HISTORY_LIMIT: usize = 100;
const DEFAULT_STATS_LIMIT: usize = 50;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the application router
pub fn router(ingestor: Arc<Ingestor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/shell-commands", post(post_shell_command).get(get_shell_commands))
        .route("/api/claude-commands", post(post_tool_invocation).get(get_claude_commands))
        .route("/api/prompts", post(post_prompt).get(get_prompts))
        .route("/api/prompts/stats", get(prompt_stats))
        .route(
            "/api/notifications",
            post(post_notification)
                .get(get_notifications)
                .delete(clear_notifications),
        )
        .route("/api/notifications/stats", get(notification_stats))
        .route("/api/history", get(get_history).delete(clear_history))
        .route("/api/command-stats", get(command_stats))
        .route("/api/sessions", get(sessions))
        .route("/api/sessions/{id}/resume", get(session_resume))
        .route("/api/stats", get(dashboard_stats))
        .route("/api/processes", get(processes))
        .route("/api/db/stats", get(db_stats))
        .route("/api/reset", delete(clear_reset))
        .route("/api/reset/status", get(reset_status))
        .route("/api/reset/soft", post(soft_reset))
        .route("/api/reset/archive", post(archive_reset))
        .route("/api/reset/clear", post(clear_reset_hard))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ingestor)
}

// ============================================
// Errors
// ============================================

/// Error body `{"error": ...}` with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<hookwatch_core::Error> for ApiError {
    fn from(e: hookwatch_core::Error) -> Self {
        match e {
            hookwatch_core::Error::ConversationNotFound(_) => Self::not_found(e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, error = %self.message, "Request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Run a database-bound call off the async workers.
async fn blocking<T, F>(ingestor: &Arc<Ingestor>, f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce(&Ingestor) -> hookwatch_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let ingestor = Arc::clone(ingestor);
    tokio::task::spawn_blocking(move || f(&ingestor))
        .await
        .map_err(|e| ApiError::internal(format!("task failed: {e}")))?
        .map_err(ApiError::from)
}

fn with_default_limit(mut query: HistoryQuery) -> HistoryQuery {
    query.limit.get_or_insert(DEFAULT_HISTORY_LIMIT);
    query
}

// ============================================
// Health
// ============================================

async fn health(State(ingestor): State<Arc<Ingestor>>) -> Response {
    let database = blocking(&ingestor, |i| i.repo().database().health_check()).await;
    let body = json!({
        "status": if database.is_ok() { "ok" } else { "degraded" },
        "database": database.is_ok(),
        "subscribers": ingestor.hub().subscriber_count(),
        "timestamp": Utc::now(),
    });
    let status = if database.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

// ============================================
// Ingestion
// ============================================

/// Discarded events still answer 200 so producers never retry them
fn ingest_response(outcome: IngestOutcome) -> Json<Value> {
    match outcome {
        IngestOutcome::Recorded { id } => Json(json!({ "status": "recorded", "id": id })),
        IngestOutcome::Discarded { reason } => {
            Json(json!({ "status": "ignored", "reason": reason }))
        }
    }
}

async fn post_shell_command(
    State(ingestor): State<Arc<Ingestor>>,
    Json(req): Json<ShellCommandRequest>,
) -> ApiResult<Value> {
    let outcome = blocking(&ingestor, move |i| i.record_shell_command(req)).await?;
    Ok(ingest_response(outcome))
}

async fn post_tool_invocation(
    State(ingestor): State<Arc<Ingestor>>,
    Json(req): Json<ToolInvocationRequest>,
) -> ApiResult<Value> {
    let outcome = blocking(&ingestor, move |i| i.record_tool_invocation(req)).await?;
    Ok(ingest_response(outcome))
}

async fn post_prompt(
    State(ingestor): State<Arc<Ingestor>>,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Value> {
    let outcome = blocking(&ingestor, move |i| i.record_prompt(req)).await?;
    Ok(ingest_response(outcome))
}

async fn post_notification(
    State(ingestor): State<Arc<Ingestor>>,
    Json(req): Json<NotificationRequest>,
) -> ApiResult<Value> {
    let outcome = blocking(&ingestor, move |i| i.record_notification(req)).await?;
    Ok(ingest_response(outcome))
}

// ============================================
// History
// ============================================

async fn get_shell_commands(
    State(ingestor): State<Arc<Ingestor>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<ShellCommand>> {
    let query = with_default_limit(query);
    Ok(Json(
        blocking(&ingestor, move |i| i.repo().get_shell_commands(&query)).await?,
    ))
}

async fn get_claude_commands(
    State(ingestor): State<Arc<Ingestor>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<ClaudeCommand>> {
    let query = with_default_limit(query);
    Ok(Json(
        blocking(&ingestor, move |i| i.repo().get_claude_commands(&query)).await?,
    ))
}

async fn get_prompts(
    State(ingestor): State<Arc<Ingestor>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<UserMessage>> {
    let query = with_default_limit(query);
    Ok(Json(
        blocking(&ingestor, move |i| i.repo().get_user_messages(&query)).await?,
    ))
}

async fn get_notifications(
    State(ingestor): State<Arc<Ingestor>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<Notification>> {
    let query = with_default_limit(query);
    Ok(Json(
        blocking(&ingestor, move |i| i.repo().get_notifications(&query)).await?,
    ))
}

async fn get_history(
    State(ingestor): State<Arc<Ingestor>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<HistoryItem>> {
    let query = with_default_limit(query);
    Ok(Json(
        blocking(&ingestor, move |i| i.repo().get_all_history(&query)).await?,
    ))
}

// ============================================
// Aggregates
// ============================================

#[derive(Debug, Deserialize)]
struct CommandStatsParams {
    #[serde(rename = "type")]
    command_type: Option<String>,
    limit: Option<usize>,
}

async fn command_stats(
    State(ingestor): State<Arc<Ingestor>>,
    Query(params): Query<CommandStatsParams>,
) -> ApiResult<Vec<CommandStat>> {
    let command_type = match params.command_type.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(name) => Some(name.parse::<CommandType>().map_err(ApiError::bad_request)?),
    };
    let limit = params.limit.unwrap_or(DEFAULT_STATS_LIMIT);
    Ok(Json(
        blocking(&ingestor, move |i| {
            i.repo().get_command_stats(command_type, Some(limit))
        })
        .await?,
    ))
}

async fn notification_stats(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<NotificationStats> {
    Ok(Json(
        blocking(&ingestor, |i| i.repo().get_notification_stats()).await?,
    ))
}

async fn prompt_stats(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<PromptStats> {
    Ok(Json(
        blocking(&ingestor, |i| i.repo().get_prompt_stats()).await?,
    ))
}

async fn sessions(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<Vec<SessionSummary>> {
    Ok(Json(
        blocking(&ingestor, |i| i.repo().get_unique_sessions()).await?,
    ))
}

async fn session_resume(
    State(ingestor): State<Arc<Ingestor>>,
    Path(id): Path<String>,
) -> ApiResult<SessionResume> {
    let lookup = id.clone();
    blocking(&ingestor, move |i| i.repo().get_session_resume(&lookup))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no prompts recorded for session {id}")))
}

async fn dashboard_stats(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<DashboardStats> {
    Ok(Json(blocking(&ingestor, |i| i.dashboard_stats()).await?))
}

async fn processes(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<ProcessReport> {
    Ok(Json(ingestor.processes().await?))
}

async fn db_stats(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<Value> {
    let counts = blocking(&ingestor, |i| i.repo().database().table_counts()).await?;
    Ok(Json(json!({
        "tables": counts,
        "aggregate_queue": ingestor.repo().queue().stats(),
        "pending_aggregates": ingestor.repo().queue().pending(),
        "subscribers": ingestor.hub().subscriber_count(),
        "dropped_envelopes": ingestor.hub().dropped_count(),
        "path": ingestor.repo().database().path(),
    })))
}

// ============================================
// Admin
// ============================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SoftResetBody {
    reason: Option<String>,
}

async fn soft_reset(State(ingestor): State<Arc<Ingestor>>, body: Bytes) -> ApiResult<Value> {
    // An empty body is a reset with the default reason
    let body: SoftResetBody = if body.is_empty() {
        SoftResetBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))?
    };

    let point = ingestor.soft_reset(body.reason.as_deref()).await?;
    Ok(Json(json!({
        "action": "soft",
        "message": "Soft reset applied",
        "reset_point": point,
    })))
}

async fn archive_reset(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<Value> {
    let archived = ingestor.archive_reset().await?;
    Ok(Json(json!({
        "action": "archive",
        "message": "All conversations have been archived",
        "archived": archived,
    })))
}

async fn clear_reset_hard(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<Value> {
    let deleted = ingestor.clear_reset_hard().await?;
    Ok(Json(json!({
        "action": "clear",
        "message": "All conversations have been permanently deleted",
        "deleted": deleted,
    })))
}

async fn clear_reset(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<Value> {
    let cleared = blocking(&ingestor, |i| i.clear_reset()).await?;
    let body = if cleared {
        json!({
            "action": "cleared",
            "message": "Reset point cleared - showing original counts",
        })
    } else {
        json!({ "action": "no_reset", "message": "No reset point to clear" })
    };
    Ok(Json(body))
}

async fn reset_status(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<Value> {
    let point = ingestor.reset_tracker().reset_point();
    Ok(Json(json!({
        "has_reset_point": point.is_some(),
        "reset_point": point,
    })))
}

async fn clear_history(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<Value> {
    let report = ingestor.clear_history().await?;
    Ok(Json(json!({
        "message": "All history deleted and database vacuumed",
        "report": report,
    })))
}

async fn clear_notifications(State(ingestor): State<Arc<Ingestor>>) -> ApiResult<Value> {
    let deleted = blocking(&ingestor, |i| i.clear_notifications()).await?;
    Ok(Json(json!({
        "message": "All notifications deleted",
        "deleted": deleted,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use hookwatch_core::{Config, Database};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> (tempfile::TempDir, Arc<Ingestor>, Router) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let ingestor = Ingestor::with_database(
            &Config::default(),
            Arc::new(db),
            &dir.path().join("reset_point.json"),
        )
        .unwrap();
        let ingestor = Arc::new(ingestor);
        (dir, Arc::clone(&ingestor), router(ingestor))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, _ingestor, app) = app();
        let (status, body) = call(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_incomplete_event_is_ignored() {
        let (_dir, _ingestor, app) = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/shell-commands",
            Some(json!({ "command": "ls" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ignored");
    }

    #[tokio::test]
    async fn test_record_then_list() {
        let (_dir, ingestor, app) = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/shell-commands",
            Some(json!({
                "session_id": "sess-1",
                "command": "cargo build",
                "cwd": "/work/app",
                "exit_code": 0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "recorded");
        ingestor.settle().await;

        let (_, list) = call(
            &app,
            Method::GET,
            "/api/shell-commands?conversation_id=sess-1&limit=5",
            None,
        )
        .await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["command"], "cargo build");

        let (_, stats) = call(&app, Method::GET, "/api/command-stats?type=shell", None).await;
        assert_eq!(stats[0]["command_name"], "cargo");

        let (_, dashboard) = call(&app, Method::GET, "/api/stats", None).await;
        assert_eq!(dashboard["total_conversations"], 1);
    }

    #[tokio::test]
    async fn test_notification_is_classified() {
        let (_dir, _ingestor, app) = app();
        call(
            &app,
            Method::POST,
            "/api/notifications",
            Some(json!({
                "session_id": "s",
                "message": "Claude needs your permission to use Write"
            })),
        )
        .await;

        let (_, list) = call(
            &app,
            Method::GET,
            "/api/notifications?notification_type=permission_request",
            None,
        )
        .await;
        assert_eq!(list[0]["tool_name"], "Write");

        let (_, stats) = call(&app, Method::GET, "/api/notifications/stats", None).await;
        assert_eq!(stats["permission_requests"], 1);
    }

    #[tokio::test]
    async fn test_oversized_page_bounds_return_everything() {
        let (_dir, ingestor, app) = app();
        for command in ["ls", "pwd", "make"] {
            call(
                &app,
                Method::POST,
                "/api/shell-commands",
                Some(json!({ "session_id": "s", "command": command })),
            )
            .await;
        }
        ingestor.settle().await;

        let max = usize::MAX;
        let (status, history) = call(
            &app,
            Method::GET,
            &format!("/api/history?limit={max}&offset=1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 2);

        let (status, stats) =
            call(&app, Method::GET, &format!("/api/command-stats?limit={max}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dashboard_reports_estimated_tokens() {
        let (_dir, ingestor, app) = app();
        call(
            &app,
            Method::POST,
            "/api/prompts",
            Some(json!({ "session_id": "s", "prompt": "a".repeat(400) })),
        )
        .await;
        ingestor.settle().await;

        let (_, dashboard) = call(&app, Method::GET, "/api/stats", None).await;
        assert_eq!(dashboard["total_tokens"], 100);
        assert_eq!(dashboard["avg_tokens"], 100);
    }

    #[tokio::test]
    async fn test_bad_command_type_is_rejected() {
        let (_dir, _ingestor, app) = app();
        let (status, body) = call(&app, Method::GET, "/api/command-stats?type=docker", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("docker"));
    }

    #[tokio::test]
    async fn test_resume_unknown_session_is_404() {
        let (_dir, _ingestor, app) = app();
        let (status, _) = call(&app, Method::GET, "/api/sessions/nope/resume", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_lifecycle() {
        let (_dir, _ingestor, app) = app();

        let (_, body) = call(&app, Method::DELETE, "/api/reset", None).await;
        assert_eq!(body["action"], "no_reset");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/reset/soft",
            Some(json!({ "reason": "new week" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reset_point"]["reason"], "new week");

        let (_, status_body) = call(&app, Method::GET, "/api/reset/status", None).await;
        assert_eq!(status_body["has_reset_point"], true);

        let (_, body) = call(&app, Method::DELETE, "/api/reset", None).await;
        assert_eq!(body["action"], "cleared");
    }

    #[tokio::test]
    async fn test_soft_reset_accepts_empty_body() {
        let (_dir, _ingestor, app) = app();
        let (status, body) = call(&app, Method::POST, "/api/reset/soft", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reset_point"]["reason"], "Manual soft reset");
    }
}
