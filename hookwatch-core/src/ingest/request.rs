//! Producer payloads
//!
//! Every field is optional at the serde level so that an incomplete payload
//! still deserialises and can be discarded quietly instead of rejected.

use serde::{Deserialize, Serialize};

/// `POST /api/shell-commands`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellCommandRequest {
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub command: Option<String>,
    pub description: Option<String>,
    pub cwd: Option<String>,
    pub branch: Option<String>,
    pub model_provider: Option<String>,
    pub model_name: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub duration_ms: Option<i64>,
}

/// `POST /api/claude-commands`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolInvocationRequest {
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub tool_name: Option<String>,
    /// Tool input, as JSON (strings are stored verbatim)
    pub parameters: Option<serde_json::Value>,
    /// Tool output, as JSON (strings are stored verbatim)
    pub result: Option<serde_json::Value>,
    pub cwd: Option<String>,
    pub branch: Option<String>,
    pub model_provider: Option<String>,
    pub model_name: Option<String>,
    /// Defaults to "no error message was given"
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

/// `POST /api/prompts`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptRequest {
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub prompt: Option<String>,
    pub cwd: Option<String>,
    pub branch: Option<String>,
    pub model_provider: Option<String>,
    pub model_name: Option<String>,
}

/// `POST /api/notifications`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationRequest {
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    /// Producer's own classification, used when recognised
    pub notification_type: Option<String>,
    pub message: Option<String>,
    pub tool_name: Option<String>,
    pub command_details: Option<String>,
    pub cwd: Option<String>,
    pub branch: Option<String>,
    pub model_provider: Option<String>,
    pub model_name: Option<String>,
}

/// Trimmed value if present and non-empty
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// JSON value as stored text: strings verbatim, anything else serialised
pub(crate) fn json_text(value: &Option<serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
