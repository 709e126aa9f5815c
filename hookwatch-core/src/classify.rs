//! Notification classification
//!
//! Turns the free-text message of an assistant notification into a
//! [`NotificationType`] and, for permission requests, the tool being asked
//! about. Ambiguous text always falls through to [`NotificationType::Other`].

use crate::types::NotificationType;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_PERMISSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)permission").unwrap());
static RE_USE_TOOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\buse\s+(\S+)").unwrap());
static RE_WAITING_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)waiting.*input").unwrap());

/// Result of classifying a notification message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: NotificationType,
    /// Tool named in a permission request, if one could be extracted
    pub tool_name: Option<String>,
}

/// Classify a raw notification message.
///
/// Precedence: permission request, then idle alert, then other.
pub fn classify(message: &str) -> Classification {
    if RE_PERMISSION.is_match(message) {
        return Classification {
            kind: NotificationType::PermissionRequest,
            tool_name: extract_tool_name(message),
        };
    }

    if RE_WAITING_INPUT.is_match(message) {
        return Classification {
            kind: NotificationType::IdleAlert,
            tool_name: None,
        };
    }

    Classification {
        kind: NotificationType::Other,
        tool_name: None,
    }
}

/// Classify, letting explicit producer hints override the derived values.
///
/// Producers that already know the notification type or tool send them along;
/// an unrecognised type hint is ignored rather than forcing `other`.
pub fn classify_with_hints(
    message: &str,
    type_hint: Option<&str>,
    tool_hint: Option<&str>,
) -> Classification {
    let mut classification = classify(message);

    if let Some(kind) = type_hint.and_then(|s| s.trim().parse::<NotificationType>().ok()) {
        classification.kind = kind;
    }

    match tool_hint.map(str::trim).filter(|s| !s.is_empty()) {
        Some(tool) => classification.tool_name = Some(tool.to_string()),
        None if classification.kind == NotificationType::PermissionRequest => {
            // the hint may have promoted a message without the keyword
            classification.tool_name = extract_tool_name(message)
        }
        None => classification.tool_name = None,
    }

    classification
}

fn extract_tool_name(message: &str) -> Option<String> {
    let caps = RE_USE_TOOL.captures(message)?;
    let word = caps
        .get(1)?
        .as_str()
        .trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-');
    (!word.is_empty()).then(|| word.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_request_with_tool() {
        let c = classify("Claude needs your permission to use Bash");
        assert_eq!(c.kind, NotificationType::PermissionRequest);
        assert_eq!(c.tool_name.as_deref(), Some("Bash"));
    }

    #[test]
    fn test_idle_alert() {
        let c = classify("Claude is waiting for your input");
        assert_eq!(c.kind, NotificationType::IdleAlert);
        assert_eq!(c.tool_name, None);
    }

    #[test]
    fn test_other() {
        let c = classify("build finished");
        assert_eq!(c.kind, NotificationType::Other);
        assert_eq!(c.tool_name, None);
    }

    #[test]
    fn test_case_insensitive() {
        let c = classify("PERMISSION needed to USE WebFetch.");
        assert_eq!(c.kind, NotificationType::PermissionRequest);
        assert_eq!(c.tool_name.as_deref(), Some("WebFetch"));

        assert_eq!(
            classify("Still WAITING on user INPUT").kind,
            NotificationType::IdleAlert
        );
    }

    #[test]
    fn test_permission_without_tool() {
        let c = classify("Permission required");
        assert_eq!(c.kind, NotificationType::PermissionRequest);
        assert_eq!(c.tool_name, None);
    }

    #[test]
    fn test_permission_wins_over_idle() {
        let c = classify("waiting for input: permission to use Edit");
        assert_eq!(c.kind, NotificationType::PermissionRequest);
        assert_eq!(c.tool_name.as_deref(), Some("Edit"));
    }

    #[test]
    fn test_mcp_tool_names_survive() {
        let c = classify("Claude needs your permission to use mcp__github__create_issue");
        assert_eq!(c.tool_name.as_deref(), Some("mcp__github__create_issue"));
    }

    #[test]
    fn test_hints_override() {
        let c = classify_with_hints("build finished", Some("idle_alert"), None);
        assert_eq!(c.kind, NotificationType::IdleAlert);

        let c = classify_with_hints(
            "Claude needs your permission to use Bash",
            None,
            Some("Write"),
        );
        assert_eq!(c.tool_name.as_deref(), Some("Write"));

        let c = classify_with_hints("build finished", Some("bogus"), Some(" "));
        assert_eq!(c.kind, NotificationType::Other);
        assert_eq!(c.tool_name, None);
    }

    #[test]
    fn test_type_hint_promotes_and_extracts_tool() {
        let c = classify_with_hints("Claude wants to use Write", Some("permission_request"), None);
        assert_eq!(c.kind, NotificationType::PermissionRequest);
        assert_eq!(c.tool_name.as_deref(), Some("Write"));

        // demoted by the hint, so the extracted tool is dropped
        let c = classify_with_hints(
            "Claude needs your permission to use Bash",
            Some("other"),
            None,
        );
        assert_eq!(c.kind, NotificationType::Other);
        assert_eq!(c.tool_name, None);
    }
}
