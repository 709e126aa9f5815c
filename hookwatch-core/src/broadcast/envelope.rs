//! Wire format for broadcast messages

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Name of a broadcast event.
///
/// Unknown names deserialize to [`EventKind::Unknown`] so older clients keep
/// working when new events are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NotificationRecorded,
    PromptRecorded,
    CommandRecorded,
    StatsUpdated,
    ResetArchive,
    ResetClear,
    ResetSoft,
    ResetCleared,
    HistoryCleared,
    NotificationsCleared,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NotificationRecorded => "notification_recorded",
            EventKind::PromptRecorded => "prompt_recorded",
            EventKind::CommandRecorded => "command_recorded",
            EventKind::StatsUpdated => "stats_updated",
            EventKind::ResetArchive => "reset_archive",
            EventKind::ResetClear => "reset_clear",
            EventKind::ResetSoft => "reset_soft",
            EventKind::ResetCleared => "reset_cleared",
            EventKind::HistoryCleared => "history_cleared",
            EventKind::NotificationsCleared => "notifications_cleared",
            EventKind::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "notification_recorded" => EventKind::NotificationRecorded,
            "prompt_recorded" => EventKind::PromptRecorded,
            "command_recorded" => EventKind::CommandRecorded,
            "stats_updated" => EventKind::StatsUpdated,
            "reset_archive" => EventKind::ResetArchive,
            "reset_clear" => EventKind::ResetClear,
            "reset_soft" => EventKind::ResetSoft,
            "reset_cleared" => EventKind::ResetCleared,
            "history_cleared" => EventKind::HistoryCleared,
            "notifications_cleared" => EventKind::NotificationsCleared,
            _ => EventKind::Unknown,
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(EventKind::from_name(&name))
    }
}

/// `{"event": <name>, "data": <payload>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventKind,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(event: EventKind, data: &T) -> serde_json::Result<Self> {
        Ok(Self {
            event,
            data: serde_json::to_value(data)?,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(EventKind::PromptRecorded, &json!({ "id": 7 })).unwrap();
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({ "event": "prompt_recorded", "data": { "id": 7 } }));
    }

    #[test]
    fn test_unknown_event_name_is_tolerated() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"event":"session_teleported","data":null}"#).unwrap();
        assert_eq!(envelope.event, EventKind::Unknown);
    }
}
