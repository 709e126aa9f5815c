//! Rolling aggregates: conversation totals and per-command statistics
//!
//! Aggregates are derived data. They are updated off the ingestion path by
//! [`AggregateQueue`], so there is a short window in which a recorded event is
//! visible in its own table but not yet reflected in the aggregates.
//! [`AggregateQueue::settle`] closes that window on demand.

mod aggregator;
mod queue;

pub use aggregator::{refresh_conversation, upsert_command_stat};
pub use queue::{AggregateQueue, QueueStats};

use crate::db::Database;
use crate::error::Result;
use crate::types::CommandType;
use chrono::{DateTime, Utc};
use serde_json::json;

/// One unit of aggregate work.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateJob {
    /// Recompute the totals of one conversation
    ConversationTotals {
        conversation_id: String,
        cwd: String,
        model_provider: String,
        model_name: String,
        at: DateTime<Utc>,
    },
    /// Fold one execution into a command stat row
    CommandStat {
        command_type: CommandType,
        command_name: String,
        success: bool,
        duration_ms: Option<i64>,
        at: DateTime<Utc>,
    },
}

impl AggregateJob {
    /// Run the job's SQL under the datastore's exclusive lock
    pub fn apply(&self, db: &Database) -> Result<()> {
        match self {
            AggregateJob::ConversationTotals {
                conversation_id,
                cwd,
                model_provider,
                model_name,
                at,
            } => db.write(|conn| {
                refresh_conversation(conn, conversation_id, cwd, model_provider, model_name, at)
            }),
            AggregateJob::CommandStat {
                command_type,
                command_name,
                success,
                duration_ms,
                at,
            } => db.write(|conn| {
                upsert_command_stat(conn, *command_type, command_name, *success, *duration_ms, at)
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AggregateJob::ConversationTotals { .. } => "conversation_totals",
            AggregateJob::CommandStat { .. } => "command_stat",
        }
    }

    /// Payload of the `stats_updated` event naming the key this job touched
    pub fn updated_key(&self) -> serde_json::Value {
        match self {
            AggregateJob::ConversationTotals {
                conversation_id, ..
            } => json!({ "kind": self.kind(), "conversation_id": conversation_id }),
            AggregateJob::CommandStat {
                command_type,
                command_name,
                ..
            } => json!({
                "kind": self.kind(),
                "command_type": command_type,
                "command_name": command_name,
            }),
        }
    }
}
