//! Database layer for hookwatch
//!
//! - [`Database`]: the shared SQLite handle and its locking discipline
//! - [`schema`]: migrations tracked through `PRAGMA user_version`
//! - [`Repository`]: typed reads and writes over the event and aggregate tables

mod repo;
pub mod schema;
mod store;

pub use repo::{
    extract_command_name, ActivityTotals, HistoryClearReport, HistoryContent, HistoryItem,
    HistoryKind, HistoryQuery, NotificationStats, PromptStats, Repository, SessionResume,
    SessionSummary,
};
pub use store::{Database, TableCounts};
