//! # hookwatch-core
//!
//! Core library for hookwatch - an activity telemetry engine for AI coding
//! assistants.
//!
//! This library provides:
//! - Domain types for shell commands, tool invocations, prompts and notifications
//! - SQLite storage with per-conversation and per-command aggregates
//! - A background aggregation queue with bounded retries
//! - In-memory fan-out of recorded events to live dashboard clients
//! - Soft-reset baselines, notification classification and process detection
//! - Configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three stages:
//! - **Ingest:** producer payloads are validated and stored as immutable event rows
//! - **Aggregate:** conversation totals and command stats are derived off the hot path
//! - **Broadcast:** every recorded event is pushed to connected subscribers
//!
//! ## Example
//!
//! ```rust,no_run
//! use hookwatch_core::{Config, Ingestor};
//!
//! # async fn run() -> hookwatch_core::Result<()> {
//! let config = Config::load()?;
//! let ingestor = Ingestor::open(&config, &Config::database_path(), &Config::reset_point_path())?;
//! println!("{:?}", ingestor.dashboard_stats()?);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use broadcast::{Envelope, EventKind, Hub, Subscription};
pub use config::Config;
pub use db::{Database, HistoryQuery, Repository};
pub use error::{Error, Result};
pub use ingest::{DashboardStats, IngestOutcome, Ingestor, ProcessReport};
pub use types::*;

// Public modules
pub mod broadcast;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod naming;
pub mod process;
pub mod reset;
pub mod stats;
pub mod types;
