//! Host process correlation
//!
//! Finds running assistant CLI processes and pairs them with recorded
//! conversations by working directory. The linkage is best effort: nothing
//! ties a process to a session id, so two sessions in the same directory are
//! indistinguishable and the most recently active one wins.
//!
//! Enumeration goes through [`ProcessSource`] so tests can supply a fixed
//! process table. Results are cached for a short window because dashboards
//! poll in bursts.

use crate::config::ProcessConfig;
use crate::error::{Error, Result};
use crate::types::Conversation;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Placeholder working directory when none can be determined
pub const UNKNOWN_CWD: &str = "unknown";

/// Command-line fragments of lookalike processes that are never the CLI
const EXCLUDED_MARKERS: &[&str] = &[
    "chrome_crashpad_handler",
    "create-claude-config",
    "chats-mobile",
    "analytics",
    "/Applications/Claude.app",
    "Claude Helper",
    "claude-desktop",
    "npm start",
    "grep",
    "hookwatch",
];

/// One entry of the host process table, as reported by a [`ProcessSource`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProcess {
    pub pid: u32,
    pub argv: Vec<String>,
    pub user: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub status: String,
    /// Working directory reported by the OS, when readable
    pub cwd: Option<PathBuf>,
}

/// Something that can list host processes.
///
/// Implementations are called on a blocking thread.
pub trait ProcessSource: Send + Sync {
    fn list(&self) -> Result<Vec<RawProcess>>;
}

/// Process table read through `sysinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoSource;

impl ProcessSource for SysinfoSource {
    fn list(&self) -> Result<Vec<RawProcess>> {
        use sysinfo::{ProcessRefreshKind, System, UpdateKind, Users};

        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::Always)
                .with_cwd(UpdateKind::Always)
                .with_user(UpdateKind::Always),
        );
        let users = Users::new_with_refreshed_list();

        let processes = sys
            .processes()
            .iter()
            .map(|(pid, process)| RawProcess {
                pid: pid.as_u32(),
                argv: process.cmd().to_vec(),
                user: process
                    .user_id()
                    .and_then(|uid| users.get_user_by_id(uid))
                    .map(|user| user.name().to_string()),
                started_at: DateTime::from_timestamp(process.start_time() as i64, 0),
                status: process.status().to_string(),
                cwd: process.cwd().map(|p| p.to_path_buf()),
            })
            .collect();

        Ok(processes)
    }
}

/// A detected assistant process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Process {
    pub pid: u32,
    pub command: String,
    pub working_directory: String,
    pub started_at: Option<DateTime<Utc>>,
    pub status: String,
    pub user: Option<String>,
}

impl Process {
    fn from_raw(raw: RawProcess) -> Self {
        let mut working_directory = extract_cwd(&raw.argv);
        if working_directory == UNKNOWN_CWD {
            if let Some(cwd) = &raw.cwd {
                working_directory = cwd.display().to_string();
            }
        }

        Self {
            pid: raw.pid,
            command: raw.argv.join(" "),
            working_directory,
            started_at: raw.started_at,
            status: raw.status,
            user: raw.user,
        }
    }
}

/// Counts over one detection pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    pub total: usize,
    pub with_known_working_dir: usize,
    pub with_unknown_working_dir: usize,
}

impl ProcessStats {
    pub fn from_processes(processes: &[Process]) -> Self {
        let known = processes
            .iter()
            .filter(|p| p.working_directory != UNKNOWN_CWD)
            .count();
        Self {
            total: processes.len(),
            with_known_working_dir: known,
            with_unknown_working_dir: processes.len() - known,
        }
    }
}

/// A process paired with the conversation it most likely belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelatedProcess {
    #[serde(flatten)]
    pub process: Process,
    pub conversation_id: Option<String>,
}

/// Whether a command line looks like an assistant CLI invocation.
pub fn is_assistant_process(argv: &[String]) -> bool {
    let command = argv.join(" ");
    let command = command.trim();

    if !command.contains("claude") {
        return false;
    }
    if EXCLUDED_MARKERS.iter().any(|marker| command.contains(marker)) {
        return false;
    }

    command == "claude"
        || command.contains("claude --")
        || command.contains("claude ")
        || command.contains("/claude")
        || command.contains("bin/claude")
}

/// Working directory passed as `--cwd <dir>` or `--cwd=<dir>`.
///
/// Returns [`UNKNOWN_CWD`] when the flag is absent or empty.
pub fn extract_cwd(argv: &[String]) -> String {
    let mut args = argv.iter();
    while let Some(arg) = args.next() {
        let value = if arg == "--cwd" {
            args.next().map(String::as_str)
        } else {
            arg.strip_prefix("--cwd=")
        };

        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            return value.to_string();
        }
    }
    UNKNOWN_CWD.to_string()
}

/// Pair each process with the most recently active conversation whose
/// project path equals the process working directory.
pub fn correlate(processes: &[Process], conversations: &[Conversation]) -> Vec<CorrelatedProcess> {
    processes
        .iter()
        .map(|process| {
            let conversation_id = conversations
                .iter()
                .filter(|c| c.project_path.as_deref() == Some(process.working_directory.as_str()))
                .max_by_key(|c| c.last_activity_at)
                .map(|c| c.id.clone());

            CorrelatedProcess {
                process: process.clone(),
                conversation_id,
            }
        })
        .collect()
}

struct Snapshot {
    taken_at: Instant,
    processes: Vec<Process>,
}

/// Cached, time-bounded assistant process detection.
pub struct ProcessCorrelator {
    source: Arc<dyn ProcessSource>,
    ttl: Duration,
    timeout: Duration,
    cache: Mutex<Option<Snapshot>>,
    /// Serialises refreshes so a burst of callers shares one enumeration
    refresh: tokio::sync::Mutex<()>,
}

impl ProcessCorrelator {
    pub fn new(source: Arc<dyn ProcessSource>, config: &ProcessConfig) -> Self {
        Self {
            source,
            ttl: Duration::from_millis(config.cache_ttl_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            cache: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Correlator backed by the host process table
    pub fn system(config: &ProcessConfig) -> Self {
        Self::new(Arc::new(SysinfoSource), config)
    }

    /// Detect running assistant processes.
    ///
    /// A snapshot younger than the cache TTL is returned as is. Otherwise the
    /// process table is read on a blocking thread, bounded by the timeout.
    /// Concurrent callers that miss the cache wait for the one refresh in
    /// flight instead of enumerating again.
    pub async fn detect(&self) -> Result<Vec<Process>> {
        if let Some(processes) = self.cached() {
            return Ok(processes);
        }

        let _refresh = self.refresh.lock().await;
        if let Some(processes) = self.cached() {
            return Ok(processes);
        }

        let source = Arc::clone(&self.source);
        let listing = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || source.list()),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: "process enumeration",
            millis: self.timeout.as_millis() as u64,
        })?
        .map_err(|e| Error::Process(e.to_string()))??;

        let processes: Vec<Process> = listing
            .into_iter()
            .filter(|p| is_assistant_process(&p.argv))
            .map(Process::from_raw)
            .collect();

        tracing::debug!(count = processes.len(), "Detected assistant processes");

        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(Snapshot {
            taken_at: Instant::now(),
            processes: processes.clone(),
        });
        Ok(processes)
    }

    /// Drop the cached snapshot so the next call re-enumerates.
    pub fn clear_cache(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn cached(&self) -> Option<Vec<Process>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|snapshot| snapshot.taken_at.elapsed() < self.ttl)
            .map(|snapshot| snapshot.processes.clone())
    }
}
