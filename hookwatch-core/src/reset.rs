//! Soft-reset baseline for cumulative counters
//!
//! A soft reset records the current cumulative totals instead of deleting
//! rows. Displayed totals are then `raw - baseline`, clamped at zero, until
//! the baseline is cleared. The baseline lives in a small JSON side file so it
//! survives restarts independently of the event tables.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Persisted baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetPoint {
    /// When the reset was taken
    pub timestamp: DateTime<Utc>,
    /// Cumulative token count at reset time
    pub token_delta: i64,
    /// Cumulative conversation count at reset time
    pub conversation_delta: i64,
    /// Human-readable reason shown in the dashboard
    pub reason: String,
}

/// Owns the baseline file and its in-memory copy.
pub struct ResetTracker {
    path: PathBuf,
    point: RwLock<Option<ResetPoint>>,
}

impl ResetTracker {
    /// Load the baseline from `path`.
    ///
    /// A missing file means no reset is active. An unreadable file is logged
    /// and treated the same way so a corrupt baseline never blocks startup.
    pub fn load(path: &Path) -> Result<Self> {
        let point = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<ResetPoint>(&bytes) {
                Ok(point) => Some(point),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable reset point");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::Io(e)),
        };

        if let Some(point) = &point {
            tracing::info!(
                timestamp = %point.timestamp,
                reason = %point.reason,
                "Loaded reset point"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            point: RwLock::new(point),
        })
    }

    /// Record the current raw totals as the new baseline
    pub fn set_reset_point(
        &self,
        total_tokens: i64,
        total_conversations: i64,
        reason: &str,
    ) -> Result<ResetPoint> {
        let point = ResetPoint {
            timestamp: Utc::now(),
            token_delta: total_tokens,
            conversation_delta: total_conversations,
            reason: reason.to_string(),
        };

        let mut guard = self
            .point
            .write()
            .map_err(|_| Error::LockPoisoned("reset point"))?;
        write_atomic(&self.path, &serde_json::to_vec_pretty(&point)?)?;
        *guard = Some(point.clone());

        tracing::info!(
            token_delta = total_tokens,
            conversation_delta = total_conversations,
            reason,
            "Reset point set"
        );
        Ok(point)
    }

    /// Subtract the baseline from raw totals, never going below zero
    pub fn apply_delta(&self, raw_tokens: i64, raw_conversations: i64) -> (i64, i64) {
        let guard = self.point.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(point) => (
                (raw_tokens - point.token_delta).max(0),
                (raw_conversations - point.conversation_delta).max(0),
            ),
            None => (raw_tokens, raw_conversations),
        }
    }

    /// Remove the baseline. Returns false if none was set.
    pub fn clear_reset_point(&self) -> Result<bool> {
        let mut guard = self
            .point
            .write()
            .map_err(|_| Error::LockPoisoned("reset point"))?;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }

        let had = guard.take().is_some();
        if had {
            tracing::info!("Reset point cleared");
        }
        Ok(had)
    }

    /// Current baseline, if any
    pub fn reset_point(&self) -> Option<ResetPoint> {
        self.point
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_reset_point(&self) -> bool {
        self.point
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, payload)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
