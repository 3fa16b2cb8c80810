//! Circuit breaker snapshot persistence
//!
//! Snapshots are small JSON documents written on every state transition and at
//! shutdown. They only exist for crash-recovery continuity: a snapshot older
//! than [`SNAPSHOT_MAX_AGE`] is ignored on startup.

use crate::circuit_breaker::{CircuitBreakerMetrics, CircuitState};
use crate::error::PersistenceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Snapshots older than this are not restored
pub const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Persisted circuit breaker state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub last_state_change: DateTime<Utc>,
    pub failure_count: u32,
    pub success_count: u32,
    pub recovery_attempts: u32,
    pub metrics: CircuitBreakerMetrics,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl BreakerSnapshot {
    /// Age of the snapshot relative to now
    pub fn age(&self) -> Duration {
        (Utc::now() - self.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Load a snapshot, `Ok(None)` when no file exists
    pub fn load(path: &Path) -> Result<Option<Self>, PersistenceError> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&data)?;
        Ok(Some(snapshot))
    }

    /// Load a snapshot only if it is younger than `max_age`
    pub fn load_fresh(path: &Path, max_age: Duration) -> Result<Option<Self>, PersistenceError> {
        match Self::load(path)? {
            Some(snapshot) if snapshot.age() < max_age => Ok(Some(snapshot)),
            Some(snapshot) => Err(PersistenceError::Stale {
                age_secs: snapshot.age().as_secs() as i64,
            }),
            None => Ok(None),
        }
    }

    /// Write the snapshot, replacing any previous file atomically
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let data = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
