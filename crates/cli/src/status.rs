//! Run status record and single-run guard
//!
//! The caller creates a [`StatusHandle`] before a run and reads it while the
//! run progresses on a worker thread. [`RunGuard`] rejects a second run
//! while one is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anomap_algorithms::anomaly::{Progress, RiskSummary};
use serde::Serialize;
use tracing::info;

/// Outputs of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResults {
    /// Percent of pixels per risk class, one decimal
    pub high_risk: f64,
    pub medium_risk: f64,
    pub low_risk: f64,
    /// Model that produced the scores
    pub model: String,
    pub raw_map_file: String,
    pub map_file: String,
    pub rgb_file: String,
    pub water_fraction: f64,
}

impl RunResults {
    pub fn risk(&self) -> RiskSummary {
        RiskSummary {
            high: self.high_risk,
            medium: self.medium_risk,
            low: self.low_risk,
        }
    }
}

/// Snapshot of a run as seen by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatus {
    pub is_processing: bool,
    /// 0-100
    pub progress: u8,
    pub current_step: String,
    pub error: Option<String>,
    pub results: Option<RunResults>,
}

/// Shared, cloneable handle on a [`RunStatus`]
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<RunStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RunStatus> {
        // A panic while holding the lock leaves a consistent record
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> RunStatus {
        self.lock().clone()
    }

    /// Reset for a new run
    pub fn start(&self) {
        *self.lock() = RunStatus {
            is_processing: true,
            progress: 0,
            current_step: "Starting".to_string(),
            error: None,
            results: None,
        };
    }

    pub fn update(&self, progress: u8, step: &str) {
        info!("[{:>3}%] {}", progress, step);
        let mut status = self.lock();
        status.progress = progress.min(100);
        status.current_step = step.to_string();
    }

    pub fn complete(&self, results: RunResults) {
        let mut status = self.lock();
        status.is_processing = false;
        status.progress = 100;
        status.current_step = "Done".to_string();
        status.results = Some(results);
    }

    pub fn fail(&self, message: impl Into<String>) {
        let mut status = self.lock();
        status.is_processing = false;
        status.error = Some(message.into());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}

impl Progress for StatusHandle {
    fn checkpoint(&self, percent: u8, step: &str) {
        self.update(percent, step);
    }
}

// ---------------------------------------------------------------------------
// Run guard
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RunError {
    #[error("a run is already in progress")]
    AlreadyRunning,
}

/// Process-wide "is processing" flag
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or fail if a run holds it
    pub fn try_acquire(&self) -> Result<RunTicket, RunError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RunError::AlreadyRunning)?;
        Ok(RunTicket {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of a run; releases the guard on drop
#[derive(Debug)]
pub struct RunTicket {
    busy: Arc<AtomicBool>,
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_rejects_overlap() {
        let guard = RunGuard::new();
        let ticket = guard.try_acquire().unwrap();
        assert!(guard.is_busy());
        assert_eq!(guard.clone().try_acquire().unwrap_err(), RunError::AlreadyRunning);

        drop(ticket);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_ok());
    }

    #[test]
    fn test_status_lifecycle() {
        let status = StatusHandle::new();
        status.start();
        status.checkpoint(40, "Computing anomalies");

        let snap = status.snapshot();
        assert!(snap.is_processing);
        assert_eq!(snap.progress, 40);
        assert_eq!(snap.current_step, "Computing anomalies");

        status.fail("boom");
        let snap = status.snapshot();
        assert!(!snap.is_processing);
        assert_eq!(snap.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_start_clears_previous_error() {
        let status = StatusHandle::new();
        status.fail("old");
        status.start();
        assert_eq!(status.snapshot().error, None);
    }

    #[test]
    fn test_json_shape() {
        let status = StatusHandle::new();
        status.start();
        let json: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(json["is_processing"], true);
        assert_eq!(json["progress"], 0);
        assert!(json["error"].is_null());
    }
}
