//! Scan lifecycle state.
//!
//! Tracks where a scan is in its lifecycle, the flags that end it early, and the
//! per-run bookkeeping owned by the sequencing loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::data::NavigationAxis;
use crate::error::ErrorCode;
use crate::scanner::ScanLayout;

/// Scan execution phase.
///
/// # State Machine
///
/// ```text
/// Idle ──start──> Running(average=0, step=0) ──> Running(a, s) ──> Finished
///                                                    │
///                                                    ├──cancel/timeout──> Aborted
///                                                    │
///                                                    └──fatal error─────> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanPhase {
    /// Waiting for a start command
    Idle,
    /// Loop running at the given average and step
    Running {
        /// Current average index
        average: usize,
        /// Current linear step within the average
        step: usize,
    },
    /// All averages completed
    Finished,
    /// Ended early by cancellation or timeout
    Aborted,
    /// Ended by a fatal error
    Failed,
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanPhase::Idle => write!(f, "Idle"),
            ScanPhase::Running { average, step } => {
                write!(f, "Running(average={}, step={})", average, step)
            }
            ScanPhase::Finished => write!(f, "Finished"),
            ScanPhase::Aborted => write!(f, "Aborted"),
            ScanPhase::Failed => write!(f, "Failed"),
        }
    }
}

impl ScanPhase {
    /// Check if the phase allows starting the acquisition.
    ///
    /// An engine runs one scan; once left, `Idle` is never re-entered.
    pub fn can_start(&self) -> bool {
        matches!(self, ScanPhase::Idle)
    }

    /// Check if the phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanPhase::Finished | ScanPhase::Aborted | ScanPhase::Failed
        )
    }
}

/// Terminal outcome of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// All averages completed
    Finished,
    /// Ended early by cancellation or timeout
    Aborted,
    /// Ended by a fatal error
    Failed,
}

impl RunOutcome {
    /// Matching terminal phase
    pub fn phase(&self) -> ScanPhase {
        match self {
            RunOutcome::Finished => ScanPhase::Finished,
            RunOutcome::Aborted => ScanPhase::Aborted,
            RunOutcome::Failed => ScanPhase::Failed,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.phase().fmt(f)
    }
}

/// Shared cancellation and timeout flags, checked once per step boundary.
#[derive(Debug, Clone, Default)]
pub struct ScanFlags {
    cancel: Arc<AtomicBool>,
    timeout: Arc<AtomicBool>,
}

impl ScanFlags {
    /// Fresh, lowered flags
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Raise the timeout flag
    pub fn time_out(&self) {
        self.timeout.store(true, Ordering::SeqCst);
    }

    /// Cancellation requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Watchdog expired
    pub fn is_timed_out(&self) -> bool {
        self.timeout.load(Ordering::SeqCst)
    }

    /// Either flag raised
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.is_timed_out()
    }

    /// The raw cancellation flag, for collaborators that raise it directly
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

/// Per-run state owned by the sequencing loop.
#[derive(Debug)]
pub struct EngineState {
    /// Current average index
    pub average: usize,
    /// Current linear step within the average
    pub step: usize,
    /// Steps reduced so far, across all averages
    pub steps_completed: usize,
    /// Cancellation and timeout flags
    pub flags: ScanFlags,
    /// Positions come from an adaptive oracle
    pub adaptive: bool,
    /// Intended axes (grown per step in adaptive mode)
    pub intended_axes: Vec<NavigationAxis>,
    /// Measured axes, entries overwritten with reported positions
    pub measured_axes: Vec<NavigationAxis>,
}

impl EngineState {
    /// State for a scan with the given layout.
    ///
    /// The `Average` axis of an averaged layout is not a scanned dimension and gets no
    /// measured counterpart.
    pub fn new(layout: &ScanLayout, n_average: usize, adaptive: bool, flags: ScanFlags) -> Self {
        let skip = usize::from(n_average > 1);
        let intended_axes: Vec<NavigationAxis> = layout.axes.iter().skip(skip).cloned().collect();
        let measured_axes = intended_axes
            .iter()
            .map(NavigationAxis::measured_from)
            .collect();
        Self {
            average: 0,
            step: 0,
            steps_completed: 0,
            flags,
            adaptive,
            intended_axes,
            measured_axes,
        }
    }
}

/// Summary of one scan run, returned when the engine is joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier
    pub run_id: Uuid,
    /// Start timestamp
    pub started_at: DateTime<Utc>,
    /// End timestamp
    pub finished_at: DateTime<Utc>,
    /// Terminal outcome
    pub outcome: RunOutcome,
    /// Steps reduced across all averages
    pub steps_completed: usize,
    /// Fatal error message, for failed scans
    pub error: Option<String>,
    /// Fatal error code, for failed scans
    pub error_code: Option<ErrorCode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::LinearScan;

    #[test]
    fn test_phase_transitions() {
        assert!(ScanPhase::Idle.can_start());
        assert!(!ScanPhase::Running { average: 0, step: 0 }.can_start());
        assert!(!ScanPhase::Finished.can_start());
        assert!(ScanPhase::Aborted.is_terminal());
        assert_eq!(RunOutcome::Failed.phase(), ScanPhase::Failed);
        assert_eq!(
            ScanPhase::Running { average: 1, step: 3 }.to_string(),
            "Running(average=1, step=3)"
        );
    }

    #[test]
    fn test_flags_are_shared() {
        let flags = ScanFlags::new();
        let clone = flags.clone();
        assert!(!flags.should_stop());
        clone.time_out();
        assert!(flags.is_timed_out());
        assert!(!flags.is_cancelled());
        flags.cancel_handle().store(true, Ordering::SeqCst);
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_engine_state_skips_average_axis() {
        let scan = LinearScan::new("delay", 0.0, 1.0, 0.5).unwrap();
        let layout = ScanLayout::new(&scan, 2);
        let state = EngineState::new(&layout, 2, false, ScanFlags::new());
        assert_eq!(state.intended_axes.len(), 1);
        assert_eq!(state.measured_axes[0].label, "measured_delay");
        assert_eq!(state.measured_axes[0].index, 1);
        assert_eq!(state.measured_axes[0].len(), 3);
    }
}
