//! Error types for the scan acquisition engine.
//!
//! Every seam of the engine has its own `thiserror` enum:
//!
//! - **`GatewayError`**: actuator/detector failures reported by a [`crate::hardware::Gateway`].
//! - **`SequencerError`**: failures producing positions (sequencer or adaptive oracle).
//! - **`StorageError`**: failures reported by a [`crate::storage::GridWriter`].
//! - **`ConfigError`**: semantic validation errors in the scan configuration.
//! - **`LiveError`**: failures ingesting live updates into a temporary dataset.
//! - **`CommandError`**: failures on the command channel.
//!
//! The engine itself distinguishes two classes that must never be conflated:
//!
//! - **`FatalScanError`**: raised inside the sequencing loop. The scan transitions to
//!   `Failed` and terminates.
//! - **`ReductionError`**: raised while reducing a single step (grid write, background
//!   matching, live selection). The step's live update is dropped but the scan continues.
//!
//! Each error maps onto an [`ErrorCode`], which is what status consumers see next to the
//! human-readable message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::StepIndex;

/// Structured error codes surfaced on the status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Connecting or releasing actuators/detectors failed
    GatewayConnect,
    /// An actuator move failed
    GatewayMove,
    /// A detector grab failed
    GatewayGrab,
    /// The position sequencer failed
    Sequencer,
    /// The adaptive point oracle failed
    Oracle,
    /// The grid writer rejected an operation
    Storage,
    /// Returned data did not have the expected shape
    Shape,
    /// Background matching or association failed
    Background,
    /// A start command arrived while a scan was already started
    AlreadyRunning,
    /// The scan watchdog expired
    Timeout,
    /// Invalid configuration
    Config,
    /// The engine worker stopped
    Engine,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCode::GatewayConnect => "gateway_connect",
            ErrorCode::GatewayMove => "gateway_move",
            ErrorCode::GatewayGrab => "gateway_grab",
            ErrorCode::Sequencer => "sequencer",
            ErrorCode::Oracle => "oracle",
            ErrorCode::Storage => "storage",
            ErrorCode::Shape => "shape",
            ErrorCode::Background => "background",
            ErrorCode::AlreadyRunning => "already_running",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Config => "config",
            ErrorCode::Engine => "engine",
        };
        write!(f, "{}", label)
    }
}

/// Errors reported by the actuator/detector gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Operation attempted before `connect()`
    #[error("Gateway not connected")]
    NotConnected,

    /// Connecting or disconnecting hardware failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// An actuator failed to reach its target
    #[error("Actuator '{actuator}' move failed: {message}")]
    Move {
        /// Actuator name
        actuator: String,
        /// Failure description
        message: String,
    },

    /// A detector failed to return data
    #[error("Detector '{detector}' grab failed: {message}")]
    Grab {
        /// Detector name
        detector: String,
        /// Failure description
        message: String,
    },

    /// Requested position does not match the actuator set
    #[error("Position has {got} coordinates but {expected} actuators are configured")]
    AxisMismatch {
        /// Number of configured actuators
        expected: usize,
        /// Number of coordinates supplied
        got: usize,
    },
}

impl GatewayError {
    /// Structured code for status reporting
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::NotConnected | GatewayError::Connection(_) => ErrorCode::GatewayConnect,
            GatewayError::Move { .. } | GatewayError::AxisMismatch { .. } => ErrorCode::GatewayMove,
            GatewayError::Grab { .. } => ErrorCode::GatewayGrab,
        }
    }
}

/// Errors produced by position sources.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequencerError {
    /// Scan parameters cannot produce a position list
    #[error("Invalid scan parameters: {0}")]
    InvalidParameters(String),

    /// Step index beyond the sequencer's step count
    #[error("Step {step} out of range (scan has {n_steps} steps)")]
    StepOutOfRange {
        /// Requested step
        step: usize,
        /// Total number of steps
        n_steps: usize,
    },

    /// The adaptive oracle failed to suggest or accept a point
    #[error("Adaptive oracle error: {0}")]
    Oracle(String),
}

impl SequencerError {
    /// Structured code for status reporting
    pub fn code(&self) -> ErrorCode {
        match self {
            SequencerError::Oracle(_) => ErrorCode::Oracle,
            _ => ErrorCode::Sequencer,
        }
    }
}

/// Errors reported by grid writers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// A step was written twice at the same grid index
    #[error("Grid index {0} already written")]
    DuplicateIndex(StepIndex),

    /// A step index lies outside the declared grid shape
    #[error("Grid index {index} outside declared shape {shape:?}")]
    OutOfBounds {
        /// Offending index
        index: StepIndex,
        /// Declared grid shape
        shape: Vec<usize>,
    },

    /// Write attempted after the writer was flushed and closed
    #[error("Writer is closed")]
    Closed,

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Structured code for status reporting
    pub fn code(&self) -> ErrorCode {
        ErrorCode::Storage
    }
}

/// Loop-level failure. Terminates the scan in the `Failed` phase.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FatalScanError {
    /// Hardware failure
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Position source failure
    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    /// Failure handing axes to storage or flushing
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Data returned by the hardware did not have the expected shape
    #[error("Unexpected data shape: {0}")]
    UnexpectedShape(String),
}

impl FatalScanError {
    /// Structured code for status reporting
    pub fn code(&self) -> ErrorCode {
        match self {
            FatalScanError::Gateway(e) => e.code(),
            FatalScanError::Sequencer(e) => e.code(),
            FatalScanError::Storage(e) => e.code(),
            FatalScanError::UnexpectedShape(_) => ErrorCode::Shape,
        }
    }
}

/// Step-level failure. Drops the step's live update; the scan continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReductionError {
    /// The grid writer rejected the step
    #[error("Failed to store step: {0}")]
    Storage(#[from] StorageError),

    /// Reported position does not match the measured axes
    #[error("Measured position has {got} coordinates, scan has {expected} axes")]
    AxisMismatch {
        /// Number of navigation axes
        expected: usize,
        /// Number of reported coordinates
        got: usize,
    },

    /// Background frame could not be associated
    #[error("Background association failed: {0}")]
    Background(String),
}

impl ReductionError {
    /// Structured code for status reporting
    pub fn code(&self) -> ErrorCode {
        match self {
            ReductionError::Storage(e) => e.code(),
            ReductionError::AxisMismatch { .. } => ErrorCode::Shape,
            ReductionError::Background(_) => ErrorCode::Background,
        }
    }
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A value parsed but is semantically invalid
    #[error("Configuration validation error: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Structured code for status reporting
    pub fn code(&self) -> ErrorCode {
        ErrorCode::Config
    }
}

/// Errors ingesting live updates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LiveError {
    /// A live update arrived with an index not after the previous one
    #[error("Live update {got} arrived after {last}")]
    OutOfOrder {
        /// Last accepted index
        last: StepIndex,
        /// Rejected index
        got: StepIndex,
    },
}

/// Errors on the command channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The acquisition has already been started on this engine
    #[error("Acquisition already started (phase: {0})")]
    AlreadyStarted(String),

    /// The engine worker is gone
    #[error("Engine worker is not running")]
    WorkerGone,
}

impl CommandError {
    /// Structured code for status reporting
    pub fn code(&self) -> ErrorCode {
        match self {
            CommandError::AlreadyStarted(_) => ErrorCode::AlreadyRunning,
            CommandError::WorkerGone => ErrorCode::Engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_error_keeps_underlying_code() {
        let err: FatalScanError = GatewayError::Grab {
            detector: "det1".into(),
            message: "timeout".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::GatewayGrab);
        assert!(err.to_string().contains("det1"));

        let err: FatalScanError = SequencerError::Oracle("no points".into()).into();
        assert_eq!(err.code(), ErrorCode::Oracle);
    }

    #[test]
    fn reduction_error_codes() {
        let err: ReductionError = StorageError::DuplicateIndex(StepIndex::new(vec![0, 3])).into();
        assert_eq!(err.code(), ErrorCode::Storage);
        assert!(err.to_string().contains("(0, 3)"));

        let err = ReductionError::Background("node missing".into());
        assert_eq!(err.code(), ErrorCode::Background);
    }

    #[test]
    fn error_code_display_is_snake_case() {
        assert_eq!(ErrorCode::GatewayMove.to_string(), "gateway_move");
        assert_eq!(
            serde_json::to_string(&ErrorCode::AlreadyRunning).unwrap(),
            "\"already_running\""
        );
    }
}
