//! Command and status messages of the scan engine.
//!
//! Commands flow from a controller to the engine over an mpsc channel; each command
//! carries a oneshot sender for its reply. Status events flow back through a per-subscriber
//! unbounded queue, in the order the engine produced them.
//!
//! ```text
//! Controller                          Engine actor              Scan worker
//! ----------                          ------------              -----------
//! StartAcquisition{reply} ──mpsc──>   spawn worker  ─────────>  run loop
//!                        <─oneshot─   Ok(())
//! Stop{reply}            ──mpsc──>    raise cancel flag         (checked per step)
//!                        <─fan-out─────────────────────────── StatusEvent
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{CommandError, ErrorCode};
use crate::experiment::state::RunOutcome;

/// Commands accepted by the engine.
#[derive(Debug)]
pub enum ScanCommand {
    /// Start the acquisition.
    ///
    /// # Response
    ///
    /// - `Ok(())`: the worker was spawned
    /// - `Err(CommandError::AlreadyStarted)`: this engine already started its scan
    StartAcquisition {
        /// Response channel
        reply: oneshot::Sender<Result<(), CommandError>>,
    },

    /// Request cancellation. Takes effect at the next step boundary.
    ///
    /// # Response
    ///
    /// Always succeeds.
    Stop {
        /// Response channel
        reply: oneshot::Sender<()>,
    },
}

impl ScanCommand {
    /// Create a start command with its reply receiver
    pub fn start() -> (Self, oneshot::Receiver<Result<(), CommandError>>) {
        let (reply, rx) = oneshot::channel();
        (Self::StartAcquisition { reply }, rx)
    }

    /// Create a stop command with its reply receiver
    pub fn stop() -> (Self, oneshot::Receiver<()>) {
        let (reply, rx) = oneshot::channel();
        (Self::Stop { reply }, rx)
    }
}

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Lifecycle information
    Info,
    /// Recoverable problem; the scan continues
    Warning,
    /// Fatal problem; the scan ends
    Error,
}

/// Events published on the status channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Human-readable status
    StatusMessage {
        /// Message text
        text: String,
        /// Severity
        severity: Severity,
        /// Structured code for errors and warnings
        code: Option<ErrorCode>,
    },
    /// The loop reached a new step, before the cancellation check
    StepProgress {
        /// Linear step within the average
        step: usize,
        /// Average index
        average: usize,
    },
    /// Terminal event, published exactly once per started scan
    ScanFinished {
        /// How the scan ended
        outcome: RunOutcome,
    },
}

impl StatusEvent {
    /// Informational message
    pub fn info(text: impl Into<String>) -> Self {
        Self::StatusMessage {
            text: text.into(),
            severity: Severity::Info,
            code: None,
        }
    }

    /// Warning with a code
    pub fn warning(text: impl Into<String>, code: ErrorCode) -> Self {
        Self::StatusMessage {
            text: text.into(),
            severity: Severity::Warning,
            code: Some(code),
        }
    }

    /// Error with a code
    pub fn error(text: impl Into<String>, code: ErrorCode) -> Self {
        Self::StatusMessage {
            text: text.into(),
            severity: Severity::Error,
            code: Some(code),
        }
    }
}
