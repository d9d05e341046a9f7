//! Scan acquisition engine.
//!
//! - [`acquisition`]: the sequencing loop driving moves, grabs and reduction
//! - [`reducer`]: per-step grid write and live selection
//! - [`background`]: reference-frame matching and renaming
//! - [`live`]: ordered fan-out of live updates
//! - [`temp`]: temporary dataset grown from live updates
//! - [`engine`]: command actor and subscriptions
//! - [`messages`], [`state`]: command/status types and lifecycle state

pub mod acquisition;
pub mod background;
pub mod engine;
pub mod live;
pub mod messages;
pub mod reducer;
pub mod state;
pub mod temp;

pub use acquisition::ScanAcquisition;
pub use background::BackgroundMatcher;
pub use engine::ScanEngine;
pub use live::{Fanout, LiveEmitter, LiveUpdate, StatusEmitter};
pub use messages::{ScanCommand, Severity, StatusEvent};
pub use reducer::{StepInput, StepReducer};
pub use state::{EngineState, RunOutcome, RunSummary, ScanFlags, ScanPhase};
pub use temp::{TempDataset, TempRow};
