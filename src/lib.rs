//! # DAQ Scan Acquisition Engine
//!
//! This crate drives multi-axis scans: it steps actuators through a sequence of positions,
//! triggers the detectors at each one, writes every step into a pre-declared N-dimensional
//! grid and streams reduced live updates to any number of subscribers. Averaging,
//! background frames, measured-vs-intended axes and adaptive point selection are handled
//! by the engine; hardware and storage sit behind traits.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-based loading of [`config::AppConfig`] from TOML and
//!   `DAQ_SCAN_` environment variables, plus validation.
//! - **`data`**: Channel, bundle, navigation-axis and step-index types shared by every
//!   layer.
//! - **`error`**: Error enums per layer and the stable [`error::ErrorCode`] carried on
//!   status events.
//! - **`experiment`**: The sequencing loop, per-step reducer, background matcher, live
//!   fan-out and the [`experiment::ScanEngine`] command actor.
//! - **`hardware`**: Async capability traits for actuators and detectors and a simulated
//!   gateway.
//! - **`scanner`**: Indexed sequencers (linear, tabular, grid) and the adaptive
//!   point oracle.
//! - **`storage`**: The [`storage::GridWriter`] contract and an in-memory implementation.
//! - **`tracing_config`**: Structured logging setup.

pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod scanner;
pub mod storage;
pub mod tracing_config;

pub use error::ErrorCode;
pub use experiment::{RunOutcome, RunSummary, ScanAcquisition, ScanEngine, StatusEvent};
