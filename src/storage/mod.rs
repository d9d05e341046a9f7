//! Persistence boundary of the scan engine.
//!
//! The engine performs exactly three kinds of writes per scan:
//!
//! - `add_data`: one call per step, the full bundle at its [`StepIndex`]
//! - `add_nav_axes`: one call per average, the measured axes so far
//! - `attach_background`: at most once per average, reference channels for their
//!   detector nodes
//!
//! followed by one `flush` when the scan ends. How the grid is laid out on disk is the
//! writer's business; writers are built from the [`crate::scanner::ScanLayout`] of the scan
//! so they know the declared shape and axes up front.

pub mod memory;

pub use memory::{GridHandle, GridRecord, MemoryGridWriter};

use async_trait::async_trait;

use crate::data::{BackgroundFrame, MeasurementBundle, NavigationAxis, StepIndex};
use crate::error::StorageError;
use crate::scanner::DataDistribution;

/// Append-only, indexed dataset writer.
///
/// # Concurrency
///
/// A writer accepts at most one producer per scan. Methods take `&mut self`, so the
/// owner serialises every write; implementations must not assume calls from several
/// tasks and must not be shared between concurrently running scans.
#[async_trait]
pub trait GridWriter: Send {
    /// Store the bundle's data channels at `index`.
    ///
    /// Writing the same index twice, or an index outside the declared shape, is an error.
    async fn add_data(
        &mut self,
        index: &StepIndex,
        bundle: &MeasurementBundle,
        distribution: DataDistribution,
    ) -> Result<(), StorageError>;

    /// Hand off the measured navigation axes. Later calls replace earlier ones.
    async fn add_nav_axes(&mut self, axes: &[NavigationAxis]) -> Result<(), StorageError>;

    /// Associate reference channels with their detector nodes, replacing any previous
    /// association for those detectors.
    async fn attach_background(&mut self, frame: &BackgroundFrame) -> Result<(), StorageError>;

    /// Make everything written so far durable and close the writer.
    async fn flush(&mut self) -> Result<(), StorageError>;
}
