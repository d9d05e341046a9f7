//! Hardware capabilities required by the scan engine.
//!
//! The engine never talks to individual instruments. It sees the whole set of scanned
//! actuators and triggered detectors through three small capability traits:
//!
//! - [`Connectable`]: acquire and release every actuator and detector
//! - [`Positioner`]: move all actuators to a [`Position`] and report where they landed
//! - [`Detector`]: grab one [`MeasurementBundle`] from every detector
//!
//! Anything implementing all three is a [`Gateway`] (blanket impl), which is what the
//! sequencing loop owns for the duration of a scan.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses `&self`; implementations keep their state behind interior mutability
//! - Returns [`GatewayError`] so failures carry a structured code
//!
//! Moves and grabs are allowed to block on hardware I/O. The loop never interrupts an
//! in-flight call; cancellation is only observed between steps.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn measure_once<G: Gateway + ?Sized>(
//!     gateway: &G,
//!     target: &Position,
//! ) -> Result<f64, GatewayError> {
//!     gateway.connect().await?;
//!     let actual = gateway.move_to(target).await?;
//!     let bundle = gateway.grab(&actual).await?;
//!     gateway.disconnect().await?;
//!     Ok(bundle.channels()[0].values[0])
//! }
//! ```

use async_trait::async_trait;

use crate::data::MeasurementBundle;
use crate::error::GatewayError;
use crate::scanner::Position;

/// Acquire/release hardware resources.
#[async_trait]
pub trait Connectable: Send + Sync {
    /// Connect every actuator and detector
    async fn connect(&self) -> Result<(), GatewayError>;

    /// Release every actuator and detector.
    ///
    /// Must be safe to call after a failed `connect()`.
    async fn disconnect(&self) -> Result<(), GatewayError>;
}

/// Multi-axis positioning.
#[async_trait]
pub trait Positioner: Send + Sync {
    /// Actuator names, in the coordinate order of a [`Position`]
    fn actuators(&self) -> Vec<String>;

    /// Move every actuator to `target` and wait for completion.
    ///
    /// Returns the positions the actuators actually reached, which may differ from
    /// `target` under actuator imprecision.
    async fn move_to(&self, target: &Position) -> Result<Position, GatewayError>;
}

/// Triggered acquisition across all detectors.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detector (module) names
    fn detectors(&self) -> Vec<String>;

    /// Trigger every detector and wait for all of them to return data.
    ///
    /// `at` is the reported actuator position, forwarded for detectors that tag their
    /// data with it. Channels are role-tagged in the returned bundle.
    async fn grab(&self, at: &Position) -> Result<MeasurementBundle, GatewayError>;
}

/// Everything the sequencing loop needs from the hardware.
pub trait Gateway: Connectable + Positioner + Detector {}

impl<T: Connectable + Positioner + Detector> Gateway for T {}
