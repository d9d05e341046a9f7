//! Data model shared by the sequencing loop, reducer and live consumers.
//!
//! - [`Channel`] / [`MeasurementBundle`]: named data returned by one detector grab
//! - [`NavigationAxis`]: one scanned dimension (intended or measured coordinates)
//! - [`StepIndex`]: location of one step in the output grid
//! - [`BackgroundFrame`]: reference channels captured on the first step of an average

pub mod axis;
pub mod background;
pub mod channel;
pub mod index;

pub use axis::{NavigationAxis, UNWRITTEN};
pub use background::BackgroundFrame;
pub use channel::{Channel, ChannelName, ChannelRole, DataDim, MeasurementBundle};
pub use index::StepIndex;
