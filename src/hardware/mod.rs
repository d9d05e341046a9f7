//! Hardware access for the scan engine.
//!
//! [`capabilities`] defines the async traits the sequencing loop drives; [`mock`] provides
//! a simulated gateway used by the binary and the test-suite.

pub mod capabilities;
pub mod mock;

pub use capabilities::{Connectable, Detector, Gateway, Positioner};
pub use mock::{DetectorSpec, MockCalls, MockGateway};
