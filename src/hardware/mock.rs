//! Mock Hardware Implementations
//!
//! Provides a simulated gateway for running scans without physical hardware.
//! All delays use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Simulation
//!
//! - Actuators land at `target + offset`, with a configurable offset per actuator, so the
//!   measured axes diverge from the intended ones.
//! - Every detector returns a gaussian peak centred at 0.5 on each axis, as scalar
//!   channels (`ch0`, `ch1`, ...), an optional 1-D `spectrum` and an optional 2-D `image`.
//! - Detectors built `with_backgrounds()` add `Bg_fluo` and `Bg_dark` reference channels,
//!   tagged as background at the gateway boundary.
//! - Failures can be injected on a given move or grab call, and a cancellation flag can
//!   be raised while a given grab is in flight.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::config::{MockDetectorConfig, MockHardwareConfig};
use crate::data::{Channel, ChannelName, MeasurementBundle};
use crate::error::GatewayError;
use crate::hardware::capabilities::{Connectable, Detector, Positioner};
use crate::scanner::Position;

/// Name prefix of reference-frame channels produced by the mock detectors
pub const DEFAULT_MARKER: &str = "Bg";

/// Channel set of one simulated detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSpec {
    /// Module name
    pub name: String,
    /// Number of scalar channels
    pub scalars: usize,
    /// Length of the 1-D `spectrum` channel, if any
    pub trace_len: Option<usize>,
    /// `(rows, cols)` of the 2-D `image` channel, if any
    pub image: Option<(usize, usize)>,
    /// Emit `Bg_fluo` / `Bg_dark` reference channels
    pub backgrounds: bool,
}

impl DetectorSpec {
    /// Detector with a single scalar channel `ch0`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scalars: 1,
            trace_len: None,
            image: None,
            backgrounds: false,
        }
    }

    /// Set the number of scalar channels
    pub fn with_scalars(mut self, scalars: usize) -> Self {
        self.scalars = scalars;
        self
    }

    /// Add a 1-D `spectrum` channel
    pub fn with_trace(mut self, len: usize) -> Self {
        self.trace_len = Some(len);
        self
    }

    /// Add a 2-D `image` channel
    pub fn with_image(mut self, rows: usize, cols: usize) -> Self {
        self.image = Some((rows, cols));
        self
    }

    /// Add `Bg_fluo` / `Bg_dark` reference channels
    pub fn with_backgrounds(mut self) -> Self {
        self.backgrounds = true;
        self
    }
}

impl From<&MockDetectorConfig> for DetectorSpec {
    fn from(config: &MockDetectorConfig) -> Self {
        Self {
            name: config.name.clone(),
            scalars: config.scalars,
            trace_len: config.trace_len,
            image: config.image.map(|[rows, cols]| (rows, cols)),
            backgrounds: config.backgrounds,
        }
    }
}

/// Calls recorded by [`MockGateway`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockCalls {
    /// Number of `connect()` calls
    pub connects: usize,
    /// Number of `disconnect()` calls
    pub disconnects: usize,
    /// Requested move targets, in call order
    pub moves: Vec<Position>,
    /// Positions passed to `grab()`, in call order
    pub grabs: Vec<Position>,
}

struct MockState {
    connected: bool,
    calls: MockCalls,
    rng: StdRng,
}

/// Simulated actuators and detectors behind the [`crate::hardware::Gateway`] traits.
///
/// # Example
///
/// ```
/// use daq_scan::hardware::{Connectable, DetectorSpec, MockGateway, Positioner};
/// use daq_scan::scanner::Position;
///
/// # tokio_test::block_on(async {
/// let gateway = MockGateway::new(vec!["delay".into()])
///     .with_detector(DetectorSpec::new("det1").with_backgrounds())
///     .with_offset(0, 0.5);
/// gateway.connect().await.unwrap();
/// let actual = gateway.move_to(&Position::new(vec![1.0])).await.unwrap();
/// assert_eq!(actual.coords(), &[1.5]);
/// # });
/// ```
pub struct MockGateway {
    actuators: Vec<String>,
    offsets: Vec<f64>,
    detectors: Vec<DetectorSpec>,
    marker: String,
    noise: f64,
    move_delay: Duration,
    grab_delay: Duration,
    fail_connect: bool,
    fail_move_at: Option<usize>,
    fail_grab_at: Option<usize>,
    cancel_at_grab: Option<(usize, Arc<AtomicBool>)>,
    state: Arc<RwLock<MockState>>,
}

impl MockGateway {
    /// Gateway with the given actuators and no detectors
    pub fn new(actuators: Vec<String>) -> Self {
        let offsets = vec![0.0; actuators.len()];
        Self {
            actuators,
            offsets,
            detectors: Vec::new(),
            marker: DEFAULT_MARKER.to_string(),
            noise: 0.0,
            move_delay: Duration::ZERO,
            grab_delay: Duration::ZERO,
            fail_connect: false,
            fail_move_at: None,
            fail_grab_at: None,
            cancel_at_grab: None,
            state: Arc::new(RwLock::new(MockState {
                connected: false,
                calls: MockCalls::default(),
                rng: StdRng::seed_from_u64(0),
            })),
        }
    }

    /// Gateway described by the `[mock]` configuration section
    pub fn from_config(
        actuators: Vec<String>,
        config: &MockHardwareConfig,
        marker: impl Into<String>,
    ) -> Self {
        let mut gateway = Self::new(actuators)
            .with_marker(marker)
            .with_noise(config.noise, config.seed)
            .with_delays(config.move_delay, config.grab_delay);
        for (axis, offset) in config.offsets.iter().enumerate() {
            gateway = gateway.with_offset(axis, *offset);
        }
        for detector in &config.detectors {
            gateway = gateway.with_detector(detector.into());
        }
        gateway
    }

    /// Add a detector
    pub fn with_detector(mut self, detector: DetectorSpec) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Actuator `axis` lands `offset` away from every requested target
    pub fn with_offset(mut self, axis: usize, offset: f64) -> Self {
        if let Some(slot) = self.offsets.get_mut(axis) {
            *slot = offset;
        }
        self
    }

    /// Background marker used to tag channels at the boundary
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Uniform noise amplitude added to detector values (seeded, reproducible)
    pub fn with_noise(mut self, amplitude: f64, seed: u64) -> Self {
        self.noise = amplitude;
        self.state = Arc::new(RwLock::new(MockState {
            connected: false,
            calls: MockCalls::default(),
            rng: StdRng::seed_from_u64(seed),
        }));
        self
    }

    /// Simulated move and grab durations
    pub fn with_delays(mut self, move_delay: Duration, grab_delay: Duration) -> Self {
        self.move_delay = move_delay;
        self.grab_delay = grab_delay;
        self
    }

    /// Make `connect()` fail
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Fail the move with 0-based call number `call`
    pub fn failing_move_at(mut self, call: usize) -> Self {
        self.fail_move_at = Some(call);
        self
    }

    /// Fail the grab with 0-based call number `call`
    pub fn failing_grab_at(mut self, call: usize) -> Self {
        self.fail_grab_at = Some(call);
        self
    }

    /// Raise `flag` while the grab with 0-based call number `call` is in flight
    pub fn cancel_at_grab(mut self, call: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_at_grab = Some((call, flag));
        self
    }

    /// Snapshot of the recorded calls
    pub async fn calls(&self) -> MockCalls {
        self.state.read().await.calls.clone()
    }

    /// True between `connect()` and `disconnect()`
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    fn signal(position: &Position) -> f64 {
        position
            .coords()
            .iter()
            .map(|x| (-(x - 0.5).powi(2) / 0.02).exp())
            .sum()
    }

    fn detector_channels(
        &self,
        spec: &DetectorSpec,
        signal: f64,
        rng: &mut StdRng,
    ) -> Vec<Channel> {
        let mut noise = || {
            if self.noise > 0.0 {
                rng.gen_range(-self.noise..self.noise)
            } else {
                0.0
            }
        };

        let mut channels: Vec<Channel> = (0..spec.scalars)
            .map(|i| {
                Channel::scalar(
                    ChannelName::new(spec.name.clone(), format!("ch{}", i)),
                    signal + i as f64 + noise(),
                )
            })
            .collect();

        if let Some(len) = spec.trace_len {
            let values = (0..len)
                .map(|j| signal * (j as f64 + 1.0) / len as f64 + noise())
                .collect();
            channels.push(Channel::trace(
                ChannelName::new(spec.name.clone(), "spectrum"),
                values,
            ));
        }

        if let Some((rows, cols)) = spec.image {
            let values = (0..rows * cols)
                .map(|k| signal * k as f64 + noise())
                .collect();
            channels.push(Channel::image(
                ChannelName::new(spec.name.clone(), "image"),
                rows,
                cols,
                values,
            ));
        }

        if spec.backgrounds {
            for (channel, level) in [("Bg_fluo", 0.1), ("Bg_dark", 0.01)] {
                let name = ChannelName::new(spec.name.clone(), channel);
                channels.push(match spec.trace_len {
                    Some(len) => Channel::trace(name, vec![level; len]),
                    None => Channel::scalar(name, level),
                });
            }
        }

        channels
    }
}

#[async_trait]
impl Connectable for MockGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        state.calls.connects += 1;
        if self.fail_connect {
            return Err(GatewayError::Connection(
                "simulated connection failure".into(),
            ));
        }
        state.connected = true;
        debug!(
            actuators = self.actuators.len(),
            detectors = self.detectors.len(),
            "MockGateway connected"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        state.calls.disconnects += 1;
        state.connected = false;
        debug!("MockGateway disconnected");
        Ok(())
    }
}

#[async_trait]
impl Positioner for MockGateway {
    fn actuators(&self) -> Vec<String> {
        self.actuators.clone()
    }

    async fn move_to(&self, target: &Position) -> Result<Position, GatewayError> {
        let call = {
            let mut state = self.state.write().await;
            if !state.connected {
                return Err(GatewayError::NotConnected);
            }
            state.calls.moves.push(target.clone());
            state.calls.moves.len() - 1
        };

        if target.len() != self.actuators.len() {
            return Err(GatewayError::AxisMismatch {
                expected: self.actuators.len(),
                got: target.len(),
            });
        }
        if self.fail_move_at == Some(call) {
            return Err(GatewayError::Move {
                actuator: self.actuators.first().cloned().unwrap_or_default(),
                message: format!("simulated failure on move {}", call),
            });
        }

        // CRITICAL: Use tokio::time::sleep, NOT std::thread::sleep
        if !self.move_delay.is_zero() {
            sleep(self.move_delay).await;
        }

        let actual = Position::new(
            target
                .coords()
                .iter()
                .zip(&self.offsets)
                .map(|(x, offset)| x + offset)
                .collect(),
        );
        debug!(call, target = %target, actual = %actual, "MockGateway moved");
        Ok(actual)
    }
}

#[async_trait]
impl Detector for MockGateway {
    fn detectors(&self) -> Vec<String> {
        self.detectors.iter().map(|d| d.name.clone()).collect()
    }

    async fn grab(&self, at: &Position) -> Result<MeasurementBundle, GatewayError> {
        let mut state = self.state.write().await;
        if !state.connected {
            return Err(GatewayError::NotConnected);
        }
        state.calls.grabs.push(at.clone());
        let call = state.calls.grabs.len() - 1;

        if let Some((at_call, flag)) = &self.cancel_at_grab {
            if *at_call == call {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if self.fail_grab_at == Some(call) {
            return Err(GatewayError::Grab {
                detector: self
                    .detectors
                    .first()
                    .map(|d| d.name.clone())
                    .unwrap_or_default(),
                message: format!("simulated failure on grab {}", call),
            });
        }

        if !self.grab_delay.is_zero() {
            sleep(self.grab_delay).await;
        }

        let signal = Self::signal(at);
        let mut channels = Vec::new();
        for spec in &self.detectors {
            let produced = self.detector_channels(spec, signal, &mut state.rng);
            channels.extend(produced);
        }
        debug!(call, at = %at, channels = channels.len(), "MockGateway grabbed");
        Ok(MeasurementBundle::tagged(channels, &self.marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ChannelRole;

    fn gateway() -> MockGateway {
        MockGateway::new(vec!["x".into(), "y".into()])
            .with_detector(
                DetectorSpec::new("det1")
                    .with_scalars(2)
                    .with_trace(4)
                    .with_image(2, 3)
                    .with_backgrounds(),
            )
            .with_offset(1, 0.5)
    }

    #[tokio::test]
    async fn move_reports_offset_position() {
        let gw = gateway();
        gw.connect().await.unwrap();
        let actual = gw.move_to(&Position::new(vec![1.0, 2.0])).await.unwrap();
        assert_eq!(actual.coords(), &[1.0, 2.5]);
        assert_eq!(gw.calls().await.moves.len(), 1);
    }

    #[tokio::test]
    async fn zero_delays_complete_on_first_poll() {
        let gw = gateway();
        gw.connect().await.unwrap();
        let at = Position::new(vec![0.0, 0.0]);

        let mut moving = tokio_test::task::spawn(gw.move_to(&at));
        tokio_test::assert_ready_ok!(moving.poll());
        let mut grabbing = tokio_test::task::spawn(gw.grab(&at));
        tokio_test::assert_ready_ok!(grabbing.poll());
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let gw = gateway();
        let err = gw.move_to(&Position::new(vec![0.0, 0.0])).await.unwrap_err();
        assert_eq!(err, GatewayError::NotConnected);
        let err = gw.grab(&Position::new(vec![0.0, 0.0])).await.unwrap_err();
        assert_eq!(err, GatewayError::NotConnected);
    }

    #[tokio::test]
    async fn grab_tags_background_channels() {
        let gw = gateway();
        gw.connect().await.unwrap();
        let bundle = gw.grab(&Position::new(vec![0.5, 0.5])).await.unwrap();

        // ch0, ch1, spectrum, image, Bg_fluo, Bg_dark
        assert_eq!(bundle.len(), 6);
        assert_eq!(bundle.with_role(ChannelRole::Background).count(), 2);
        let image = bundle.get("det1/image").unwrap();
        assert_eq!(image.shape, vec![2, 3]);
        let fluo = bundle.get("det1/Bg_fluo").unwrap();
        assert_eq!(fluo.role, ChannelRole::Background);
        assert_eq!(fluo.values.len(), 4);
    }

    #[tokio::test]
    async fn injected_failures_and_arity_check() {
        let gw = MockGateway::new(vec!["x".into()])
            .with_detector(DetectorSpec::new("det1"))
            .failing_move_at(1)
            .failing_grab_at(0);
        gw.connect().await.unwrap();
        assert!(gw.move_to(&Position::new(vec![0.0])).await.is_ok());
        assert!(matches!(
            gw.move_to(&Position::new(vec![1.0])).await,
            Err(GatewayError::Move { .. })
        ));
        assert!(matches!(
            gw.move_to(&Position::new(vec![1.0, 2.0])).await,
            Err(GatewayError::AxisMismatch { expected: 1, got: 2 })
        ));
        assert!(matches!(
            gw.grab(&Position::new(vec![0.0])).await,
            Err(GatewayError::Grab { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_hook_raises_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let gw = MockGateway::new(vec!["x".into()])
            .with_detector(DetectorSpec::new("det1"))
            .cancel_at_grab(1, flag.clone());
        gw.connect().await.unwrap();
        gw.grab(&Position::new(vec![0.0])).await.unwrap();
        assert!(!flag.load(Ordering::SeqCst));
        gw.grab(&Position::new(vec![0.0])).await.unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn built_from_config_section() {
        let config = MockHardwareConfig {
            detectors: vec![MockDetectorConfig {
                name: "cam".into(),
                scalars: 0,
                trace_len: None,
                image: Some([2, 2]),
                backgrounds: false,
            }],
            offsets: vec![0.25],
            ..Default::default()
        };
        let gw = MockGateway::from_config(vec!["x".into()], &config, "Bg");
        assert_eq!(gw.detectors(), vec!["cam".to_string()]);

        gw.connect().await.unwrap();
        let actual = gw.move_to(&Position::new(vec![1.0])).await.unwrap();
        assert_eq!(actual.coords(), &[1.25]);
        let bundle = gw.grab(&actual).await.unwrap();
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.get("cam/image").unwrap().shape, vec![2, 2]);
    }

    #[tokio::test]
    async fn seeded_noise_is_reproducible() {
        let a = MockGateway::new(vec!["x".into()])
            .with_detector(DetectorSpec::new("det1"))
            .with_noise(0.1, 7);
        let b = MockGateway::new(vec!["x".into()])
            .with_detector(DetectorSpec::new("det1"))
            .with_noise(0.1, 7);
        a.connect().await.unwrap();
        b.connect().await.unwrap();
        let at = Position::new(vec![0.2]);
        assert_eq!(a.grab(&at).await.unwrap(), b.grab(&at).await.unwrap());
    }
}
