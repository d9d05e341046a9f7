//! Adaptive position strategy.
//!
//! An adaptive scan has no precomputed position list. After every grab the loop tells the
//! oracle the value of a probe channel at the visited position, and asks it for the next
//! point to probe.

use crate::data::NavigationAxis;
use crate::error::SequencerError;
use crate::scanner::Position;

/// Suggests the next point to probe from previously measured values.
pub trait PointOracle: Send {
    /// Next point to visit, or `None` when the oracle has nothing left to ask.
    fn ask(&mut self) -> Result<Option<Position>, SequencerError>;

    /// Report the probe value measured at `position`.
    fn tell(&mut self, position: &Position, value: f64) -> Result<(), SequencerError>;
}

/// Oracle plus the scan-level parameters of an adaptive scan.
pub struct AdaptiveSource {
    oracle: Box<dyn PointOracle>,
    actuators: Vec<String>,
    max_steps: usize,
    probe: String,
}

impl AdaptiveSource {
    /// Build an adaptive source.
    ///
    /// `probe` is the full name of the channel fed back to the oracle and `max_steps`
    /// bounds the number of points per average.
    pub fn new(
        oracle: Box<dyn PointOracle>,
        actuators: Vec<String>,
        max_steps: usize,
        probe: impl Into<String>,
    ) -> Self {
        Self {
            oracle,
            actuators,
            max_steps,
            probe: probe.into(),
        }
    }

    /// Point budget per average
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Probe channel name
    pub fn probe(&self) -> &str {
        &self.probe
    }

    /// Empty axes, grown as points are visited
    pub fn intended_axes(&self) -> Vec<NavigationAxis> {
        self.actuators
            .iter()
            .map(|label| NavigationAxis::new(label.clone(), Vec::new(), 0))
            .collect()
    }

    pub(crate) fn ask(&mut self) -> Result<Option<Position>, SequencerError> {
        self.oracle.ask()
    }

    pub(crate) fn tell(&mut self, position: &Position, value: f64) -> Result<(), SequencerError> {
        self.oracle.tell(position, value)
    }
}

/// 1-D learner refining the interval with the largest loss.
///
/// The first two points are the bounds. Every following point bisects the interval
/// between neighbouring points whose normalised `sqrt(dx² + dy²)` is largest, so the
/// learner samples densely where the probe signal changes fastest.
///
/// A value told after an `ask` belongs to the suggested point, wherever the actuator
/// actually landed.
#[derive(Debug, Clone)]
pub struct Learner1D {
    bounds: (f64, f64),
    /// Visited x values with their value once told, kept sorted by x
    points: Vec<(f64, Option<f64>)>,
    min_interval: f64,
    /// Last suggestion not yet told a value
    pending: Option<f64>,
    asked: usize,
}

impl Learner1D {
    /// Learner over `[lower, upper]`.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` when the bounds are empty or not finite.
    pub fn new(lower: f64, upper: f64) -> Result<Self, SequencerError> {
        if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
            return Err(SequencerError::InvalidParameters(format!(
                "invalid learner bounds [{}, {}]",
                lower, upper
            )));
        }
        Ok(Self {
            bounds: (lower, upper),
            points: Vec::new(),
            min_interval: (upper - lower) * 1e-9,
            pending: None,
            asked: 0,
        })
    }

    /// Visited points that have been told a value
    pub fn data(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .filter_map(|(x, y)| y.map(|y| (*x, y)))
            .collect()
    }

    fn insert(&mut self, x: f64) {
        let at = self.points.partition_point(|(px, _)| *px < x);
        self.points.insert(at, (x, None));
    }

    fn y_scale(&self) -> f64 {
        let ys: Vec<f64> = self.points.iter().filter_map(|(_, y)| *y).collect();
        let (min, max) = ys
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &y| {
                (lo.min(y), hi.max(y))
            });
        if ys.is_empty() || max - min <= 0.0 {
            1.0
        } else {
            max - min
        }
    }
}

impl PointOracle for Learner1D {
    fn ask(&mut self) -> Result<Option<Position>, SequencerError> {
        let (lower, upper) = self.bounds;
        let next = match self.asked {
            0 => Some(lower),
            1 => Some(upper),
            _ => {
                let x_scale = upper - lower;
                let y_scale = self.y_scale();
                self.points
                    .windows(2)
                    .filter(|w| w[1].0 - w[0].0 > self.min_interval)
                    .map(|w| {
                        let dx = (w[1].0 - w[0].0) / x_scale;
                        let dy = match (w[0].1, w[1].1) {
                            (Some(a), Some(b)) => (b - a) / y_scale,
                            _ => 0.0,
                        };
                        ((w[0].0 + w[1].0) / 2.0, dx.hypot(dy))
                    })
                    .fold(None, |best: Option<(f64, f64)>, (x, loss)| match best {
                        Some((_, best_loss)) if best_loss >= loss => best,
                        _ => Some((x, loss)),
                    })
                    .map(|(x, _)| x)
            }
        };
        if let Some(x) = next {
            self.insert(x);
            self.asked += 1;
        }
        self.pending = next;
        Ok(next.map(|x| Position::new(vec![x])))
    }

    fn tell(&mut self, position: &Position, value: f64) -> Result<(), SequencerError> {
        let x = *position
            .coords()
            .first()
            .ok_or_else(|| SequencerError::Oracle("position has no coordinate".into()))?;
        if let Some(asked) = self.pending.take() {
            if let Some(slot) = self.points.iter_mut().find(|(px, _)| *px == asked) {
                slot.1 = Some(value);
                return Ok(());
            }
        }
        match self
            .points
            .iter_mut()
            .min_by(|a, b| (a.0 - x).abs().total_cmp(&(b.0 - x).abs()))
        {
            Some(slot) if (slot.0 - x).abs() <= self.min_interval.max(1e-12) => {
                slot.1 = Some(value);
            }
            _ => {
                // Told about a point it never suggested.
                let at = self.points.partition_point(|(px, _)| *px < x);
                self.points.insert(at, (x, Some(value)));
            }
        }
        Ok(())
    }
}
