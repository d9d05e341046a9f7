//! 1-D scan between start and stop with a fixed step.

use crate::data::NavigationAxis;
use crate::error::SequencerError;
use crate::scanner::{check_step, DataDistribution, Position, Sequencer};

const STEP_TOLERANCE: f64 = 1e-12;

/// Linear scan of a single actuator.
///
/// Positions run from `start` towards `stop` in increments of `step`. `stop` is included
/// when it falls on the step grid (within `1e-12`); otherwise the last position is the
/// largest grid point before `stop`.
///
/// # Example
///
/// ```rust
/// use daq_scan::scanner::{LinearScan, Sequencer};
///
/// let scan = LinearScan::new("delay_line", 0.0, 1.0, 0.25).unwrap();
/// assert_eq!(scan.n_steps(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct LinearScan {
    actuator: String,
    positions: Vec<f64>,
}

impl LinearScan {
    /// Build the position list.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` when `step` is zero, `start == stop`, or `step` points away
    /// from `stop`.
    pub fn new(
        actuator: impl Into<String>,
        start: f64,
        stop: f64,
        step: f64,
    ) -> Result<Self, SequencerError> {
        let positions = linspace_step(start, stop, step)?;
        Ok(Self {
            actuator: actuator.into(),
            positions,
        })
    }

    /// Step count estimated from the parameters alone, before building positions.
    pub fn evaluate_steps(start: f64, stop: f64, step: f64) -> usize {
        if step == 0.0 {
            return 0;
        }
        ((stop - start) / step).abs().floor() as usize + 1
    }
}

fn linspace_step(start: f64, stop: f64, step: f64) -> Result<Vec<f64>, SequencerError> {
    if step.abs() < STEP_TOLERANCE
        || start == stop
        || (stop - start).signum() != step.signum()
        || !start.is_finite()
        || !stop.is_finite()
    {
        return Err(SequencerError::InvalidParameters(format!(
            "cannot step from {} to {} by {}",
            start, stop, step
        )));
    }

    let mut n_steps = ((stop - start) / step).ceil() as usize;
    let last = start + (n_steps as f64 - 1.0) * step;
    if (last + step - stop).abs() < STEP_TOLERANCE {
        n_steps += 1;
    }
    Ok((0..n_steps).map(|i| start + i as f64 * step).collect())
}

impl Sequencer for LinearScan {
    fn scan_type(&self) -> &str {
        "linear"
    }

    fn n_steps(&self) -> usize {
        self.positions.len()
    }

    fn position_at(&self, step: usize) -> Result<Position, SequencerError> {
        check_step(step, self.n_steps())?;
        Ok(Position::new(vec![self.positions[step]]))
    }

    fn grid_index_of(&self, step: usize) -> Result<Vec<usize>, SequencerError> {
        check_step(step, self.n_steps())?;
        Ok(vec![step])
    }

    fn nav_axes(&self) -> Vec<NavigationAxis> {
        vec![NavigationAxis::new(
            self.actuator.clone(),
            self.positions.clone(),
            0,
        )]
    }

    fn grid_shape(&self) -> Vec<usize> {
        vec![self.positions.len()]
    }

    fn distribution(&self) -> DataDistribution {
        DataDistribution::Uniform
    }
}
