//! Scan over an explicit table of N-D points.

use crate::data::NavigationAxis;
use crate::error::SequencerError;
use crate::scanner::{check_step, DataDistribution, Position, Sequencer};

/// Explicit list of points, each with one coordinate per actuator.
///
/// Points are indexed by a single linear grid dimension (`Spread` distribution), so
/// arbitrary curvilinear paths can be scanned.
#[derive(Debug, Clone)]
pub struct TabularScan {
    actuators: Vec<String>,
    points: Vec<Vec<f64>>,
}

impl TabularScan {
    /// Build a table scan.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` when there are no actuators or a point's arity does not match.
    pub fn new(actuators: Vec<String>, points: Vec<Vec<f64>>) -> Result<Self, SequencerError> {
        if actuators.is_empty() {
            return Err(SequencerError::InvalidParameters(
                "tabular scan needs at least one actuator".into(),
            ));
        }
        if let Some((i, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| p.len() != actuators.len())
        {
            return Err(SequencerError::InvalidParameters(format!(
                "point {} has {} coordinates, expected {}",
                i,
                p.len(),
                actuators.len()
            )));
        }
        Ok(Self { actuators, points })
    }
}

impl Sequencer for TabularScan {
    fn scan_type(&self) -> &str {
        "tabular"
    }

    fn n_steps(&self) -> usize {
        self.points.len()
    }

    fn position_at(&self, step: usize) -> Result<Position, SequencerError> {
        check_step(step, self.n_steps())?;
        Ok(Position::new(self.points[step].clone()))
    }

    fn grid_index_of(&self, step: usize) -> Result<Vec<usize>, SequencerError> {
        check_step(step, self.n_steps())?;
        Ok(vec![step])
    }

    fn nav_axes(&self) -> Vec<NavigationAxis> {
        // Every axis indexes the same linear dimension.
        self.actuators
            .iter()
            .enumerate()
            .map(|(a, label)| {
                NavigationAxis::new(
                    label.clone(),
                    self.points.iter().map(|p| p[a]).collect(),
                    0,
                )
            })
            .collect()
    }

    fn grid_shape(&self) -> Vec<usize> {
        vec![self.points.len()]
    }

    fn distribution(&self) -> DataDistribution {
        DataDistribution::Spread
    }
}
