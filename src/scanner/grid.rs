//! Rectangular N-D grid scans.

use serde::{Deserialize, Serialize};

use crate::data::NavigationAxis;
use crate::error::SequencerError;
use crate::scanner::{check_step, DataDistribution, Position, Sequencer};

/// Evenly spaced values for one grid axis, `num_points` from `start` to `stop` inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    /// Actuator driving this axis
    pub actuator: String,
    /// First value
    pub start: f64,
    /// Last value
    pub stop: f64,
    /// Number of values (>= 1)
    pub num_points: usize,
}

impl AxisRange {
    /// Build an axis range
    pub fn new(actuator: impl Into<String>, start: f64, stop: f64, num_points: usize) -> Self {
        Self {
            actuator: actuator.into(),
            start,
            stop,
            num_points,
        }
    }

    fn value(&self, i: usize) -> f64 {
        if self.num_points <= 1 {
            self.start
        } else {
            let step = (self.stop - self.start) / (self.num_points - 1) as f64;
            self.start + step * i as f64
        }
    }
}

/// Cartesian product of axis ranges, visited row-major (last axis fastest).
#[derive(Debug, Clone)]
pub struct GridScan {
    axes: Vec<AxisRange>,
}

impl GridScan {
    /// Build a grid scan.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` when there are no axes or an axis has zero points.
    pub fn new(axes: Vec<AxisRange>) -> Result<Self, SequencerError> {
        if axes.is_empty() {
            return Err(SequencerError::InvalidParameters(
                "grid scan needs at least one axis".into(),
            ));
        }
        if let Some(axis) = axes.iter().find(|a| a.num_points == 0) {
            return Err(SequencerError::InvalidParameters(format!(
                "axis '{}' has no points",
                axis.actuator
            )));
        }
        Ok(Self { axes })
    }

    fn unravel(&self, step: usize) -> Vec<usize> {
        let mut rest = step;
        let mut index = vec![0; self.axes.len()];
        for (slot, axis) in index.iter_mut().zip(&self.axes).rev() {
            *slot = rest % axis.num_points;
            rest /= axis.num_points;
        }
        index
    }
}

impl Sequencer for GridScan {
    fn scan_type(&self) -> &str {
        "grid"
    }

    fn n_steps(&self) -> usize {
        self.axes.iter().map(|a| a.num_points).product()
    }

    fn position_at(&self, step: usize) -> Result<Position, SequencerError> {
        check_step(step, self.n_steps())?;
        let index = self.unravel(step);
        Ok(Position::new(
            self.axes
                .iter()
                .zip(&index)
                .map(|(axis, &i)| axis.value(i))
                .collect(),
        ))
    }

    fn grid_index_of(&self, step: usize) -> Result<Vec<usize>, SequencerError> {
        check_step(step, self.n_steps())?;
        Ok(self.unravel(step))
    }

    fn nav_axes(&self) -> Vec<NavigationAxis> {
        let n = self.n_steps();
        self.axes
            .iter()
            .enumerate()
            .map(|(dim, axis)| {
                let data = (0..n).map(|s| axis.value(self.unravel(s)[dim])).collect();
                NavigationAxis::new(axis.actuator.clone(), data, dim)
            })
            .collect()
    }

    fn grid_shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.num_points).collect()
    }

    fn distribution(&self) -> DataDistribution {
        DataDistribution::Uniform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2x3() -> GridScan {
        GridScan::new(vec![
            AxisRange::new("x", 0.0, 1.0, 2),
            AxisRange::new("y", 10.0, 12.0, 3),
        ])
        .unwrap()
    }

    #[test]
    fn row_major_order() {
        let grid = grid_2x3();
        assert_eq!(grid.n_steps(), 6);
        assert_eq!(grid.grid_shape(), vec![2, 3]);
        assert_eq!(grid.grid_index_of(0).unwrap(), vec![0, 0]);
        assert_eq!(grid.grid_index_of(2).unwrap(), vec![0, 2]);
        assert_eq!(grid.grid_index_of(3).unwrap(), vec![1, 0]);
        assert_eq!(grid.position_at(4).unwrap().coords(), &[1.0, 11.0]);
    }

    #[test]
    fn grid_indices_are_dense_and_distinct() {
        let grid = grid_2x3();
        let mut seen: Vec<Vec<usize>> = (0..grid.n_steps())
            .map(|s| grid.grid_index_of(s).unwrap())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn nav_axes_are_flattened_per_step() {
        let axes = grid_2x3().nav_axes();
        assert_eq!(axes[0].data, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(axes[1].data, vec![10.0, 11.0, 12.0, 10.0, 11.0, 12.0]);
        assert_eq!(axes[1].index, 1);
    }

    #[test]
    fn rejects_empty_axes() {
        assert!(GridScan::new(vec![]).is_err());
        assert!(GridScan::new(vec![AxisRange::new("x", 0.0, 1.0, 0)]).is_err());
    }
}
