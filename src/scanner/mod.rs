//! Position sources for the sequencing loop.
//!
//! A scan draws its positions from a [`PositionSource`], chosen once per scan:
//!
//! - **Indexed**: a [`Sequencer`] exposing a precomputed, indexable position list
//!   ([`LinearScan`], [`TabularScan`], [`GridScan`]).
//! - **Adaptive**: a [`PointOracle`] suggesting the next point from previously measured
//!   values ([`Learner1D`]).
//!
//! The loop treats sequencers as read-only and deterministic: `position_at(k)` returns the
//! same position for the whole scan.

pub mod adaptive;
pub mod grid;
pub mod linear;
pub mod tabular;

pub use adaptive::{AdaptiveSource, Learner1D, PointOracle};
pub use grid::{AxisRange, GridScan};
pub use linear::LinearScan;
pub use tabular::TabularScan;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::NavigationAxis;
use crate::error::SequencerError;

/// Coordinates of one step, one value per scanned axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position(Vec<f64>);

impl Position {
    /// Position from coordinates
    pub fn new(coords: Vec<f64>) -> Self {
        Self(coords)
    }

    /// Coordinates in axis order
    pub fn coords(&self) -> &[f64] {
        &self.0
    }

    /// Number of axes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the zero-axis position
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for Position {
    fn from(coords: Vec<f64>) -> Self {
        Self(coords)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// How grid indices relate to positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDistribution {
    /// Rectangular grid; each axis indexes its own dimension
    Uniform,
    /// Arbitrary point list indexed by a single linear dimension
    Spread,
}

impl fmt::Display for DataDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDistribution::Uniform => write!(f, "uniform"),
            DataDistribution::Spread => write!(f, "spread"),
        }
    }
}

/// Precomputed, indexable list of scan positions.
pub trait Sequencer: Send + Sync {
    /// Scan type identifier (e.g. "linear", "tabular", "grid")
    fn scan_type(&self) -> &str;

    /// Total number of steps per average
    fn n_steps(&self) -> usize;

    /// Position for a linear step
    fn position_at(&self, step: usize) -> Result<Position, SequencerError>;

    /// Grid index components for a linear step
    fn grid_index_of(&self, step: usize) -> Result<Vec<usize>, SequencerError>;

    /// Intended navigation axes, one coordinate per step
    fn nav_axes(&self) -> Vec<NavigationAxis>;

    /// Shape of the grid spanned by `grid_index_of`
    fn grid_shape(&self) -> Vec<usize>;

    /// Layout tag
    fn distribution(&self) -> DataDistribution;
}

pub(crate) fn check_step(step: usize, n_steps: usize) -> Result<(), SequencerError> {
    if step >= n_steps {
        return Err(SequencerError::StepOutOfRange { step, n_steps });
    }
    Ok(())
}

/// Declared grid of a scan: shape, axes and distribution, including the average dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanLayout {
    /// Grid shape (average dimension first when averaging)
    pub shape: Vec<usize>,
    /// Declared axes; the `Average` axis sits at dimension 0 when averaging
    pub axes: Vec<NavigationAxis>,
    /// Layout tag forwarded with every step write
    pub distribution: DataDistribution,
}

impl ScanLayout {
    /// Layout of an indexed scan repeated `n_average` times.
    pub fn new(sequencer: &dyn Sequencer, n_average: usize) -> Self {
        Self::build(
            sequencer.grid_shape(),
            sequencer.nav_axes(),
            sequencer.distribution(),
            n_average,
        )
    }

    /// Layout of an adaptive scan bounded by `max_steps` points per average.
    pub fn adaptive(source: &AdaptiveSource, n_average: usize) -> Self {
        Self::build(
            vec![source.max_steps()],
            source.intended_axes(),
            DataDistribution::Spread,
            n_average,
        )
    }

    /// Layout of any position source
    pub fn for_source(source: &PositionSource, n_average: usize) -> Self {
        match source {
            PositionSource::Indexed(seq) => Self::new(seq.as_ref(), n_average),
            PositionSource::Adaptive(adaptive) => Self::adaptive(adaptive, n_average),
        }
    }

    fn build(
        grid_shape: Vec<usize>,
        mut axes: Vec<NavigationAxis>,
        distribution: DataDistribution,
        n_average: usize,
    ) -> Self {
        let mut shape = grid_shape;
        if n_average > 1 {
            for axis in axes.iter_mut() {
                axis.index += 1;
            }
            let averages = (0..n_average).map(|a| a as f64).collect();
            axes.insert(0, NavigationAxis::new("Average", averages, 0));
            shape.insert(0, n_average);
        }
        Self {
            shape,
            axes,
            distribution,
        }
    }

    /// Total number of grid cells
    pub fn n_cells(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Position strategy selected once per scan.
pub enum PositionSource {
    /// Precomputed positions
    Indexed(Box<dyn Sequencer>),
    /// Oracle-suggested positions
    Adaptive(AdaptiveSource),
}

/// Next position to visit together with its grid index components.
#[derive(Debug, Clone, PartialEq)]
pub struct NextPoint {
    /// Requested position
    pub position: Position,
    /// Grid index components (without the average prefix)
    pub grid: Vec<usize>,
}

impl PositionSource {
    /// True for the adaptive strategy
    pub fn is_adaptive(&self) -> bool {
        matches!(self, PositionSource::Adaptive(_))
    }

    /// Steps per average, if known in advance
    pub fn n_steps(&self) -> Option<usize> {
        match self {
            PositionSource::Indexed(seq) => Some(seq.n_steps()),
            PositionSource::Adaptive(_) => None,
        }
    }

    /// Layout tag
    pub fn distribution(&self) -> DataDistribution {
        match self {
            PositionSource::Indexed(seq) => seq.distribution(),
            PositionSource::Adaptive(_) => DataDistribution::Spread,
        }
    }

    /// Intended axes before any data is collected
    pub fn intended_axes(&self) -> Vec<NavigationAxis> {
        match self {
            PositionSource::Indexed(seq) => seq.nav_axes(),
            PositionSource::Adaptive(adaptive) => adaptive.intended_axes(),
        }
    }

    /// Position for `step`, or `None` once the average is exhausted.
    pub fn next_point(&mut self, step: usize) -> Result<Option<NextPoint>, SequencerError> {
        match self {
            PositionSource::Indexed(seq) => {
                if step >= seq.n_steps() {
                    return Ok(None);
                }
                Ok(Some(NextPoint {
                    position: seq.position_at(step)?,
                    grid: seq.grid_index_of(step)?,
                }))
            }
            PositionSource::Adaptive(adaptive) => {
                if step >= adaptive.max_steps() {
                    return Ok(None);
                }
                Ok(adaptive.ask()?.map(|position| NextPoint {
                    position,
                    grid: vec![step],
                }))
            }
        }
    }

    /// Feed a measured value back to the adaptive oracle; no-op for indexed scans.
    pub fn tell(&mut self, position: &Position, value: f64) -> Result<(), SequencerError> {
        match self {
            PositionSource::Indexed(_) => Ok(()),
            PositionSource::Adaptive(adaptive) => adaptive.tell(position, value),
        }
    }

    /// Channel whose value is fed back to the oracle
    pub fn probe(&self) -> Option<&str> {
        match self {
            PositionSource::Indexed(_) => None,
            PositionSource::Adaptive(adaptive) => Some(adaptive.probe()),
        }
    }
}

impl fmt::Debug for PositionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSource::Indexed(seq) => f
                .debug_struct("Indexed")
                .field("scan_type", &seq.scan_type())
                .field("n_steps", &seq.n_steps())
                .finish(),
            PositionSource::Adaptive(adaptive) => f
                .debug_struct("Adaptive")
                .field("max_steps", &adaptive.max_steps())
                .field("probe", &adaptive.probe())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_prepends_average_axis() {
        let scan = LinearScan::new("delay", 0.0, 1.0, 0.25).unwrap();
        let single = ScanLayout::new(&scan, 1);
        assert_eq!(single.shape, vec![5]);
        assert_eq!(single.axes[0].index, 0);

        let averaged = ScanLayout::new(&scan, 3);
        assert_eq!(averaged.shape, vec![3, 5]);
        assert_eq!(averaged.axes[0].label, "Average");
        assert_eq!(averaged.axes[0].data, vec![0.0, 1.0, 2.0]);
        assert_eq!(averaged.axes[1].label, "delay");
        assert_eq!(averaged.axes[1].index, 1);
        assert_eq!(averaged.n_cells(), 15);
    }

    #[test]
    fn indexed_source_ends_after_last_step() {
        let scan = LinearScan::new("x", 0.0, 2.0, 1.0).unwrap();
        let mut source = PositionSource::Indexed(Box::new(scan));
        assert_eq!(source.n_steps(), Some(3));
        let p = source.next_point(2).unwrap().unwrap();
        assert_eq!(p.position.coords(), &[2.0]);
        assert_eq!(p.grid, vec![2]);
        assert!(source.next_point(3).unwrap().is_none());
        assert!(!source.is_adaptive());
    }
}
