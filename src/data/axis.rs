//! Navigation axes.

use serde::{Deserialize, Serialize};

/// Value held by measured-axis entries that no step has written yet.
///
/// Steps skipped by an early cancellation keep this value in the axes handed to storage.
pub const UNWRITTEN: f64 = f64::NAN;

/// One scanned dimension.
///
/// The sequencer produces the *intended* axes; the loop keeps a *measured* copy whose
/// entries are overwritten with the coordinates the actuators report back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationAxis {
    /// Axis label (actuator name for sequencer axes)
    pub label: String,
    /// Coordinate per linear step
    pub data: Vec<f64>,
    /// Grid dimension this axis indexes
    pub index: usize,
}

impl NavigationAxis {
    /// Create an axis from its coordinates
    pub fn new(label: impl Into<String>, data: Vec<f64>, index: usize) -> Self {
        Self {
            label: label.into(),
            data,
            index,
        }
    }

    /// Measured counterpart of an intended axis: `measured_<label>`, all entries unwritten.
    pub fn measured_from(intended: &NavigationAxis) -> Self {
        Self {
            label: format!("measured_{}", intended.label),
            data: vec![UNWRITTEN; intended.data.len()],
            index: intended.index,
        }
    }

    /// Number of coordinates
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the axis holds no coordinates
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the coordinate for `step`, growing the axis with unwritten entries if needed.
    pub fn record(&mut self, step: usize, value: f64) {
        if step >= self.data.len() {
            self.data.resize(step + 1, UNWRITTEN);
        }
        self.data[step] = value;
    }

    /// Whether `step` holds a written coordinate
    pub fn is_written(&self, step: usize) -> bool {
        self.data.get(step).is_some_and(|v| !v.is_nan())
    }
}
