//! Grid step indices.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tuple of integers locating one step in the output grid.
///
/// When averaging is enabled the first component is the average index; the remaining
/// components come from the sequencer's grid mapping. Indices order lexicographically,
/// which is also the order in which the loop produces them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepIndex(Vec<usize>);

impl StepIndex {
    /// Build an index from its components
    pub fn new(components: Vec<usize>) -> Self {
        Self(components)
    }

    /// Build the index for a step, prefixing the average component when averaging.
    pub fn for_step(average: usize, n_average: usize, grid: &[usize]) -> Self {
        let mut components = Vec::with_capacity(grid.len() + 1);
        if n_average > 1 {
            components.push(average);
        }
        components.extend_from_slice(grid);
        Self(components)
    }

    /// Index components
    pub fn components(&self) -> &[usize] {
        &self.0
    }

    /// Number of grid axes consumed by this index
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the zero-dimensional index
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every component lies inside `shape`
    pub fn fits(&self, shape: &[usize]) -> bool {
        self.0.len() == shape.len() && self.0.iter().zip(shape).all(|(i, n)| i < n)
    }
}

impl fmt::Display for StepIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_prefix_only_when_averaging() {
        assert_eq!(StepIndex::for_step(0, 1, &[4]).components(), &[4]);
        assert_eq!(StepIndex::for_step(1, 3, &[4, 2]).components(), &[1, 4, 2]);
    }

    #[test]
    fn lexicographic_order_follows_averages() {
        let a = StepIndex::for_step(0, 2, &[4]);
        let b = StepIndex::for_step(1, 2, &[0]);
        assert!(a < b);
    }

    #[test]
    fn fits_checks_rank_and_bounds() {
        let idx = StepIndex::new(vec![1, 2]);
        assert!(idx.fits(&[2, 3]));
        assert!(!idx.fits(&[2, 2]));
        assert!(!idx.fits(&[2]));
        assert_eq!(idx.to_string(), "(1, 2)");
    }
}
