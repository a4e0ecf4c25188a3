//! Running coordinate sum + point count for one centroid id.

use crate::error::{KmeansError, Result};
use kmeans_core::{CentroidId, Point, Vector};
use serde::{Deserialize, Serialize};

/// Partial statistics for a centroid. Two accumulators can only be merged
/// when they share an id and a dimensionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    id: CentroidId,
    sum: Vector,
    count: u64,
}

impl Accumulator {
    /// An accumulator that has seen no points yet.
    pub fn empty(id: CentroidId, dimension: usize) -> Self {
        Self {
            id,
            sum: vec![0.0; dimension],
            count: 0,
        }
    }

    /// An accumulator holding exactly one point.
    pub fn from_point(id: CentroidId, point: &Point) -> Self {
        Self {
            id,
            sum: point.coords().to_vec(),
            count: 1,
        }
    }

    pub fn id(&self) -> CentroidId {
        self.id
    }

    pub fn sum(&self) -> &[f64] {
        &self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn dimension(&self) -> usize {
        self.sum.len()
    }

    pub fn add_point(&mut self, point: &Point) -> Result<()> {
        self.check_dimension(point.dimension())?;
        for (acc, value) in self.sum.iter_mut().zip(point.coords()) {
            *acc += value;
        }
        self.count += 1;
        Ok(())
    }

    /// Vector-add and count-add `other` into `self`.
    pub fn merge(&mut self, other: &Accumulator) -> Result<()> {
        if other.id != self.id {
            return Err(KmeansError::InvalidState(format!(
                "cannot merge accumulator for centroid {} into centroid {}",
                other.id, self.id
            )));
        }
        self.check_dimension(other.dimension())?;
        for (acc, value) in self.sum.iter_mut().zip(&other.sum) {
            *acc += value;
        }
        self.count += other.count;
        Ok(())
    }

    /// Component-wise mean, or `None` when no point was accumulated.
    pub fn mean(&self) -> Option<Vector> {
        if self.count == 0 {
            return None;
        }
        let count = self.count as f64;
        Some(self.sum.iter().map(|value| value / count).collect())
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension() {
            return Err(KmeansError::InvalidArgument(format!(
                "vector dimension mismatch for centroid {}: expected {}, got {}",
                self.id,
                self.dimension(),
                actual
            )));
        }
        Ok(())
    }
}
