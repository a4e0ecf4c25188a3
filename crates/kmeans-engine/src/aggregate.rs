//! Two-stage aggregation of assignments into new centroids.
//!
//! The local stage pre-combines assignments inside one partition; the global
//! stage merges every partial for a centroid id and decides convergence. Both
//! stages rely on the same associative, commutative [`Accumulator::merge`], so
//! skipping the local stage never changes the result.

use crate::accumulator::Accumulator;
use crate::error::{KmeansError, Result};
use kmeans_core::{euclidean, Centroid, CentroidId, Point, Vector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-partition pre-combiner keyed by centroid id.
#[derive(Debug, Clone, Default)]
pub struct LocalAggregator {
    accumulators: BTreeMap<CentroidId, Accumulator>,
}

impl LocalAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one assignment into the accumulator for `id`.
    pub fn observe(&mut self, id: CentroidId, point: &Point) -> Result<()> {
        match self.accumulators.get_mut(&id) {
            Some(acc) => acc.add_point(point),
            None => {
                self.accumulators
                    .insert(id, Accumulator::from_point(id, point));
                Ok(())
            }
        }
    }

    /// Merges an already-built accumulator.
    pub fn absorb(&mut self, partial: Accumulator) -> Result<()> {
        match self.accumulators.get_mut(&partial.id()) {
            Some(acc) => acc.merge(&partial),
            None => {
                self.accumulators.insert(partial.id(), partial);
                Ok(())
            }
        }
    }

    /// Merges every accumulator of `other` into `self`.
    pub fn merge(&mut self, other: LocalAggregator) -> Result<()> {
        for partial in other.accumulators.into_values() {
            self.absorb(partial)?;
        }
        Ok(())
    }

    /// Number of distinct centroid ids seen.
    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    pub fn get(&self, id: CentroidId) -> Option<&Accumulator> {
        self.accumulators.get(&id)
    }

    /// Accumulators in ascending id order.
    pub fn into_accumulators(self) -> Vec<Accumulator> {
        self.accumulators.into_values().collect()
    }
}

/// Outcome of the global stage for one centroid id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceResult {
    pub id: CentroidId,
    pub old_coords: Vector,
    pub new_coords: Vector,
    /// Points assigned to the centroid this round.
    pub count: u64,
    /// Euclidean distance between old and new coordinates.
    pub shift: f64,
    pub converged: bool,
}

impl ConvergenceResult {
    pub fn centroid(&self) -> Centroid {
        Centroid {
            id: self.id,
            coords: self.new_coords.clone(),
        }
    }
}

/// Global reducer: merges partials for one id and classifies convergence.
#[derive(Debug, Clone, Copy)]
pub struct GlobalAggregator {
    threshold: f64,
}

impl GlobalAggregator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Reduces all partials for `previous.id` into a new centroid.
    ///
    /// A centroid that received no points keeps its previous coordinates and
    /// counts as converged.
    pub fn reduce(
        &self,
        previous: &Centroid,
        partials: impl IntoIterator<Item = Accumulator>,
    ) -> Result<ConvergenceResult> {
        let mut total = Accumulator::empty(previous.id, previous.dimension());
        for partial in partials {
            total.merge(&partial)?;
        }

        let (new_coords, shift, converged) = match total.mean() {
            None => (previous.coords.clone(), 0.0, true),
            Some(mean) => {
                let shift = euclidean(&previous.coords, &mean)
                    .map_err(|err| KmeansError::InvalidState(err.to_string()))?;
                (mean, shift, shift <= self.threshold)
            }
        };

        Ok(ConvergenceResult {
            id: previous.id,
            old_coords: previous.coords.clone(),
            new_coords,
            count: total.count(),
            shift,
            converged,
        })
    }
}

/// Reduces a round's results to the number of centroids that moved more than
/// the threshold.
pub fn unconverged_count(results: &[ConvergenceResult]) -> usize {
    results.iter().filter(|result| !result.converged).count()
}
