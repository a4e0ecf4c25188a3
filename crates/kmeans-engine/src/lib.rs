//! Iterative k-means over a map/aggregate execution model.
//!
//! Each round assigns every point to its nearest centroid in parallel,
//! pre-combines assignments per partition, merges the partials per centroid
//! id, and writes a fresh centroid snapshot. The [`Orchestrator`] repeats
//! rounds until no centroid moves more than the threshold or the iteration
//! cap is hit.
//!
//! ## Components
//!
//! - [`assign`]: nearest-centroid lookup, ties to the lowest id
//! - [`LocalAggregator`] / [`GlobalAggregator`]: the two reduction stages
//! - [`bootstrap_centroids`]: initial centroids sampled without replacement
//! - [`ExecutionEngine`]: round boundary; [`LocalEngine`] runs it on rayon
//! - [`Orchestrator`]: the round loop and convergence decision

mod accumulator;
mod aggregate;
mod assign;
mod bootstrap;
mod config;
mod engine;
mod error;
mod orchestrator;
pub mod snapshot;

pub use accumulator::Accumulator;
pub use aggregate::{unconverged_count, ConvergenceResult, GlobalAggregator, LocalAggregator};
pub use assign::assign;
pub use bootstrap::{bootstrap_centroids, bootstrap_from_file, make_rng, sample_positions};
pub use config::{CentroidSource, RunConfig};
pub use engine::{reducer_for, ExecutionEngine, LocalEngine, RoundJob, RoundOutput};
pub use error::{KmeansError, Result};
pub use orchestrator::{Orchestrator, RoundReport, RunOutcome, RunPhase, RunReport, RunState};
