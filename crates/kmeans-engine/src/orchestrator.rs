//! Round-by-round driver of a clustering run.
//!
//! Phases: `Bootstrapping → RoundRunning → RoundEvaluated → (RoundRunning |
//! Converged | MaxIterExceeded | Cancelled)`. Rounds are strictly sequential;
//! the only suspension point is [`ExecutionEngine::submit_round`].

use crate::bootstrap::{bootstrap_from_file, make_rng};
use crate::config::{CentroidSource, RunConfig};
use crate::engine::{ExecutionEngine, LocalEngine, RoundJob};
use crate::error::{KmeansError, Result};
use crate::snapshot::{
    assemble_snapshot, bootstrap_snapshot_path, clear_output, final_snapshot_path, read_snapshot,
    write_snapshot,
};
use kmeans_core::{scan_points, CentroidId, CentroidSet, PointScan};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Bootstrapping,
    RoundRunning,
    RoundEvaluated,
    Converged,
    MaxIterExceeded,
    Cancelled,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Converged | RunPhase::MaxIterExceeded | RunPhase::Cancelled
        )
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Converged,
    MaxIterExceeded,
    Cancelled,
}

/// Mutable state of a run, owned by the orchestrator and only changed
/// between rounds.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub phase: RunPhase,
    /// Round currently running or last evaluated, starting at 1
    pub iteration: usize,
    /// Last round that finished successfully (0 before the first one)
    pub last_completed: usize,
    pub snapshot: PathBuf,
    pub threshold: f64,
    pub max_iterations: usize,
    pub last_unconverged: Option<usize>,
}

/// Summary of one evaluated round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub iteration: usize,
    pub unconverged: usize,
    /// Ids that moved further than the threshold
    pub moved: Vec<CentroidId>,
    pub max_shift: f64,
    pub assigned_points: u64,
    pub elapsed_ms: f64,
}

/// Terminal report handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub iterations: usize,
    pub initial_snapshot: PathBuf,
    pub final_snapshot: PathBuf,
    pub centroids: CentroidSet,
    pub rounds: Vec<RoundReport>,
}

pub struct Orchestrator<E> {
    config: RunConfig,
    engine: E,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator<LocalEngine> {
    /// Orchestrator backed by the in-process rayon engine.
    pub fn local(config: RunConfig) -> Result<Self> {
        let engine = LocalEngine::from_config(&config);
        Self::new(config, engine)
    }
}

impl<E: ExecutionEngine> Orchestrator<E> {
    pub fn new(config: RunConfig, engine: E) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Flag that, once set, stops the run at the next round boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(&self) -> Result<RunReport> {
        self.run_with(|_, _| {})
    }

    /// Runs to a terminal phase, calling `observer` after every evaluated
    /// round.
    pub fn run_with<F>(&self, mut observer: F) -> Result<RunReport>
    where
        F: FnMut(&RunState, &RoundReport),
    {
        let mut state = RunState {
            phase: RunPhase::Bootstrapping,
            iteration: 1,
            last_completed: 0,
            snapshot: PathBuf::new(),
            threshold: self.config.threshold,
            max_iterations: self.config.max_iterations,
            last_unconverged: None,
        };

        let scan = self.scan_input()?;
        let (initial_snapshot, mut centroids) = self.bootstrap(scan.records)?;
        if scan.dimension != Some(centroids.dimension()) {
            return Err(KmeansError::InvalidArgument(format!(
                "points have {} coordinates but centroids have {}",
                scan.dimension.unwrap_or_default(),
                centroids.dimension()
            )));
        }

        let owned_snapshot = final_snapshot_path(&initial_snapshot);
        if owned_snapshot == self.config.input {
            return Err(KmeansError::InvalidArgument(format!(
                "snapshot path {} would overwrite the input",
                owned_snapshot.display()
            )));
        }
        state.snapshot = initial_snapshot.clone();
        state.phase = RunPhase::RoundRunning;

        let mut rounds = Vec::new();
        info!(
            input = %self.config.input.display(),
            centroids = centroids.len(),
            dimension = centroids.dimension(),
            max_iterations = state.max_iterations,
            threshold = state.threshold,
            "starting k-means run"
        );

        loop {
            let started = Instant::now();
            let job = RoundJob {
                iteration: state.iteration,
                centroids: &centroids,
                input: &self.config.input,
                output: &self.config.output,
                threshold: self.config.threshold,
                num_reducers: self.config.num_reducers,
            };
            let output =
                self.engine
                    .submit_round(&job)
                    .map_err(|source| KmeansError::EngineFailure {
                        iteration: state.iteration,
                        last_completed: state.last_completed,
                        source: Box::new(source),
                    })?;

            let next = assemble_snapshot(&self.config.output, &owned_snapshot)?;
            if next.len() != centroids.len() {
                return Err(KmeansError::InvalidState(format!(
                    "round {} produced {} centroids, expected {}",
                    state.iteration,
                    next.len(),
                    centroids.len()
                )));
            }

            let report = RoundReport {
                iteration: state.iteration,
                unconverged: output.unconverged,
                moved: output
                    .results
                    .iter()
                    .filter(|result| !result.converged)
                    .map(|result| result.id)
                    .collect(),
                max_shift: output
                    .results
                    .iter()
                    .map(|result| result.shift)
                    .fold(0.0, f64::max),
                assigned_points: output.results.iter().map(|result| result.count).sum(),
                elapsed_ms: started.elapsed().as_secs_f64() * 1_000.0,
            };

            state.phase = RunPhase::RoundEvaluated;
            state.last_completed = state.iteration;
            state.snapshot = owned_snapshot.clone();
            state.last_unconverged = Some(output.unconverged);
            centroids = next;

            info!(
                iteration = report.iteration,
                unconverged = report.unconverged,
                max_shift = report.max_shift,
                elapsed_ms = report.elapsed_ms,
                "round complete"
            );

            if output.unconverged == 0 {
                state.phase = RunPhase::Converged;
            } else if state.iteration >= state.max_iterations {
                state.phase = RunPhase::MaxIterExceeded;
            }

            observer(&state, &report);
            rounds.push(report);

            if !state.phase.is_terminal() && self.cancel.load(Ordering::SeqCst) {
                state.phase = RunPhase::Cancelled;
            }
            if state.phase.is_terminal() {
                break;
            }

            clear_output(&self.config.output)?;
            state.iteration += 1;
            state.phase = RunPhase::RoundRunning;
        }

        let outcome = match state.phase {
            RunPhase::Converged => RunOutcome::Converged,
            RunPhase::Cancelled => RunOutcome::Cancelled,
            _ => RunOutcome::MaxIterExceeded,
        };
        match outcome {
            RunOutcome::Converged => info!(
                iterations = state.last_completed,
                snapshot = %owned_snapshot.display(),
                "run converged"
            ),
            RunOutcome::MaxIterExceeded => warn!(
                iterations = state.last_completed,
                unconverged = state.last_unconverged.unwrap_or_default(),
                "iteration cap reached before convergence"
            ),
            RunOutcome::Cancelled => warn!(iterations = state.last_completed, "run cancelled"),
        }

        Ok(RunReport {
            outcome,
            iterations: state.last_completed,
            initial_snapshot,
            final_snapshot: owned_snapshot,
            centroids,
            rounds,
        })
    }

    /// Parses every input record before any round is submitted, so malformed
    /// or ragged records fail the run up front.
    fn scan_input(&self) -> Result<PointScan> {
        let input = &self.config.input;
        let file = File::open(input).map_err(|source| KmeansError::io(input, source))?;
        let scan = scan_points(BufReader::new(file), self.config.point_id_column).map_err(
            |err| match KmeansError::from(err) {
                KmeansError::Io { source, .. } => KmeansError::io(input, source),
                other => other,
            },
        )?;
        if scan.records == 0 {
            return Err(KmeansError::InvalidArgument(format!(
                "input {} holds no points",
                input.display()
            )));
        }
        debug!(records = scan.records, dimension = ?scan.dimension, "validated input");
        Ok(scan)
    }

    /// Resolves the initial centroid set and the file it lives in. A
    /// caller-supplied file is only ever read.
    fn bootstrap(&self, records: usize) -> Result<(PathBuf, CentroidSet)> {
        match &self.config.centroids {
            CentroidSource::File(path) => {
                let centroids = read_snapshot(path)?;
                debug!(path = %path.display(), count = centroids.len(), "loaded initial centroids");
                Ok((path.clone(), centroids))
            }
            CentroidSource::Count(k) => {
                let mut rng = make_rng(self.config.seed);
                let centroids = bootstrap_from_file(
                    &self.config.input,
                    *k,
                    records,
                    self.config.point_id_column,
                    &mut rng,
                )?;
                let path = bootstrap_snapshot_path(&self.config.work_dir());
                write_snapshot(&path, &centroids)?;
                info!(k, path = %path.display(), "sampled initial centroids");
                Ok((path, centroids))
            }
        }
    }
}
