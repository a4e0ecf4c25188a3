//! Execution-engine boundary and the in-process rayon implementation.
//!
//! A round runs in three stages: map (assign every point of a partition,
//! optionally pre-combining with a [`LocalAggregator`]), shuffle (route each
//! partial to the reducer owning its centroid id) and reduce (one
//! [`GlobalAggregator`] pass per reducer, each writing its own part file).
//! Reducers own disjoint id sets, so the reduce stage needs no locking.

use crate::accumulator::Accumulator;
use crate::aggregate::{unconverged_count, ConvergenceResult, GlobalAggregator, LocalAggregator};
use crate::assign::assign;
use crate::config::RunConfig;
use crate::error::{KmeansError, Result};
use crate::snapshot::{list_part_files, write_part_file};
use kmeans_core::{read_points, Centroid, CentroidId, CentroidSet, Point};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One Assign+Aggregate round handed to an execution engine.
#[derive(Debug, Clone, Copy)]
pub struct RoundJob<'a> {
    pub iteration: usize,
    pub centroids: &'a CentroidSet,
    pub input: &'a Path,
    pub output: &'a Path,
    pub threshold: f64,
    pub num_reducers: usize,
}

/// What a finished round leaves behind.
#[derive(Debug, Clone)]
pub struct RoundOutput {
    /// One result per centroid id, ascending.
    pub results: Vec<ConvergenceResult>,
    /// Part files written under the round output directory.
    pub part_files: Vec<PathBuf>,
    pub unconverged: usize,
}

/// Black-box executor of rounds. `submit_round` returns only once every
/// map and reduce task of the round has finished.
pub trait ExecutionEngine {
    fn submit_round(&self, job: &RoundJob<'_>) -> Result<RoundOutput>;
}

impl<E: ExecutionEngine + ?Sized> ExecutionEngine for &E {
    fn submit_round(&self, job: &RoundJob<'_>) -> Result<RoundOutput> {
        (**self).submit_round(job)
    }
}

/// Reducer that owns centroid `id` when `num_reducers` reducers run.
pub fn reducer_for(id: CentroidId, num_reducers: usize) -> usize {
    (id as usize).saturating_sub(1) % num_reducers.max(1)
}

/// Runs rounds on the local rayon thread pool.
#[derive(Debug, Clone)]
pub struct LocalEngine {
    num_partitions: Option<usize>,
    combine: bool,
    point_id_column: bool,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self {
            num_partitions: None,
            combine: true,
            point_id_column: false,
        }
    }
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            num_partitions: config.num_partitions,
            combine: config.combine,
            point_id_column: config.point_id_column,
        }
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.num_partitions = Some(partitions.max(1));
        self
    }

    /// Enables or disables the local pre-aggregation stage.
    pub fn with_combine(mut self, combine: bool) -> Self {
        self.combine = combine;
        self
    }

    pub fn with_point_id_column(mut self, point_id_column: bool) -> Self {
        self.point_id_column = point_id_column;
        self
    }

    fn load_partitions(&self, input: &Path) -> Result<Vec<Vec<Point>>> {
        let file = File::open(input).map_err(|source| KmeansError::io(input, source))?;
        let points = read_points(BufReader::new(file), self.point_id_column).map_err(
            |err| match KmeansError::from(err) {
                KmeansError::Io { source, .. } => KmeansError::io(input, source),
                other => other,
            },
        )?;

        let partitions = self
            .num_partitions
            .unwrap_or_else(rayon::current_num_threads)
            .max(1);
        let chunk = points.len().div_ceil(partitions).max(1);
        Ok(points.chunks(chunk).map(<[Point]>::to_vec).collect())
    }

    fn map_partition(
        &self,
        partition: &[Point],
        centroids: &CentroidSet,
    ) -> Result<Vec<Accumulator>> {
        if self.combine {
            let mut local = LocalAggregator::new();
            for point in partition {
                local.observe(assign(point, centroids.as_slice())?, point)?;
            }
            Ok(local.into_accumulators())
        } else {
            partition
                .iter()
                .map(|point| -> Result<Accumulator> {
                    let id = assign(point, centroids.as_slice())?;
                    Ok(Accumulator::from_point(id, point))
                })
                .collect()
        }
    }
}

type ReducerInput = BTreeMap<CentroidId, Vec<Accumulator>>;

/// Routes map outputs to reducers. Every snapshot id gets an entry, even one
/// that received no points, so empty centroids still reach a reducer.
fn shuffle(
    map_outputs: Vec<Vec<Accumulator>>,
    centroids: &CentroidSet,
    num_reducers: usize,
) -> Result<Vec<ReducerInput>> {
    let mut reducers: Vec<ReducerInput> = vec![BTreeMap::new(); num_reducers];
    for id in centroids.ids() {
        reducers[reducer_for(id, num_reducers)].insert(id, Vec::new());
    }

    for partial in map_outputs.into_iter().flatten() {
        let id = partial.id();
        reducers[reducer_for(id, num_reducers)]
            .get_mut(&id)
            .ok_or_else(|| {
                KmeansError::InvalidState(format!("assignment to unknown centroid {id}"))
            })?
            .push(partial);
    }
    Ok(reducers)
}

fn reduce(
    reducer: usize,
    input: ReducerInput,
    centroids: &CentroidSet,
    global: GlobalAggregator,
    output: &Path,
) -> Result<(Vec<ConvergenceResult>, PathBuf)> {
    let mut results = Vec::with_capacity(input.len());
    for (id, partials) in input {
        let previous = centroids.get(id).ok_or_else(|| {
            KmeansError::InvalidState(format!("reducer {reducer} got unknown centroid {id}"))
        })?;
        results.push(global.reduce(previous, partials)?);
    }

    let records: Vec<Centroid> = results.iter().map(ConvergenceResult::centroid).collect();
    let path = write_part_file(output, reducer, &records)?;
    Ok((results, path))
}

impl ExecutionEngine for LocalEngine {
    fn submit_round(&self, job: &RoundJob<'_>) -> Result<RoundOutput> {
        if job.num_reducers == 0 {
            return Err(KmeansError::InvalidArgument(
                "num_reducers must be > 0".to_string(),
            ));
        }
        if job.output.exists() && !list_part_files(job.output)?.is_empty() {
            return Err(KmeansError::InvalidArgument(format!(
                "output location {} already holds round output",
                job.output.display()
            )));
        }

        let partitions = self.load_partitions(job.input)?;
        let map_outputs = partitions
            .par_iter()
            .map(|partition| self.map_partition(partition, job.centroids))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            iteration = job.iteration,
            partitions = partitions.len(),
            partials = map_outputs.iter().map(Vec::len).sum::<usize>(),
            "map stage complete"
        );

        let reducer_inputs = shuffle(map_outputs, job.centroids, job.num_reducers)?;
        let global = GlobalAggregator::new(job.threshold);
        let reduced = reducer_inputs
            .into_par_iter()
            .enumerate()
            .map(|(reducer, input)| reduce(reducer, input, job.centroids, global, job.output))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(job.centroids.len());
        let mut part_files = Vec::with_capacity(reduced.len());
        for (reducer_results, path) in reduced {
            results.extend(reducer_results);
            part_files.push(path);
        }
        results.sort_by_key(|result| result.id);

        Ok(RoundOutput {
            unconverged: unconverged_count(&results),
            results,
            part_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_input(dir: &Path, points: &[[f64; 2]]) -> PathBuf {
        let path = dir.join("points.txt");
        let body: String = points
            .iter()
            .map(|[x, y]| format!("{x}\t{y}\n"))
            .collect();
        fs::write(&path, body).unwrap();
        path
    }

    fn centroids(entries: &[(CentroidId, [f64; 2])]) -> CentroidSet {
        CentroidSet::new(
            entries
                .iter()
                .map(|(id, coords)| Centroid::new(*id, coords.to_vec()).unwrap())
                .collect(),
        )
        .unwrap()
    }

    const POINTS: [[f64; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]];

    #[test]
    fn reducer_routing_is_stable() {
        assert_eq!(reducer_for(1, 3), 0);
        assert_eq!(reducer_for(3, 3), 2);
        assert_eq!(reducer_for(4, 3), 0);
        assert_eq!(reducer_for(7, 1), 0);
    }

    #[test]
    fn round_computes_new_centroids() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), &POINTS);
        let output = dir.path().join("out");
        let snapshot = centroids(&[(1, [0.0, 0.0]), (2, [10.0, 0.0])]);

        let engine = LocalEngine::new().with_partitions(2);
        let round = engine
            .submit_round(&RoundJob {
                iteration: 1,
                centroids: &snapshot,
                input: &input,
                output: &output,
                threshold: 0.0,
                num_reducers: 2,
            })
            .unwrap();

        assert_eq!(round.unconverged, 2);
        assert_eq!(round.results[0].new_coords, vec![0.0, 0.5]);
        assert_eq!(round.results[1].new_coords, vec![10.0, 0.5]);
        assert_eq!(round.part_files.len(), 2);
        assert_eq!(
            fs::read_to_string(output.join("part-r-00001")).unwrap(),
            "2\t10\t0.5\n"
        );
    }

    #[test]
    fn empty_centroid_reaches_a_reducer() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), &POINTS);
        let output = dir.path().join("out");
        let snapshot = centroids(&[(1, [0.0, 0.0]), (2, [10.0, 0.0]), (3, [500.0, 500.0])]);

        let round = LocalEngine::new()
            .submit_round(&RoundJob {
                iteration: 1,
                centroids: &snapshot,
                input: &input,
                output: &output,
                threshold: 0.0,
                num_reducers: 1,
            })
            .unwrap();

        let far = &round.results[2];
        assert_eq!(far.id, 3);
        assert_eq!(far.count, 0);
        assert!(far.converged);
        assert_eq!(far.new_coords, vec![500.0, 500.0]);
        assert_eq!(round.unconverged, 2);
    }

    #[test]
    fn skipping_local_stage_gives_identical_results() {
        let dir = tempfile::tempdir().unwrap();
        let points: Vec<[f64; 2]> = kmeans_core::generate_blob_dataset(2, 3, 40, 50.0, 2.0, 11)
            .unwrap()
            .iter()
            .map(|p| [p.coords()[0], p.coords()[1]])
            .collect();
        let input = write_input(dir.path(), &points);
        let snapshot = centroids(&[(1, points[0]), (2, points[1]), (3, points[2])]);

        let run = |combine: bool, name: &str| {
            LocalEngine::new()
                .with_partitions(4)
                .with_combine(combine)
                .submit_round(&RoundJob {
                    iteration: 1,
                    centroids: &snapshot,
                    input: &input,
                    output: &dir.path().join(name),
                    threshold: 1e-9,
                    num_reducers: 2,
                })
                .unwrap()
        };

        let combined = run(true, "combined");
        let raw = run(false, "raw");
        assert_eq!(combined.unconverged, raw.unconverged);
        for (a, b) in combined.results.iter().zip(&raw.results) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.count, b.count);
            for (x, y) in a.new_coords.iter().zip(&b.new_coords) {
                approx::assert_relative_eq!(*x, *y, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn refuses_to_overwrite_existing_round_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), &POINTS);
        let output = dir.path().join("out");
        let snapshot = centroids(&[(1, [0.0, 0.0])]);
        let job = RoundJob {
            iteration: 1,
            centroids: &snapshot,
            input: &input,
            output: &output,
            threshold: 0.0,
            num_reducers: 1,
        };

        LocalEngine::new().submit_round(&job).unwrap();
        assert!(matches!(
            LocalEngine::new().submit_round(&job),
            Err(KmeansError::InvalidArgument(_))
        ));
    }

    #[test]
    fn dimension_mismatch_fails_the_round() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), &POINTS);
        let snapshot = CentroidSet::new(vec![Centroid::new(1, vec![0.0, 0.0, 0.0]).unwrap()])
            .unwrap();

        let result = LocalEngine::new().submit_round(&RoundJob {
            iteration: 1,
            centroids: &snapshot,
            input: &input,
            output: &dir.path().join("out"),
            threshold: 0.0,
            num_reducers: 1,
        });
        assert!(result.is_err());
    }
}
