//! Initial centroid selection by uniform sampling of input records without
//! replacement.

use crate::error::{KmeansError, Result};
use kmeans_core::point::is_blank;
use kmeans_core::{Centroid, CentroidId, CentroidSet, Point};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Seeded RNG when `seed` is given, otherwise one drawn from OS entropy.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Chooses `k` distinct positions in `[0, n)` by rejection sampling.
pub fn sample_positions<R: Rng + ?Sized>(
    k: usize,
    n: usize,
    rng: &mut R,
) -> Result<BTreeSet<usize>> {
    if k == 0 {
        return Err(KmeansError::InvalidArgument(
            "centroid count must be positive".to_string(),
        ));
    }
    if k > n {
        return Err(KmeansError::InvalidArgument(format!(
            "cannot sample {k} centroids from {n} points"
        )));
    }
    if CentroidId::try_from(k).is_err() {
        return Err(KmeansError::InvalidArgument(format!(
            "centroid count {k} exceeds the id range"
        )));
    }

    let mut positions = BTreeSet::new();
    while positions.len() < k {
        positions.insert(rng.gen_range(0..n));
    }
    Ok(positions)
}

/// Picks `k` of the `n` records in `reader` as initial centroids.
///
/// Positions are chosen up front, then one scan assigns ids `1..=k` in file
/// order. The scan stops as soon as the last chosen record has been read.
pub fn bootstrap_centroids<B, R>(
    reader: B,
    k: usize,
    n: usize,
    has_id_column: bool,
    rng: &mut R,
) -> Result<CentroidSet>
where
    B: BufRead,
    R: Rng + ?Sized,
{
    let positions = sample_positions(k, n, rng)?;
    debug!(?positions, "sampled bootstrap positions");

    let mut centroids = Vec::with_capacity(k);
    let mut position = 0usize;
    let mut next_id: CentroidId = 1;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| KmeansError::io("<bootstrap input>", source))?;
        if is_blank(&line) {
            continue;
        }
        if positions.contains(&position) {
            let point = Point::parse(&line, has_id_column).map_err(|reason| {
                KmeansError::InvalidArgument(format!(
                    "malformed record on line {}: {reason}",
                    index + 1
                ))
            })?;
            centroids.push(Centroid {
                id: next_id,
                coords: point.coords().to_vec(),
            });
            next_id += 1;
            if centroids.len() == k {
                break;
            }
        }
        position += 1;
    }

    if centroids.len() < k {
        return Err(KmeansError::InvalidArgument(format!(
            "input ended after {position} records, expected {n}"
        )));
    }

    Ok(CentroidSet::new(centroids)?)
}

/// Samples `k` of the `n` records of `input`. `n` comes from an earlier
/// validating pass, so this read can stop at the last chosen record.
pub fn bootstrap_from_file<R: Rng + ?Sized>(
    input: &Path,
    k: usize,
    n: usize,
    has_id_column: bool,
    rng: &mut R,
) -> Result<CentroidSet> {
    let file = File::open(input).map_err(|source| KmeansError::io(input, source))?;
    bootstrap_centroids(BufReader::new(file), k, n, has_id_column, rng).map_err(|err| match err {
        KmeansError::Io { source, .. } => KmeansError::io(input, source),
        other => other,
    })
}
