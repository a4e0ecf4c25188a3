//! Shared building blocks for the iterative k-means crates.
//! This crate defines the point and centroid models, their text record
//! formats, distance helpers, and seeded dataset generators.

mod error;
pub mod point;
pub mod record;

pub use error::{CoreError, Result};
pub use point::{read_points, scan_points, write_points, Point, PointScan};
pub use record::{
    load_centroids, read_centroids, write_centroids, Centroid, CentroidId, CentroidSet,
};

use rand::{distributions::Uniform, prelude::*};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Canonical coordinate vector used throughout the workspace.
pub type Vector = Vec<f64>;

/// Squared Euclidean distance. Cheaper than [`euclidean`] and order-preserving,
/// so it is what nearest-centroid search compares.
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    validate_dimension(Some(a.len()), b.len())?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(lhs, rhs)| {
            let diff = lhs - rhs;
            diff * diff
        })
        .sum())
}

/// Euclidean (L2) distance between two vectors.
pub fn euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    squared_euclidean(a, b).map(f64::sqrt)
}

/// Validates that a vector has the expected dimension.
pub fn validate_dimension(expected: Option<usize>, actual: usize) -> Result<()> {
    if let Some(expected) = expected {
        if expected != actual {
            return Err(CoreError::DimensionMismatch { expected, actual });
        }
    }
    Ok(())
}

/// Generates a deterministic set of points uniformly sampled within the given range.
pub fn generate_uniform_dataset(
    dimension: usize,
    count: usize,
    bounds: std::ops::Range<f64>,
    seed: u64,
) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    let distribution = Uniform::from(bounds);

    (0..count)
        .filter_map(|_| {
            let coords = (0..dimension).map(|_| rng.sample(distribution)).collect();
            Point::new(coords).ok()
        })
        .collect()
}

/// Generates `clusters` well-separated blobs of `per_cluster` points each.
/// Blob centres are drawn from `[-bounds, bounds)` and points are scattered
/// uniformly within `spread` of their centre.
pub fn generate_blob_dataset(
    dimension: usize,
    clusters: usize,
    per_cluster: usize,
    bounds: f64,
    spread: f64,
    seed: u64,
) -> Result<Vec<Point>> {
    for (name, value) in [("bounds", bounds), ("spread", spread)] {
        if !(value > 0.0 && (2.0 * value).is_finite()) {
            return Err(CoreError::InvalidArgument(format!(
                "blob {name} must be a positive finite number, got {value}"
            )));
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let centre_dist = Uniform::from(-bounds..bounds);
    let jitter = Uniform::from(-spread..spread);

    let centres: Vec<Vector> = (0..clusters)
        .map(|_| (0..dimension).map(|_| rng.sample(centre_dist)).collect())
        .collect();

    let mut points = Vec::with_capacity(clusters * per_cluster);
    for centre in &centres {
        for _ in 0..per_cluster {
            let coords = centre.iter().map(|c| c + rng.sample(jitter)).collect();
            points.push(Point::new(coords)?);
        }
    }
    points.shuffle(&mut rng);
    Ok(points)
}

/// Saves a serializable value to a JSON file.
pub fn save_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

/// Loads a deserializable value from a JSON file.
pub fn load_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn euclidean_distance_matches_manual_result() {
        let dist = euclidean(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert_relative_eq!(dist, 5.0);
        assert_relative_eq!(squared_euclidean(&[0.0, 0.0], &[3.0, 4.0]).unwrap(), 25.0);
    }

    #[test]
    fn distance_rejects_dimension_mismatch() {
        assert!(matches!(
            euclidean(&[0.0], &[1.0, 2.0]),
            Err(CoreError::DimensionMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn dataset_generation_is_deterministic() {
        let first = generate_uniform_dataset(4, 8, -1.0..1.0, 42);
        let second = generate_uniform_dataset(4, 8, -1.0..1.0, 42);
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
        assert!(first.iter().all(|p| p.dimension() == 4));
    }

    #[test]
    fn blob_dataset_has_requested_shape() {
        let points = generate_blob_dataset(3, 4, 25, 100.0, 1.0, 7).unwrap();
        assert_eq!(points.len(), 100);
        assert!(points.iter().all(|p| p.dimension() == 3));
    }

    #[test]
    fn blob_dataset_rejects_empty_ranges() {
        for (bounds, spread) in [(10.0, 0.0), (0.0, 1.0), (-5.0, 1.0), (10.0, f64::NAN)] {
            assert!(matches!(
                generate_blob_dataset(2, 2, 5, bounds, spread, 1),
                Err(CoreError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn json_helpers_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("centroid.json");
        let centroid = Centroid::new(4, vec![1.0, 2.0]).unwrap();
        save_json(&centroid, &path).unwrap();
        let loaded: Centroid = load_json(&path).unwrap();
        assert_eq!(loaded, centroid);
    }
}
