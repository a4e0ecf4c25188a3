use crate::error::{KmeansError, Result};
use kmeans_core::{squared_euclidean, Centroid, CentroidId, Point};

/// Returns the id of the centroid nearest to `point` by squared Euclidean
/// distance. Ties resolve to the lowest id regardless of slice order.
pub fn assign(point: &Point, centroids: &[Centroid]) -> Result<CentroidId> {
    let mut best: Option<(f64, CentroidId)> = None;

    for centroid in centroids {
        let dist = squared_euclidean(point.coords(), &centroid.coords)?;
        let closer = match best {
            None => true,
            Some((best_dist, best_id)) => {
                dist < best_dist || (dist == best_dist && centroid.id < best_id)
            }
        };
        if closer {
            best = Some((dist, centroid.id));
        }
    }

    best.map(|(_, id)| id).ok_or_else(|| {
        KmeansError::InvalidState("cannot assign a point without centroids".to_string())
    })
}
