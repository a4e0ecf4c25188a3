use clap::ValueEnum;
use kmeans_core::{generate_blob_dataset, generate_uniform_dataset, Point, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab_case")]
pub enum ScenarioKind {
    /// Tiny, well-separated blobs; converges in a handful of rounds.
    Smoke,
    /// Mid-sized blob dataset for multi-reducer runs.
    Blobs,
    /// Overlapping blobs in a higher dimension; slower to converge.
    HighDim,
    /// Structureless uniform noise, useful to exercise the iteration cap.
    Uniform,
}

#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub dimension: usize,
    pub points: usize,
    /// Blob count, or `None` for uniform noise.
    pub clusters: Option<usize>,
    pub bounds: f64,
    pub spread: f64,
}

#[derive(Clone, Debug)]
pub struct ScenarioDetails {
    pub slug: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub config: ScenarioConfig,
}

impl ScenarioKind {
    pub fn details(self) -> ScenarioDetails {
        match self {
            ScenarioKind::Smoke => ScenarioDetails {
                slug: "smoke",
                label: "Smoke (1k pts, 4 blobs)",
                description: "Quick correctness check that fits easily into CI.",
                config: ScenarioConfig {
                    dimension: 2,
                    points: 1_000,
                    clusters: Some(4),
                    bounds: 100.0,
                    spread: 2.0,
                },
            },
            ScenarioKind::Blobs => ScenarioDetails {
                slug: "blobs",
                label: "Blobs (100k pts, 16 blobs)",
                description: "Moderate dataset for comparing reducer and partition counts.",
                config: ScenarioConfig {
                    dimension: 8,
                    points: 100_000,
                    clusters: Some(16),
                    bounds: 50.0,
                    spread: 5.0,
                },
            },
            ScenarioKind::HighDim => ScenarioDetails {
                slug: "high-dim",
                label: "High-dim (50k pts, 32 blobs)",
                description: "Overlapping clusters in 64 dimensions; many rounds to settle.",
                config: ScenarioConfig {
                    dimension: 64,
                    points: 50_000,
                    clusters: Some(32),
                    bounds: 10.0,
                    spread: 6.0,
                },
            },
            ScenarioKind::Uniform => ScenarioDetails {
                slug: "uniform",
                label: "Uniform (20k pts)",
                description: "No cluster structure at all; centroids keep drifting.",
                config: ScenarioConfig {
                    dimension: 4,
                    points: 20_000,
                    clusters: None,
                    bounds: 1.0,
                    spread: 0.0,
                },
            },
        }
    }

    pub fn list_details() -> Vec<ScenarioDetails> {
        ScenarioKind::value_variants()
            .iter()
            .map(|kind| kind.details())
            .collect()
    }
}

impl ScenarioConfig {
    pub fn generate(&self, seed: u64) -> Result<Vec<Point>> {
        match self.clusters {
            Some(clusters) => generate_blob_dataset(
                self.dimension,
                clusters,
                self.points / clusters.max(1),
                self.bounds,
                self.spread,
                seed,
            ),
            None => Ok(generate_uniform_dataset(
                self.dimension,
                self.points,
                -self.bounds..self.bounds,
                seed,
            )),
        }
    }
}

pub fn print_available() {
    println!("Available dataset scenarios:");
    for details in ScenarioKind::list_details() {
        let clusters = details
            .config
            .clusters
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<10} {:<30} dim={:<4} points={:<7} clusters={:<4}",
            details.slug, details.label, details.config.dimension, details.config.points, clusters
        );
        println!("      {}", details.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_scenarios_have_unique_slugs() {
        let mut slugs = ScenarioKind::list_details()
            .into_iter()
            .map(|detail| detail.slug)
            .collect::<Vec<_>>();
        slugs.sort_unstable();
        slugs.dedup();
        assert_eq!(slugs.len(), ScenarioKind::value_variants().len());
    }

    #[test]
    fn smoke_scenario_generates_requested_shape() {
        let points = ScenarioKind::Smoke.details().config.generate(42).unwrap();
        assert_eq!(points.len(), 1_000);
        assert!(points.iter().all(|p| p.dimension() == 2));
    }

    #[test]
    fn every_scenario_has_a_valid_shape() {
        for details in ScenarioKind::list_details() {
            let config = &details.config;
            assert!(config.dimension > 0, "{}", details.slug);
            assert!(config.bounds > 0.0, "{}", details.slug);
            if config.clusters.is_some() {
                assert!(config.spread > 0.0, "{}", details.slug);
            }
        }
    }
}
