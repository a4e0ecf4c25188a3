use crate::error::{KmeansError, Result};
use crate::snapshot::{bootstrap_snapshot_path, final_snapshot_path};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where the initial centroids come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentroidSource {
    /// An explicit centroid record file supplied by the caller.
    File(PathBuf),
    /// Sample this many centroids from the input.
    Count(usize),
}

impl FromStr for CentroidSource {
    type Err = std::convert::Infallible;

    /// All-digit strings are counts, anything else is a path.
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(count) = value.parse() {
                return Ok(CentroidSource::Count(count));
            }
        }
        Ok(CentroidSource::File(PathBuf::from(value)))
    }
}

/// Parameters of one clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Point records to cluster
    pub input: PathBuf,
    /// Directory receiving each round's `part-r-*` files
    pub output: PathBuf,
    pub centroids: CentroidSource,
    /// Hard cap on the number of rounds
    pub max_iterations: usize,
    /// Largest centroid shift still counted as converged
    pub threshold: f64,
    /// Parallelism of the global aggregation stage
    pub num_reducers: usize,

    /// Map partitions per round (None = rayon thread count)
    #[serde(default)]
    pub num_partitions: Option<usize>,
    /// Run the local pre-aggregation stage
    #[serde(default = "default_combine")]
    pub combine: bool,
    /// Point records carry a leading id column
    #[serde(default)]
    pub point_id_column: bool,
    /// Bootstrap sampling seed (None = OS entropy)
    #[serde(default)]
    pub seed: Option<u64>,
    /// Directory for bootstrapped centroid files (None = parent of `output`)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

fn default_combine() -> bool {
    true
}

impl RunConfig {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        centroids: CentroidSource,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            centroids,
            max_iterations: 20,
            threshold: 1e-4,
            num_reducers: 1,
            num_partitions: None,
            combine: default_combine(),
            point_id_column: false,
            seed: None,
            work_dir: None,
        }
    }

    /// Directory that receives Orchestrator-owned files when bootstrapping.
    pub fn work_dir(&self) -> PathBuf {
        if let Some(dir) = &self.work_dir {
            return dir.clone();
        }
        match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be > 0"));
        }

        if self.threshold.is_nan() || self.threshold < 0.0 {
            return Err(invalid("threshold must be a non-negative number"));
        }

        if self.num_reducers == 0 {
            return Err(invalid("num_reducers must be > 0"));
        }

        if self.num_partitions == Some(0) {
            return Err(invalid("num_partitions must be > 0"));
        }

        if self.input.as_os_str().is_empty() {
            return Err(invalid("input location is required"));
        }

        if self.output.as_os_str().is_empty() {
            return Err(invalid("output location is required"));
        }

        if same_path(&self.input, &self.output) {
            return Err(invalid("output location must differ from the input"));
        }

        // The output location is removed between rounds.
        if is_within(&self.input, &self.output) {
            return Err(invalid("input must not lie inside the output location"));
        }

        match &self.centroids {
            CentroidSource::Count(0) => return Err(invalid("centroid count must be > 0")),
            CentroidSource::Count(_) => {
                let sampled = bootstrap_snapshot_path(&self.work_dir());
                if is_within(&sampled, &self.output)
                    || is_within(&final_snapshot_path(&sampled), &self.output)
                {
                    return Err(invalid("work_dir must not lie inside the output location"));
                }
            }
            CentroidSource::File(path) => {
                if same_path(path, &self.input) {
                    return Err(invalid("centroid file must differ from the input"));
                }
                if is_within(path, &self.output) {
                    return Err(invalid(
                        "centroid file must not lie inside the output location",
                    ));
                }
                if is_within(&final_snapshot_path(path), &self.output) {
                    return Err(invalid(
                        "centroid snapshot would land inside the output location",
                    ));
                }
            }
        }

        Ok(())
    }
}

fn invalid(reason: &str) -> KmeansError {
    KmeansError::InvalidArgument(reason.to_string())
}

/// Absolute form of `path` with its longest existing prefix canonicalized,
/// so paths that do not exist yet still compare against ones that do.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(dir) => dir.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    resolve(a) == resolve(b)
}

/// True when `path` is `dir` itself or lies somewhere below it.
fn is_within(path: &Path, dir: &Path) -> bool {
    resolve(path).starts_with(resolve(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig::new("points.txt", "out", CentroidSource::Count(3))
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_centroid_source_parsing() {
        assert_eq!(
            "12".parse::<CentroidSource>().unwrap(),
            CentroidSource::Count(12)
        );
        assert_eq!(
            "means.txt".parse::<CentroidSource>().unwrap(),
            CentroidSource::File(PathBuf::from("means.txt"))
        );
        assert_eq!(
            "-3".parse::<CentroidSource>().unwrap(),
            CentroidSource::File(PathBuf::from("-3"))
        );
    }

    #[test]
    fn test_invalid_threshold() {
        for threshold in [-0.1, f64::NAN] {
            let cfg = RunConfig {
                threshold,
                ..config()
            };
            assert!(matches!(cfg.validate(), Err(KmeansError::InvalidArgument(_))));
        }
        let cfg = RunConfig {
            threshold: f64::INFINITY,
            ..config()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_counts() {
        let zero_iters = RunConfig {
            max_iterations: 0,
            ..config()
        };
        assert!(zero_iters.validate().is_err());

        let zero_reducers = RunConfig {
            num_reducers: 0,
            ..config()
        };
        assert!(zero_reducers.validate().is_err());

        let zero_k = RunConfig {
            centroids: CentroidSource::Count(0),
            ..config()
        };
        assert!(zero_k.validate().is_err());

        let zero_partitions = RunConfig {
            num_partitions: Some(0),
            ..config()
        };
        assert!(zero_partitions.validate().is_err());
    }

    #[test]
    fn test_files_inside_output_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        std::fs::create_dir_all(&output).unwrap();
        let input = dir.path().join("points.txt");

        let caller_file = RunConfig::new(
            &input,
            &output,
            CentroidSource::File(output.join("centroids.txt")),
        );
        assert!(matches!(
            caller_file.validate(),
            Err(KmeansError::InvalidArgument(_))
        ));

        let nested_input = RunConfig::new(
            output.join("points.txt"),
            &output,
            CentroidSource::Count(2),
        );
        assert!(nested_input.validate().is_err());

        for work_dir in [output.clone(), output.join("seeds")] {
            let sampled = RunConfig {
                work_dir: Some(work_dir),
                ..RunConfig::new(&input, &output, CentroidSource::Count(2))
            };
            assert!(sampled.validate().is_err());
        }

        // Unnormalised spellings of the same directory are still caught.
        let dotted = RunConfig::new(
            &input,
            dir.path().join("out/../out"),
            CentroidSource::File(output.join("centroids.txt")),
        );
        assert!(dotted.validate().is_err());
    }

    #[test]
    fn test_sibling_paths_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig::new(
            dir.path().join("points.txt"),
            dir.path().join("out"),
            CentroidSource::File(dir.path().join("output-seeds.txt")),
        );
        assert!(run.validate().is_ok());

        let sampled = RunConfig {
            work_dir: Some(dir.path().join("work")),
            ..RunConfig::new(
                dir.path().join("points.txt"),
                dir.path().join("out"),
                CentroidSource::Count(2),
            )
        };
        assert!(sampled.validate().is_ok());
    }

    #[test]
    fn test_work_dir_defaults_to_output_parent() {
        let cfg = RunConfig::new("in.txt", "runs/out", CentroidSource::Count(1));
        assert_eq!(cfg.work_dir(), PathBuf::from("runs"));
        assert_eq!(config().work_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = r#"{
            "input": "points.txt",
            "output": "out",
            "centroids": {"count": 4},
            "max_iterations": 10,
            "threshold": 0.01,
            "num_reducers": 2
        }"#;
        let cfg: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.centroids, CentroidSource::Count(4));
        assert!(cfg.combine);
        assert_eq!(cfg.seed, None);
    }
}
