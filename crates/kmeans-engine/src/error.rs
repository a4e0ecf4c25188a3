use kmeans_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KmeansError {
    /// Bad run parameters or malformed records; the run never starts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A broken internal invariant, e.g. assigning against no centroids.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A round could not be completed by the execution engine.
    #[error("round {iteration} failed (last completed round: {last_completed}): {source}")]
    EngineFailure {
        iteration: usize,
        last_completed: usize,
        #[source]
        source: Box<KmeansError>,
    },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KmeansError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<CoreError> for KmeansError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io { path, source } => KmeansError::Io { path, source },
            CoreError::Json(err) => KmeansError::InvalidArgument(err.to_string()),
            other => KmeansError::InvalidArgument(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, KmeansError>;
