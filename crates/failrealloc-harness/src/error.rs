//! Harness error type.

use std::path::PathBuf;

use failrealloc_subjects::UnknownSubject;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Subject(#[from] UnknownSubject),
    #[error("shim library not found at {}", .0.display())]
    MissingShim(PathBuf),
    #[error("checker binary not found at {}", .0.display())]
    MissingChecker(PathBuf),
    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{failed} of {total} checks did not meet expectations")]
    ExpectationsFailed { failed: usize, total: usize },
}
