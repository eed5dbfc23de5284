//! Harness error taxonomy.

use std::path::PathBuf;

use buddyalloc::ArenaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("case '{case}': {source}")]
    Arena {
        case: String,
        #[source]
        source: ArenaError,
    },
    #[error("case '{case}' step {step}: unknown handle '{handle}'")]
    UnknownHandle {
        case: String,
        step: usize,
        handle: String,
    },
    #[error("case '{case}' step {step}: handle '{handle}' is still live")]
    DuplicateHandle {
        case: String,
        step: usize,
        handle: String,
    },
    #[error("case '{case}' step {step}: expected {expected}, got {actual}")]
    Mismatch {
        case: String,
        step: usize,
        expected: String,
        actual: String,
    },
    #[error("thread {thread} step {step}: payload of {size} bytes was overwritten")]
    Corruption {
        thread: usize,
        step: usize,
        size: usize,
    },
    #[error("stress worker {thread} panicked")]
    WorkerPanicked { thread: usize },
}

impl ScenarioError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
