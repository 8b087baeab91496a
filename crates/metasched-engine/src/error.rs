use thiserror::Error;

use crate::submission::FatalSubmission;
use crate::supervisor::FatalRetryLimit;

/// Everything that can end a run early with a non-zero exit.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] metasched_core::ConfigError),

    #[error(transparent)]
    FatalSubmission(#[from] FatalSubmission),

    #[error(transparent)]
    FatalRetryLimit(#[from] FatalRetryLimit),

    #[error("engine task panicked or was cancelled: {0}")]
    Join(String),
}
