use std::path::PathBuf;

use crate::jobs::JobState;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the prediction and job APIs.
///
/// Each variant maps to a stable error-kind tag (see [`Error::kind`]) so the
/// MCP layer and the CLI can report failures uniformly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was rejected before any job record was created.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No job with the given identifier exists in the store.
    #[error("no such job: {0}")]
    NotFound(String),

    /// The result was requested before the job reached `completed`.
    #[error("job {job_id} is {state}; result not available yet")]
    NotReady {
        /// Identifier of the queried job.
        job_id: String,
        /// State the job was observed in.
        state: JobState,
    },

    /// The job finished without a usable result.
    #[error("job {job_id} finished {state}: {message}")]
    JobFailed {
        /// Identifier of the queried job.
        job_id: String,
        /// Terminal state the job ended in (`failed` or `cancelled`).
        state: JobState,
        /// Short failure reason; the job log holds the full detail.
        message: String,
    },

    /// The predictor exited with a nonzero status during a foreground run.
    #[error("netMHCpan exited with status {exit_code}: {stderr}")]
    Tool {
        /// Exit code reported by the predictor.
        exit_code: i32,
        /// Captured stderr, trimmed for display.
        stderr: String,
    },

    /// A job-store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The runner could not produce an outcome (launch, timeout, cancel).
    #[error(transparent)]
    Run(#[from] RunError),

    /// Filesystem access outside the job store failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serializing or deserializing a result payload failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable tag for this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::NotReady { .. } => "not_ready",
            Error::JobFailed { .. } => "job_failed",
            Error::Tool { .. } => "process",
            Error::Store(_) => "store",
            Error::Run(RunError::Launch { .. }) => "launch",
            Error::Run(RunError::Timeout { .. }) => "timeout",
            Error::Run(RunError::Cancelled) => "cancelled",
            Error::Io(_) => "io",
            Error::Json(_) => "serialization",
        }
    }
}

/// Failures of a single external-binary invocation.
///
/// A nonzero exit is NOT an error here; the runner reports it as a normal
/// outcome and callers decide what a nonzero status means.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The binary could not be located or spawned.
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Program path that was attempted.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The child exceeded the configured wall-clock budget and was killed.
    #[error("timed out after {timeout_secs}s")]
    Timeout {
        /// Budget that was exceeded, in seconds.
        timeout_secs: u64,
    },

    /// The caller cancelled the run; the child was killed.
    #[error("run cancelled")]
    Cancelled,
}

/// Failures local to the filesystem job store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The identifier is not present in the store's index.
    #[error("no such job: {0}")]
    UnknownJob(String),

    /// A state change would leave a terminal state or skip a stage.
    #[error("job {job_id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Job the update targeted.
        job_id: String,
        /// State currently recorded.
        from: JobState,
        /// State the update requested.
        to: JobState,
    },

    /// A timestamp that is set at most once would be overwritten.
    #[error("job {job_id}: {field} already set")]
    TimestampRewrite {
        /// Job the update targeted.
        job_id: String,
        /// Name of the offending timestamp field.
        field: &'static str,
    },

    /// Reading or writing a job artifact failed.
    #[error("job store io at {}: {source}", path.display())]
    Io {
        /// Artifact path involved.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// A manifest on disk could not be decoded.
    #[error("corrupt manifest at {}: {source}", path.display())]
    CorruptManifest {
        /// Manifest path involved.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}
