//! Asynchronous job subsystem: durable records, a filesystem store, and the
//! manager that executes predictions off the caller's request path.
//!
//! A job wraps exactly one predictor invocation. Submission validates the
//! request, persists a `pending` record, and returns an identifier; the run
//! itself happens on a background task bounded by an admission limit.
//! Callers poll with `status`, fetch structured output with `result`, tail
//! the live log, or cancel.

pub mod manager;
pub mod store;

pub use manager::{CancelOutcome, JobManager};
pub use store::{JobStore, JobUpdate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::predict::PredictionRequest;

/// Lifecycle state of a job.
///
/// `pending` and `running` are the only non-terminal states; every legal
/// transition moves forward, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Created, waiting for an execution slot.
    Pending,
    /// The predictor process is live.
    Running,
    /// Finished with exit code 0 and a persisted result.
    Completed,
    /// Finished without a result; the record's error says why.
    Failed,
    /// Stopped on request before producing a result.
    Cancelled,
}

impl JobState {
    /// True for states no further transition leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    /// Self-transitions are not legal, terminal states admit nothing.
    #[must_use]
    pub fn can_transition_to(self, next: JobState) -> bool {
        match self {
            JobState::Pending => matches!(
                next,
                JobState::Running | JobState::Failed | JobState::Cancelled
            ),
            JobState::Running => matches!(
                next,
                JobState::Completed | JobState::Failed | JobState::Cancelled
            ),
            JobState::Completed | JobState::Failed | JobState::Cancelled => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for JobState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(crate::error::Error::Validation(format!(
                "unknown job state '{other}'"
            ))),
        }
    }
}

/// Stage a failed job broke down in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobErrorKind {
    /// The binary could not be spawned or an input could not be staged.
    Launch,
    /// The run exceeded its wall-clock budget and was killed.
    Timeout,
    /// The predictor exited with a nonzero status.
    Process,
    /// The job store failed persistently while recording progress.
    Store,
}

impl std::fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobErrorKind::Launch => "launch",
            JobErrorKind::Timeout => "timeout",
            JobErrorKind::Process => "process",
            JobErrorKind::Store => "store",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Why a job ended `failed`. The full detail lives in the job log; this is
/// the short, stable part kept on the record.
pub struct JobError {
    /// Failure stage.
    pub kind: JobErrorKind,
    /// Human-readable reason.
    pub message: String,
    /// Exit code for process failures.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exit_code: Option<i32>,
}

impl JobError {
    /// Builds an error without an exit code.
    #[must_use]
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
        }
    }

    /// Builds a process-failure error carrying the exit code.
    #[must_use]
    pub fn process(exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: JobErrorKind::Process,
            message: message.into(),
            exit_code: Some(exit_code),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Durable record of one job, persisted as the job-directory manifest.
pub struct JobRecord {
    /// Store-unique identifier.
    pub id: String,
    /// Optional caller-supplied label.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// The request this job executes.
    pub request: PredictionRequest,
    /// Current lifecycle state.
    pub state: JobState,
    /// When the record was created. Never changes.
    pub created_at: DateTime<Utc>,
    /// When execution began. Set at most once.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state. Set at most once.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Append-only log artifact, existing from creation.
    pub log_path: PathBuf,
    /// Structured result artifact, existing once completed.
    pub result_path: PathBuf,
    /// Failure detail, populated only in the `failed` state.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<JobError>,
}

/// Listing/status view of a job: identity, state, and timestamps, without
/// request or error payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    /// Store-unique identifier.
    pub id: String,
    /// Optional caller-supplied label.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// Operation label (`peptide`, `protein`, `affinity`, `custom_mhc`).
    pub operation: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When execution began, if it has.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state, if it has.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&JobRecord> for JobSummary {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            operation: record.request.operation().to_owned(),
            state: record.state,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

/// Listing order over creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Most recently created first.
    #[default]
    NewestFirst,
    /// Oldest first.
    OldestFirst,
}
