//! Filesystem-backed job store.
//!
//! Layout: one directory per job under a configured root.
//!
//! ```text
//! <root>/<job_id>/manifest.json   durable JobRecord, rewritten atomically
//! <root>/<job_id>/job.log         append-only process output
//! <root>/<job_id>/result.json     structured result, present once completed
//! ```
//!
//! The in-memory index mirrors the manifests; disk is authoritative and the
//! index is rebuilt from it on open. Updates to one job serialize on that
//! job's own lock, so jobs never block each other on manifest writes.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::jobs::{JobError, JobRecord, JobState, JobSummary, SortOrder};
use crate::parser::ParsedOutput;
use crate::predict::PredictionRequest;

const MANIFEST_FILE: &str = "manifest.json";
const LOG_FILE: &str = "job.log";
const RESULT_FILE: &str = "result.json";

// Freshly generated ids essentially never collide; the loop exists so that
// a collision degrades into a retry instead of clobbering a job directory.
const CREATE_ATTEMPTS: usize = 8;

/// Partial update applied to a [`JobRecord`].
///
/// Every field is optional; unset fields keep their current value. State
/// changes must follow the transition graph and timestamps are write-once.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    /// New lifecycle state.
    pub state: Option<JobState>,
    /// Execution start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal time.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure detail.
    pub error: Option<JobError>,
}

impl JobUpdate {
    /// Update that only changes state.
    #[must_use]
    pub fn state(state: JobState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Adds an execution start time of now.
    #[must_use]
    pub fn started_now(mut self) -> Self {
        self.started_at = Some(Utc::now());
        self
    }

    /// Adds a terminal time of now.
    #[must_use]
    pub fn finished_now(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// Adds failure detail.
    #[must_use]
    pub fn with_error(mut self, error: JobError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Keyed, durable store of job records and their artifacts.
#[derive(Debug)]
pub struct JobStore {
    root: PathBuf,
    jobs: DashMap<String, Arc<Mutex<JobRecord>>>,
}

impl JobStore {
    /// Opens (creating if needed) a store rooted at `root` and indexes any
    /// jobs already on disk.
    ///
    /// Jobs found in `pending` or `running` are indexed as-is: their
    /// executor died with the previous process, and the records stay
    /// durably visible rather than being silently rewritten.
    ///
    /// # Errors
    ///
    /// Fails when the root cannot be created or read. Individually corrupt
    /// manifests are skipped with a warning, not fatal.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;

        let store = Self {
            jobs: DashMap::new(),
            root: root.clone(),
        };
        let entries = fs::read_dir(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        for entry in entries.flatten() {
            let manifest = entry.path().join(MANIFEST_FILE);
            if !manifest.is_file() {
                continue;
            }
            match read_manifest(&manifest) {
                Ok(record) => {
                    debug!(job_id = %record.id, state = %record.state, "indexed existing job");
                    store
                        .jobs
                        .insert(record.id.clone(), Arc::new(Mutex::new(record)));
                }
                Err(err) => {
                    warn!(path = %manifest.display(), error = %err, "skipping unreadable manifest");
                }
            }
        }
        Ok(store)
    }

    /// Root directory this store writes under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one job's artifacts.
    #[must_use]
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Creates a new `pending` job: fresh identifier, artifact directory,
    /// empty log, durable manifest.
    ///
    /// Safe to call concurrently; identifiers never collide because the
    /// job directory is claimed with an exclusive create.
    ///
    /// # Errors
    ///
    /// Fails when the artifacts cannot be created.
    pub fn create(
        &self,
        request: PredictionRequest,
        name: Option<String>,
    ) -> Result<JobRecord, StoreError> {
        for _ in 0..CREATE_ATTEMPTS {
            let id = Uuid::new_v4().to_string();
            let dir = self.job_dir(&id);
            match fs::create_dir(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(StoreError::Io { path: dir, source }),
            }

            let record = JobRecord {
                id: id.clone(),
                name,
                request,
                state: JobState::Pending,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
                log_path: dir.join(LOG_FILE),
                result_path: dir.join(RESULT_FILE),
                error: None,
            };
            // The log artifact exists from the moment the job does.
            fs::write(&record.log_path, b"").map_err(|source| StoreError::Io {
                path: record.log_path.clone(),
                source,
            })?;
            write_manifest(&dir, &record)?;
            self.jobs
                .insert(id.clone(), Arc::new(Mutex::new(record.clone())));
            debug!(job_id = %id, "created job");
            return Ok(record);
        }
        // Only reachable if id generation collides CREATE_ATTEMPTS times.
        Err(StoreError::Io {
            path: self.root.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "could not allocate a fresh job id",
            ),
        })
    }

    /// Snapshot of one record.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownJob`] when the id is not indexed.
    pub fn get(&self, job_id: &str) -> Result<JobRecord, StoreError> {
        let slot = self.slot(job_id)?;
        let guard = lock(&slot);
        Ok(guard.clone())
    }

    /// Applies a partial update to one record and persists the manifest.
    ///
    /// The update is atomic with respect to other updates and readers of
    /// the same job: either the whole update lands (in memory and on disk)
    /// or none of it does.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownJob`] for unknown ids,
    /// [`StoreError::IllegalTransition`] when the state change leaves a
    /// terminal state or skips a stage, [`StoreError::TimestampRewrite`]
    /// when a write-once timestamp is already set, and
    /// [`StoreError::Io`] when persisting fails (the in-memory record is
    /// left unchanged).
    pub fn update(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let slot = self.slot(job_id)?;
        let mut guard = lock(&slot);

        // Terminal records reject every update, state-bearing or not.
        if guard.state.is_terminal() {
            return Err(StoreError::IllegalTransition {
                job_id: job_id.to_owned(),
                from: guard.state,
                to: update.state.unwrap_or(guard.state),
            });
        }
        if let Some(next) = update.state {
            if !guard.state.can_transition_to(next) {
                return Err(StoreError::IllegalTransition {
                    job_id: job_id.to_owned(),
                    from: guard.state,
                    to: next,
                });
            }
        }
        if update.started_at.is_some() && guard.started_at.is_some() {
            return Err(StoreError::TimestampRewrite {
                job_id: job_id.to_owned(),
                field: "started_at",
            });
        }
        if update.finished_at.is_some() && guard.finished_at.is_some() {
            return Err(StoreError::TimestampRewrite {
                job_id: job_id.to_owned(),
                field: "finished_at",
            });
        }

        let mut next = guard.clone();
        if let Some(state) = update.state {
            next.state = state;
        }
        if let Some(at) = update.started_at {
            next.started_at = Some(at);
        }
        if let Some(at) = update.finished_at {
            next.finished_at = Some(at);
        }
        if let Some(error) = update.error {
            next.error = Some(error);
        }

        write_manifest(&self.job_dir(job_id), &next)?;
        *guard = next.clone();
        Ok(next)
    }

    /// Summaries of all jobs, optionally filtered by state, ordered by
    /// creation time. A snapshot: concurrent updates after the call are
    /// not reflected.
    #[must_use]
    pub fn list(&self, filter: Option<JobState>, order: SortOrder) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> = self
            .jobs
            .iter()
            .map(|entry| {
                let guard = lock(entry.value());
                JobSummary::from(&*guard)
            })
            .filter(|summary| filter.is_none_or(|state| summary.state == state))
            .collect();
        // Identifier as tie-break keeps the order stable for equal stamps.
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if order == SortOrder::NewestFirst {
            summaries.reverse();
        }
        summaries
    }

    /// Appends text to the job's log artifact. Readers may tail the file
    /// concurrently; nothing is locked against them.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownJob`] for unknown ids, [`StoreError::Io`] when
    /// the append fails.
    pub fn append_log(&self, job_id: &str, text: &str) -> Result<(), StoreError> {
        let log_path = {
            let slot = self.slot(job_id)?;
            let guard = lock(&slot);
            guard.log_path.clone()
        };
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)
            .map_err(|source| StoreError::Io {
                path: log_path.clone(),
                source,
            })?;
        file.write_all(text.as_bytes())
            .map_err(|source| StoreError::Io {
                path: log_path,
                source,
            })
    }

    /// Reads the job's log, optionally only its last `tail` lines.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownJob`] for unknown ids, [`StoreError::Io`] when
    /// the log cannot be read.
    pub fn read_log(&self, job_id: &str, tail: Option<usize>) -> Result<String, StoreError> {
        let record = self.get(job_id)?;
        let text =
            fs::read_to_string(&record.log_path).map_err(|source| StoreError::Io {
                path: record.log_path.clone(),
                source,
            })?;
        Ok(crate::utils::tail_lines(&text, tail))
    }

    /// Persists the structured result artifact for a job.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownJob`] for unknown ids, [`StoreError::Io`] when
    /// writing fails.
    pub fn write_result(&self, job_id: &str, result: &ParsedOutput) -> Result<(), StoreError> {
        let record = self.get(job_id)?;
        let json = serde_json::to_vec_pretty(result).map_err(|source| {
            StoreError::CorruptManifest {
                path: record.result_path.clone(),
                source,
            }
        })?;
        write_atomic(&record.result_path, &json)
    }

    /// Reads the structured result artifact back.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownJob`] for unknown ids, [`StoreError::Io`] when
    /// the artifact is missing or unreadable,
    /// [`StoreError::CorruptManifest`] when it does not decode.
    pub fn read_result(&self, job_id: &str) -> Result<ParsedOutput, StoreError> {
        let record = self.get(job_id)?;
        let bytes = fs::read(&record.result_path).map_err(|source| StoreError::Io {
            path: record.result_path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::CorruptManifest {
            path: record.result_path.clone(),
            source,
        })
    }

    fn slot(&self, job_id: &str) -> Result<Arc<Mutex<JobRecord>>, StoreError> {
        self.jobs
            .get(job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::UnknownJob(job_id.to_owned()))
    }
}

fn lock(slot: &Arc<Mutex<JobRecord>>) -> MutexGuard<'_, JobRecord> {
    // A poisoned lock means a panic elsewhere; the record itself is still
    // a consistent snapshot, so keep serving it.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_manifest(path: &Path) -> Result<JobRecord, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::CorruptManifest {
        path: path.to_path_buf(),
        source,
    })
}

fn write_manifest(dir: &Path, record: &JobRecord) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(record).map_err(|source| {
        StoreError::CorruptManifest {
            path: dir.join(MANIFEST_FILE),
            source,
        }
    })?;
    write_atomic(&dir.join(MANIFEST_FILE), &json)
}

/// Writes via a sibling temp file and rename, so readers never observe a
/// half-written artifact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
