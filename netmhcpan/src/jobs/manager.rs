//! Background execution of prediction jobs.
//!
//! The manager owns the admission gate, the cancellation channels, and the
//! one background task per job. Submission is cheap: validate, persist a
//! `pending` record, spawn the executor, return. Everything slow happens on
//! the executor task, which acquires an admission permit (first come, first
//! served), runs the predictor inside the job directory, streams output
//! into the job log, and lands the record in a terminal state exactly once.
//!
//! Cancellation owns the `cancelled` transition: the executor never writes
//! a state after its run is cancelled, so the cancel/complete race can only
//! produce one terminal state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::NetMhcPanConfig;
use crate::error::{Error, Result, RunError, StoreError};
use crate::jobs::store::{JobStore, JobUpdate};
use crate::jobs::{JobError, JobErrorKind, JobRecord, JobState, JobSummary, SortOrder};
use crate::parser::{OutputParser, ParsedOutput};
use crate::predict::{PredictionRequest, ToolEnv};
use crate::runner::{run_streamed, LogLine, LogStream, RunOutcome, RunSpec};

/// Attempts at persisting a state change before giving up on the store.
const PERSIST_ATTEMPTS: u32 = 3;

/// Buffered log lines between the runner and the log writer.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// What [`JobManager::cancel`] did.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CancelOutcome {
    /// Identifier of the targeted job.
    pub job_id: String,
    /// State the job is in after the call.
    pub state: JobState,
    /// True when this call performed the cancellation. False when the job
    /// was already terminal; `state` then reports what it ended as.
    pub cancelled: bool,
}

/// Submits, supervises, and answers questions about prediction jobs.
///
/// Shared behind an [`Arc`]; every handle sees the same store, the same
/// admission gate, and the same cancellation registry.
#[derive(Debug)]
pub struct JobManager {
    store: Arc<JobStore>,
    config: NetMhcPanConfig,
    parser: OutputParser,
    admission: Arc<Semaphore>,
    cancels: DashMap<String, oneshot::Sender<()>>,
}

impl JobManager {
    /// Opens the job store under the configured root and builds a manager
    /// enforcing the configured concurrency limit.
    ///
    /// # Errors
    ///
    /// Fails when the store root cannot be opened.
    pub fn open(config: NetMhcPanConfig) -> Result<Arc<Self>> {
        let store = JobStore::open(config.job_root.clone())?;
        let parser = OutputParser::new(config.rank_strong, config.rank_weak);
        let admission = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Ok(Arc::new(Self {
            store: Arc::new(store),
            config,
            parser,
            admission,
            cancels: DashMap::new(),
        }))
    }

    /// Configuration this manager runs with.
    #[must_use]
    pub fn config(&self) -> &NetMhcPanConfig {
        &self.config
    }

    /// Validates the request, persists a `pending` record, and schedules
    /// execution. Returns immediately with the new record; callers poll
    /// [`JobManager::status`] for progress.
    ///
    /// A configured home is required up front, but the launcher script is
    /// deliberately not probed here: a missing binary surfaces later as a
    /// launch failure on the job itself.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a malformed request or unconfigured
    /// installation; store errors when the record cannot be persisted.
    pub fn submit(
        self: &Arc<Self>,
        request: PredictionRequest,
        name: Option<String>,
    ) -> Result<JobRecord> {
        request.validate()?;
        let env = ToolEnv::from_config(&self.config)?;
        let record = self.store.create(request, name)?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.cancels.insert(record.id.clone(), cancel_tx);

        let manager = Arc::clone(self);
        let job_id = record.id.clone();
        tokio::spawn(async move {
            manager.execute(&job_id, &env, cancel_rx).await;
            manager.cancels.remove(&job_id);
        });

        info!(
            job_id = %record.id,
            operation = record.request.operation(),
            name = record.name.as_deref().unwrap_or(""),
            "job submitted"
        );
        Ok(record)
    }

    /// Current record of one job.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown identifiers.
    pub fn status(&self, job_id: &str) -> Result<JobRecord> {
        self.store.get(job_id).map_err(reject_unknown)
    }

    /// Structured result of a completed job.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown identifiers, [`Error::NotReady`]
    /// while the job is still `pending` or `running`, and
    /// [`Error::JobFailed`] when it ended `failed` or `cancelled`.
    pub fn result(&self, job_id: &str) -> Result<ParsedOutput> {
        let record = self.status(job_id)?;
        match record.state {
            JobState::Completed => self.store.read_result(job_id).map_err(Into::into),
            JobState::Pending | JobState::Running => Err(Error::NotReady {
                job_id: record.id,
                state: record.state,
            }),
            JobState::Failed | JobState::Cancelled => {
                let message = record
                    .error
                    .map(|err| err.message)
                    .unwrap_or_else(|| "job was cancelled before completion".to_owned());
                Err(Error::JobFailed {
                    job_id: record.id,
                    state: record.state,
                    message,
                })
            }
        }
    }

    /// The job's interleaved process log, optionally only its last
    /// `tail` lines. Available in every state, including mid-run.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown identifiers; store errors when the
    /// log cannot be read.
    pub fn log(&self, job_id: &str, tail: Option<usize>) -> Result<String> {
        self.store.read_log(job_id, tail).map_err(reject_unknown)
    }

    /// Summaries of known jobs, optionally filtered by state.
    #[must_use]
    pub fn list(&self, state: Option<JobState>, order: SortOrder) -> Vec<JobSummary> {
        self.store.list(state, order)
    }

    /// Requests cancellation of a job.
    ///
    /// Queued jobs are cancelled in place; running jobs get their process
    /// killed. Already-terminal jobs are left untouched and the outcome
    /// reports the state they ended in.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown identifiers; store errors when the
    /// record cannot be persisted.
    pub fn cancel(&self, job_id: &str) -> Result<CancelOutcome> {
        let record = self.status(job_id)?;
        if record.state.is_terminal() {
            return Ok(CancelOutcome {
                job_id: record.id,
                state: record.state,
                cancelled: false,
            });
        }

        let update = JobUpdate::state(JobState::Cancelled).finished_now();
        match self.store.update(job_id, update) {
            Ok(updated) => {
                // Fire after the record is durably cancelled, so the
                // executor can never observe a live channel on a
                // non-cancelled job.
                if let Some((_, cancel_tx)) = self.cancels.remove(job_id) {
                    let _ = cancel_tx.send(());
                }
                info!(job_id, "job cancelled");
                Ok(CancelOutcome {
                    job_id: updated.id,
                    state: updated.state,
                    cancelled: true,
                })
            }
            // Lost the race against completion or failure.
            Err(StoreError::IllegalTransition { from, .. }) => Ok(CancelOutcome {
                job_id: record.id,
                state: from,
                cancelled: false,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Runs one job to a terminal state. Panics never escape this task;
    /// every exit path either lands a terminal record or leaves the
    /// cancelled record written by [`JobManager::cancel`].
    async fn execute(&self, job_id: &str, env: &ToolEnv, cancel: oneshot::Receiver<()>) {
        // Fair queue: permits hand out in request order.
        let _permit = match self.admission.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        // Cancelled while queued: the record is already terminal.
        let record = match self.store.get(job_id) {
            Ok(record) if record.state == JobState::Pending => record,
            Ok(record) => {
                debug!(job_id, state = %record.state, "job left pending before admission");
                return;
            }
            Err(err) => {
                error!(job_id, error = %err, "job vanished before admission");
                return;
            }
        };
        if !self.mark_running(job_id).await {
            return;
        }
        self.run_to_completion(&record, env, cancel).await;
    }

    async fn run_to_completion(
        &self,
        record: &JobRecord,
        env: &ToolEnv,
        cancel: oneshot::Receiver<()>,
    ) {
        let job_id = record.id.as_str();
        let job_dir = self.store.job_dir(job_id);
        let materialized = match record.request.materialize(&job_dir) {
            Ok(materialized) => materialized,
            Err(err) => {
                warn!(job_id, error = %err, "could not stage job inputs");
                let detail = JobError::new(JobErrorKind::Launch, err.to_string());
                self.finish(job_id, failed(detail)).await;
                return;
            }
        };

        let spec = RunSpec {
            program: env.tool_path(),
            args: materialized.args,
            env: env.overlay(),
            cwd: Some(job_dir.clone()),
            timeout: Duration::from_secs(self.config.job_timeout_secs),
            kill_grace: Duration::from_secs(self.config.kill_grace_secs),
        };

        let (log_tx, log_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let (run, report) = tokio::join!(
            run_streamed(&spec, log_tx, cancel),
            self.drain_log(job_id, log_rx)
        );

        match run {
            Ok(outcome) if outcome.exit_code == 0 => {
                self.complete(record, &job_dir, &report, &outcome).await;
            }
            Ok(outcome) => {
                warn!(job_id, exit_code = outcome.exit_code, "predictor failed");
                let detail = JobError::process(
                    outcome.exit_code,
                    format!("netMHCpan exited with status {}", outcome.exit_code),
                );
                self.finish(job_id, failed(detail)).await;
            }
            // cancel() already wrote the terminal record.
            Err(RunError::Cancelled) => {
                debug!(job_id, "run stopped by cancellation");
            }
            Err(err @ RunError::Timeout { .. }) => {
                warn!(job_id, error = %err, "predictor timed out");
                let detail = JobError::new(JobErrorKind::Timeout, err.to_string());
                self.finish(job_id, failed(detail)).await;
            }
            Err(err @ RunError::Launch { .. }) => {
                warn!(job_id, error = %err, "predictor could not start");
                let detail = JobError::new(JobErrorKind::Launch, err.to_string());
                self.finish(job_id, failed(detail)).await;
            }
        }
    }

    /// Persists the report and result artifacts, then lands `completed`.
    async fn complete(&self, record: &JobRecord, job_dir: &Path, report: &str, run: &RunOutcome) {
        let job_id = record.id.as_str();
        let report_path = job_dir.join(record.request.derived_output_name());
        if let Err(err) = std::fs::write(&report_path, report) {
            warn!(job_id, error = %err, "could not write report artifact");
            let detail = JobError::new(
                JobErrorKind::Store,
                format!("could not write {}: {err}", report_path.display()),
            );
            self.finish(job_id, failed(detail)).await;
            return;
        }

        let parsed = self.parser.parse(report);
        if let Err(err) = self.store.write_result(job_id, &parsed) {
            warn!(job_id, error = %err, "could not write result artifact");
            let detail = JobError::new(JobErrorKind::Store, err.to_string());
            self.finish(job_id, failed(detail)).await;
            return;
        }

        info!(
            job_id,
            records = parsed.records.len(),
            duration = %crate::utils::format_secs(run.duration.as_secs_f64()),
            "job completed"
        );
        self.finish(job_id, JobUpdate::state(JobState::Completed).finished_now())
            .await;
    }

    /// Moves the record to `running`. Returns false when the job must not
    /// run, either because it was cancelled first or because the store
    /// refuses to persist the transition.
    async fn mark_running(&self, job_id: &str) -> bool {
        for attempt in 1..=PERSIST_ATTEMPTS {
            let update = JobUpdate::state(JobState::Running).started_now();
            match self.store.update(job_id, update) {
                Ok(_) => return true,
                Err(StoreError::IllegalTransition { from, .. }) => {
                    debug!(job_id, state = %from, "not starting; job already moved on");
                    return false;
                }
                Err(err) if attempt < PERSIST_ATTEMPTS => {
                    warn!(job_id, error = %err, attempt, "could not persist running state; retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(err) => {
                    error!(job_id, error = %err, "could not persist running state");
                    let detail = JobError::new(JobErrorKind::Store, err.to_string());
                    self.finish(job_id, failed(detail)).await;
                    return false;
                }
            }
        }
        false
    }

    /// Applies a terminal update, retrying transient store failures.
    /// An illegal transition means another writer (cancellation) landed a
    /// terminal state first; the record is kept as that writer left it.
    async fn finish(&self, job_id: &str, update: JobUpdate) {
        for attempt in 1..=PERSIST_ATTEMPTS {
            match self.store.update(job_id, update.clone()) {
                Ok(record) => {
                    debug!(job_id, state = %record.state, "job finished");
                    return;
                }
                Err(StoreError::IllegalTransition { from, .. }) => {
                    debug!(job_id, state = %from, "terminal state already recorded");
                    return;
                }
                Err(err) if attempt < PERSIST_ATTEMPTS => {
                    warn!(job_id, error = %err, attempt, "could not persist terminal state; retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(err) => {
                    error!(job_id, error = %err, "could not persist terminal state");
                    return;
                }
            }
        }
    }

    /// Forwards child output into the job log and collects the report.
    ///
    /// The log gets every line, stream-tagged, in arrival order. Only
    /// stdout lines form the report text; that is the document netMHCpan
    /// writes, with diagnostics on stderr kept out of it.
    async fn drain_log(&self, job_id: &str, mut log_rx: mpsc::Receiver<LogLine>) -> String {
        let mut report = String::new();
        let mut log_broken = false;
        while let Some(entry) = log_rx.recv().await {
            if entry.stream == LogStream::Stdout {
                report.push_str(&entry.line);
                report.push('\n');
            }
            if !log_broken {
                let tagged = format!("[{}] {}\n", entry.stream, entry.line);
                if let Err(err) = self.store.append_log(job_id, &tagged) {
                    warn!(job_id, error = %err, "log append failed; further output not logged");
                    log_broken = true;
                }
            }
        }
        report
    }
}

fn failed(detail: JobError) -> JobUpdate {
    JobUpdate::state(JobState::Failed)
        .finished_now()
        .with_error(detail)
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(50 * u64::from(attempt))
}

fn reject_unknown(err: StoreError) -> Error {
    match err {
        StoreError::UnknownJob(id) => Error::NotFound(id),
        other => Error::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::PeptideRequest;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, home: Option<PathBuf>) -> Arc<JobManager> {
        let config = NetMhcPanConfig {
            home,
            job_root: dir.path().join("jobs"),
            ..NetMhcPanConfig::default()
        };
        JobManager::open(config).unwrap()
    }

    fn peptide_request(dir: &TempDir) -> PredictionRequest {
        let input = dir.path().join("test.pep");
        std::fs::write(&input, "SIINFEKL\n").unwrap();
        PredictionRequest::Peptide(PeptideRequest {
            input_file: input,
            allele: "HLA-A02:01".to_owned(),
            rank_threshold: None,
            output_file: None,
        })
    }

    #[test]
    fn unknown_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Some(PathBuf::from("/opt/netMHCpan-4.2")));

        for err in [
            manager.status("missing").unwrap_err(),
            manager.result("missing").unwrap_err(),
            manager.log("missing", None).unwrap_err(),
            manager.cancel("missing").unwrap_err(),
        ] {
            assert_eq!(err.kind(), "not_found");
        }
    }

    #[tokio::test]
    async fn submit_rejects_invalid_request() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Some(PathBuf::from("/opt/netMHCpan-4.2")));
        let request = PredictionRequest::Peptide(PeptideRequest {
            input_file: dir.path().join("absent.pep"),
            allele: "HLA-A02:01".to_owned(),
            rank_threshold: None,
            output_file: None,
        });

        let err = manager.submit(request, None).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(manager.list(None, SortOrder::NewestFirst).is_empty());
    }

    #[tokio::test]
    async fn submit_requires_configured_home() {
        let dir = TempDir::new().unwrap();
        std::env::remove_var("NMHOME");
        let manager = manager(&dir, None);

        let err = manager.submit(peptide_request(&dir), None).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn missing_launcher_fails_the_job_not_the_submit() {
        let dir = TempDir::new().unwrap();
        // Home exists but holds no launcher script.
        std::fs::create_dir_all(dir.path().join("empty-install")).unwrap();
        let manager = manager(&dir, Some(dir.path().join("empty-install")));

        let record = manager
            .submit(peptide_request(&dir), Some("doomed".to_owned()))
            .unwrap();

        let mut state = record.state;
        for _ in 0..200 {
            state = manager.status(&record.id).unwrap().state;
            if state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state, JobState::Failed);

        let failed = manager.status(&record.id).unwrap();
        let detail = failed.error.unwrap();
        assert_eq!(detail.kind, JobErrorKind::Launch);
        assert!(failed.finished_at.is_some());

        let err = manager.result(&record.id).unwrap_err();
        assert_eq!(err.kind(), "job_failed");
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_terminal_jobs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("empty-install")).unwrap();
        let manager = manager(&dir, Some(dir.path().join("empty-install")));

        let record = manager.submit(peptide_request(&dir), None).unwrap();
        for _ in 0..200 {
            if manager.status(&record.id).unwrap().state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let outcome = manager.cancel(&record.id).unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.state, JobState::Failed);
    }
}
