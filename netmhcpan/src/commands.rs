use crate::config::Config;
use crate::error::{Error, StoreError};
use crate::export::{self, ExportRequest};
use crate::jobs::{JobStore, SortOrder};
use crate::output;
use crate::parser::OutputParser;
use crate::predict::{PredictionRequest, Predictor};

use anyhow::Result;
use colored::Colorize;
use indicatif::ProgressBar;
use std::io::Write;
use std::path::Path;

/// Prints a request failure to stderr and maps it to exit code 1.
fn report_failure(error: &Error) -> Result<i32> {
    eprintln!("{} {error}", format!("[{}]", error.kind()).red());
    Ok(1)
}

fn spinner(json: bool) -> ProgressBar {
    if json {
        ProgressBar::hidden()
    } else {
        output::create_spinner()
    }
}

fn open_store(config: &Config) -> Result<JobStore, StoreError> {
    JobStore::open(config.netmhcpan.job_root.clone())
}

/// Runs one prediction in the foreground and renders the captured report.
///
/// # Errors
///
/// Returns an error only for writer or runtime failures; predictor failures
/// are reported on stderr and mapped to a nonzero exit code.
pub fn run_prediction<W: Write>(
    config: &Config,
    request: &PredictionRequest,
    json: bool,
    mut writer: W,
) -> Result<i32> {
    let predictor = match Predictor::from_config(config) {
        Ok(predictor) => predictor,
        Err(error) => return report_failure(&error),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let progress = spinner(json);
    let outcome = runtime.block_on(predictor.run(request));
    progress.finish_and_clear();

    match outcome {
        Ok(report) => {
            if json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                output::print_prediction_report(&mut writer, &report)?;
            }
            Ok(0)
        }
        Err(error) => report_failure(&error),
    }
}

/// Runs a multi-allele comparison and writes the summary and table files.
///
/// # Errors
///
/// Returns an error only for writer or runtime failures; predictor failures
/// are reported on stderr and mapped to a nonzero exit code.
pub fn run_export<W: Write>(
    config: &Config,
    request: &ExportRequest,
    json: bool,
    mut writer: W,
) -> Result<i32> {
    let predictor = match Predictor::from_config(config) {
        Ok(predictor) => predictor,
        Err(error) => return report_failure(&error),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let progress = spinner(json);
    let outcome = runtime.block_on(export::run_export(&predictor, request));
    progress.finish_and_clear();

    match outcome {
        Ok(report) => {
            if json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                output::print_export_report(&mut writer, &report)?;
            }
            Ok(0)
        }
        Err(error) => report_failure(&error),
    }
}

/// Re-analyzes an existing report file. An explicit threshold moves the
/// weak-binder cutoff; the strong cutoff stays as configured.
///
/// # Errors
///
/// Returns an error when the report file cannot be read or the writer fails.
pub fn run_analyze<W: Write>(
    config: &Config,
    report_file: &Path,
    rank_threshold: Option<f64>,
    json: bool,
    mut writer: W,
) -> Result<i32> {
    let section = &config.netmhcpan;
    let parser = OutputParser::new(
        section.rank_strong,
        rank_threshold.unwrap_or(section.rank_weak),
    );
    let parsed = parser.parse_file(report_file)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&parsed)?)?;
    } else {
        output::print_header(&mut writer)?;
        output::print_parsed_output(&mut writer, &parsed)?;
    }
    Ok(0)
}

/// Lists jobs recorded in the configured job store.
///
/// # Errors
///
/// Returns an error only when the writer fails; store failures are reported
/// on stderr and mapped to a nonzero exit code.
pub fn run_jobs_list<W: Write>(
    config: &Config,
    state: Option<&str>,
    oldest_first: bool,
    json: bool,
    mut writer: W,
) -> Result<i32> {
    let filter = match state.map(|s| s.parse()).transpose() {
        Ok(filter) => filter,
        Err(error) => return report_failure(&error),
    };
    let order = if oldest_first {
        SortOrder::OldestFirst
    } else {
        SortOrder::NewestFirst
    };

    let store = match open_store(config) {
        Ok(store) => store,
        Err(error) => return report_failure(&Error::Store(error)),
    };
    let jobs = store.list(filter, order);

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&jobs)?)?;
    } else {
        output::print_job_table(&mut writer, &jobs)?;
    }
    Ok(0)
}

/// Shows one job's full record.
///
/// # Errors
///
/// Returns an error only when the writer fails; store failures are reported
/// on stderr and mapped to a nonzero exit code.
pub fn run_job_status<W: Write>(
    config: &Config,
    job_id: &str,
    json: bool,
    mut writer: W,
) -> Result<i32> {
    let store = match open_store(config) {
        Ok(store) => store,
        Err(error) => return report_failure(&Error::Store(error)),
    };
    let record = match store.get(job_id) {
        Ok(record) => record,
        Err(StoreError::UnknownJob(id)) => return report_failure(&Error::NotFound(id)),
        Err(other) => return report_failure(&Error::Store(other)),
    };

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&record)?)?;
    } else {
        output::print_job_record(&mut writer, &record)?;
    }
    Ok(0)
}

/// Prints a job's captured process log.
///
/// # Errors
///
/// Returns an error only when the writer fails; store failures are reported
/// on stderr and mapped to a nonzero exit code.
pub fn run_job_log<W: Write>(
    config: &Config,
    job_id: &str,
    tail: Option<usize>,
    json: bool,
    mut writer: W,
) -> Result<i32> {
    let store = match open_store(config) {
        Ok(store) => store,
        Err(error) => return report_failure(&Error::Store(error)),
    };
    let log = match store.read_log(job_id, tail) {
        Ok(log) => log,
        Err(StoreError::UnknownJob(id)) => return report_failure(&Error::NotFound(id)),
        Err(other) => return report_failure(&Error::Store(other)),
    };

    if json {
        let payload = serde_json::json!({ "job_id": job_id, "log": log });
        writeln!(writer, "{}", serde_json::to_string_pretty(&payload)?)?;
    } else {
        write!(writer, "{log}")?;
    }
    Ok(0)
}
