//! Prediction requests and their mapping onto predictor invocations.
//!
//! Each request kind mirrors one invocation shape of netMHCpan-4.2:
//! peptide-list scoring, protein (FASTA) scans, binding-affinity runs, and
//! scoring against a custom MHC sequence. Requests validate synchronously;
//! a request that fails validation is rejected before any job exists.
//!
//! The predictor writes its report to stdout. The caller captures that
//! stream and persists it under a derived file name, so the argv never
//! contains an output path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{Config, NetMhcPanConfig};
use crate::constants::{get_hla_allele_re, ENV_NMHOME, ENV_TMPDIR, MAX_PEPTIDE_LEN, MIN_PEPTIDE_LEN};
use crate::error::{Error, Result};
use crate::parser::{OutputParser, ParsedOutput};
use crate::runner::{run_captured, RunSpec};
use crate::utils::file_stem_string;

/// Which scores a binding-affinity run requests from the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMode {
    /// Eluted-ligand and binding-affinity scores (`-BA -EL`).
    #[default]
    Both,
    /// Binding-affinity only (`-BA`).
    Ba,
    /// Eluted-ligand only (`-EL`).
    El,
}

impl PredictionMode {
    /// Flags appended to the argv for this mode.
    #[must_use]
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            PredictionMode::Both => &["-BA", "-EL"],
            PredictionMode::Ba => &["-BA"],
            PredictionMode::El => &["-EL"],
        }
    }

    /// Suffix used in derived output file names.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            PredictionMode::Both => "both",
            PredictionMode::Ba => "ba",
            PredictionMode::El => "el",
        }
    }
}

impl std::fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

impl std::str::FromStr for PredictionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "both" => Ok(PredictionMode::Both),
            "ba" => Ok(PredictionMode::Ba),
            "el" => Ok(PredictionMode::El),
            other => Err(Error::Validation(format!(
                "unknown prediction mode '{other}' (expected both, ba, or el)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Scores a peptide-list file against one allele.
pub struct PeptideRequest {
    /// Peptide-list file, one sequence per line.
    pub input_file: PathBuf,
    /// Allele to score against.
    pub allele: String,
    /// Optional `%Rank` display cutoff passed as `-t`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rank_threshold: Option<f64>,
    /// Explicit report location; derived next to the input when unset.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Scans one or more FASTA protein files for epitopes.
pub struct ProteinRequest {
    /// FASTA files. More than one is combined into a single staged input.
    pub input_files: Vec<PathBuf>,
    /// Allele to score against.
    pub allele: String,
    /// Comma-separated peptide lengths, e.g. `"8,9,10"`.
    pub lengths: String,
    /// Optional `%Rank` display cutoff passed as `-t`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rank_threshold: Option<f64>,
    /// Sort the report by descending score (`-s`).
    #[serde(default)]
    pub sort_output: bool,
    /// Explicit report location; derived next to the input when unset.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Scores a peptide-list file with explicit score-type selection, against
/// one or several alleles in a single run.
pub struct AffinityRequest {
    /// Peptide-list file, one sequence per line.
    pub input_file: PathBuf,
    /// Alleles to score against; joined with commas for the predictor.
    pub alleles: Vec<String>,
    /// Score selection.
    #[serde(default)]
    pub mode: PredictionMode,
    /// Optional `%Rank` display cutoff passed as `-t`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rank_threshold: Option<f64>,
    /// Advisory batch size recorded with the job for very large screens.
    /// The predictor handles any input size in one pass.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chunk_size: Option<usize>,
    /// Explicit report location; derived next to the input when unset.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Scores a peptide-list file against a custom MHC molecule given as a
/// FASTA sequence instead of a known allele name.
pub struct CustomMhcRequest {
    /// Peptide-list file, one sequence per line.
    pub input_file: PathBuf,
    /// FASTA file holding the MHC molecule sequence (`-hlaseq`).
    pub mhc_sequence_file: PathBuf,
    /// Identifier for the molecule in the report (`-hlaid`).
    pub mhc_name: String,
    /// Optional `%Rank` display cutoff passed as `-t`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rank_threshold: Option<f64>,
    /// Explicit report location; derived next to the input when unset.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_file: Option<PathBuf>,
}

/// One prediction request of any kind. Serialized into job manifests with
/// an `operation` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum PredictionRequest {
    /// Peptide-list scoring.
    Peptide(PeptideRequest),
    /// Protein (FASTA) epitope scan.
    Protein(ProteinRequest),
    /// Binding-affinity scoring.
    Affinity(AffinityRequest),
    /// Custom-MHC scoring.
    CustomMhc(CustomMhcRequest),
}

impl PredictionRequest {
    /// Short operation label used in summaries and job listings.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            PredictionRequest::Peptide(_) => "peptide",
            PredictionRequest::Protein(_) => "protein",
            PredictionRequest::Affinity(_) => "affinity",
            PredictionRequest::CustomMhc(_) => "custom_mhc",
        }
    }

    /// Checks the request against its operation's required parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first problem found. A
    /// request that passes here can still fail at run time (the predictor
    /// has opinions of its own), but never because of a missing parameter.
    pub fn validate(&self) -> Result<()> {
        match self {
            PredictionRequest::Peptide(req) => {
                require_file(&req.input_file, "input file")?;
                require_allele(&req.allele)?;
                require_threshold(req.rank_threshold)
            }
            PredictionRequest::Protein(req) => {
                if req.input_files.is_empty() {
                    return Err(Error::Validation("no input files given".to_owned()));
                }
                for file in &req.input_files {
                    require_file(file, "input file")?;
                }
                require_allele(&req.allele)?;
                parse_lengths(&req.lengths)?;
                require_threshold(req.rank_threshold)
            }
            PredictionRequest::Affinity(req) => {
                require_file(&req.input_file, "input file")?;
                if req.alleles.is_empty() {
                    return Err(Error::Validation("no alleles given".to_owned()));
                }
                for allele in &req.alleles {
                    require_allele(allele)?;
                }
                require_threshold(req.rank_threshold)
            }
            PredictionRequest::CustomMhc(req) => {
                require_file(&req.input_file, "input file")?;
                require_file(&req.mhc_sequence_file, "MHC sequence file")?;
                if req.mhc_name.trim().is_empty() {
                    return Err(Error::Validation("MHC name must not be empty".to_owned()));
                }
                require_threshold(req.rank_threshold)
            }
        }
    }

    /// File name the captured report is stored under when the request does
    /// not name one.
    #[must_use]
    pub fn derived_output_name(&self) -> String {
        match self {
            PredictionRequest::Peptide(req) => {
                format!("{}_predictions.txt", file_stem_string(&req.input_file))
            }
            PredictionRequest::Protein(req) => {
                let stem = if req.input_files.len() == 1 {
                    file_stem_string(&req.input_files[0])
                } else {
                    COMBINED_PROTEIN_STEM.to_owned()
                };
                let lengths = req.lengths.replace(',', "_");
                format!("{stem}_protein_pred_{lengths}mer.txt")
            }
            PredictionRequest::Affinity(req) => format!(
                "{}_binding_{}.txt",
                file_stem_string(&req.input_file),
                req.mode.suffix()
            ),
            PredictionRequest::CustomMhc(req) => {
                format!("{}_custom_mhc_pred.txt", file_stem_string(&req.input_file))
            }
        }
    }

    /// Explicit report location, when the request names one.
    #[must_use]
    pub fn output_override(&self) -> Option<&Path> {
        match self {
            PredictionRequest::Peptide(req) => req.output_file.as_deref(),
            PredictionRequest::Protein(req) => req.output_file.as_deref(),
            PredictionRequest::Affinity(req) => req.output_file.as_deref(),
            PredictionRequest::CustomMhc(req) => req.output_file.as_deref(),
        }
    }

    /// Directory the derived report lands in for foreground runs. Matches
    /// where the first input lives.
    #[must_use]
    pub fn input_parent(&self) -> PathBuf {
        let input: &Path = match self {
            PredictionRequest::Peptide(req) => &req.input_file,
            PredictionRequest::Protein(req) => &req.input_files[0],
            PredictionRequest::Affinity(req) => &req.input_file,
            PredictionRequest::CustomMhc(req) => &req.input_file,
        };
        input.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Builds the argv for this request, staging combined inputs under
    /// `work_dir` when needed.
    ///
    /// # Errors
    ///
    /// Fails when a combined protein input cannot be read or staged.
    pub fn materialize(&self, work_dir: &Path) -> Result<MaterializedRequest> {
        let mut args: Vec<OsString> = Vec::new();
        let mut staged_input = None;

        match self {
            PredictionRequest::Peptide(req) => {
                args.push("-p".into());
                args.push("-a".into());
                args.push(req.allele.clone().into());
                args.push(req.input_file.clone().into());
                push_threshold(&mut args, req.rank_threshold);
            }
            PredictionRequest::Protein(req) => {
                let input = if req.input_files.len() == 1 {
                    req.input_files[0].clone()
                } else {
                    let combined = combine_fasta(&req.input_files, work_dir)?;
                    staged_input = Some(combined.clone());
                    combined
                };
                args.push("-f".into());
                args.push(input.into());
                args.push("-a".into());
                args.push(req.allele.clone().into());
                args.push("-l".into());
                args.push(req.lengths.clone().into());
                push_threshold(&mut args, req.rank_threshold);
                if req.sort_output {
                    args.push("-s".into());
                }
            }
            PredictionRequest::Affinity(req) => {
                args.push("-p".into());
                args.push("-a".into());
                args.push(req.alleles.join(",").into());
                args.push(req.input_file.clone().into());
                for flag in req.mode.flags() {
                    args.push((*flag).into());
                }
                push_threshold(&mut args, req.rank_threshold);
            }
            PredictionRequest::CustomMhc(req) => {
                args.push("-p".into());
                args.push("-hlaseq".into());
                args.push(req.mhc_sequence_file.clone().into());
                args.push("-hlaid".into());
                args.push(req.mhc_name.clone().into());
                args.push(req.input_file.clone().into());
                push_threshold(&mut args, req.rank_threshold);
            }
        }

        Ok(MaterializedRequest { args, staged_input })
    }
}

/// Stem used for the staged input when several FASTA files are combined.
const COMBINED_PROTEIN_STEM: &str = "combined_proteins";

/// Concrete argv for one invocation, plus any input staged on the way.
#[derive(Debug, Clone)]
pub struct MaterializedRequest {
    /// Arguments handed to the predictor, in order.
    pub args: Vec<OsString>,
    /// Combined FASTA written under the work directory, when the request
    /// had more than one input file.
    pub staged_input: Option<PathBuf>,
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{what} not found or not readable: {}",
            path.display()
        )))
    }
}

fn require_allele(allele: &str) -> Result<()> {
    let trimmed = allele.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("allele must not be empty".to_owned()));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c == ',') {
        return Err(Error::Validation(format!(
            "allele '{trimmed}' must not contain whitespace or commas"
        )));
    }
    // HLA names get a shape check; other species' nomenclature passes
    // through to the predictor untouched.
    if trimmed.starts_with("HLA-") && !get_hla_allele_re().is_match(trimmed) {
        return Err(Error::Validation(format!(
            "allele '{trimmed}' is not a valid HLA class I name (expected e.g. HLA-A02:01)"
        )));
    }
    Ok(())
}

fn require_threshold(threshold: Option<f64>) -> Result<()> {
    match threshold {
        Some(t) if !t.is_finite() || t <= 0.0 => Err(Error::Validation(format!(
            "rank threshold must be a positive number, got {t}"
        ))),
        _ => Ok(()),
    }
}

/// Parses a comma-separated length list, enforcing the predictor's
/// supported 8..=14 range.
///
/// # Errors
///
/// Returns [`Error::Validation`] for empty lists, non-numeric entries, and
/// out-of-range lengths.
pub fn parse_lengths(lengths: &str) -> Result<Vec<usize>> {
    let mut parsed = Vec::new();
    for part in lengths.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let value: usize = part.parse().map_err(|_| {
            Error::Validation(format!("peptide length '{part}' is not a number"))
        })?;
        if !(MIN_PEPTIDE_LEN..=MAX_PEPTIDE_LEN).contains(&value) {
            return Err(Error::Validation(format!(
                "peptide length {value} outside supported range {MIN_PEPTIDE_LEN}-{MAX_PEPTIDE_LEN}"
            )));
        }
        parsed.push(value);
    }
    if parsed.is_empty() {
        return Err(Error::Validation(format!(
            "no peptide lengths given in '{lengths}'"
        )));
    }
    Ok(parsed)
}

fn push_threshold(args: &mut Vec<OsString>, threshold: Option<f64>) {
    if let Some(t) = threshold {
        args.push("-t".into());
        args.push(t.to_string().into());
    }
}

fn combine_fasta(inputs: &[PathBuf], work_dir: &Path) -> Result<PathBuf> {
    let mut combined = String::new();
    for input in inputs {
        let content = std::fs::read_to_string(input)?;
        combined.push_str(&content);
        if !combined.ends_with('\n') {
            combined.push('\n');
        }
    }
    let staged = work_dir.join(format!("{COMBINED_PROTEIN_STEM}.fsa"));
    std::fs::write(&staged, combined)?;
    Ok(staged)
}

/// Installation paths and environment handed to every invocation.
#[derive(Debug, Clone)]
pub struct ToolEnv {
    home: PathBuf,
    tmp_dir: PathBuf,
}

impl ToolEnv {
    /// Resolves the predictor installation from configuration.
    ///
    /// Only the configuration is checked here. Whether the launcher script
    /// actually exists is a run-time question: the job manager reports a
    /// missing binary as a launch failure on the job, while foreground
    /// callers check eagerly via [`ToolEnv::ensure_launcher`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when no home is configured.
    pub fn from_config(config: &NetMhcPanConfig) -> Result<Self> {
        let home = config.resolved_home().ok_or_else(|| {
            Error::Validation(format!(
                "netMHCpan home is not configured; set [netmhcpan].home or {ENV_NMHOME}"
            ))
        })?;
        Ok(Self {
            home,
            tmp_dir: config.resolved_tmp_dir(),
        })
    }

    /// Checks that the launcher script exists inside the installation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the missing path.
    pub fn ensure_launcher(&self) -> Result<()> {
        let launcher = self.tool_path();
        if launcher.is_file() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "netMHCpan launcher not found at {}",
                launcher.display()
            )))
        }
    }

    /// Path of the launcher script inside the installation.
    #[must_use]
    pub fn tool_path(&self) -> PathBuf {
        self.home.join("netMHCpan")
    }

    /// Environment overlay the predictor requires.
    #[must_use]
    pub fn overlay(&self) -> Vec<(String, String)> {
        vec![
            (
                ENV_NMHOME.to_owned(),
                self.home.to_string_lossy().into_owned(),
            ),
            (
                ENV_TMPDIR.to_owned(),
                self.tmp_dir.to_string_lossy().into_owned(),
            ),
        ]
    }
}

/// Report and statistics from one foreground prediction run.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    /// Where the captured report was written.
    pub output_file: PathBuf,
    /// Structured view of the report.
    #[serde(flatten)]
    pub parsed: ParsedOutput,
    /// Wall-clock seconds the predictor ran for.
    pub duration_secs: f64,
}

/// Runs predictions in the foreground, blocking the caller until the
/// report is captured and parsed. The job manager is the asynchronous
/// counterpart for long runs.
#[derive(Debug, Clone)]
pub struct Predictor {
    env: ToolEnv,
    parser: OutputParser,
    timeout: Duration,
    kill_grace: Duration,
}

impl Predictor {
    /// Builds a predictor from configuration.
    ///
    /// # Errors
    ///
    /// Fails when the installation cannot be resolved (see
    /// [`ToolEnv::from_config`]).
    pub fn from_config(config: &Config) -> Result<Self> {
        let section = &config.netmhcpan;
        let env = ToolEnv::from_config(section)?;
        env.ensure_launcher()?;
        Ok(Self {
            env,
            parser: OutputParser::new(section.rank_strong, section.rank_weak),
            timeout: Duration::from_secs(section.job_timeout_secs),
            kill_grace: Duration::from_secs(section.kill_grace_secs),
        })
    }

    /// The installation this predictor invokes.
    #[must_use]
    pub fn env(&self) -> &ToolEnv {
        &self.env
    }

    /// Validates and runs one request, writing the captured report next to
    /// the input (or to the request's explicit output path).
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for bad requests, [`Error::Run`] for launch
    /// and timeout failures, [`Error::Tool`] for nonzero predictor exits,
    /// and IO errors when the report cannot be written.
    pub async fn run(&self, request: &PredictionRequest) -> Result<PredictionReport> {
        request.validate()?;

        // Staged inputs for foreground runs live in a scratch directory
        // that disappears once the run is over. The captured report does
        // not: it is written to the resolved output path below.
        let scratch = tempfile::tempdir()?;
        let materialized = request.materialize(scratch.path())?;

        let spec = RunSpec {
            program: self.env.tool_path(),
            args: materialized.args,
            env: self.env.overlay(),
            cwd: None,
            timeout: self.timeout,
            kill_grace: self.kill_grace,
        };
        info!(
            operation = request.operation(),
            program = %spec.program.display(),
            "running prediction"
        );
        let run = run_captured(&spec).await?;
        if run.exit_code != 0 {
            return Err(Error::Tool {
                exit_code: run.exit_code,
                stderr: run.stderr.trim().to_owned(),
            });
        }

        let output_file = match request.output_override() {
            Some(path) => path.to_path_buf(),
            None => request.input_parent().join(request.derived_output_name()),
        };
        if let Some(parent) = output_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&output_file, &run.stdout)?;

        let parsed = self.parser.parse(&run.stdout);
        info!(
            operation = request.operation(),
            strong = parsed.summary.strong_binders,
            weak = parsed.summary.weak_binders,
            total = parsed.summary.total_records,
            "prediction finished"
        );
        Ok(PredictionReport {
            output_file,
            parsed,
            duration_secs: run.duration.as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn peptide_argv_matches_tool_contract() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "test.pep", "SIINFEKL\n");
        let request = PredictionRequest::Peptide(PeptideRequest {
            input_file: input.clone(),
            allele: "HLA-A02:01".to_owned(),
            rank_threshold: None,
            output_file: None,
        });
        request.validate().unwrap();
        let materialized = request.materialize(dir.path()).unwrap();
        let mut expected = os(&["-p", "-a", "HLA-A02:01"]);
        expected.push(input.into());
        assert_eq!(materialized.args, expected);
        assert!(materialized.staged_input.is_none());
        assert_eq!(request.derived_output_name(), "test_predictions.txt");
    }

    #[test]
    fn peptide_threshold_trails_the_input() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "test.pep", "SIINFEKL\n");
        let request = PredictionRequest::Peptide(PeptideRequest {
            input_file: input.clone(),
            allele: "HLA-A02:01".to_owned(),
            rank_threshold: Some(2.0),
            output_file: None,
        });
        let materialized = request.materialize(dir.path()).unwrap();
        let mut expected = os(&["-p", "-a", "HLA-A02:01"]);
        expected.push(input.into());
        expected.extend(os(&["-t", "2"]));
        assert_eq!(materialized.args, expected);
    }

    #[test]
    fn protein_argv_and_output_name() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "spike.fsa", ">spike\nMKV\n");
        let request = PredictionRequest::Protein(ProteinRequest {
            input_files: vec![input.clone()],
            allele: "HLA-A02:01".to_owned(),
            lengths: "8,9,10".to_owned(),
            rank_threshold: None,
            sort_output: true,
            output_file: None,
        });
        request.validate().unwrap();
        let materialized = request.materialize(dir.path()).unwrap();
        let mut expected = os(&["-f"]);
        expected.push(input.into());
        expected.extend(os(&["-a", "HLA-A02:01", "-l", "8,9,10", "-s"]));
        assert_eq!(materialized.args, expected);
        assert_eq!(
            request.derived_output_name(),
            "spike_protein_pred_8_9_10mer.txt"
        );
    }

    #[test]
    fn multiple_proteins_are_combined() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.fsa", ">a\nMKV");
        let b = touch(dir.path(), "b.fsa", ">b\nGIL\n");
        let work = TempDir::new().unwrap();
        let request = PredictionRequest::Protein(ProteinRequest {
            input_files: vec![a, b],
            allele: "HLA-A02:01".to_owned(),
            lengths: "9".to_owned(),
            rank_threshold: None,
            sort_output: false,
            output_file: None,
        });
        let materialized = request.materialize(work.path()).unwrap();
        let staged = materialized.staged_input.unwrap();
        assert_eq!(staged, work.path().join("combined_proteins.fsa"));
        let content = std::fs::read_to_string(&staged).unwrap();
        assert_eq!(content, ">a\nMKV\n>b\nGIL\n");
        assert_eq!(
            request.derived_output_name(),
            "combined_proteins_protein_pred_9mer.txt"
        );
        // argv points at the staged file
        assert_eq!(materialized.args[1], OsString::from(staged));
    }

    #[test]
    fn affinity_argv_joins_alleles_and_appends_mode() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "test.pep", "SIINFEKL\n");
        let request = PredictionRequest::Affinity(AffinityRequest {
            input_file: input.clone(),
            alleles: vec!["HLA-A02:01".to_owned(), "HLA-B07:02".to_owned()],
            mode: PredictionMode::Both,
            rank_threshold: Some(0.5),
            chunk_size: None,
            output_file: None,
        });
        request.validate().unwrap();
        let materialized = request.materialize(dir.path()).unwrap();
        let mut expected = os(&["-p", "-a", "HLA-A02:01,HLA-B07:02"]);
        expected.push(input.into());
        expected.extend(os(&["-BA", "-EL", "-t", "0.5"]));
        assert_eq!(materialized.args, expected);
        assert_eq!(request.derived_output_name(), "test_binding_both.txt");
    }

    #[test]
    fn affinity_modes_map_to_flags() {
        assert_eq!(PredictionMode::Both.flags(), &["-BA", "-EL"]);
        assert_eq!(PredictionMode::Ba.flags(), &["-BA"]);
        assert_eq!(PredictionMode::El.flags(), &["-EL"]);
        assert_eq!("BA".parse::<PredictionMode>().unwrap(), PredictionMode::Ba);
        assert!("nope".parse::<PredictionMode>().is_err());
    }

    #[test]
    fn custom_mhc_argv() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "test.pep", "SIINFEKL\n");
        let mhc = touch(dir.path(), "custom.fsa", ">custom\nMAV\n");
        let request = PredictionRequest::CustomMhc(CustomMhcRequest {
            input_file: input.clone(),
            mhc_sequence_file: mhc.clone(),
            mhc_name: "MyMHC".to_owned(),
            rank_threshold: None,
            output_file: None,
        });
        request.validate().unwrap();
        let materialized = request.materialize(dir.path()).unwrap();
        let mut expected = os(&["-p", "-hlaseq"]);
        expected.push(mhc.into());
        expected.extend(os(&["-hlaid", "MyMHC"]));
        expected.push(input.into());
        assert_eq!(materialized.args, expected);
        assert_eq!(request.derived_output_name(), "test_custom_mhc_pred.txt");
    }

    #[test]
    fn missing_input_fails_validation() {
        let request = PredictionRequest::Peptide(PeptideRequest {
            input_file: PathBuf::from("/definitely/not/here.pep"),
            allele: "HLA-A02:01".to_owned(),
            rank_threshold: None,
            output_file: None,
        });
        let err = request.validate().unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn bad_hla_name_fails_validation() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "test.pep", "SIINFEKL\n");
        let request = PredictionRequest::Peptide(PeptideRequest {
            input_file: input,
            allele: "HLA-A2:1".to_owned(),
            rank_threshold: None,
            output_file: None,
        });
        assert_eq!(request.validate().unwrap_err().kind(), "validation");
    }

    #[test]
    fn non_hla_names_pass_through() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "test.pep", "SIINFEKL\n");
        let request = PredictionRequest::Peptide(PeptideRequest {
            input_file: input,
            allele: "H-2-Kb".to_owned(),
            rank_threshold: None,
            output_file: None,
        });
        request.validate().unwrap();
    }

    #[test]
    fn lengths_are_range_checked() {
        assert_eq!(parse_lengths("8,9,10").unwrap(), vec![8, 9, 10]);
        assert_eq!(parse_lengths(" 9 ").unwrap(), vec![9]);
        assert!(parse_lengths("7").is_err());
        assert!(parse_lengths("15").is_err());
        assert!(parse_lengths("abc").is_err());
        assert!(parse_lengths("").is_err());
    }

    #[test]
    fn negative_threshold_rejected() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "test.pep", "SIINFEKL\n");
        let request = PredictionRequest::Peptide(PeptideRequest {
            input_file: input,
            allele: "HLA-A02:01".to_owned(),
            rank_threshold: Some(-1.0),
            output_file: None,
        });
        assert_eq!(request.validate().unwrap_err().kind(), "validation");
    }

    #[test]
    fn request_roundtrips_with_operation_tag() {
        let request = PredictionRequest::Affinity(AffinityRequest {
            input_file: PathBuf::from("test.pep"),
            alleles: vec!["HLA-A02:01".to_owned()],
            mode: PredictionMode::El,
            rank_threshold: None,
            chunk_size: Some(1000),
            output_file: None,
        });
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["operation"], "affinity");
        assert_eq!(json["mode"], "el");
        let back: PredictionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.operation(), "affinity");
    }

    #[cfg(unix)]
    mod with_stub_tool {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Writes an executable stub that prints a canned report.
        fn stub_home(dir: &Path, script_body: &str) -> PathBuf {
            let home = dir.join("netMHCpan-4.2");
            std::fs::create_dir_all(&home).unwrap();
            let launcher = home.join("netMHCpan");
            std::fs::write(&launcher, script_body).unwrap();
            let mut perms = std::fs::metadata(&launcher).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&launcher, perms).unwrap();
            home
        }

        fn config_with_home(home: PathBuf) -> Config {
            let mut config = Config::default();
            config.netmhcpan.home = Some(home);
            config
        }

        const REPORT: &str = "\
 Pos          MHC         Peptide       Core Of Gp Gl Ip Il        Icore        Identity  Score_EL %Rank_EL BindLevel
   1  HLA-A*02:01       GILGFVFTL  GILGFVFTL  0  0  0  0  0    GILGFVFTL         PEPLIST 0.8536690    0.136 <= SB
";

        #[tokio::test]
        async fn foreground_run_writes_report_next_to_input() {
            let dir = TempDir::new().unwrap();
            let home = stub_home(
                dir.path(),
                &format!("#!/bin/sh\ncat <<'EOF'\n{REPORT}EOF\n"),
            );
            let input = touch(dir.path(), "test.pep", "GILGFVFTL\n");

            let predictor = Predictor::from_config(&config_with_home(home)).unwrap();
            let request = PredictionRequest::Peptide(PeptideRequest {
                input_file: input,
                allele: "HLA-A02:01".to_owned(),
                rank_threshold: None,
                output_file: None,
            });
            let report = predictor.run(&request).await.unwrap();
            assert_eq!(report.output_file, dir.path().join("test_predictions.txt"));
            assert!(report.output_file.is_file());
            assert_eq!(report.parsed.summary.strong_binders, 1);
        }

        #[tokio::test]
        async fn nonzero_exit_surfaces_stderr() {
            let dir = TempDir::new().unwrap();
            let home = stub_home(dir.path(), "#!/bin/sh\necho 'bad allele' >&2\nexit 2\n");
            let input = touch(dir.path(), "test.pep", "GILGFVFTL\n");

            let predictor = Predictor::from_config(&config_with_home(home)).unwrap();
            let request = PredictionRequest::Peptide(PeptideRequest {
                input_file: input,
                allele: "HLA-A02:01".to_owned(),
                rank_threshold: None,
                output_file: None,
            });
            let err = predictor.run(&request).await.unwrap_err();
            match err {
                Error::Tool { exit_code, stderr } => {
                    assert_eq!(exit_code, 2);
                    assert_eq!(stderr, "bad allele");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn missing_launcher_is_validation_error() {
            let config = config_with_home(PathBuf::from("/no/such/install"));
            let err = Predictor::from_config(&config).unwrap_err();
            assert_eq!(err.kind(), "validation");
            assert!(err.to_string().contains("launcher not found"));
        }
    }
}
