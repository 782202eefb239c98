//! MCP tool implementations for the NetMHCpan wrapper.
//!
//! This module defines the tools that are exposed via MCP, allowing LLMs
//! to run MHC class I binding predictions and manage long-running jobs.

use netmhcpan::config::Config;
use netmhcpan::constants::{EXAMPLE_ALLELES, MAX_PEPTIDE_LEN, MIN_PEPTIDE_LEN, NETMHCPAN_VERSION};
use netmhcpan::error::Error;
use netmhcpan::export::{run_export, ExportRequest};
use netmhcpan::jobs::{JobManager, JobState, JobSummary, SortOrder};
use netmhcpan::parser::OutputParser;
use netmhcpan::predict::{
    AffinityRequest, CustomMhcRequest, PeptideRequest, PredictionMode, PredictionRequest,
    Predictor, ProteinRequest,
};
use rmcp::{
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_router, ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use std::path::PathBuf;
use std::sync::Arc;

/// Request parameters for tools addressing one job.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct JobIdRequest {
    /// Identifier returned at submission.
    #[schemars(description = "Job identifier returned at submission")]
    pub job_id: String,
}

/// Request parameters for the `get_job_log` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct JobLogRequest {
    /// Identifier returned at submission.
    #[schemars(description = "Job identifier returned at submission")]
    pub job_id: String,
    /// Number of trailing log lines to return (default: 50).
    #[schemars(description = "Number of trailing log lines to return")]
    #[serde(default = "default_tail")]
    pub tail: usize,
}

fn default_tail() -> usize {
    50
}

/// Request parameters for the `list_jobs` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct ListJobsRequest {
    /// Optional state filter (pending, running, completed, failed, cancelled).
    #[schemars(description = "Filter by state: pending, running, completed, failed, or cancelled")]
    #[serde(default)]
    pub state: Option<String>,
}

/// Request parameters for the `predict_peptide_binding` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct PredictPeptideRequest {
    /// Path to the peptide-list file.
    #[schemars(description = "Path to file with peptides, one per line")]
    pub input_file: String,
    /// HLA allele to score against.
    #[schemars(description = "HLA allele, e.g. HLA-A02:01 (defaults to the configured allele)")]
    #[serde(default)]
    pub allele: Option<String>,
    /// Optional %Rank display cutoff.
    #[schemars(description = "Optional rank threshold for filtering (e.g., 2.0 for weak binders)")]
    #[serde(default)]
    pub rank_threshold: Option<f64>,
    /// Optional path for the raw report.
    #[schemars(description = "Optional path to save the raw predictor output")]
    #[serde(default)]
    pub output_file: Option<String>,
}

/// Request parameters for the `predict_protein_epitopes` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct PredictProteinRequest {
    /// Path to the FASTA file.
    #[schemars(description = "Path to FASTA file with protein sequence(s)")]
    pub input_file: String,
    /// Comma-separated peptide lengths to scan.
    #[schemars(description = "Comma-separated lengths to scan, e.g. \"8,9,10\" (defaults to the configured lengths)")]
    #[serde(default)]
    pub peptide_lengths: Option<String>,
    /// HLA allele to score against.
    #[schemars(description = "HLA allele, e.g. HLA-A02:01 (defaults to the configured allele)")]
    #[serde(default)]
    pub allele: Option<String>,
    /// Sort the report by descending prediction score.
    #[schemars(description = "Sort results by binding affinity")]
    #[serde(default)]
    pub sort_output: bool,
    /// Optional %Rank display cutoff.
    #[schemars(description = "Optional rank threshold for filtering")]
    #[serde(default)]
    pub rank_threshold: Option<f64>,
    /// Optional path for the raw report.
    #[schemars(description = "Optional path to save the raw predictor output")]
    #[serde(default)]
    pub output_file: Option<String>,
}

/// Request parameters for the `predict_binding_affinity` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct PredictAffinityRequest {
    /// Path to the peptide-list file.
    #[schemars(description = "Path to file with peptides, one per line")]
    pub input_file: String,
    /// Alleles to score in one run.
    #[schemars(description = "HLA alleles to score against (defaults to the configured allele)")]
    #[serde(default)]
    pub alleles: Vec<String>,
    /// Score selection: "EL", "BA", or "both".
    #[schemars(description = "Prediction type: \"EL\" (elution), \"BA\" (binding), or \"both\"")]
    #[serde(default)]
    pub prediction_mode: Option<String>,
    /// Optional %Rank display cutoff.
    #[schemars(description = "Optional rank threshold for filtering")]
    #[serde(default)]
    pub rank_threshold: Option<f64>,
    /// Optional path for the raw report.
    #[schemars(description = "Optional path to save the raw predictor output")]
    #[serde(default)]
    pub output_file: Option<String>,
}

/// Request parameters for the `predict_custom_mhc_binding` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct PredictCustomMhcRequest {
    /// Path to the peptide-list file.
    #[schemars(description = "Path to file with peptides, one per line")]
    pub input_file: String,
    /// Path to the FASTA file with the MHC molecule sequence.
    #[schemars(description = "Path to FASTA file with the MHC sequence")]
    pub mhc_sequence_file: String,
    /// Identifier for the molecule in the report (default: `CUSTOM_MHC`).
    #[schemars(description = "Identifier for the custom MHC")]
    #[serde(default = "default_mhc_name")]
    pub mhc_name: String,
    /// Optional %Rank display cutoff.
    #[schemars(description = "Optional rank threshold for filtering")]
    #[serde(default)]
    pub rank_threshold: Option<f64>,
    /// Optional path for the raw report.
    #[schemars(description = "Optional path to save the raw predictor output")]
    #[serde(default)]
    pub output_file: Option<String>,
}

fn default_mhc_name() -> String {
    "CUSTOM_MHC".to_owned()
}

/// Request parameters for the `export_predictions` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct ExportPredictionsRequest {
    /// Path to the peptide-list file.
    #[schemars(description = "Path to file with peptides, one per line")]
    pub input_file: String,
    /// Alleles to compare.
    #[schemars(description = "HLA alleles to compare, e.g. [\"HLA-A02:01\", \"HLA-B07:02\"]")]
    pub alleles: Vec<String>,
    /// Optional %Rank display cutoff.
    #[schemars(description = "Optional rank threshold for filtering")]
    #[serde(default)]
    pub rank_threshold: Option<f64>,
    /// Optional path for the text summary.
    #[schemars(description = "Optional path for the text summary (auto-generated if not provided)")]
    #[serde(default)]
    pub output_file: Option<String>,
    /// Optional path for the tab-delimited table.
    #[schemars(description = "Optional path for the tab-delimited table (auto-generated if not provided)")]
    #[serde(default)]
    pub excel_file: Option<String>,
}

/// Request parameters for the `submit_batch_protein_analysis` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct BatchProteinRequest {
    /// FASTA files to analyze in one job.
    #[schemars(description = "List of FASTA file paths to analyze")]
    pub input_files: Vec<String>,
    /// Comma-separated peptide lengths to scan.
    #[schemars(description = "Comma-separated peptide lengths, e.g. \"8,9,10\" (defaults to the configured lengths)")]
    #[serde(default)]
    pub peptide_lengths: Option<String>,
    /// HLA allele for all predictions.
    #[schemars(description = "HLA allele for all predictions (defaults to the configured allele)")]
    #[serde(default)]
    pub allele: Option<String>,
    /// Optional name for tracking.
    #[schemars(description = "Optional name for tracking")]
    #[serde(default)]
    pub job_name: Option<String>,
}

/// Request parameters for the `submit_multi_allele_screening` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct MultiAlleleScreeningRequest {
    /// Path to the peptide-list file.
    #[schemars(description = "Path to file with peptides, one per line")]
    pub input_file: String,
    /// Alleles to screen against in one run.
    #[schemars(description = "List of HLA alleles to screen against")]
    pub alleles: Vec<String>,
    /// Score selection: "EL", "BA", or "both".
    #[schemars(description = "Prediction type: \"EL\", \"BA\", or \"both\"")]
    #[serde(default)]
    pub prediction_mode: Option<String>,
    /// Optional name for tracking.
    #[schemars(description = "Optional name for tracking")]
    #[serde(default)]
    pub job_name: Option<String>,
}

/// Request parameters for the `submit_large_peptide_screening` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct LargeScreeningRequest {
    /// Path to the peptide-list file.
    #[schemars(description = "Path to large peptide file")]
    pub input_file: String,
    /// HLA allele for predictions.
    #[schemars(description = "HLA allele for predictions (defaults to the configured allele)")]
    #[serde(default)]
    pub allele: Option<String>,
    /// Score selection: "EL", "BA", or "both".
    #[schemars(description = "Prediction type: \"EL\", \"BA\", or \"both\"")]
    #[serde(default)]
    pub prediction_mode: Option<String>,
    /// Advisory batch size recorded with the job (default: 1000).
    #[schemars(description = "Number of peptides per processing chunk")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Optional name for tracking.
    #[schemars(description = "Optional name for tracking")]
    #[serde(default)]
    pub job_name: Option<String>,
}

fn default_chunk_size() -> usize {
    1000
}

/// Request parameters for the `analyze_prediction_output` tool.
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct AnalyzeOutputRequest {
    /// Path to an existing predictor report.
    #[schemars(description = "Path to NetMHCpan output file")]
    pub netmhcpan_output_file: String,
    /// %Rank threshold for weak-binder classification (default: 2.0).
    #[schemars(description = "Rank threshold for weak binder classification")]
    #[serde(default = "default_weak_threshold")]
    pub rank_threshold: f64,
}

fn default_weak_threshold() -> f64 {
    2.0
}

/// The main MCP server struct for the NetMHCpan wrapper.
#[derive(Debug, Clone)]
pub struct NetMhcPanServer {
    #[allow(dead_code)]
    tool_router: ToolRouter<Self>,
    config: Config,
    manager: Arc<JobManager>,
}

impl NetMhcPanServer {
    /// Creates a server over the given configuration, opening the job store
    /// under the configured root.
    ///
    /// # Errors
    ///
    /// Fails when the job store cannot be opened.
    pub fn new(config: Config) -> netmhcpan::error::Result<Self> {
        let manager = JobManager::open(config.netmhcpan.clone())?;
        Ok(Self {
            tool_router: Self::tool_router(),
            config,
            manager,
        })
    }

    fn allele_or_default(&self, allele: Option<String>) -> String {
        allele.unwrap_or_else(|| self.config.netmhcpan.default_allele.clone())
    }

    fn lengths_or_default(&self, lengths: Option<String>) -> String {
        lengths.unwrap_or_else(|| self.config.netmhcpan.default_lengths.clone())
    }

    fn alleles_or_default(&self, alleles: Vec<String>) -> Vec<String> {
        if alleles.is_empty() {
            vec![self.config.netmhcpan.default_allele.clone()]
        } else {
            alleles
        }
    }

    async fn run_foreground(&self, request: &PredictionRequest) -> CallToolResult {
        let predictor = match Predictor::from_config(&self.config) {
            Ok(predictor) => predictor,
            Err(error) => return error_result(&error),
        };
        match predictor.run(request).await {
            Ok(report) => success_json(&report),
            Err(error) => error_result(&error),
        }
    }

    fn submit(&self, request: PredictionRequest, name: String) -> CallToolResult {
        match self.manager.submit(request, Some(name)) {
            Ok(record) => success_json(&JobSummary::from(&record)),
            Err(error) => error_result(&error),
        }
    }
}

fn error_result(error: &Error) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!(
        "[{}] {error}",
        error.kind()
    ))])
}

fn success_json<T: serde::Serialize>(payload: &T) -> CallToolResult {
    let json = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|e| format!(r#"{{"error": "Serialization error: {e}"}}"#));
    CallToolResult::success(vec![Content::text(json)])
}

fn parse_mode(text: Option<&str>) -> Result<PredictionMode, Error> {
    match text {
        Some(text) => text.parse(),
        None => Ok(PredictionMode::default()),
    }
}

#[tool_router]
#[allow(clippy::unused_self, clippy::unnecessary_wraps)]
impl NetMhcPanServer {
    /// Report the state and timestamps of one job.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; unknown jobs produce a tool error result.
    #[tool(
        description = "Check the status of a submitted prediction job.\n\
        Returns the full job record: state (pending/running/completed/failed/cancelled),\n\
        timestamps, the original request, and failure details when failed."
    )]
    pub fn get_job_status(
        &self,
        params: Parameters<JobIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        match self.manager.status(&req.job_id) {
            Ok(record) => Ok(success_json(&record)),
            Err(error) => Ok(error_result(&error)),
        }
    }

    /// Fetch the structured result of a completed job.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; failures produce a tool error result.
    #[tool(
        description = "Fetch the parsed result of a completed prediction job.\n\
        Returns prediction records plus strong/weak binder counts. Errors with\n\
        not_ready while the job is still pending or running, and with job_failed\n\
        for failed or cancelled jobs."
    )]
    pub fn get_job_result(
        &self,
        params: Parameters<JobIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        match self.manager.result(&req.job_id) {
            Ok(parsed) => Ok(success_json(&parsed)),
            Err(error) => Ok(error_result(&error)),
        }
    }

    /// Tail the captured process log of a job.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; unknown jobs produce a tool error result.
    #[tool(
        description = "Read the tail of a job's captured process log.\n\
        Lines are prefixed [stdout]/[stderr] in arrival order. Useful for\n\
        watching progress of a running job or diagnosing a failed one."
    )]
    pub fn get_job_log(
        &self,
        params: Parameters<JobLogRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        match self.manager.log(&req.job_id, Some(req.tail)) {
            Ok(log) => {
                let payload = serde_json::json!({ "job_id": req.job_id, "log": log });
                Ok(success_json(&payload))
            }
            Err(error) => Ok(error_result(&error)),
        }
    }

    /// Cancel a pending or running job.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; unknown jobs produce a tool error result.
    #[tool(
        description = "Cancel a pending or running prediction job.\n\
        Idempotent: cancelling a job that already finished reports the existing\n\
        terminal state with cancelled=false instead of failing."
    )]
    pub fn cancel_job(&self, params: Parameters<JobIdRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        match self.manager.cancel(&req.job_id) {
            Ok(outcome) => Ok(success_json(&outcome)),
            Err(error) => Ok(error_result(&error)),
        }
    }

    /// List known jobs, newest first.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; a bad state filter produces a tool error result.
    #[tool(
        description = "List all prediction jobs, newest first.\n\
        Optionally filter by state: pending, running, completed, failed, cancelled."
    )]
    pub fn list_jobs(&self, params: Parameters<ListJobsRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let filter = match req.state.as_deref() {
            Some(text) => match text.parse::<JobState>() {
                Ok(state) => Some(state),
                Err(error) => return Ok(error_result(&error)),
            },
            None => None,
        };
        let jobs = self.manager.list(filter, SortOrder::NewestFirst);
        Ok(success_json(&jobs))
    }

    /// Predict binding of listed peptides against one allele.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; predictor failures produce a tool error result.
    #[tool(
        description = "Predict MHC Class I binding affinity for individual peptides.\n\
        Fast foreground operation for peptide lists. Returns prediction records,\n\
        strong/weak binder counts, and the path of the raw report."
    )]
    pub async fn predict_peptide_binding(
        &self,
        params: Parameters<PredictPeptideRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let request = PredictionRequest::Peptide(PeptideRequest {
            input_file: PathBuf::from(req.input_file),
            allele: self.allele_or_default(req.allele),
            rank_threshold: req.rank_threshold,
            output_file: req.output_file.map(PathBuf::from),
        });
        Ok(self.run_foreground(&request).await)
    }

    /// Scan a protein FASTA file for candidate epitopes.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; predictor failures produce a tool error result.
    #[tool(
        description = "Scan protein sequences for potential MHC binding epitopes.\n\
        Takes a FASTA file and generates peptides of the requested lengths.\n\
        Returns prediction records and binder statistics."
    )]
    pub async fn predict_protein_epitopes(
        &self,
        params: Parameters<PredictProteinRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let request = PredictionRequest::Protein(ProteinRequest {
            input_files: vec![PathBuf::from(req.input_file)],
            allele: self.allele_or_default(req.allele),
            lengths: self.lengths_or_default(req.peptide_lengths),
            rank_threshold: req.rank_threshold,
            sort_output: req.sort_output,
            output_file: req.output_file.map(PathBuf::from),
        });
        Ok(self.run_foreground(&request).await)
    }

    /// Score peptides with explicit score-type selection.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; predictor failures produce a tool error result.
    #[tool(
        description = "Enhanced binding prediction with Eluted Ligand and Binding Affinity scores.\n\
        Scores one or several alleles in a single run. prediction_mode selects\n\
        \"EL\" (elution likelihood), \"BA\" (binding affinity), or \"both\"."
    )]
    pub async fn predict_binding_affinity(
        &self,
        params: Parameters<PredictAffinityRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let mode = match parse_mode(req.prediction_mode.as_deref()) {
            Ok(mode) => mode,
            Err(error) => return Ok(error_result(&error)),
        };
        let request = PredictionRequest::Affinity(AffinityRequest {
            input_file: PathBuf::from(req.input_file),
            alleles: self.alleles_or_default(req.alleles),
            mode,
            rank_threshold: req.rank_threshold,
            chunk_size: None,
            output_file: req.output_file.map(PathBuf::from),
        });
        Ok(self.run_foreground(&request).await)
    }

    /// Score peptides against a custom MHC molecule.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; predictor failures produce a tool error result.
    #[tool(
        description = "Predict binding to custom or novel MHC allele sequences.\n\
        Takes the MHC molecule as a FASTA sequence instead of a known allele name.\n\
        For research and personalized-medicine applications."
    )]
    pub async fn predict_custom_mhc_binding(
        &self,
        params: Parameters<PredictCustomMhcRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let request = PredictionRequest::CustomMhc(CustomMhcRequest {
            input_file: PathBuf::from(req.input_file),
            mhc_sequence_file: PathBuf::from(req.mhc_sequence_file),
            mhc_name: req.mhc_name,
            rank_threshold: req.rank_threshold,
            output_file: req.output_file.map(PathBuf::from),
        });
        Ok(self.run_foreground(&request).await)
    }

    /// Compare alleles over one peptide set and write export files.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; predictor failures produce a tool error result.
    #[tool(
        description = "Export predictions for multiple alleles for comparison.\n\
        Runs one prediction over all alleles, then writes a text summary and a\n\
        tab-delimited table (opens in Excel). Returns the export paths and\n\
        per-allele binder statistics."
    )]
    pub async fn export_predictions(
        &self,
        params: Parameters<ExportPredictionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let predictor = match Predictor::from_config(&self.config) {
            Ok(predictor) => predictor,
            Err(error) => return Ok(error_result(&error)),
        };
        let request = ExportRequest {
            input_file: PathBuf::from(req.input_file),
            alleles: req.alleles,
            rank_threshold: req.rank_threshold,
            output_file: req.output_file.map(PathBuf::from),
            excel_file: req.excel_file.map(PathBuf::from),
        };
        match run_export(&predictor, &request).await {
            Ok(report) => Ok(success_json(&report)),
            Err(error) => Ok(error_result(&error)),
        }
    }

    /// Submit a batch protein scan as a background job.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; rejected submissions produce a tool error result.
    #[tool(
        description = "Submit batch protein epitope analysis for multiple FASTA files.\n\
        The files are combined into a single job. Returns a job summary with the\n\
        job_id; use get_job_status to monitor progress and get_job_result to fetch\n\
        the outcome."
    )]
    pub fn submit_batch_protein_analysis(
        &self,
        params: Parameters<BatchProteinRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let name = req
            .job_name
            .unwrap_or_else(|| format!("batch_protein_analysis_{}_files", req.input_files.len()));
        let request = PredictionRequest::Protein(ProteinRequest {
            input_files: req.input_files.into_iter().map(PathBuf::from).collect(),
            allele: self.allele_or_default(req.allele),
            lengths: self.lengths_or_default(req.peptide_lengths),
            rank_threshold: None,
            sort_output: false,
            output_file: None,
        });
        Ok(self.submit(request, name))
    }

    /// Submit a multi-allele screen as a background job.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; rejected submissions produce a tool error result.
    #[tool(
        description = "Submit multi-allele screening for comprehensive HLA coverage.\n\
        Screens the same peptides against multiple HLA alleles in one run. Use for\n\
        population coverage analysis and vaccine design. Returns a job summary with\n\
        the job_id for monitoring."
    )]
    pub fn submit_multi_allele_screening(
        &self,
        params: Parameters<MultiAlleleScreeningRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let mode = match parse_mode(req.prediction_mode.as_deref()) {
            Ok(mode) => mode,
            Err(error) => return Ok(error_result(&error)),
        };
        let name = req
            .job_name
            .unwrap_or_else(|| format!("multi_allele_screening_{}_alleles", req.alleles.len()));
        let request = PredictionRequest::Affinity(AffinityRequest {
            input_file: PathBuf::from(req.input_file),
            alleles: req.alleles,
            mode,
            rank_threshold: None,
            chunk_size: None,
            output_file: None,
        });
        Ok(self.submit(request, name))
    }

    /// Submit a large peptide screen as a background job.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; rejected submissions produce a tool error result.
    #[tool(
        description = "Submit large-scale peptide screening as a background job.\n\
        For proteome-wide screens and large peptide libraries that would block a\n\
        foreground call. chunk_size is recorded with the job as an advisory batch\n\
        size. Returns a job summary with the job_id for monitoring."
    )]
    pub fn submit_large_peptide_screening(
        &self,
        params: Parameters<LargeScreeningRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let mode = match parse_mode(req.prediction_mode.as_deref()) {
            Ok(mode) => mode,
            Err(error) => return Ok(error_result(&error)),
        };
        let name = req
            .job_name
            .unwrap_or_else(|| "large_peptide_screening".to_owned());
        let request = PredictionRequest::Affinity(AffinityRequest {
            input_file: PathBuf::from(req.input_file),
            alleles: vec![self.allele_or_default(req.allele)],
            mode,
            rank_threshold: None,
            chunk_size: Some(req.chunk_size),
            output_file: None,
        });
        Ok(self.submit(request, name))
    }

    /// Parse an existing report file and return binder statistics.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error; unreadable files produce a tool error result.
    #[tool(
        description = "Analyze a raw NetMHCpan output file and extract binding statistics.\n\
        Re-parses an existing report, classifying binders with the given weak-binder\n\
        rank threshold. Useful for post-processing predictions with different\n\
        thresholds without re-running the predictor."
    )]
    pub fn analyze_prediction_output(
        &self,
        params: Parameters<AnalyzeOutputRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let path = PathBuf::from(&req.netmhcpan_output_file);
        if !path.exists() {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Path does not exist: {}",
                req.netmhcpan_output_file
            ))]));
        }

        let parser = OutputParser::new(self.config.netmhcpan.rank_strong, req.rank_threshold);
        match parser.parse_file(&path) {
            Ok(parsed) => Ok(success_json(&parsed)),
            Err(error) => Ok(error_result(&Error::Io(error))),
        }
    }

    /// Describe the server, the wrapped predictor, and the tool catalog.
    ///
    /// # Errors
    ///
    /// Never returns a protocol error.
    #[tool(
        description = "Get information about the NetMHCpan MCP server: versions, the\n\
        configured installation, supported peptide lengths, example alleles, and\n\
        the available tools grouped by kind."
    )]
    pub fn get_server_info(&self) -> Result<CallToolResult, McpError> {
        let section = &self.config.netmhcpan;
        let info = serde_json::json!({
            "server_name": "NetMHCpan-4.2 MCP Server",
            "version": env!("CARGO_PKG_VERSION"),
            "netmhcpan_version": NETMHCPAN_VERSION,
            "netmhcpan_home": section.resolved_home().map(|p| p.display().to_string()),
            "supported_peptide_lengths": (MIN_PEPTIDE_LEN..=MAX_PEPTIDE_LEN).collect::<Vec<_>>(),
            "default_allele": section.default_allele,
            "example_alleles": EXAMPLE_ALLELES,
            "tools": {
                "job_management": [
                    "get_job_status",
                    "get_job_result",
                    "get_job_log",
                    "cancel_job",
                    "list_jobs",
                ],
                "synchronous": [
                    "predict_peptide_binding",
                    "predict_protein_epitopes",
                    "predict_binding_affinity",
                    "predict_custom_mhc_binding",
                    "export_predictions",
                    "analyze_prediction_output",
                ],
                "batch_submit": [
                    "submit_batch_protein_analysis",
                    "submit_multi_allele_screening",
                    "submit_large_peptide_screening",
                ],
            },
            "example_usage": "Use predict_peptide_binding with input_file 'data/test.pep'",
        });
        Ok(success_json(&info))
    }
}

#[rmcp::tool_handler]
impl ServerHandler for NetMhcPanServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "NetMHCpan MCP server: MHC class I binding predictions via netMHCpan-4.2. \n\n\
                 🔍 TOOLS AVAILABLE:\n\
                 • predict_peptide_binding - score a peptide list against one allele\n\
                 • predict_protein_epitopes - scan FASTA proteins for epitopes\n\
                 • predict_binding_affinity - EL/BA scores, one or more alleles\n\
                 • predict_custom_mhc_binding - score against a custom MHC sequence\n\
                 • export_predictions - multi-allele comparison with summary + table files\n\
                 • submit_batch_protein_analysis / submit_multi_allele_screening /\n\
                   submit_large_peptide_screening - long-running background jobs\n\
                 • get_job_status / get_job_result / get_job_log / cancel_job / list_jobs\n\
                 • analyze_prediction_output - re-parse an existing report\n\
                 • get_server_info - versions, alleles, supported lengths\n\n\
                 📋 COMMON TASKS:\n\
                 • 'Will this peptide bind HLA-A02:01?' → predict_peptide_binding\n\
                 • 'Scan this protein for epitopes' → predict_protein_epitopes\n\
                 • 'Compare alleles over these peptides' → export_predictions\n\
                 • 'Screen a big library' → submit_large_peptide_screening, then poll\n\
                   get_job_status and fetch with get_job_result\n\n\
                 ⚠️ BINDER CLASSES: strong (%Rank < 0.5) > weak (%Rank < 2.0)"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub use rmcp::model::Content;
