use crate::cli::{Cli, Commands, JobsCommands};
use crate::config::Config;
use crate::export::ExportRequest;
use crate::predict::{
    AffinityRequest, CustomMhcRequest, PeptideRequest, PredictionMode, PredictionRequest,
    ProteinRequest,
};
use anyhow::Result;
use clap::Parser;
use std::path::Path;

fn missing_path(path: &Path) -> bool {
    if path.exists() {
        false
    } else {
        eprintln!(
            "Error: The file or directory '{}' does not exist.",
            path.display()
        );
        true
    }
}

/// Runs the predictor wrapper with the given arguments.
///
/// # Errors
///
/// Returns an error if argument parsing fails, or if the command execution fails.
pub fn run_with_args(args: Vec<String>) -> Result<i32> {
    run_with_args_to(args, &mut std::io::stdout())
}

/// Run the predictor wrapper with the given arguments, writing output to the
/// specified writer.
///
/// This is the testable version of `run_with_args` that allows output capture.
///
/// # Errors
///
/// Returns an error if argument parsing fails, or if the command execution fails.
#[allow(clippy::too_many_lines)]
pub fn run_with_args_to<W: std::io::Write>(args: Vec<String>, writer: &mut W) -> Result<i32> {
    let mut program_args = vec!["netmhcpan".to_owned()];
    program_args.extend(args);
    let cli = match Cli::try_parse_from(program_args) {
        Ok(c) => c,
        Err(e) => {
            match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    // Let clap print help/version as intended, but captured by redirect
                    write!(writer, "{e}")?;
                    writer.flush()?;
                    return Ok(0);
                }
                _ => {
                    eprint!("{e}");
                    return Ok(1);
                }
            }
        }
    };

    let config = match &cli.config {
        Some(path) => match Config::load_file(path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("Error: {error}");
                return Ok(1);
            }
        },
        None => Config::load(),
    };
    let defaults = &config.netmhcpan;

    let code = match cli.command {
        Commands::Peptide {
            input,
            allele,
            report,
        } => {
            if missing_path(&input) {
                return Ok(1);
            }
            let request = PredictionRequest::Peptide(PeptideRequest {
                input_file: input,
                allele: allele.unwrap_or_else(|| defaults.default_allele.clone()),
                rank_threshold: report.rank_threshold,
                output_file: report.output_file,
            });
            crate::commands::run_prediction(&config, &request, cli.json, writer)?
        }
        Commands::Protein {
            inputs,
            allele,
            lengths,
            sort,
            report,
        } => {
            for input in &inputs {
                if missing_path(input) {
                    return Ok(1);
                }
            }
            let request = PredictionRequest::Protein(ProteinRequest {
                input_files: inputs,
                allele: allele.unwrap_or_else(|| defaults.default_allele.clone()),
                lengths: lengths.unwrap_or_else(|| defaults.default_lengths.clone()),
                rank_threshold: report.rank_threshold,
                sort_output: sort,
                output_file: report.output_file,
            });
            crate::commands::run_prediction(&config, &request, cli.json, writer)?
        }
        Commands::Affinity {
            input,
            alleles,
            mode,
            report,
        } => {
            if missing_path(&input) {
                return Ok(1);
            }
            let mode = match mode.as_deref() {
                Some(text) => match text.parse::<PredictionMode>() {
                    Ok(mode) => mode,
                    Err(error) => {
                        eprintln!("Error: {error}");
                        return Ok(1);
                    }
                },
                None => PredictionMode::default(),
            };
            let request = PredictionRequest::Affinity(AffinityRequest {
                input_file: input,
                alleles,
                mode,
                rank_threshold: report.rank_threshold,
                chunk_size: None,
                output_file: report.output_file,
            });
            crate::commands::run_prediction(&config, &request, cli.json, writer)?
        }
        Commands::CustomMhc {
            input,
            mhc_sequence,
            mhc_name,
            report,
        } => {
            if missing_path(&input) || missing_path(&mhc_sequence) {
                return Ok(1);
            }
            let request = PredictionRequest::CustomMhc(CustomMhcRequest {
                input_file: input,
                mhc_sequence_file: mhc_sequence,
                mhc_name,
                rank_threshold: report.rank_threshold,
                output_file: report.output_file,
            });
            crate::commands::run_prediction(&config, &request, cli.json, writer)?
        }
        Commands::Export {
            input,
            alleles,
            rank_threshold,
            output_file,
            excel_file,
        } => {
            if missing_path(&input) {
                return Ok(1);
            }
            let request = ExportRequest {
                input_file: input,
                alleles,
                rank_threshold,
                output_file,
                excel_file,
            };
            crate::commands::run_export(&config, &request, cli.json, writer)?
        }
        Commands::Analyze {
            output_file,
            rank_threshold,
        } => {
            if missing_path(&output_file) {
                return Ok(1);
            }
            crate::commands::run_analyze(&config, &output_file, rank_threshold, cli.json, writer)?
        }
        Commands::Jobs { command } => match command {
            JobsCommands::List {
                state,
                oldest_first,
            } => crate::commands::run_jobs_list(
                &config,
                state.as_deref(),
                oldest_first,
                cli.json,
                writer,
            )?,
            JobsCommands::Status { job_id } => {
                crate::commands::run_job_status(&config, &job_id, cli.json, writer)?
            }
            JobsCommands::Log { job_id, tail } => {
                crate::commands::run_job_log(&config, &job_id, tail, cli.json, writer)?
            }
        },
        Commands::McpServer => {
            // MCP server is handled in netmhcpan-cli main.rs before calling entry_point
            // This should never be reached, but we need the match arm for exhaustiveness
            eprintln!("Error: mcp-server command should be handled by netmhcpan-cli directly.");
            eprintln!("If you're seeing this, please use the netmhcpan-cli binary.");
            1
        }
    };
    Ok(code)
}
