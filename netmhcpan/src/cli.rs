use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Help text for configuration file options, shown at the bottom of --help.
const CONFIG_HELP: &str = "\
CONFIGURATION FILE (.netmhcpan.toml):
  Create this file in your project root (or any ancestor) to set defaults.

  [netmhcpan]
  # Tool location
  home = \"/opt/netMHCpan-4.2\"  # Install dir (falls back to $NMHOME)
  tmp_dir = \"/tmp\"             # Scratch dir exported to the tool as TMPDIR
                               # ($NETMHCPAN_TMPDIR overrides)

  # Async jobs
  job_root = \"jobs\"            # Directory holding per-job artifacts
  max_concurrency = 2          # Predictor processes allowed at once
  job_timeout_secs = 3600      # Wall-clock budget per run
  kill_grace_secs = 5          # Pause between graceful stop and hard kill

  # Binder classification
  rank_strong = 0.5            # %Rank below this counts as a strong binder
  rank_weak = 2.0              # %Rank below this counts as a weak binder

  # Request defaults
  default_allele = \"HLA-A02:01\"
  default_lengths = \"9\"        # Comma-separated peptide lengths
";

/// Threshold and report-location options shared by prediction subcommands.
#[derive(Args, Debug, Default, Clone)]
pub struct ReportArgs {
    /// %Rank display cutoff passed to the predictor as -t.
    #[arg(short = 't', long)]
    pub rank_threshold: Option<f64>,

    /// Write the raw report here instead of next to the input.
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,
}

/// Command line interface configuration using `clap`.
/// This struct defines the arguments and flags accepted by the program.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "netmhcpan - MHC class I binding predictions via netMHCpan-4.2, with multi-allele comparison and async jobs",
    long_about = None,
    after_help = CONFIG_HELP
)]
pub struct Cli {
    #[command(subcommand)]
    /// The subcommand to execute (e.g., peptide, protein, jobs).
    pub command: Commands,

    /// Output raw JSON instead of formatted tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of searching for
    /// .netmhcpan.toml in the working directory and its ancestors.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
/// Available subcommands for predictions, jobs, and server integration.
pub enum Commands {
    /// Score a peptide-list file against one allele
    Peptide {
        /// Peptide-list file, one sequence per line.
        input: PathBuf,

        /// Allele to score against (defaults to the configured allele).
        #[arg(short, long)]
        allele: Option<String>,

        /// Threshold and report-location options.
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Scan FASTA protein files for candidate epitopes
    Protein {
        /// FASTA files. More than one is combined into a single run.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Allele to score against (defaults to the configured allele).
        #[arg(short, long)]
        allele: Option<String>,

        /// Comma-separated peptide lengths, e.g. "8,9,10"
        /// (defaults to the configured lengths).
        #[arg(short, long)]
        lengths: Option<String>,

        /// Sort the report by descending prediction score.
        #[arg(short, long)]
        sort: bool,

        /// Threshold and report-location options.
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Score peptides with explicit score-type selection, one or more alleles
    Affinity {
        /// Peptide-list file, one sequence per line.
        input: PathBuf,

        /// Alleles to score against, comma-separated or repeated.
        #[arg(short, long, value_delimiter = ',', required = true)]
        alleles: Vec<String>,

        /// Score selection: both, ba, or el.
        #[arg(short, long)]
        mode: Option<String>,

        /// Threshold and report-location options.
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Score peptides against a custom MHC molecule given as a FASTA sequence
    #[command(name = "custom-mhc")]
    CustomMhc {
        /// Peptide-list file, one sequence per line.
        input: PathBuf,

        /// FASTA file holding the MHC molecule sequence.
        #[arg(long, value_name = "FILE")]
        mhc_sequence: PathBuf,

        /// Identifier for the molecule in the report.
        #[arg(long, value_name = "NAME")]
        mhc_name: String,

        /// Threshold and report-location options.
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Compare alleles over one peptide set and export summary + table files
    Export {
        /// Peptide-list file, one sequence per line.
        input: PathBuf,

        /// Alleles to compare, comma-separated or repeated.
        #[arg(short, long, value_delimiter = ',', required = true)]
        alleles: Vec<String>,

        /// %Rank display cutoff passed to the predictor as -t.
        #[arg(short = 't', long)]
        rank_threshold: Option<f64>,

        /// Write the text summary here instead of deriving a name.
        #[arg(long, value_name = "FILE")]
        output_file: Option<PathBuf>,

        /// Write the tab-delimited table here instead of deriving a name.
        #[arg(long, value_name = "FILE")]
        excel_file: Option<PathBuf>,
    },
    /// Re-analyze an existing netMHCpan report file
    Analyze {
        /// Report file produced by an earlier run.
        output_file: PathBuf,

        /// %Rank threshold below which a peptide counts as a weak binder.
        #[arg(short = 't', long)]
        rank_threshold: Option<f64>,
    },
    /// Inspect the asynchronous job store
    Jobs {
        /// The job operation to perform.
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Start MCP server for LLM integration (Claude Desktop, VS Code Copilot, etc.)
    #[command(name = "mcp-server")]
    McpServer,
}

#[derive(Subcommand, Debug)]
/// Read-only views over the job store. Jobs are submitted through the MCP
/// server; these subcommands only inspect what it has recorded.
pub enum JobsCommands {
    /// List jobs, newest first
    List {
        /// Keep only jobs in this state
        /// (pending, running, completed, failed, cancelled).
        #[arg(long)]
        state: Option<String>,

        /// List oldest jobs first.
        #[arg(long)]
        oldest_first: bool,
    },
    /// Show one job's full record
    Status {
        /// Job identifier as returned at submission.
        job_id: String,
    },
    /// Print a job's captured process log
    Log {
        /// Job identifier as returned at submission.
        job_id: String,

        /// Show only the last N lines.
        #[arg(long, value_name = "N")]
        tail: Option<usize>,
    },
}
