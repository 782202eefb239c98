use regex::Regex;
use std::sync::OnceLock;

/// Name of the optional configuration file searched for in the working
/// directory and its ancestors.
pub const CONFIG_FILENAME: &str = ".netmhcpan.toml";

/// Version of the wrapped predictor release this crate targets.
pub const NETMHCPAN_VERSION: &str = "4.2";

/// Allele used when a request does not name one.
pub const DEFAULT_ALLELE: &str = "HLA-A02:01";

/// Peptide lengths used for protein scans when a request does not name any.
pub const DEFAULT_LENGTHS: &str = "9";

/// Percentile-rank threshold below which a peptide is a strong binder.
pub const DEFAULT_RANK_STRONG: f64 = 0.5;

/// Percentile-rank threshold below which a peptide is a weak binder.
pub const DEFAULT_RANK_WEAK: f64 = 2.0;

/// Shortest peptide the predictor accepts.
pub const MIN_PEPTIDE_LEN: usize = 8;

/// Longest peptide the predictor accepts.
pub const MAX_PEPTIDE_LEN: usize = 14;

/// Default cap on concurrently running predictor processes.
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Default wall-clock budget for one predictor invocation, in seconds.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

/// Default pause between a graceful stop request and a hard kill.
pub const DEFAULT_KILL_GRACE_SECS: u64 = 5;

/// Environment variable the predictor reads to find its own installation.
pub const ENV_NMHOME: &str = "NMHOME";

/// Environment variable the predictor reads for scratch space.
pub const ENV_TMPDIR: &str = "TMPDIR";

/// Scratch directory handed to the predictor unless configured otherwise.
pub const DEFAULT_TOOL_TMPDIR: &str = "/tmp";

/// Alleles advertised by the server-info surfaces as known-good examples.
pub const EXAMPLE_ALLELES: &[&str] = &[
    "HLA-A01:01",
    "HLA-A02:01",
    "HLA-A03:01",
    "HLA-A24:02",
    "HLA-B07:02",
    "HLA-B08:01",
    "HLA-B27:05",
    "HLA-B35:01",
    "HLA-C07:02",
    "HLA-C08:02",
];

/// Regex matching the predictor's per-allele binder summary line.
/// Captures, in order: strong-binder count, weak-binder count, peptide count.
///
/// # Panics
///
/// Panics if the regex pattern is invalid.
pub fn get_binder_summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| {
        Regex::new(
            r"Number of high binders (\d+)\. Number of weak binders (\d+)\. Number of peptides (\d+)",
        )
        .expect("Invalid binder summary regex pattern")
    })
}

/// Regex matching well-formed HLA class I allele names such as
/// `HLA-A02:01` or `HLA-B*07:02`.
///
/// # Panics
///
/// Panics if the regex pattern is invalid.
pub fn get_hla_allele_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| {
        Regex::new(r"^HLA-[A-C]\*?\d{2}:?\d{2,3}$").expect("Invalid HLA allele regex pattern")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_regex_captures_counts() {
        let line = "Number of high binders 2. Number of weak binders 3. Number of peptides 10";
        let caps = get_binder_summary_re().captures(line).unwrap();
        assert_eq!(&caps[1], "2");
        assert_eq!(&caps[2], "3");
        assert_eq!(&caps[3], "10");
    }

    #[test]
    fn allele_regex_accepts_common_forms() {
        for allele in ["HLA-A02:01", "HLA-B*07:02", "HLA-C0702", "HLA-A02:101"] {
            assert!(get_hla_allele_re().is_match(allele), "{allele}");
        }
    }

    #[test]
    fn allele_regex_rejects_garbage() {
        for bad in ["H-2Kb", "HLA-D02:01", "HLA-A2:1", "hla-a02:01", ""] {
            assert!(!get_hla_allele_re().is_match(bad), "{bad}");
        }
    }
}
