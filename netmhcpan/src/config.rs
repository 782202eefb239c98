use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    CONFIG_FILENAME, DEFAULT_ALLELE, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_KILL_GRACE_SECS,
    DEFAULT_LENGTHS, DEFAULT_MAX_CONCURRENCY, DEFAULT_RANK_STRONG, DEFAULT_RANK_WEAK,
    DEFAULT_TOOL_TMPDIR, ENV_NMHOME, ENV_TMPDIR,
};

#[derive(Debug, Deserialize, Default, Clone)]
/// Top-level configuration struct.
pub struct Config {
    #[serde(default)]
    /// The main configuration section for the predictor wrapper.
    pub netmhcpan: NetMhcPanConfig,
    /// The path to the configuration file this was loaded from.
    /// Set during `load_from_path`, `None` if using defaults or programmatic config.
    #[serde(skip)]
    pub config_file_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
/// Configuration options for predictor invocation and job management.
pub struct NetMhcPanConfig {
    /// Installation directory of netMHCpan-4.2 (the directory holding the
    /// `netMHCpan` launcher script). Falls back to the `NMHOME` environment
    /// variable when unset.
    pub home: Option<PathBuf>,
    /// Scratch directory exported to the predictor as `TMPDIR`.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// Directory under which per-job working directories are created.
    #[serde(default = "default_job_root")]
    pub job_root: PathBuf,
    /// Maximum number of predictor processes allowed to run at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Wall-clock budget for one predictor invocation, in seconds.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Seconds between a graceful stop request and a hard kill.
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
    /// Percentile-rank threshold below which a peptide counts as a strong binder.
    #[serde(default = "default_rank_strong")]
    pub rank_strong: f64,
    /// Percentile-rank threshold below which a peptide counts as a weak binder.
    #[serde(default = "default_rank_weak")]
    pub rank_weak: f64,
    /// Allele used when a request does not name one.
    #[serde(default = "default_allele")]
    pub default_allele: String,
    /// Peptide lengths used for protein scans when a request does not name any.
    #[serde(default = "default_lengths")]
    pub default_lengths: String,
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TOOL_TMPDIR)
}

fn default_job_root() -> PathBuf {
    PathBuf::from("jobs")
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_job_timeout_secs() -> u64 {
    DEFAULT_JOB_TIMEOUT_SECS
}

fn default_kill_grace_secs() -> u64 {
    DEFAULT_KILL_GRACE_SECS
}

fn default_rank_strong() -> f64 {
    DEFAULT_RANK_STRONG
}

fn default_rank_weak() -> f64 {
    DEFAULT_RANK_WEAK
}

fn default_allele() -> String {
    DEFAULT_ALLELE.to_owned()
}

fn default_lengths() -> String {
    DEFAULT_LENGTHS.to_owned()
}

impl Default for NetMhcPanConfig {
    fn default() -> Self {
        Self {
            home: None,
            tmp_dir: default_tmp_dir(),
            job_root: default_job_root(),
            max_concurrency: default_max_concurrency(),
            job_timeout_secs: default_job_timeout_secs(),
            kill_grace_secs: default_kill_grace_secs(),
            rank_strong: default_rank_strong(),
            rank_weak: default_rank_weak(),
            default_allele: default_allele(),
            default_lengths: default_lengths(),
        }
    }
}

impl NetMhcPanConfig {
    /// Resolves the predictor installation directory, preferring the config
    /// value over the `NMHOME` environment variable.
    #[must_use]
    pub fn resolved_home(&self) -> Option<PathBuf> {
        self.home
            .clone()
            .or_else(|| std::env::var_os(ENV_NMHOME).map(PathBuf::from))
    }

    /// Resolves the scratch directory exported to the predictor, preferring
    /// the `NETMHCPAN_TMPDIR` environment variable over the config value.
    #[must_use]
    pub fn resolved_tmp_dir(&self) -> PathBuf {
        std::env::var_os(format!("NETMHCPAN_{ENV_TMPDIR}"))
            .map_or_else(|| self.tmp_dir.clone(), PathBuf::from)
    }
}

impl Config {
    /// Loads configuration from default locations (.netmhcpan.toml in the
    /// current directory or an ancestor).
    #[must_use]
    pub fn load() -> Self {
        Self::load_from_path(Path::new("."))
    }

    /// Loads configuration from an explicit file, without any searching.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Validation`] when the file cannot be
    /// read or is not valid TOML.
    pub fn load_file(path: &Path) -> crate::error::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            crate::error::Error::Validation(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        let mut config: Config = toml::from_str(&content).map_err(|e| {
            crate::error::Error::Validation(format!(
                "invalid config file {}: {e}",
                path.display()
            ))
        })?;
        config.config_file_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Loads configuration starting from a specific path and traversing up.
    #[must_use]
    pub fn load_from_path(path: &Path) -> Self {
        let mut current = path.to_path_buf();
        if current.is_file() {
            current.pop();
        }

        loop {
            let config_toml = current.join(CONFIG_FILENAME);
            if config_toml.exists() {
                if let Ok(content) = fs::read_to_string(&config_toml) {
                    if let Ok(mut config) = toml::from_str::<Config>(&content) {
                        config.config_file_path = Some(config_toml.clone());
                        return config;
                    }
                }
            }

            if !current.pop() {
                break;
            }
        }

        Config::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.netmhcpan.home.is_none());
        assert_eq!(config.netmhcpan.max_concurrency, 2);
        assert_eq!(config.netmhcpan.job_timeout_secs, 3600);
        assert_eq!(config.netmhcpan.kill_grace_secs, 5);
        assert!((config.netmhcpan.rank_strong - 0.5).abs() < f64::EPSILON);
        assert!((config.netmhcpan.rank_weak - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.netmhcpan.default_allele, "HLA-A02:01");
        assert_eq!(config.netmhcpan.default_lengths, "9");
        assert_eq!(config.netmhcpan.tmp_dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_load_from_path_no_config() {
        // Create an empty temp directory with no config files
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_path(dir.path());
        // Should return default config
        assert!(config.netmhcpan.home.is_none());
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_load_from_path_netmhcpan_toml() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join(".netmhcpan.toml")).unwrap();
        writeln!(
            file,
            r#"[netmhcpan]
home = "/opt/netMHCpan-4.2"
max_concurrency = 4
job_timeout_secs = 120
"#
        )
        .unwrap();

        let config = Config::load_from_path(dir.path());
        assert_eq!(
            config.netmhcpan.home,
            Some(PathBuf::from("/opt/netMHCpan-4.2"))
        );
        assert_eq!(config.netmhcpan.max_concurrency, 4);
        assert_eq!(config.netmhcpan.job_timeout_secs, 120);
        // Unset keys keep their defaults
        assert_eq!(config.netmhcpan.kill_grace_secs, 5);
        assert!(config.config_file_path.is_some());
    }

    #[test]
    fn test_load_from_path_traverses_up() {
        // Create nested directory structure
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("src").join("lib");
        std::fs::create_dir_all(&nested).unwrap();

        // Put config in root
        let mut file = std::fs::File::create(dir.path().join(".netmhcpan.toml")).unwrap();
        writeln!(
            file,
            r#"[netmhcpan]
default_allele = "HLA-B07:02"
"#
        )
        .unwrap();

        // Load from nested path - should find config in parent
        let config = Config::load_from_path(&nested);
        assert_eq!(config.netmhcpan.default_allele, "HLA-B07:02");
    }

    #[test]
    fn test_load_from_file_path() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join(".netmhcpan.toml")).unwrap();
        writeln!(
            file,
            r#"[netmhcpan]
rank_weak = 5.0
"#
        )
        .unwrap();

        // Create a file in the directory
        let pep_file = dir.path().join("test.pep");
        std::fs::write(&pep_file, "SIINFEKL").unwrap();

        // Load from file path (not directory)
        let config = Config::load_from_path(&pep_file);
        assert!((config.netmhcpan.rank_weak - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_file_explicit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[netmhcpan]\nmax_concurrency = 7\n").unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.netmhcpan.max_concurrency, 7);
        assert_eq!(config.config_file_path, Some(path));

        let missing = Config::load_file(&dir.path().join("nope.toml"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_config_home_wins_over_env() {
        let section = NetMhcPanConfig {
            home: Some(PathBuf::from("/explicit/home")),
            ..NetMhcPanConfig::default()
        };
        assert_eq!(
            section.resolved_home(),
            Some(PathBuf::from("/explicit/home"))
        );
    }
}
