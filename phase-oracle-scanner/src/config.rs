//! Configuration for the scanner.

use phase_oracle::OracleConfig;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Where period reports go.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Print reports to stdout as JSON
    #[default]
    Stdout,
    /// Write one JSON file per period into `output_path`
    File,
}

/// Scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Base URL of the indexing service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Values requested per call
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Retries per chunk after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay; attempt `n` waits `n` times this
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Keep coinbase outputs in calibration and search
    #[serde(default)]
    pub include_coinbase: bool,

    /// Output mode for period reports
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Report directory (required if output_mode = file)
    pub output_path: Option<PathBuf>,

    /// Algorithm parameters
    #[serde(default)]
    pub oracle: OracleConfig,
}

fn default_endpoint() -> String {
    "http://localhost:3110".to_string()
}

fn default_chunk_size() -> u64 {
    25_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            include_coinbase: false,
            output_mode: OutputMode::default(),
            output_path: None,
            oracle: OracleConfig::default(),
        }
    }
}

impl ScannerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScannerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint.is_empty() {
            anyhow::bail!("endpoint must be specified");
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            anyhow::bail!("endpoint must be an http(s) URL, got {}", self.endpoint);
        }

        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be at least 1");
        }
        if self.chunk_size > 1_000_000 {
            tracing::warn!(
                "Large chunk_size ({}) may exceed indexer response limits",
                self.chunk_size
            );
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }

        if self.output_mode == OutputMode::File && self.output_path.is_none() {
            anyhow::bail!("output_path is required when output_mode = file");
        }

        self.oracle.validate()?;

        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();
        assert_eq!(config.chunk_size, 25_000);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay(), Duration::from_millis(500));
        assert_eq!(config.output_mode, OutputMode::Stdout);
        assert!(!config.include_coinbase);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_file_mode_needs_path() {
        let config = ScannerConfig {
            output_mode: OutputMode::File,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_chunk() {
        let config = ScannerConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_oracle_config() {
        let mut config = ScannerConfig::default();
        config.oracle.search.resolution = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_with_partial_oracle_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scanner.toml");
        std::fs::write(
            &path,
            r#"
endpoint = "https://indexer.example.org"
chunk_size = 10000
output_mode = "file"
output_path = "reports"

[oracle.search]
tolerance = 0.01

[oracle.thresholds]
point_accurate = 0.10
"#,
        )
        .unwrap();

        let config = ScannerConfig::from_file(&path).unwrap();
        assert_eq!(config.endpoint, "https://indexer.example.org");
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.output_mode, OutputMode::File);
        assert_eq!(config.oracle.search.tolerance, 0.01);
        assert_eq!(config.oracle.search.resolution, 100);
        assert_eq!(config.oracle.thresholds.point_accurate, 0.10);
        assert_eq!(config.oracle.thresholds.point_close, 0.30);
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempdir().unwrap();
        assert!(ScannerConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
