// External crates
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Optional settings file. Every value can also be given on the command line,
/// which takes precedence.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub general: GeneralConfig,
    pub logging: LoggingConfig,
    pub papertrail: PapertrailConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load and parse the configuration file
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading rdstail configuration file"
        );

        let config_str = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file at {:?}", path_ref))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse TOML from {:?}", path_ref))?;

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "rdstail configuration file loaded successfully"
        );
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    pub instance: Option<String>,
    pub region: Option<String>,
    pub max_retries: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub rate: Option<Duration>,
    pub lines: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub log_level: Option<String>,
    pub log_format: LogFormat,
    /// Write diagnostics to a daily rolling file here instead of stderr
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PapertrailConfig {
    pub host: Option<String>,
    pub app: Option<String>,
    pub hostname: Option<String>,
    pub ca_file: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub max_retry_interval: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub retry_deadline: Option<Duration>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    pub listen_addr: Option<SocketAddr>,
}
