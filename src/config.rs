use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for the exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// HTTP exposition configuration.
    #[serde(default)]
    pub web: WebConfig,

    /// Slurm command configuration.
    #[serde(default)]
    pub slurm: SlurmConfig,

    /// Which collectors are registered.
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

/// HTTP exposition configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Listen address, ":port" binds all interfaces. Default: ":8080".
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path serving the Prometheus text format. Default: "/metrics".
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

/// Locations of the Slurm reporting tools.
#[derive(Debug, Clone, Deserialize)]
pub struct SlurmConfig {
    /// Path to `sinfo`. Default: "/usr/bin/sinfo".
    #[serde(default = "default_sinfo")]
    pub sinfo: PathBuf,

    /// Path to `sdiag`. Default: "/usr/bin/sdiag".
    #[serde(default = "default_sdiag")]
    pub sdiag: PathBuf,

    /// Path to `scontrol`. Default: "/usr/bin/scontrol".
    #[serde(default = "default_scontrol")]
    pub scontrol: PathBuf,

    /// PATH passed to the commands. Default: "/usr/bin:/bin:/usr/sbin:/sbin".
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Per-command timeout. Default: 10s.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Collector toggles.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorsConfig {
    /// Node state gauges per partition. Default: true.
    #[serde(default = "default_true")]
    pub nodes: bool,

    /// Scheduler and RPC statistics from sdiag. Default: true.
    #[serde(default = "default_true")]
    pub scheduler: bool,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_address() -> String {
    ":8080".to_string()
}

fn default_telemetry_path() -> String {
    "/metrics".to_string()
}

fn default_sinfo() -> PathBuf {
    PathBuf::from("/usr/bin/sinfo")
}

fn default_sdiag() -> PathBuf {
    PathBuf::from("/usr/bin/sdiag")
}

fn default_scontrol() -> PathBuf {
    PathBuf::from("/usr/bin/scontrol")
}

fn default_search_path() -> String {
    "/usr/bin:/bin:/usr/sbin:/sbin".to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            web: WebConfig::default(),
            slurm: SlurmConfig::default(),
            collectors: CollectorsConfig::default(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            telemetry_path: default_telemetry_path(),
        }
    }
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            sinfo: default_sinfo(),
            sdiag: default_sdiag(),
            scontrol: default_scontrol(),
            search_path: default_search_path(),
            timeout: default_command_timeout(),
        }
    }
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            nodes: true,
            scheduler: true,
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.web.listen_address.is_empty() {
            bail!("web.listen_address is required");
        }

        if !self.web.telemetry_path.starts_with('/') {
            bail!(
                "web.telemetry_path must start with '/': {}",
                self.web.telemetry_path
            );
        }

        if self.web.telemetry_path == "/healthz" {
            bail!("web.telemetry_path must not be /healthz");
        }

        for (name, path) in [
            ("slurm.sinfo", &self.slurm.sinfo),
            ("slurm.sdiag", &self.slurm.sdiag),
            ("slurm.scontrol", &self.slurm.scontrol),
        ] {
            if path.as_os_str().is_empty() {
                bail!("{name} must not be empty");
            }
        }

        if self.slurm.timeout.is_zero() {
            bail!("slurm.timeout must be positive");
        }

        if !self.collectors.nodes && !self.collectors.scheduler {
            bail!("at least one of collectors.nodes and collectors.scheduler must be enabled");
        }

        Ok(())
    }
}
