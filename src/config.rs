use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::app::DashboardOptions;
use crate::manager::{ManagerOptions, Scope};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DashboardConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_dashboard_log_lines")]
    pub log_lines: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CliConfig {
    #[serde(default = "default_cli_log_lines")]
    pub log_lines: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct JobsConfig {
    /// 0 waits for job completion without a limit.
    #[serde(default = "default_job_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    2
}

fn default_dashboard_log_lines() -> usize {
    200
}

fn default_cli_log_lines() -> usize {
    50
}

fn default_job_timeout_secs() -> u64 {
    90
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            log_lines: default_dashboard_log_lines(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_lines: default_cli_log_lines(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_job_timeout_secs(),
        }
    }
}

impl Config {
    pub fn manager_options(&self, scope: Scope) -> ManagerOptions {
        let job_timeout = match self.jobs.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        ManagerOptions { scope, job_timeout }
    }

    pub fn dashboard_options(&self) -> DashboardOptions {
        DashboardOptions {
            refresh_interval: Duration::from_secs(self.dashboard.refresh_interval_secs.max(1)),
            log_lines: self.dashboard.log_lines,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("svcm").join("config.json"))
}

/// Loads `path`, or the default location when `None`.
///
/// A missing file yields the defaults; an unreadable or malformed one is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str::<Config>(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
