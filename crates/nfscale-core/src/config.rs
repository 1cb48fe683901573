//! nfscale.toml configuration parser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ArimaOrder, ForecastConfig, ScalingThresholds};

/// Token in `service_config.amf_url` replaced by the instance id.
pub const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub docker_hosts: Vec<DockerHostConfig>,
    pub service_config: ServiceConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
}

/// One container host in the fleet. Order in the file is allocation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerHostConfig {
    pub host: String,
    pub port: u16,
    pub max_services: usize,
    #[serde(default)]
    pub container_config: ContainerTemplate,
    pub command: Option<String>,
    /// Seconds allowed for each backend call.
    #[serde(default = "default_backend_timeout")]
    pub timeout: u64,
}

impl DockerHostConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// `command` split into argv with shell quoting rules. Empty when unset.
    pub fn command_argv(&self) -> ConfigResult<Vec<String>> {
        match self.command.as_deref() {
            Some(command) => shell_words::split(command).map_err(|e| {
                invalid(format!("docker_hosts[{}].command: {e}", self.address()))
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Static container fields merged into every instance created on a host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerTemplate {
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub network_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_label")]
    pub service_label: String,
    pub nrf_ip: String,
    /// Instance address template; must contain [`ID_PLACEHOLDER`].
    pub amf_url: String,
    pub image_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub thresholds: ScalingThresholds,
    #[serde(default)]
    pub arima: ArimaOrder,
    #[serde(default = "default_minimal_monitorings")]
    pub minimal_monitorings: usize,
    #[serde(default = "default_minimal_services")]
    pub minimal_services: usize,
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
    #[serde(default)]
    pub forecaster: ForecasterKind,
    /// Seconds allowed for one model fit.
    #[serde(default = "default_forecast_timeout")]
    pub forecast_timeout: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            thresholds: ScalingThresholds::default(),
            arima: ArimaOrder::default(),
            minimal_monitorings: default_minimal_monitorings(),
            minimal_services: default_minimal_services(),
            lookahead: default_lookahead(),
            forecaster: ForecasterKind::default(),
            forecast_timeout: default_forecast_timeout(),
        }
    }
}

impl ManagerConfig {
    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            order: self.arima,
            lookahead: self.lookahead,
        }
    }
}

/// Which time-series model drives the scaling signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecasterKind {
    #[default]
    Arima,
    Holt,
    Linear,
    MovingAverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub host: String,
    pub port: u16,
    /// Seconds between poll cycles.
    pub interval: u64,
    /// Seconds allowed for one metric fetch.
    #[serde(default = "default_monitor_timeout")]
    pub timeout: u64,
}

impl MonitorConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub filename: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            filename: None,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn default_backend_timeout() -> u64 {
    30
}
fn default_service_label() -> String {
    "amf".to_string()
}
fn default_minimal_monitorings() -> usize {
    10
}
fn default_minimal_services() -> usize {
    1
}
fn default_lookahead() -> usize {
    10
}
fn default_forecast_timeout() -> u64 {
    30
}
fn default_monitor_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Read, parse and validate a configuration file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field invariants serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.docker_hosts.is_empty() {
            return Err(invalid("docker_hosts must list at least one host"));
        }
        for host in &self.docker_hosts {
            if host.timeout == 0 {
                return Err(invalid(format!(
                    "docker_hosts[{}].timeout must be at least 1 second",
                    host.address()
                )));
            }
            host.command_argv()?;
        }
        let t = &self.manager.thresholds;
        if !(t.lower < t.upper) {
            return Err(invalid(format!(
                "manager.thresholds.lower ({}) must be below upper ({})",
                t.lower, t.upper
            )));
        }
        if self.manager.minimal_monitorings == 0 {
            return Err(invalid("manager.minimal_monitorings must be at least 1"));
        }
        if self.manager.lookahead == 0 {
            return Err(invalid("manager.lookahead must be at least 1"));
        }
        if self.monitor.interval == 0 {
            return Err(invalid("monitor.interval must be at least 1 second"));
        }
        if self.monitor.timeout == 0 {
            return Err(invalid("monitor.timeout must be at least 1 second"));
        }
        if self.manager.forecast_timeout == 0 {
            return Err(invalid("manager.forecast_timeout must be at least 1 second"));
        }
        if !self.service_config.amf_url.contains(ID_PLACEHOLDER) {
            return Err(invalid(format!(
                "service_config.amf_url must contain the {ID_PLACEHOLDER} token"
            )));
        }
        if self.service_config.service_label.is_empty() {
            return Err(invalid("service_config.service_label must not be empty"));
        }
        let level = self.logger.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid(format!(
                "logger.level {:?} must be one of {}",
                self.logger.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Sum of `max_services` across every host.
    pub fn fleet_capacity(&self) -> usize {
        self.docker_hosts.iter().map(|h| h.max_services).sum()
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
