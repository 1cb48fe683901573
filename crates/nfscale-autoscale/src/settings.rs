//! Engine tuning knobs.

use std::time::Duration;

use nfscale_core::ScalingThresholds;
use nfscale_core::config::{ManagerConfig, MonitorConfig};

/// Everything the decision engine reads from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub thresholds: ScalingThresholds,
    /// Window length; no decision is made until this many samples arrived.
    pub minimal_monitorings: usize,
    /// Floor the engine never scales below.
    pub minimal_services: usize,
    /// Forecast horizon. The last point is the scaling signal.
    pub lookahead: usize,
    /// Pause between cycles.
    pub interval: Duration,
    pub forecast_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(manager: &ManagerConfig, monitor: &MonitorConfig) -> Self {
        let forecast = manager.forecast_config();
        Self {
            thresholds: manager.thresholds,
            minimal_monitorings: manager.minimal_monitorings.max(1),
            minimal_services: manager.minimal_services,
            lookahead: forecast.lookahead.max(1),
            interval: Duration::from_secs(monitor.interval),
            forecast_timeout: Duration::from_secs(manager.forecast_timeout),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            thresholds: ScalingThresholds::default(),
            minimal_monitorings: 10,
            minimal_services: 1,
            lookahead: 10,
            interval: Duration::from_secs(5),
            forecast_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_from_config_sections() {
        let manager = ManagerConfig {
            minimal_monitorings: 6,
            minimal_services: 2,
            lookahead: 4,
            forecast_timeout: 3,
            ..ManagerConfig::default()
        };
        let monitor = MonitorConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            interval: 15,
            timeout: 10,
        };
        let settings = EngineSettings::from_config(&manager, &monitor);
        assert_eq!(settings.minimal_monitorings, 6);
        assert_eq!(settings.minimal_services, 2);
        assert_eq!(settings.lookahead, 4);
        assert_eq!(settings.interval, Duration::from_secs(15));
        assert_eq!(settings.forecast_timeout, Duration::from_secs(3));
        assert_eq!(settings.thresholds.upper, 70.0);
        assert_eq!(settings.thresholds.lower, 30.0);
    }
}
