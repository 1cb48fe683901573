//! Subscriber setup from the `[logger]` section.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use nfscale_core::config::LoggerConfig;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: the configured level for nfscale
/// crates, warnings for everything else.
pub fn default_directives(config: &LoggerConfig) -> String {
    let level = config.level.to_ascii_lowercase();
    format!(
        "warn,nfscaled={level},nfscale_core={level},nfscale_forecast={level},\
         nfscale_monitor={level},nfscale_fleet={level},nfscale_autoscale={level}"
    )
}

/// Install the global subscriber. Writes to `logger.filename` in append
/// mode when set, stdout otherwise.
pub fn init(config: &LoggerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(config)))
        .context("invalid log filter")?;

    match &config.filename {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_follow_configured_level() {
        let config = LoggerConfig {
            level: "DEBUG".to_string(),
            filename: None,
        };
        let directives = default_directives(&config);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("nfscale_fleet=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
