//! Console logging driven by the `host.logger` section of the configuration.

use anyhow::{Result, anyhow};
use pmoconfig::Config;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise the minimum level comes
/// from `host.logger.min_level`. With `host.logger.enable_console` off no
/// subscriber is installed. Fails if a global subscriber already exists.
pub fn init_logging(config: &Config) -> Result<()> {
    if !config.get_log_enable_console().unwrap_or(true) {
        return Ok(());
    }

    let default_level = config
        .get_log_min_level()
        .ok()
        .and_then(|l| string_to_level(&l))
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(string_to_level("debug"), Some(Level::DEBUG));
        assert_eq!(string_to_level("WARN"), Some(Level::WARN));
        assert_eq!(string_to_level("verbose"), None);
    }

    #[test]
    fn second_initialisation_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        // another test binary thread may have won the race for the first one
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
