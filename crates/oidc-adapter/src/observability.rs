//! Log output for processes hosting the adapter.
//!
//! [`init_logging`] installs the global subscriber from the `[logging]`
//! section; [`reload_logging`] swaps the filter when that section changes.
//! `RUST_LOG`, when set, takes precedence at install time.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::{ConfigError, LoggingConfig};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Parses the configured filter directive.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if `level` is not a valid
/// `EnvFilter` directive.
pub fn parse_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(level).map_err(|e| {
        ConfigError::InvalidValue(format!("logging.level '{level}' is not a valid filter: {e}"))
    })
}

/// Installs the global subscriber. Returns `false` if another subscriber was
/// already installed, in which case nothing changes.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the configured level does not parse.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => parse_filter(&config.level)?,
    };
    let (filter_layer, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(config.ansi).with_target(true))
        .try_init()
        .is_ok();
    if installed {
        let _ = FILTER_HANDLE.set(handle);
        tracing::debug!(level = %config.level, "Logging initialised");
    }
    Ok(installed)
}

/// Applies a changed `[logging]` section. Returns `false` if logging was not
/// installed through [`init_logging`].
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the new level does not parse; the
/// previous filter stays active.
pub fn reload_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = parse_filter(&config.level)?;
    let Some(handle) = FILTER_HANDLE.get() else {
        return Ok(false);
    };
    Ok(handle.reload(filter).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn test_parse_filter_rejects_garbage() {
        assert!(parse_filter("oidc_adapter=debug,warn").is_ok());
        assert!(parse_filter("oidc_adapter=loud").is_err());
    }

    #[test]
    fn test_init_then_reload() {
        init_logging(&logging("info")).unwrap();
        // Second install is a no-op.
        assert!(!init_logging(&logging("warn")).unwrap());

        assert!(reload_logging(&logging("oidc_adapter=trace")).unwrap());
        assert!(reload_logging(&logging("oidc_adapter=loud")).is_err());
    }
}
