//! Global configuration model for the local lifecycle engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Environment variable selecting the container engine executable.
pub const ENGINE_VAR: &str = "RACK_ENGINE";
/// Environment variable overriding the launch spacing, in milliseconds.
pub const LAUNCH_SPACING_VAR: &str = "RACK_LAUNCH_SPACING_MS";
/// Environment variable overriding the registry attempt count.
pub const REGISTRY_ATTEMPTS_VAR: &str = "RACK_PULL_ATTEMPTS";

/// Root configuration for the local lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RackConfig {
    /// Container engine executable.
    pub engine: String,
    /// Manifest file name inside the application directory.
    pub manifest_file: String,
    /// Delay between two service launches, in milliseconds.
    pub launch_spacing_ms: u64,
    /// Attempts for each registry pull or push.
    pub registry_attempts: u32,
    /// First backoff delay between registry attempts, in milliseconds.
    pub retry_base_delay_ms: u64,
}

impl Default for RackConfig {
    fn default() -> Self {
        Self {
            engine: constants::DEFAULT_ENGINE.into(),
            manifest_file: constants::DEFAULT_MANIFEST_FILE.into(),
            launch_spacing_ms: constants::DEFAULT_LAUNCH_SPACING_MS,
            registry_attempts: constants::DEFAULT_REGISTRY_ATTEMPTS,
            retry_base_delay_ms: constants::DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

impl RackConfig {
    /// Builds the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Values that cannot be parsed are ignored with a warning and the
    /// default is kept.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(engine) = lookup(ENGINE_VAR).filter(|v| !v.trim().is_empty()) {
            config.engine = engine.trim().to_string();
        }
        if let Some(ms) = parse_var(&lookup, LAUNCH_SPACING_VAR) {
            config.launch_spacing_ms = ms;
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, REGISTRY_ATTEMPTS_VAR) {
            config.registry_attempts = attempts.max(1);
        }
        config
    }

    /// Delay between two service launches.
    #[must_use]
    pub const fn launch_spacing(&self) -> Duration {
        Duration::from_millis(self.launch_spacing_ms)
    }

    /// First backoff delay between registry attempts.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
