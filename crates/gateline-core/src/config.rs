//! Configuration resolution for Gateline.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. Config file (JSON, path supplied by the caller)
//! 3. Environment variables (`GATELINE_*`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete Gateline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub claims: ClaimConfig,
    #[serde(default)]
    pub expiry: ExpiryConfig,
}

/// Daemon-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    /// Capacity of each per-event status feed broadcast channel.
    pub feed_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
            feed_capacity: 64,
        }
    }
}

/// Claim-token issuing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// Maximum claim attempts per client identity within the window.
    pub rate_limit_max_claims: u32,
    /// Rate-limit window in seconds.
    pub rate_limit_window_secs: u64,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            rate_limit_max_claims: 5,
            rate_limit_window_secs: 60,
        }
    }
}

impl ClaimConfig {
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// Expiry worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Unfinished registrations older than this are reaped. Default: 10 minutes.
    pub registration_timeout_secs: u64,
    /// Unconsumed claim tokens older than this are reaped. Default: 30 minutes.
    pub claim_token_timeout_secs: u64,
    /// Interval between reaper sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            registration_timeout_secs: 10 * 60,
            claim_token_timeout_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl ExpiryConfig {
    pub const fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub const fn claim_token_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_token_timeout_secs)
    }

    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Load configuration, optionally overlaying a JSON config file, then
/// applying environment overrides.
pub fn load_config(config_file: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(path) = config_file {
        if path.exists() {
            config = load_config_file(path)?;
        }
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("GATELINE_DATABASE_PATH") {
        config.daemon.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("GATELINE_LOG_LEVEL") {
        config.daemon.log_level = val;
    }
    if let Ok(val) = std::env::var("GATELINE_RATE_LIMIT_MAX_CLAIMS") {
        if let Ok(n) = val.parse() {
            config.claims.rate_limit_max_claims = n;
        }
    }
    if let Ok(val) = std::env::var("GATELINE_RATE_LIMIT_WINDOW_SECS") {
        if let Ok(n) = val.parse() {
            config.claims.rate_limit_window_secs = n;
        }
    }
    if let Ok(val) = std::env::var("GATELINE_REGISTRATION_TIMEOUT_SECS") {
        if let Ok(n) = val.parse() {
            config.expiry.registration_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("GATELINE_CLAIM_TOKEN_TIMEOUT_SECS") {
        if let Ok(n) = val.parse() {
            config.expiry.claim_token_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("GATELINE_SWEEP_INTERVAL_SECS") {
        if let Ok(n) = val.parse() {
            config.expiry.sweep_interval_secs = n;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_registration_timeout_is_10_minutes() {
        let config = Config::default();
        assert_eq!(config.expiry.registration_timeout_secs, 600);
    }

    #[test]
    fn default_claim_token_timeout_is_30_minutes() {
        let config = Config::default();
        assert_eq!(config.expiry.claim_token_timeout_secs, 1800);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"claims": {"rate_limit_max_claims": 3, "rate_limit_window_secs": 10}}"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.claims.rate_limit_max_claims, 3);
        assert_eq!(config.claims.rate_limit_window_secs, 10);
        // Untouched sections keep defaults
        assert_eq!(config.expiry.registration_timeout_secs, 600);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/gateline.json"))).unwrap();
        assert_eq!(config.claims.rate_limit_max_claims, 5);
    }
}
