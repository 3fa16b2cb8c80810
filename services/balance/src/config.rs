//! Balance manager configuration
//!
//! Loaded from TOML (`from_file` / `from_toml_str`) or from `BALANCE_*`
//! environment variables. Unset or unparsable environment values keep their
//! defaults.

use crate::cache::CacheConfig;
use crate::error::{BalanceError, Result};
use crate::history::HistoryConfig;
use crate::validator::ValidatorConfig;
use resilience::CircuitBreakerConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Circuit breaker settings for the REST fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Base backoff
    pub recovery_timeout_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub jitter_range: f64,
    pub max_half_open_requests: u32,
    pub call_timeout_secs: u64,
    pub monitoring_window_secs: u64,
    pub failure_rate_threshold: f64,
    pub latency_window: usize,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout_secs: 60,
            max_backoff_secs: 300,
            backoff_multiplier: 2.0,
            jitter_range: 0.1,
            max_half_open_requests: 3,
            call_timeout_secs: 30,
            monitoring_window_secs: 60,
            failure_rate_threshold: 0.5,
            latency_window: 100,
            snapshot_path: None,
        }
    }
}

impl BreakerSettings {
    pub fn to_breaker_config(&self, name: &str) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            name: name.to_string(),
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            backoff_multiplier: self.backoff_multiplier,
            jitter_range: self.jitter_range,
            max_half_open_requests: self.max_half_open_requests,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            monitoring_window: Duration::from_secs(self.monitoring_window_secs),
            failure_rate_threshold: self.failure_rate_threshold,
            latency_window: self.latency_window,
            persistence_path: self.snapshot_path.clone(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceManagerConfig {
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub validator: ValidatorConfig,
    pub circuit_breaker: BreakerSettings,

    /// Absolute delta that raises a balance change event
    pub balance_change_threshold: Decimal,
    pub health_check_interval_secs: u64,
    /// Full REST refresh when the feed has been silent this long
    pub force_update_interval_secs: u64,
    pub housekeeping_interval_secs: u64,
    pub shutdown_grace_ms: u64,
    pub rest_requests_per_minute: u32,
    /// Validate cache hits before returning them
    pub validate_on_read: bool,
    /// Loaded at initialize, written at shutdown
    pub history_snapshot_path: Option<PathBuf>,
}

impl Default for BalanceManagerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            validator: ValidatorConfig::default(),
            circuit_breaker: BreakerSettings::default(),
            balance_change_threshold: dec!(0.001),
            health_check_interval_secs: 5,
            force_update_interval_secs: 60,
            housekeeping_interval_secs: 300,
            shutdown_grace_ms: 5000,
            rest_requests_per_minute: 60,
            validate_on_read: true,
            history_snapshot_path: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

impl BalanceManagerConfig {
    /// Defaults overridden by `BALANCE_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let breaker = &defaults.circuit_breaker;

        Self {
            cache: CacheConfig {
                max_size: env_or("BALANCE_CACHE_MAX_SIZE", defaults.cache.max_size),
                default_ttl_secs: env_or("BALANCE_CACHE_TTL_SECS", defaults.cache.default_ttl_secs),
                cleanup_interval_secs: env_or(
                    "BALANCE_CACHE_CLEANUP_INTERVAL_SECS",
                    defaults.cache.cleanup_interval_secs,
                ),
            },
            history: HistoryConfig {
                max_entries_per_asset: env_or(
                    "BALANCE_HISTORY_MAX_ENTRIES",
                    defaults.history.max_entries_per_asset,
                ),
                retention_hours: env_or("BALANCE_HISTORY_RETENTION_HOURS", defaults.history.retention_hours),
                ..defaults.history.clone()
            },
            validator: ValidatorConfig {
                stale_threshold_secs: env_or(
                    "BALANCE_VALIDATOR_STALE_SECS",
                    defaults.validator.stale_threshold_secs,
                ),
                unrealistic_balance_threshold: env_or(
                    "BALANCE_VALIDATOR_UNREALISTIC_THRESHOLD",
                    defaults.validator.unrealistic_balance_threshold,
                ),
                ..defaults.validator.clone()
            },
            circuit_breaker: BreakerSettings {
                failure_threshold: env_or("BALANCE_BREAKER_FAILURE_THRESHOLD", breaker.failure_threshold),
                success_threshold: env_or("BALANCE_BREAKER_SUCCESS_THRESHOLD", breaker.success_threshold),
                recovery_timeout_secs: env_or(
                    "BALANCE_BREAKER_RECOVERY_TIMEOUT_SECS",
                    breaker.recovery_timeout_secs,
                ),
                call_timeout_secs: env_or("BALANCE_BREAKER_CALL_TIMEOUT_SECS", breaker.call_timeout_secs),
                snapshot_path: env_path("BALANCE_BREAKER_SNAPSHOT_PATH"),
                ..breaker.clone()
            },
            balance_change_threshold: env_or("BALANCE_CHANGE_THRESHOLD", defaults.balance_change_threshold),
            health_check_interval_secs: env_or(
                "BALANCE_HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval_secs,
            ),
            force_update_interval_secs: env_or(
                "BALANCE_FORCE_UPDATE_INTERVAL_SECS",
                defaults.force_update_interval_secs,
            ),
            housekeeping_interval_secs: env_or(
                "BALANCE_HOUSEKEEPING_INTERVAL_SECS",
                defaults.housekeeping_interval_secs,
            ),
            shutdown_grace_ms: env_or("BALANCE_SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms),
            rest_requests_per_minute: env_or(
                "BALANCE_REST_REQUESTS_PER_MINUTE",
                defaults.rest_requests_per_minute,
            ),
            validate_on_read: env_or("BALANCE_VALIDATE_ON_READ", defaults.validate_on_read),
            history_snapshot_path: env_path("BALANCE_HISTORY_SNAPSHOT_PATH"),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate().map_err(BalanceError::Config)?;
        self.history.validate().map_err(BalanceError::Config)?;
        self.validator.validate().map_err(BalanceError::Config)?;
        self.circuit_breaker
            .to_breaker_config("validation")
            .validate()
            .map_err(BalanceError::Config)?;

        if self.balance_change_threshold < Decimal::ZERO {
            return Err(BalanceError::config("Balance change threshold must not be negative"));
        }
        if self.health_check_interval_secs == 0 {
            return Err(BalanceError::config("Health check interval must be greater than 0"));
        }
        if self.force_update_interval_secs == 0 {
            return Err(BalanceError::config("Force update interval must be greater than 0"));
        }
        if self.housekeeping_interval_secs == 0 {
            return Err(BalanceError::config("Housekeeping interval must be greater than 0"));
        }
        if self.rest_requests_per_minute == 0 {
            return Err(BalanceError::config("REST requests per minute must be greater than 0"));
        }
        Ok(())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn force_update_interval(&self) -> Duration {
        Duration::from_secs(self.force_update_interval_secs)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{Severity, ValidationRule};

    #[test]
    fn test_defaults_are_valid() {
        let config = BalanceManagerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.history.retention_hours, 24);
        assert_eq!(config.balance_change_threshold, dec!(0.001));

        let breaker = config.circuit_breaker.to_breaker_config("rest");
        assert_eq!(breaker.name, "rest");
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(60));
        assert_eq!(breaker.max_backoff, Duration::from_secs(300));
    }

    #[test]
    fn test_toml_overrides_and_keeps_defaults() {
        let config = BalanceManagerConfig::from_toml_str(
            r#"
            balance_change_threshold = "0.5"
            rest_requests_per_minute = 10

            [cache]
            max_size = 50

            [validator]
            disabled_rules = ["stale_data", "all_zero_balances"]

            [validator.severity_overrides]
            unrealistic_balance = "error"

            [circuit_breaker]
            failure_threshold = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.balance_change_threshold, dec!(0.5));
        assert_eq!(config.rest_requests_per_minute, 10);
        assert_eq!(config.cache.max_size, 50);
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(
            config.validator.disabled_rules,
            vec![ValidationRule::StaleData, ValidationRule::AllZeroBalances]
        );
        assert_eq!(
            config.validator.severity_overrides.get(&ValidationRule::UnrealisticBalance),
            Some(&Severity::Error)
        );
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.success_threshold, 3);
    }

    #[test]
    fn test_unknown_severity_override_rejected() {
        let contents = "[validator.severity_overrides]\nno_such_rule = \"error\"\n";
        assert!(matches!(
            BalanceManagerConfig::from_toml_str(contents),
            Err(BalanceError::Toml(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_cache = "[cache]\nmax_size = 0\n";
        assert!(matches!(
            BalanceManagerConfig::from_toml_str(zero_cache),
            Err(BalanceError::Config(_))
        ));

        let bad_rate = "[circuit_breaker]\nfailure_rate_threshold = 1.5\n";
        assert!(BalanceManagerConfig::from_toml_str(bad_rate).is_err());

        let config = BalanceManagerConfig {
            balance_change_threshold: dec!(-1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_reads_overrides() {
        env::set_var("BALANCE_CACHE_MAX_SIZE", "42");
        env::set_var("BALANCE_CHANGE_THRESHOLD", "0.25");
        env::set_var("BALANCE_FORCE_UPDATE_INTERVAL_SECS", "not-a-number");

        let config = BalanceManagerConfig::from_env();
        assert_eq!(config.cache.max_size, 42);
        assert_eq!(config.balance_change_threshold, dec!(0.25));
        assert_eq!(config.force_update_interval_secs, 60);

        env::remove_var("BALANCE_CACHE_MAX_SIZE");
        env::remove_var("BALANCE_CHANGE_THRESHOLD");
        env::remove_var("BALANCE_FORCE_UPDATE_INTERVAL_SECS");
    }
}
