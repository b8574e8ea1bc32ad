//! Application configuration
//!
//! Loaded from a TOML file (default `~/.config/charge-settlement/config.toml`,
//! overridable with `SETTLEMENT_CONFIG`). Every field has a default, so a
//! missing file or a partial one still yields a working dev setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::services::{SweepConfig, DEFAULT_ESTIMATED_POWER_KW};
use crate::domain::{DomainResult, Rate};
use crate::infrastructure::gateway::MIN_SECRET_LEN;
use crate::infrastructure::{DatabaseConfig, GatewayConfig};
use crate::shared::RetryConfig;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "SETTLEMENT_CONFIG";

/// `database.url` value that selects the in-memory backend.
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Station id of the fallback rate.
pub const DEFAULT_RATE_STATION: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub rates: RatesConfig,
    pub settlement: SettlementConfig,
    pub gateway: GatewayConfig,
    pub sweep: SweepSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds to wait for in-flight work on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: 30,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RatesConfig {
    /// Apply the default fees to stations without their own rate
    pub use_default: bool,
    pub electricity_fee_per_kwh: Decimal,
    pub service_fee_per_kwh: Decimal,
    pub currency: String,
    /// Per-station rates written to the store on startup
    pub stations: Vec<StationRateConfig>,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            use_default: true,
            electricity_fee_per_kwh: Decimal::new(60, 2),
            service_fee_per_kwh: Decimal::new(40, 2),
            currency: "CNY".to_string(),
            stations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StationRateConfig {
    pub station_id: String,
    pub electricity_fee_per_kwh: Decimal,
    pub service_fee_per_kwh: Decimal,
    /// Falls back to `rates.currency`
    #[serde(default)]
    pub currency: Option<String>,
}

impl RatesConfig {
    pub fn default_rate(&self) -> DomainResult<Option<Rate>> {
        if !self.use_default {
            return Ok(None);
        }
        Rate::new(
            DEFAULT_RATE_STATION,
            self.electricity_fee_per_kwh,
            self.service_fee_per_kwh,
            self.currency.clone(),
        )
        .map(Some)
    }

    pub fn station_rates(&self) -> DomainResult<Vec<Rate>> {
        self.stations
            .iter()
            .map(|station| {
                Rate::new(
                    station.station_id.clone(),
                    station.electricity_fee_per_kwh,
                    station.service_fee_per_kwh,
                    station.currency.clone().unwrap_or_else(|| self.currency.clone()),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Power assumed when a session closes without a final meter value
    pub estimated_power_kw: Decimal,
    pub retry_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            estimated_power_kw: DEFAULT_ESTIMATED_POWER_KW,
            retry_attempts: retry.max_attempts,
            retry_initial_backoff_ms: retry.initial_delay.as_millis() as u64,
            retry_max_backoff_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl SettlementConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry_initial_backoff_ms),
            max_delay: Duration::from_millis(self.retry_max_backoff_ms),
            ..RetryConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Age after which a pending gateway order is resolved
    pub ttl_secs: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        let sweep = SweepConfig::default();
        Self {
            enabled: true,
            interval_secs: sweep.interval.as_secs(),
            ttl_secs: sweep.ttl.as_secs(),
        }
    }
}

impl SweepSettings {
    pub fn to_sweep_config(&self) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            ttl: Duration::from_secs(self.ttl_secs),
        }
    }
}

impl AppConfig {
    /// Read `path`. A missing file is not an error: defaults are returned.
    /// Validation is left to the caller so CLI overrides apply first.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse and validate.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rates
            .default_rate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.rates
            .station_rates()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.settlement.estimated_power_kw <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "settlement.estimated_power_kw must be positive".into(),
            ));
        }
        if !self.gateway.sandbox && self.gateway.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "gateway.base_url is required when gateway.sandbox is false".into(),
            ));
        }
        if self.gateway.sandbox {
            if !self.gateway.secret.is_empty() && !self.gateway.has_strong_secret() {
                return Err(ConfigError::Invalid(format!(
                    "gateway.secret must be empty (random per run) or at least {} characters in sandbox mode",
                    MIN_SECRET_LEN
                )));
            }
        } else if !self.gateway.has_strong_secret() {
            return Err(ConfigError::Invalid(format!(
                "gateway.secret must be the provider signing key (at least {} characters, not a placeholder)",
                MIN_SECRET_LEN
            )));
        }
        Ok(())
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database.url.eq_ignore_ascii_case(MEMORY_DATABASE_URL)
    }
}

/// `$SETTLEMENT_CONFIG`, else `<config dir>/charge-settlement/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("charge-settlement")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SANDBOX: &str = "[gateway]\nsandbox = true\n";

    #[test]
    fn sandbox_file_yields_defaults() {
        let cfg = AppConfig::from_toml(SANDBOX).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.sweep.enabled);
        assert!(cfg.gateway.sandbox);
        assert!(cfg.gateway.secret.is_empty());
        assert_eq!(cfg.settlement.estimated_power_kw, Decimal::new(70, 1));
        let rate = cfg.rates.default_rate().unwrap().unwrap();
        assert_eq!(rate.unit_price().unwrap(), Decimal::ONE);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AppConfig::load(Path::new("/nonexistent/charge-settlement.toml")).unwrap();
        assert_eq!(cfg.server.shutdown_timeout, 30);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [server]
            port = 9100

            [gateway]
            sandbox = true

            [database]
            url = "memory"

            [rates]
            currency = "EUR"

            [[rates.stations]]
            station_id = "ST-7"
            electricity_fee_per_kwh = "1.10"
            service_fee_per_kwh = "0.25"

            [sweep]
            interval_secs = 15
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert!(cfg.uses_memory_store());
        assert_eq!(cfg.sweep.to_sweep_config().interval, Duration::from_secs(15));

        let stations = cfg.rates.station_rates().unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].currency, "EUR");
        assert_eq!(stations[0].unit_price().unwrap(), "1.35".parse::<Decimal>().unwrap());
    }

    #[test]
    fn invalid_station_rate_is_rejected() {
        let err = AppConfig::from_toml(
            r#"
            [[rates.stations]]
            station_id = "ST-1"
            electricity_fee_per_kwh = "-1"
            service_fee_per_kwh = "0"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn live_gateway_requires_base_url() {
        let err = AppConfig::from_toml(
            "[gateway]\nsandbox = false\nbase_url = \"\"\nsecret = \"9f2c4e7a1b3d5f60aa\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn gateway_secret_must_be_configured() {
        // Nothing configured: the live gateway has no key.
        assert!(matches!(AppConfig::from_toml(""), Err(ConfigError::Invalid(_))));
        assert!(AppConfig::default().validate().is_err());

        let placeholder = AppConfig::from_toml("[gateway]\nsecret = \"change-me\"\n");
        assert!(matches!(placeholder, Err(ConfigError::Invalid(_))));
        let weak_sandbox = AppConfig::from_toml("[gateway]\nsandbox = true\nsecret = \"change-me\"\n");
        assert!(matches!(weak_sandbox, Err(ConfigError::Invalid(_))));

        let live = AppConfig::from_toml("[gateway]\nsecret = \"9f2c4e7a1b3d5f60aa\"\n").unwrap();
        assert!(!live.gateway.sandbox);
    }

    #[test]
    fn retry_settings_map_to_retry_config() {
        let cfg = AppConfig::from_toml(
            "[settlement]\nretry_attempts = 0\nretry_initial_backoff_ms = 50\n[gateway]\nsandbox = true\n",
        )
        .unwrap();
        let retry = cfg.settlement.retry();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.initial_delay, Duration::from_millis(50));
    }
}
