//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::target::DEFAULT_MIN_FETCH_INTERVAL;

/// Relay configuration, built from `SMS_RELAY_*` environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// libSQL database file holding the persisted destination.
    pub db_path: PathBuf,
    /// HTTP control surface port.
    pub port: u16,
    /// Remote config document URL. Remote refresh is disabled when unset.
    pub remote_config_url: Option<String>,
    pub remote_api_key: Option<SecretString>,
    /// Minimum spacing between remote fetches.
    pub min_fetch_interval: Duration,
    /// How often the background task attempts a remote refresh.
    pub refresh_tick: Duration,
    /// SMS gateway URL. Messages are only logged when unset.
    pub gateway_url: Option<String>,
    pub gateway_token: Option<SecretString>,
    /// Directory for a daily-rolling log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/sms-relay.db"),
            port: 8080,
            remote_config_url: None,
            remote_api_key: None,
            min_fetch_interval: DEFAULT_MIN_FETCH_INTERVAL,
            refresh_tick: Duration::from_secs(900), // 15 minutes
            gateway_url: None,
            gateway_token: None,
            log_dir: None,
        }
    }
}

impl RelayConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(get("SMS_RELAY_PORT"), "SMS_RELAY_PORT", defaults.port)?;

        let min_fetch_interval = parse_or(
            get("SMS_RELAY_FETCH_INTERVAL_SECS"),
            "SMS_RELAY_FETCH_INTERVAL_SECS",
            defaults.min_fetch_interval.as_secs(),
        )
        .map(Duration::from_secs)?;

        let refresh_tick_secs: u64 = parse_or(
            get("SMS_RELAY_REFRESH_TICK_SECS"),
            "SMS_RELAY_REFRESH_TICK_SECS",
            defaults.refresh_tick.as_secs(),
        )?;
        if refresh_tick_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SMS_RELAY_REFRESH_TICK_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            db_path: get("SMS_RELAY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            port,
            remote_config_url: get("SMS_RELAY_REMOTE_CONFIG_URL"),
            remote_api_key: get("SMS_RELAY_REMOTE_API_KEY").map(SecretString::from),
            min_fetch_interval,
            refresh_tick: Duration::from_secs(refresh_tick_secs),
            gateway_url: get("SMS_RELAY_GATEWAY_URL"),
            gateway_token: get("SMS_RELAY_GATEWAY_TOKEN").map(SecretString::from),
            log_dir: get("SMS_RELAY_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value:?}: {e}"),
        }),
    }
}
