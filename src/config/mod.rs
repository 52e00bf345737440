//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::round::RoundTimings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of plain text
    pub log_json: bool,

    /// Round state machine durations
    pub round_timings: RoundTimings,
    /// Period between pairing attempts
    pub matchmaking_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, used by `from_env` and tests
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let defaults = RoundTimings::default();
        let secs = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            parse_or(&lookup, name, default.as_secs()).map(Duration::from_secs)
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: match lookup("LOG_FORMAT").as_deref() {
                None | Some("text") => false,
                Some("json") => true,
                Some(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
            },

            round_timings: RoundTimings {
                warmup: secs("WARMUP_SECS", defaults.warmup)?,
                buy_time: secs("BUY_TIME_SECS", defaults.buy_time)?,
                round_time: secs("ROUND_TIME_SECS", defaults.round_time)?,
                bomb_fuse: secs("BOMB_FUSE_SECS", defaults.bomb_fuse)?,
                restart_delay: secs("ROUND_RESTART_SECS", defaults.restart_delay)?,
            },

            matchmaking_interval: match parse_or(&lookup, "MATCHMAKING_INTERVAL_MS", 1000)? {
                0 => return Err(ConfigError::Invalid("MATCHMAKING_INTERVAL_MS")),
                ms => Duration::from_millis(ms),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
