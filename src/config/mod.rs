use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::buffer::BufferError;

/// Precision of the `time` field on written points, sent verbatim as the
/// `time_precision` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePrecision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimePrecision {
    pub fn as_str(self) -> &'static str {
        match self {
            TimePrecision::Nanoseconds => "n",
            TimePrecision::Microseconds => "u",
            TimePrecision::Milliseconds => "ms",
            TimePrecision::Seconds => "s",
            TimePrecision::Minutes => "m",
            TimePrecision::Hours => "h",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "n" => Some(TimePrecision::Nanoseconds),
            "u" => Some(TimePrecision::Microseconds),
            "ms" => Some(TimePrecision::Milliseconds),
            "s" => Some(TimePrecision::Seconds),
            "m" => Some(TimePrecision::Minutes),
            "h" => Some(TimePrecision::Hours),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("INFLUX_RELAY_URL is required but not set")]
    UrlMissing,

    #[error("INFLUX_RELAY_URL is not a valid URL: {0}")]
    UrlInvalid(String),

    #[error("destination URL cannot carry a path: {0}")]
    UrlCannotBeBase(String),

    #[error("INFLUX_RELAY_USER is required but not set")]
    UserMissing,

    #[error("INFLUX_RELAY_PASSWORD is required but not set")]
    PasswordMissing,

    #[error(
        "INFLUX_RELAY_TIME_PRECISION has invalid value: {0} (expected one of n, u, ms, s, m, h)"
    )]
    InvalidTimePrecision(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("{0} must be positive")]
    NonPositive(String),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

#[derive(Debug)]
pub struct Config {
    pub url: Url,
    pub db: String,
    pub user: String,
    pub password: String,
    pub time_precision: TimePrecision,
    pub flush_size: usize,
    pub idle_flush_time: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("INFLUX_RELAY_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let url = parse_url(vars)?;
        let db = vars
            .get("INFLUX_RELAY_DB")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "stats".to_owned());
        let user = required(vars, "INFLUX_RELAY_USER", ConfigError::UserMissing)?;
        let password = required(vars, "INFLUX_RELAY_PASSWORD", ConfigError::PasswordMissing)?;
        let time_precision = parse_time_precision(vars)?;
        let flush_size = parse_flush_size(vars)?;
        let idle_flush_time = parse_idle_flush_time(vars)?;

        Ok(Self {
            url,
            db,
            user,
            password,
            time_precision,
            flush_size,
            idle_flush_time,
        })
    }
}

fn parse_url(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = vars
        .get("INFLUX_RELAY_URL")
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::UrlMissing)?;

    Url::parse(raw).map_err(|_| ConfigError::UrlInvalid(raw.clone()))
}

fn required(
    vars: &HashMap<String, String>,
    name: &str,
    missing: ConfigError,
) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|s| !s.is_empty())
        .cloned()
        .ok_or(missing)
}

fn parse_time_precision(vars: &HashMap<String, String>) -> Result<TimePrecision, ConfigError> {
    match vars.get("INFLUX_RELAY_TIME_PRECISION") {
        Some(raw) => {
            TimePrecision::parse(raw).ok_or_else(|| ConfigError::InvalidTimePrecision(raw.clone()))
        }
        None => Ok(TimePrecision::Seconds),
    }
}

fn parse_flush_size(vars: &HashMap<String, String>) -> Result<usize, ConfigError> {
    let name = "INFLUX_RELAY_FLUSH_SIZE";
    match vars.get(name) {
        Some(val) => {
            let size: usize = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            if size == 0 {
                Err(ConfigError::NonPositive(name.to_owned()))
            } else {
                Ok(size)
            }
        }
        None => Ok(100),
    }
}

fn parse_idle_flush_time(vars: &HashMap<String, String>) -> Result<Duration, ConfigError> {
    let name = "INFLUX_RELAY_IDLE_FLUSH_TIME";
    match vars.get(name) {
        Some(val) => {
            let secs: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            if secs == 0 {
                Err(ConfigError::NonPositive(name.to_owned()))
            } else {
                Ok(Duration::from_secs(secs))
            }
        }
        None => Ok(Duration::from_secs(10)),
    }
}
