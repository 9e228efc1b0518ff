use std::time::Duration;

use thiserror::Error;

use crate::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL_PREFERENCES, MODEL_NAMESPACE_PREFIX};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LIST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set in .env")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("model preference list is empty")]
    EmptyPreferences,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub base_url: String,
    /// Ordered candidates, variant spellings of one logical model included.
    pub model_preferences: Vec<String>,
    /// Prefix removed from the resolved identifier. `None` keeps names as listed.
    pub strip_prefix: Option<String>,
    pub list_timeout: Duration,
    pub request_timeout: Duration,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("GEMINI_API_KEY").ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        let base_url = get("GEMINI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let model_preferences = match get("GEMINI_MODEL_PREFERENCES") {
            Some(raw) => {
                let list: Vec<String> = raw
                    .split(',')
                    .map(|m| m.trim())
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect();
                if list.is_empty() {
                    return Err(ConfigError::EmptyPreferences);
                }
                list
            }
            None => DEFAULT_MODEL_PREFERENCES.iter().map(|m| m.to_string()).collect(),
        };

        // Present but blank disables stripping; absent uses the default prefix.
        let strip_prefix = match lookup("GEMINI_STRIP_PREFIX") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => Some(MODEL_NAMESPACE_PREFIX.to_string()),
        };

        let list_timeout = Duration::from_secs(parse_number(
            "GEMINI_LIST_TIMEOUT_SECS",
            get("GEMINI_LIST_TIMEOUT_SECS"),
            DEFAULT_LIST_TIMEOUT_SECS,
        )?);
        let request_timeout = Duration::from_secs(parse_number(
            "GEMINI_REQUEST_TIMEOUT_SECS",
            get("GEMINI_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        let port = parse_number("PORT", get("PORT"), DEFAULT_PORT)?;

        Ok(Self {
            api_key,
            base_url,
            model_preferences,
            strip_prefix,
            list_timeout,
            request_timeout,
            port,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
