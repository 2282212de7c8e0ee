//! Environment-backed runtime configuration for `ternchat-cli`.

use std::{
    env,
    error::Error,
    fmt,
    path::PathBuf,
};

use url::Url;

use client_core::protocol::ENDPOINT_PATH;

const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8080/ws";
const DEFAULT_TOKEN_FILE: &str = "./.ternchat-token";
const DEFAULT_COMMAND_BUFFER: usize = 64;
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Runtime configuration used by the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// WebSocket endpoint of the chat server.
    pub endpoint: String,
    /// Token supplied directly via environment, when present.
    pub token: Option<String>,
    /// File the token is persisted in between runs.
    pub token_file: PathBuf,
    /// Append own messages before the server echoes them back.
    pub optimistic_send: bool,
    /// Runtime command channel depth.
    pub command_buffer: usize,
    /// Runtime event broadcast depth.
    pub event_buffer: usize,
}

impl CliConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let endpoint_raw = optional_trimmed_env("TERNCHAT_ENDPOINT", &mut lookup)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
        let endpoint =
            normalize_endpoint(&endpoint_raw).map_err(|reason| ConfigError::InvalidValue {
                key: "TERNCHAT_ENDPOINT",
                value: endpoint_raw,
                reason,
            })?;

        let token = optional_trimmed_env("TERNCHAT_TOKEN", &mut lookup);
        let token_file = optional_trimmed_env("TERNCHAT_TOKEN_FILE", &mut lookup)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE));

        let optimistic_send =
            parse_optional_bool("TERNCHAT_OPTIMISTIC_SEND", false, &mut lookup)?;
        let command_buffer = parse_optional_usize(
            "TERNCHAT_COMMAND_BUFFER",
            DEFAULT_COMMAND_BUFFER,
            &mut lookup,
        )?;
        let event_buffer =
            parse_optional_usize("TERNCHAT_EVENT_BUFFER", DEFAULT_EVENT_BUFFER, &mut lookup)?;

        if command_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TERNCHAT_COMMAND_BUFFER",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if event_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TERNCHAT_EVENT_BUFFER",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            endpoint,
            token,
            token_file,
            optimistic_send,
            command_buffer,
            event_buffer,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn normalize_endpoint(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("endpoint is required".to_owned());
    }

    let candidate = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("ws://{raw}")
    };

    let mut parsed = Url::parse(&candidate).map_err(|err| format!("invalid URL: {err}"))?;
    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err("only ws:// and wss:// endpoints are supported".to_owned());
    }
    if parsed.host_str().is_none() {
        return Err("endpoint must include a host".to_owned());
    }
    if parsed.path().is_empty() || parsed.path() == "/" {
        parsed.set_path(ENDPOINT_PATH);
    }

    Ok(parsed.to_string())
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_bool<F>(
    key: &'static str,
    default: bool,
    lookup: &mut F,
) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean (true/false/1/0)".to_owned(),
        }),
    }
}

fn parse_optional_usize<F>(
    key: &'static str,
    default: usize,
    lookup: &mut F,
) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    value
        .parse::<usize>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
