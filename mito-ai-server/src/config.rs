//! Server configuration from environment variables (after `.env` is loaded).
//!
//! | variable | default |
//! |---|---|
//! | `OPENAI_API_KEY` | unset (metered Mito server) |
//! | `OPENAI_MODEL` | `gpt-4o-mini` |
//! | `OPENAI_TEMPERATURE` | `0` |
//! | `OPENAI_MAX_COMPLETION_TOKENS` | unset |
//! | `MITO_AI_BIND_ADDR` | `127.0.0.1:8888` |
//! | `MITO_AI_TOKEN` | unset (anonymous access) |
//! | `MITO_AI_ALLOWED_ORIGINS` | unset (same-host browser origins only) |
//! | `MITO_AI_URL` | Mito production completions endpoint |
//! | `MITO_AI_PRO` | `false` |
//! | `MITO_AI_FREE_TIER_LIMIT` | `500` |
//! | `MITO_USER_JSON` | `~/.mito/user.json` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8888";
pub const DEFAULT_MITO_AI_URL: &str =
    "https://ogtzairktg.execute-api.us-east-1.amazonaws.com/Prod/completions/";
pub const DEFAULT_FREE_TIER_LIMIT: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("OPENAI_TEMPERATURE must be between 0 and 2, got {0}")]
    TemperatureOutOfRange(f32),

    #[error("could not determine the home directory; set MITO_USER_JSON")]
    NoHomeDir,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_completion_tokens: Option<u32>,
    pub bind_addr: SocketAddr,
    pub token: Option<String>,
    /// Browser origins besides the server's own host that may open a socket.
    pub allowed_origins: Vec<String>,
    pub mito_ai_url: String,
    pub is_pro: bool,
    pub free_tier_limit: u64,
    pub user_json_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = get("OPENAI_API_KEY");
        if let Some(key) = &openai_api_key {
            if !key.starts_with("sk-") {
                warn!("OPENAI_API_KEY doesn't start with 'sk-'. Please check your .env file");
            }
        }

        let temperature = parse_or("OPENAI_TEMPERATURE", get("OPENAI_TEMPERATURE"), 0.0_f32)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::TemperatureOutOfRange(temperature));
        }

        let max_completion_tokens = get("OPENAI_MAX_COMPLETION_TOKENS")
            .map(|v| parse("OPENAI_MAX_COMPLETION_TOKENS", v))
            .transpose()?;

        let bind_addr = parse(
            "MITO_AI_BIND_ADDR",
            get("MITO_AI_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        let user_json_path = match get("MITO_USER_JSON") {
            Some(path) => PathBuf::from(path),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoHomeDir)?
                .join(".mito")
                .join("user.json"),
        };

        Ok(Self {
            openai_api_key,
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            max_completion_tokens,
            bind_addr,
            token: get("MITO_AI_TOKEN"),
            allowed_origins: get("MITO_AI_ALLOWED_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            mito_ai_url: get("MITO_AI_URL").unwrap_or_else(|| DEFAULT_MITO_AI_URL.to_string()),
            is_pro: parse_bool("MITO_AI_PRO", get("MITO_AI_PRO"))?,
            free_tier_limit: parse_or(
                "MITO_AI_FREE_TIER_LIMIT",
                get("MITO_AI_FREE_TIER_LIMIT"),
                DEFAULT_FREE_TIER_LIMIT,
            )?,
            user_json_path,
        })
    }
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { var, value })
}

fn parse_or<T: FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    value.map_or(Ok(default), |v| parse(var, v))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().trim_end_matches('/').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_bool(var: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no") => Ok(false),
        Some(_) => Err(ConfigError::InvalidValue {
            var,
            value: value.unwrap_or_default(),
        }),
    }
}
