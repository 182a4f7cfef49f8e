//! Service configuration
//!
//! Everything is read from the environment once at startup.

use std::time::Duration;
use thiserror::Error;

/// Semantic model offered when `ANALYST_SEMANTIC_MODELS` is not set
pub const DEFAULT_SEMANTIC_MODEL: &str =
    "@DEV_ARENAFLOW.AI_ML.SEMANTIC_MODELS/tweet_metrics.yaml";

/// Question asked on behalf of the user when a conversation is empty
pub const DEFAULT_OPENING_QUESTION: &str = "What questions can I ask?";

/// Model used for result summaries
pub const DEFAULT_COMPLETE_MODEL: &str = "mistral-large2";

/// Sessions untouched this long, with no stream attached, are dropped
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TOKEN_TYPE: &str = "OAUTH";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Connection settings for the Snowflake account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnowflakeConfig {
    /// e.g. `https://myorg-myaccount.snowflakecomputing.com`
    pub account_url: String,
    pub token: String,
    /// Value of `X-Snowflake-Authorization-Token-Type`
    pub token_type: String,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
}

/// Per-session behaviour shared by every conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Closed list of selectable semantic models; the first one is the default
    pub semantic_models: Vec<String>,
    /// Maximum number of messages resent per turn. `None` resends everything.
    pub history_window: Option<usize>,
    pub opening_question: Option<String>,
    pub idle_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            semantic_models: vec![DEFAULT_SEMANTIC_MODEL.to_string()],
            history_window: None,
            opening_question: Some(DEFAULT_OPENING_QUESTION.to_string()),
            idle_timeout: DEFAULT_SESSION_IDLE,
        }
    }
}

impl SessionSettings {
    pub fn default_semantic_model(&self) -> &str {
        self.semantic_models
            .first()
            .map_or(DEFAULT_SEMANTIC_MODEL, String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub snowflake: SnowflakeConfig,
    pub session: SessionSettings,
    pub complete_model: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Blank values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let account_url = get("SNOWFLAKE_ACCOUNT_URL")
            .ok_or(ConfigError::Missing("SNOWFLAKE_ACCOUNT_URL"))?
            .trim_end_matches('/')
            .to_string();
        let token = get("SNOWFLAKE_TOKEN").ok_or(ConfigError::Missing("SNOWFLAKE_TOKEN"))?;

        let snowflake = SnowflakeConfig {
            account_url,
            token,
            token_type: get("SNOWFLAKE_TOKEN_TYPE").unwrap_or_else(|| DEFAULT_TOKEN_TYPE.into()),
            warehouse: get("SNOWFLAKE_WAREHOUSE"),
            database: get("SNOWFLAKE_DATABASE"),
            schema: get("SNOWFLAKE_SCHEMA"),
            role: get("SNOWFLAKE_ROLE"),
        };

        let semantic_models: Vec<String> = get("ANALYST_SEMANTIC_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_else(|| vec![DEFAULT_SEMANTIC_MODEL.to_string()]);
        if semantic_models.is_empty() {
            return Err(ConfigError::Invalid {
                var: "ANALYST_SEMANTIC_MODELS",
                value: lookup("ANALYST_SEMANTIC_MODELS").unwrap_or_default(),
            });
        }

        let history_window = match get("ANALYST_HISTORY_WINDOW") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "ANALYST_HISTORY_WINDOW",
                        value: raw,
                    })
                }
            },
            None => None,
        };

        // Set-but-empty disables the opening question
        let opening_question = match lookup("ANALYST_OPENING_QUESTION") {
            Some(q) if q.trim().is_empty() => None,
            Some(q) => Some(q),
            None => Some(DEFAULT_OPENING_QUESTION.to_string()),
        };

        let idle_timeout = match get("ANALYST_SESSION_IDLE_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "ANALYST_SESSION_IDLE_SECS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_SESSION_IDLE,
        };

        let port = match get("ANALYST_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "ANALYST_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            snowflake,
            session: SessionSettings {
                semantic_models,
                history_window,
                opening_question,
                idle_timeout,
            },
            complete_model: get("ANALYST_COMPLETE_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETE_MODEL.to_string()),
            port,
        })
    }
}
