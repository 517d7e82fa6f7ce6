use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache;
use crate::ledger::http::ResponseFormat;
use crate::reconstruct::RetryPolicy;
use crate::session::DEFAULT_MAX_SESSIONS;
use crate::transmit::DEFAULT_CONCURRENCY;

pub const DEFAULT_CONFIG: &str = r#"
    database = "chainfile.sqlite"

    [[backends]]
        name = "local"
        type = "Local"
"#;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("backend {0} needs a url")]
    MissingUrl(String),
    #[error("no backends configured")]
    NoBackends,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Sqlite file for sessions, cache and the local ledger, in memory when
    /// unset
    pub database: Option<PathBuf>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_verify")]
    pub verify: bool,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    pub backends: Vec<Backend>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size_bytes: u64,
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_size_bytes: cache::DEFAULT_MAX_SIZE,
            max_age_secs: cache::DEFAULT_MAX_AGE.as_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        RetryConfig {
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Backend {
    pub name: String,

    #[serde(rename = "type")]
    pub backend_type: BackendType,

    /// Url template for `Http`, `{id}` is swapped for the record id
    pub url: Option<String>,

    #[serde(default)]
    pub format: ResponseFormat,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Local,
    Http,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_verify() -> bool {
    true
}

impl Config {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            None => Config::parse(DEFAULT_CONFIG),
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Config::parse(&raw)
            }
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.cache.max_age_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        for backend in &self.backends {
            if backend.backend_type == BackendType::Http && backend.url.is_none() {
                return Err(ConfigError::MissingUrl(backend.name.clone()));
            }
        }
        Ok(())
    }
}
