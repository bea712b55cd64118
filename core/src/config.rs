use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

const API_URL_VAR: &str = "ASSESSOR_API_URL";
const API_TOKEN_VAR: &str = "ASSESSOR_API_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api: ApiSettings,
    pub poll_interval: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("API not configured: create assessor.yaml or set ASSESSOR_API_URL.")]
    Missing,
    #[error("API configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Missing => {
                "API not configured: create assessor.yaml or set ASSESSOR_API_URL.".to_string()
            }
            Self::Invalid(detail) => format!("API not configured: {detail}. Update assessor.yaml."),
        }
    }
}

/// Values that take precedence over both the file and the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub poll_interval: Option<Duration>,
}

impl ClientSettings {
    /// Resolve settings from `explicit` (or the first config file found in the
    /// usual locations), then the environment, then `overrides`.
    pub fn load(explicit: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = match explicit {
            Some(path) => Some(read_config(path)?),
            None => match locate_config_file() {
                Some(path) => Some(read_config(&path)?),
                None => None,
            },
        };
        let env = Overrides {
            base_url: std::env::var(API_URL_VAR).ok(),
            token: std::env::var(API_TOKEN_VAR).ok(),
            poll_interval: None,
        };
        resolve(file, env, overrides)
    }
}

fn read_config(path: &Path) -> Result<AssessorConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_yaml::from_str(&contents)
        .map_err(|err| ConfigError::Invalid(format!("invalid assessor.yaml: {err}")))
}

fn resolve(
    file: Option<AssessorConfig>,
    env: Overrides,
    overrides: Overrides,
) -> Result<ClientSettings, ConfigError> {
    let file = file.unwrap_or_default();
    let api = file.api.unwrap_or_default();
    let polling = file.polling.unwrap_or_default();

    let base_url = overrides
        .base_url
        .or(env.base_url)
        .or(api.base_url)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or(ConfigError::Missing)?;
    let token = overrides
        .token
        .or(env.token)
        .or(api.token)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    let timeout = match api.timeout_secs {
        Some(0) => return Err(ConfigError::Invalid("api.timeout_secs must be > 0".into())),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_TIMEOUT,
    };
    let poll_interval = match overrides.poll_interval {
        Some(interval) => interval,
        None => match polling.interval_ms {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "polling.interval_ms must be > 0".into(),
                ))
            }
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_POLL_INTERVAL,
        },
    };

    Ok(ClientSettings {
        api: ApiSettings {
            base_url,
            token,
            timeout,
        },
        poll_interval,
    })
}

fn locate_config_file() -> Option<PathBuf> {
    config_candidates().into_iter().find(|path| path.exists())
}

fn config_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("assessor");
        paths.push(config_dir.join("assessor.yaml"));
        paths.push(config_dir.join("assessor.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".assessor").join("assessor.yaml"));
        paths.push(home_dir.join(".assessor").join("assessor.yml"));
    } else {
        paths.push(PathBuf::from("assessor.yaml"));
        paths.push(PathBuf::from("assessor.yml"));
    }
    paths
}

#[derive(Debug, Default, Deserialize)]
struct AssessorConfig {
    api: Option<ApiSection>,
    polling: Option<PollingSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSection {
    base_url: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PollingSection {
    interval_ms: Option<u64>,
}
