#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::agent_env::{null_as_default, BlobstoreSpec};
use crate::{CpiError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TASK_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 1_800;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub photon: PhotonConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotonConfig {
    pub target: String,
    #[serde(rename = "project")]
    pub project_id: String,
    #[serde(rename = "ignore_cert", default)]
    pub ignore_certificate: bool,
    #[serde(rename = "user", default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub task_poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
}

impl PhotonConfig {
    /// True when the deployment authenticates against the control plane.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        let non_empty = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        non_empty(&self.token) || (non_empty(&self.username) && non_empty(&self.password))
    }

    #[must_use]
    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.task_poll_interval_ms
                .unwrap_or(DEFAULT_TASK_POLL_INTERVAL_MS),
        )
    }

    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs.unwrap_or(DEFAULT_TASK_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub mbus: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ntp: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub blobstore: BlobstoreSpec,
}

/// # Errors
/// Returns `CpiError::Io` when the file cannot be read and
/// `CpiError::Config` when its content is not a valid configuration.
pub async fn load_config(path: &Path) -> Result<Config> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_config_content(&content)
}

/// # Errors
/// Returns `CpiError::Config` for malformed JSON or invalid values.
pub fn parse_config_content(content: &str) -> Result<Config> {
    let mut config: Config = serde_json::from_str(content)
        .map_err(|e| CpiError::Config(format!("Failed to parse config: {e}")))?;

    config.photon.username = config.photon.username.as_deref().map(expand_env_vars);
    config.photon.password = config.photon.password.as_deref().map(expand_env_vars);
    config.photon.token = config.photon.token.as_deref().map(expand_env_vars);

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    Url::parse(&config.photon.target).map_err(|e| {
        CpiError::Config(format!(
            "Invalid photon target '{}': {e}",
            config.photon.target
        ))
    })?;

    if config.photon.project_id.trim().is_empty() {
        return Err(CpiError::Config(
            "photon.project must not be empty".to_string(),
        ));
    }

    if config.photon.task_poll_interval_ms == Some(0) {
        return Err(CpiError::Config(
            "photon.task_poll_interval_ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_part = &result[start + 2..start + end];
            let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
            let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
            result.replace_range(start..=(start + end), &value);
        } else {
            break;
        }
    }
    result
}
