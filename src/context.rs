#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::call_log::CallLog;
use crate::cloud::photon::PhotonClient;
use crate::cloud::CloudClient;
use crate::config::Config;
use crate::external_commands::{CommandRunner, ProcessRunner};
use crate::Result;
use std::sync::Arc;

/// Everything a handler needs for one call.
pub struct CpiContext {
    pub config: Config,
    pub client: Arc<dyn CloudClient>,
    pub runner: Arc<dyn CommandRunner>,
    pub log: CallLog,
}

impl CpiContext {
    #[must_use]
    pub fn new(
        config: Config,
        client: Arc<dyn CloudClient>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            client,
            runner,
            log: CallLog::new(),
        }
    }

    /// Context wired to the Photon API and local processes.
    ///
    /// # Errors
    /// Returns `CpiError::Cloud` when the HTTP client cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = PhotonClient::new(&config.photon)?;
        Ok(Self::new(
            config,
            Arc::new(client),
            Arc::new(ProcessRunner::default()),
        ))
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.config.photon.project_id
    }
}
