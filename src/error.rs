#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::cloud::CloudError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error kinds understood by the BOSH director.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "Bosh::Clouds::CloudError")]
    CloudError,
    #[serde(rename = "Bosh::Clouds::CpiError")]
    CpiError,
    #[serde(rename = "Bosh::Clouds::NotImplemented")]
    NotImplementedError,
    #[serde(rename = "Bosh::Clouds::NotSupported")]
    NotSupportedError,
    #[serde(rename = "Bosh::Clouds::VMNotFound")]
    VmNotFoundError,
    #[serde(rename = "Bosh::Clouds::DiskNotFound")]
    DiskNotFoundError,
    #[serde(rename = "Bosh::Clouds::DiskNotAttached")]
    DiskNotAttachedError,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CloudError => "Bosh::Clouds::CloudError",
            Self::CpiError => "Bosh::Clouds::CpiError",
            Self::NotImplementedError => "Bosh::Clouds::NotImplemented",
            Self::NotSupportedError => "Bosh::Clouds::NotSupported",
            Self::VmNotFoundError => "Bosh::Clouds::VMNotFound",
            Self::DiskNotFoundError => "Bosh::Clouds::DiskNotFound",
            Self::DiskNotAttachedError => "Bosh::Clouds::DiskNotAttached",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positional argument decoding failures.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("Expected at least {expected} arguments, got {got}")]
    MissingArguments { expected: usize, got: usize },

    #[error("Unexpected argument where {name} should be: expected {expected}, got {got}")]
    InvalidType {
        name: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Error)]
pub enum CpiError {
    /// Raised deliberately by a handler; kind and retry flag are final.
    #[error("{message}")]
    Classified {
        kind: ErrorKind,
        can_retry: bool,
        message: String,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Failed to generate ISO for agent settings: {message}\n{output}")]
    MediaRender { message: String, output: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CpiError {
    pub fn bosh(kind: ErrorKind, can_retry: bool, message: impl Into<String>) -> Self {
        Self::Classified {
            kind,
            can_retry,
            message: message.into(),
        }
    }

    pub fn cpi(cause: impl fmt::Display, context: impl fmt::Display) -> Self {
        Self::bosh(
            ErrorKind::CpiError,
            false,
            format!("CPI error: '{context}' | Caused by: '{cause}'"),
        )
    }

    #[must_use]
    pub fn vm_not_found(vm_id: &str) -> Self {
        Self::bosh(
            ErrorKind::VmNotFoundError,
            false,
            format!("VM '{vm_id}' not found"),
        )
    }

    #[must_use]
    pub fn disk_not_found(disk_id: &str, can_retry: bool) -> Self {
        Self::bosh(
            ErrorKind::DiskNotFoundError,
            can_retry,
            format!("Disk '{disk_id}' not found"),
        )
    }

    #[must_use]
    pub fn disk_not_attached(disk_id: &str, vm_id: &str, can_retry: bool) -> Self {
        Self::bosh(
            ErrorKind::DiskNotAttachedError,
            can_retry,
            format!("Disk '{disk_id}' not attached to VM '{vm_id}'"),
        )
    }

    /// Maps this error onto the director's taxonomy.
    ///
    /// Evaluated top to bottom: a handler-declared classification wins,
    /// then rejected or failed remote operations, then transient remote
    /// failures, and everything else is a non-retryable `CpiError`.
    #[must_use]
    pub fn classify(&self) -> (ErrorKind, bool) {
        match self {
            Self::Classified {
                kind, can_retry, ..
            } => (*kind, *can_retry),
            Self::Cloud(CloudError::Api { .. } | CloudError::Task { .. }) => {
                (ErrorKind::CloudError, false)
            }
            Self::Cloud(CloudError::Transport(_) | CloudError::TaskTimeout { .. }) => {
                (ErrorKind::CloudError, true)
            }
            Self::Cloud(CloudError::LocalFile(_))
            | Self::Argument(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Metadata(_)
            | Self::MediaRender { .. }
            | Self::Internal(_) => (ErrorKind::CpiError, false),
        }
    }
}

pub type Result<T> = std::result::Result<T, CpiError>;
