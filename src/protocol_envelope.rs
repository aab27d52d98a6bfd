#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::error::{CpiError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A method call read from standard input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub result: Option<Value>,
    pub error: Option<ResponseError>,
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(rename = "ok_to_retry")]
    pub can_retry: bool,
}

impl Response {
    #[must_use]
    pub const fn success(result: Value, log: String) -> Self {
        Self {
            result: Some(result),
            error: None,
            log,
        }
    }

    #[must_use]
    pub fn error(kind: ErrorKind, can_retry: bool, message: String, log: String) -> Self {
        Self {
            result: None,
            error: Some(ResponseError {
                kind,
                message,
                can_retry,
            }),
            log,
        }
    }

    #[must_use]
    pub fn from_error(error: &CpiError, log: String) -> Self {
        let (kind, can_retry) = error.classify();
        Self::error(kind, can_retry, error.to_string(), log)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Serialized response document; never fails so the caller always has
    /// something to print.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            let fallback = Self::error(
                ErrorKind::CpiError,
                false,
                format!("Failed to serialize response: {e}"),
                self.log.clone(),
            );
            serde_json::to_string(&fallback).unwrap_or_else(|_| {
                r#"{"result":null,"error":{"type":"Bosh::Clouds::CpiError","message":"Failed to serialize response","ok_to_retry":false},"log":""}"#
                    .to_string()
            })
        })
    }
}
