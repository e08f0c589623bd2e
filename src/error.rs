//! # RFPlayer Error Handling
//!
//! This module defines the RfpError enum, which represents the different error
//! types that can occur in the rfplayer-rs crate, and the `Report` value handed
//! back to external callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Represents the different error types that can occur in the RFPlayer crate.
#[derive(Debug, Error)]
pub enum RfpError {
    /// Open/read/write failure on the physical link.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The dongle answered HELLO with an unexpected identification.
    #[error("Bad identification: {0}")]
    BadIdentification(String),

    /// An operation needed an open channel.
    #[error("Dongle not open: {0}")]
    NotOpen(String),

    /// A line without one of the known sync headers.
    #[error("Unsynced data: {0}")]
    Unsynced(String),

    /// Indicates an error when parsing an RFPlayer frame.
    #[error("Error parsing RFPlayer frame: {0}")]
    FrameParse(String),

    /// A tracked request got no matching reply in its window.
    #[error("No reply for request {req_num} ({command})")]
    CorrelationTimeout { req_num: u32, command: String },

    /// Frame protocol outside the InfoType whitelist, or no sensor mapping.
    #[error("Decode mismatch: {0}")]
    DecodeMismatch(String),

    /// Unknown parameter, out of range value or malformed spec.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client is locked by a long running operation.
    #[error("Client locked: {0}")]
    Locked(String),

    /// Indicates a nom parsing error.
    #[error("Nom error: {0}")]
    NomError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch‑all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}

impl From<tokio_serial::Error> for RfpError {
    fn from(e: tokio_serial::Error) -> Self {
        RfpError::Transport(e.to_string())
    }
}

impl<E: std::fmt::Debug> From<nom::Err<E>> for RfpError {
    fn from(e: nom::Err<E>) -> Self {
        RfpError::NomError(format!("{e:?}"))
    }
}

impl RfpError {
    /// True for the failures that end the dongle session.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RfpError::Transport(_) | RfpError::BadIdentification(_) | RfpError::Io(_)
        )
    }
}

/// Structured result returned to callers: an `error` string (empty on
/// success) plus free-form fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub error: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Report {
    pub fn ok() -> Self {
        Report::default()
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Report {
            error: msg.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Null)
    }
}

impl From<RfpError> for Report {
    fn from(e: RfpError) -> Self {
        Report::error(e.to_string())
    }
}

impl From<Result<(), RfpError>> for Report {
    fn from(r: Result<(), RfpError>) -> Self {
        match r {
            Ok(()) => Report::ok(),
            Err(e) => e.into(),
        }
    }
}
