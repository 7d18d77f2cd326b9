/*!
 * Error types for controller communication.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A failure below the HTTP layer, described the way socket errors are
/// usually reported: an OS-style code plus the system call that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    /// OS-style error code such as `ECONNREFUSED`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// The system call that failed, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syscall: Option<String>,
    /// Human readable reason
    pub message: String,
}

impl TransportError {
    /// Create a transport error carrying an OS-style code
    pub fn with_code<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            code: Some(code.into()),
            syscall: None,
            message: message.into(),
        }
    }

    /// Create a transport error without a code
    pub fn reason<M: Into<String>>(message: M) -> Self {
        Self {
            code: None,
            syscall: None,
            message: message.into(),
        }
    }

    /// Attach the failing system call
    pub fn with_syscall<S: Into<String>>(mut self, syscall: S) -> Self {
        self.syscall = Some(syscall.into());
        self
    }

    /// Whether the error code matches `code`
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Error type for controller operations
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    /// The request never produced an HTTP response
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// The controller answered with a non-success status
    #[error("HTTP response error: {status}")]
    Response {
        /// HTTP status code
        status: u16,
        /// Response body, parsed as JSON when possible
        body: Value,
    },

    /// The controller answered but speaks neither known dialect
    #[error("Unknown device type")]
    UnknownDeviceType,

    /// The connection or request is misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A request or response could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    /// Create a new configuration error
    pub fn configuration<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Configuration(msg.as_ref().to_string())
    }

    /// Create a new serialization error
    pub fn serialization<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Serialization(msg.as_ref().to_string())
    }

    /// The transport error, if this is one
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            DeviceError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for DeviceError {
    fn from(err: TransportError) -> Self {
        DeviceError::Transport(err)
    }
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        DeviceError::Serialization(err.to_string())
    }
}

impl From<DeviceError> for pacflow_core::error::Error {
    fn from(err: DeviceError) -> Self {
        pacflow_core::error::Error::other(err.to_string())
    }
}
