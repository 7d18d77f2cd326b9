/*!
 * Error types for the PacFlow engine crate.
 */
use thiserror::Error;

/// Error type for PacFlow engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// A value could not be converted for the controller
    #[error("{0}")]
    Mapping(String),

    /// Invalid message property path
    #[error("Invalid property path: {0}")]
    Path(String),

    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] pacflow_devices::DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] pacflow_core::error::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Already exists error
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// Result type for PacFlow engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new mapping error
    pub fn mapping<S: AsRef<str>>(msg: S) -> Self {
        Error::Mapping(msg.as_ref().to_string())
    }

    /// Create a new path error
    pub fn path<S: AsRef<str>>(msg: S) -> Self {
        Error::Path(msg.as_ref().to_string())
    }

    /// Create a new validation error
    pub fn validation<S: AsRef<str>>(msg: S) -> Self {
        Error::Validation(msg.as_ref().to_string())
    }

    /// Create a new not found error
    pub fn not_found<S: AsRef<str>>(msg: S) -> Self {
        Error::NotFound(msg.as_ref().to_string())
    }

    /// Create a new already exists error
    pub fn already_exists<S: AsRef<str>>(msg: S) -> Self {
        Error::AlreadyExists(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
