//! # Groundhub errors
//!
//! All fallible operations return [`Result`], an alias for `core::result::Result<T, Error>`.
//! Steady-state loops never propagate these errors to the process: they log them and either drop
//! the offending unit of work or rebuild the failed resource.

use thiserror::Error;

/// Common result type returned by Groundhub functions and methods.
pub type Result<T> = core::result::Result<T, Error>;

/// Groundhub error.
#[derive(Debug, Error)]
pub enum Error {
    /// `std::io` error.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// MAVLink transport or framing error produced by [`mavio`].
    #[error("MAVLink error: {0:?}")]
    Mavlink(#[from] mavio::error::Error),

    /// MAVLink message specification error (payload can't be encoded or decoded).
    #[error("MAVLink spec error: {0:?}")]
    Spec(mavio::error::SpecError),

    /// <sup>`serial`</sup>
    /// Serial port can't be opened.
    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport descriptor can't be parsed.
    #[error("invalid transport descriptor `{descriptor}`: {reason}")]
    Descriptor {
        /// Descriptor as provided.
        descriptor: String,
        /// Explanation.
        reason: &'static str,
    },

    /// Message bus error.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Interop server error.
    #[error("interop error: {0}")]
    Interop(#[from] InteropError),

    /// Mission reporter is not started yet.
    #[error("mission reporter is not started")]
    NotStarted,

    /// Connection manager is stopped and can't accept requests.
    #[error("connection manager is stopped")]
    ManagerStopped,
}

/// Message bus errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// There is no topic with such name.
    #[error("unknown topic `{0}`")]
    UnknownTopic(String),
    /// There is no endpoint with such name.
    #[error("unknown endpoint `{0}`")]
    UnknownEndpoint(String),
    /// Topic with this name is already registered.
    #[error("duplicate topic `{0}`")]
    DuplicateTopic(String),
    /// Topic dispatcher is gone.
    #[error("topic `{0}` is closed")]
    TopicClosed(String),
}

/// Interop server errors.
#[derive(Clone, Debug, Error)]
pub enum InteropError {
    /// Login was rejected.
    #[error("login rejected with status {0}")]
    Auth(u16),
    /// Non-success response status.
    #[error("request to `{path}` failed with status {status}")]
    Status {
        /// Request path.
        path: String,
        /// HTTP status code.
        status: u16,
    },
    /// Network-level error.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<mavio::error::SpecError> for Error {
    fn from(value: mavio::error::SpecError) -> Self {
        Self::Spec(value)
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Interop(InteropError::Http(value.to_string()))
    }
}

#[cfg(feature = "serial")]
impl From<tokio_serial::Error> for Error {
    fn from(value: tokio_serial::Error) -> Self {
        Self::Serial(value.to_string())
    }
}

impl Error {
    /// Returns `true` if error is caused by a broken transport rather than by bad data.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Io(_) | Error::Mavlink(mavio::error::Error::Io(_)) => true,
            #[cfg(feature = "serial")]
            Error::Serial(_) => true,
            _ => false,
        }
    }
}
