use std::time::Duration;
use thiserror::Error;

/// The main error type for hotkey-portal operations
#[derive(Error, Debug)]
pub enum Error {
    /// Key normalization or accelerator parsing rejected the input
    #[error("Invalid accelerator: {0}")]
    InvalidAccelerator(String),

    /// The native grab was refused, usually because the combination is bound elsewhere
    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    /// The portal answered with something other than what the protocol allows
    #[error("Portal protocol violation: {0}")]
    ProtocolViolation(String),

    /// The GlobalShortcuts portal could not be reached or set up
    #[error("Portal connection failed: {0}")]
    ConnectionFailure(String),

    /// No response arrived on a request path within the configured bound
    #[error("Portal request {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    /// The portal responded, but with a non-zero response code
    #[error("Portal request failed with response code {code}")]
    RequestFailed { code: u32 },

    /// Error reported by the message bus itself
    #[error("Bus error: {0}")]
    Bus(String),

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the portal reported that the user dismissed the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::RequestFailed { code: 1 })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<global_hotkey::Error> for Error {
    fn from(err: global_hotkey::Error) -> Self {
        Error::RegistrationRejected(err.to_string())
    }
}

impl From<zbus::Error> for Error {
    fn from(err: zbus::Error) -> Self {
        Error::Bus(err.to_string())
    }
}

impl From<zbus::zvariant::Error> for Error {
    fn from(err: zbus::zvariant::Error) -> Self {
        Error::ProtocolViolation(err.to_string())
    }
}
