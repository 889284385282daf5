//! Error types for vahana-link

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classes of failure seen by callers of the protocol layer.
///
/// The control channel retries only [`ErrorKind::Timeout`]. Everything else is
/// surfaced on the first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Link refused or destination unreachable
    Connection,
    /// No response within the per-attempt ceiling
    Timeout,
    /// Peer explicitly declined the command
    LogicalFailure,
    /// Reassembled frame did not decode
    Decode,
    /// Caller cancelled the exchange
    Cancelled,
    /// Malformed or unexpected bytes on the wire
    Protocol,
    /// Invalid configuration or parameter
    Config,
    /// Local socket or filesystem failure
    Io,
}

/// vahana-link error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Could not establish the control connection
    #[error("Connection to {addr} failed: {source}")]
    Connection {
        /// Destination that refused or could not be reached
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Response never arrived within the retry policy
    #[error("No response after {attempts} attempt(s)")]
    Timeout {
        /// Number of full exchanges attempted
        attempts: u32,
    },

    /// Peer answered with the failure literal
    #[error("Command '{0}' was declined by the peer")]
    Declined(&'static str),

    /// Frame bytes could not be decoded into the expected artifact
    #[error("Frame decode failed: {0}")]
    Decode(String),

    /// Exchange aborted through a cancel token
    #[error("Operation cancelled")]
    Cancelled,

    /// Unexpected response or request bytes
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame needs more fragments than the 1-byte header can count
    #[error("Frame of {len} bytes needs {fragments} fragments (max 255)")]
    FrameTooLarge {
        /// Payload length in bytes
        len: usize,
        /// Fragments the payload would need
        fragments: usize,
    },

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify this error into the protocol taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Declined(_) => ErrorKind::LogicalFailure,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Protocol(_) | Error::Serialization(_) => ErrorKind::Protocol,
            Error::FrameTooLarge { .. } | Error::Config(_) | Error::InvalidParameter(_) => {
                ErrorKind::Config
            }
            Error::Io(_) | Error::Other(_) => ErrorKind::Io,
        }
    }

    /// True when a fresh exchange could succeed where this one did not
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Decode(e.to_string())
    }
}
