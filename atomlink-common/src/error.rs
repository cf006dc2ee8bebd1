use thiserror::Error;

/// Failure classification shared by the connection manager and the message bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing input.
    InvalidArgument,
    /// Operation called out of lifecycle order.
    InvalidState,
    /// Resource allocation failed.
    OutOfMemory,
    /// A bounded wait ran out of budget.
    Timeout,
    /// The underlying layer reported an explicit failure.
    ConnectionFailure,
    /// Index or key out of range.
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionFailure => "connection_failure",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common error type for atomlink components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR serialization error: {0}")]
    Cbor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn connection_failure(msg: impl Into<String>) -> Self {
        Self::ConnectionFailure(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Map this error onto the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Config(_) | Error::Json(_) | Error::Cbor(_) => ErrorKind::InvalidArgument,
            Error::Zenoh(_) | Error::Io(_) => ErrorKind::ConnectionFailure,
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

/// Result type alias using atomlink's Error.
pub type Result<T> = std::result::Result<T, Error>;
