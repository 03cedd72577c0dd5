use std::fmt;
use std::io;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Samples, snapshots or training values that cannot be used.
    InvalidData(String),
    InvalidConfig(String),
    /// Parameters or frames that do not fit a network's topology.
    InvalidShape(String),
    /// A trace stream did not follow the expected token order.
    Format(String),
    /// A read or write on the underlying stream failed.
    Io {
        kind: io::ErrorKind,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O failure with what was being attempted, e.g. `"failed to open x.trace"`.
    pub(crate) fn io(context: impl fmt::Display, err: io::Error) -> Self {
        Error::Io {
            kind: err.kind(),
            message: format!("{context}: {err}"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::InvalidShape(msg) => write!(f, "invalid shape: {msg}"),
            Error::Format(msg) => write!(f, "trace format violation: {msg}"),
            Error::Io { message, .. } => write!(f, "io error: {message}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io {
            kind: value.kind(),
            message: value.to_string(),
        }
    }
}
