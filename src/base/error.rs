use std::error;
use std::fmt;
use std::io;

/// Errors reported by the driver core.
#[derive(Debug)]
pub enum Error {
    /// A precondition of the operation was violated (not connected, payload too large, ...).
    OperationFail { description: String },

    /// No data or response arrived within the allowed time budget.
    OperationTimeout,

    /// The connected device does not support this operation.
    OperationNotSupport,

    /// Received bytes are structurally malformed or failed checksum/CRC validation.
    InvalidData { description: String },

    /// The requested state is already in effect (e.g. a scan is already running).
    AlreadyDone,

    /// The buffer provided is too small for message encoding.
    BufferTooSmall,

    /// The underlying byte channel failed.
    IoError(io::Error),
}

impl Error {
    pub(crate) fn invalid_data(description: impl Into<String>) -> Error {
        Error::InvalidData {
            description: description.into(),
        }
    }

    pub(crate) fn operation_fail(description: impl Into<String>) -> Error {
        Error::OperationFail {
            description: description.into(),
        }
    }

    /// Returns `true` for failures the scan loop absorbs by dropping the current frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::OperationTimeout | Error::InvalidData { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OperationFail { description } => write!(f, "operation failed: {}", description),
            Error::OperationTimeout => write!(f, "operation timeout"),
            Error::OperationNotSupport => write!(f, "operation not supported by device"),
            Error::InvalidData { description } => write!(f, "invalid data: {}", description),
            Error::AlreadyDone => write!(f, "operation already done"),
            Error::BufferTooSmall => write!(f, "buffer is too small for message encoding"),
            Error::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

/// A specialized `Result` type for driver operations.
pub type Result<T> = std::result::Result<T, Error>;
