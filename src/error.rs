//! The single error type returned by every public operation in this crate.

use thiserror::Error;

/// A transfer failure as reported by the host controller.
///
/// This is deliberately narrower than [`Error`]: it is the shape of error
/// the HCI collaborator hands back from a single transfer, before this
/// crate's bridges turn it into the richer [`Error`] a caller sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbError {
    Stall,
    Cancelled,
    Disconnected,
    Other,
}

/// Errors produced by the device core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument")]
    InvalidArgs,

    #[error("buffer too small")]
    BufferTooSmall,

    #[error("interface already bound")]
    AlreadyBound,

    #[error("inconsistent interface state")]
    BadState,

    #[error("out of memory")]
    NoMemory,

    #[error("descriptor i/o error")]
    Io,

    #[error("control transfer timed out")]
    TimedOut,

    #[error("operation not supported")]
    NotSupported,

    #[error("internal driver error: {0}")]
    Internal(&'static str),
}

impl From<UsbError> for Error {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::Stall => Error::Io,
            UsbError::Cancelled => Error::TimedOut,
            UsbError::Disconnected => Error::Io,
            UsbError::Other => Error::Io,
        }
    }
}

/// Converts a poisoned-lock panic into an internal error.
///
/// A poisoned interface mutex or callback mutex means a thread panicked
/// while one of the documented invariants in the data model was
/// mid-mutation; the table can no longer be trusted, so this is reported
/// rather than silently recovered.
pub(crate) fn poisoned<T>(_e: impl std::fmt::Debug) -> Error {
    let _ = _e;
    Error::Internal("lock poisoned")
}
