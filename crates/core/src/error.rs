use ched_model::{BackendError, ErrorKind};
use thiserror::Error;

/// Errors surfaced by the session layer.
///
/// None of them is fatal, the controller turns each of them into a
/// [`Notice`](crate::Notice) and keeps running.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Listing, loading or deleting threads failed.
    #[error("cannot reach the assistant: {0}")]
    Connectivity(String),
    /// An attachment could not be uploaded, so the query was not sent.
    #[error("cannot upload {file}: {reason}")]
    Upload {
        /// File name of the failed attachment.
        file: String,
        /// Why the upload failed.
        reason: String,
    },
    /// The answer broke off while streaming.
    #[error("the answer was interrupted: {0}")]
    Stream(String),
    /// The operation is not allowed.
    #[error("{0}")]
    Rejected(String),
    /// The session has been closed.
    #[error("the session has been closed")]
    Closed,
}

impl Error {
    /// Returns the backend error kind this error corresponds to.
    #[inline]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Connectivity(_) => Some(ErrorKind::Connectivity),
            Error::Upload { .. } => Some(ErrorKind::Upload),
            Error::Stream(_) => Some(ErrorKind::Stream),
            Error::Rejected(_) | Error::Closed => None,
        }
    }

    #[inline]
    pub(crate) fn connectivity(err: &dyn BackendError) -> Self {
        Error::Connectivity(format!("{err}"))
    }

    #[inline]
    pub(crate) fn stream(err: &dyn BackendError) -> Self {
        Error::Stream(format!("{err}"))
    }

    #[inline]
    pub(crate) fn rejected<S: Into<String>>(reason: S) -> Self {
        Error::Rejected(reason.into())
    }
}
