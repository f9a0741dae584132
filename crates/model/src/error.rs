use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The backend is unreachable or answered with a failure status.
    Connectivity,
    /// An attachment could not be uploaded.
    Upload,
    /// The response stream broke before it was complete.
    Stream,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connectivity => write!(f, "Connectivity error"),
            ErrorKind::Upload => write!(f, "Upload error"),
            ErrorKind::Stream => write!(f, "Stream error"),
        }
    }
}
