use std::fmt::{self, Display};

use ched_model::ErrorKind;

use crate::Error;

/// What a [`Notice`] is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// The backend could not be reached.
    Connectivity,
    /// An attachment batch failed to upload.
    Upload,
    /// An answer broke off while streaming.
    Stream,
    /// Some attachments were left out of a query.
    AttachmentsRejected,
    /// An operation was refused.
    Rejected,
}

/// A non-blocking message for the user.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Notice {
    kind: NoticeKind,
    message: String,
}

impl Notice {
    #[inline]
    pub(crate) fn new<S: Into<String>>(kind: NoticeKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns what the notice is about.
    #[inline]
    pub fn kind(&self) -> NoticeKind {
        self.kind
    }

    /// Returns the text to show.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&Error> for Notice {
    fn from(err: &Error) -> Self {
        let kind = match err.kind() {
            Some(ErrorKind::Connectivity) => NoticeKind::Connectivity,
            Some(ErrorKind::Upload) => NoticeKind::Upload,
            Some(ErrorKind::Stream) => NoticeKind::Stream,
            None => NoticeKind::Rejected,
        };
        Notice::new(kind, format!("{err}"))
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_from_error() {
        let notice = Notice::from(&Error::Upload {
            file: "a.pdf".to_owned(),
            reason: "too large".to_owned(),
        });
        assert_eq!(notice.kind(), NoticeKind::Upload);
        assert_eq!(notice.message(), "cannot upload a.pdf: too large");

        let err = Error::Stream("connection reset".to_owned());
        assert_eq!(err.kind(), Some(ErrorKind::Stream));
        assert_eq!(Notice::from(&err).kind(), NoticeKind::Stream);

        for err in [Error::rejected("nothing to retry"), Error::Closed] {
            assert_eq!(err.kind(), None);
            assert_eq!(Notice::from(&err).kind(), NoticeKind::Rejected);
        }
    }
}
