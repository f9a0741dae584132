use std::pin::Pin;
use std::task::{self, Poll};

use crate::backend::BackendError;

/// A streamed answer to a query.
pub trait QueryResponse: Sized + Send + 'static {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// Attempts to pull out the next frame from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   the next frame. Implementations will ensure that the current
    ///   task will be notified when the next frame may be ready.
    /// - `Poll::Ready(Ok(Some(frame)))` means the response has a frame
    ///   to deliver, and may produce further frames on subsequent
    ///   `poll_next_frame` calls.
    /// - `Poll::Ready(Ok(None))` means the response has completed.
    /// - `Poll::Ready(Err(error))` means the transport broke while
    ///   reading the response. No more frames will be delivered.
    ///
    /// Frames must be delivered in the order the backend sent them.
    /// Calling this method after completion should always return `None`.
    /// Dropping the response releases the underlying connection.
    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Self::Error>>;
}

/// One decoded unit of a streamed answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StreamFrame {
    /// An incremental fragment of the answer.
    Token {
        /// The fragment text.
        content: String,
    },
    /// The complete answer, superseding all tokens received so far.
    Final {
        /// The authoritative answer text.
        response: String,
    },
    /// A record that carried the frame marker but could not be decoded.
    Unparsable {
        /// The raw record payload.
        record: String,
        /// Why decoding failed.
        reason: String,
    },
}
