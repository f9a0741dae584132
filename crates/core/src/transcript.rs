//! The message log of the active thread.

use ched_model::{HistoryMessage, Role};
use chrono::{NaiveDateTime, Utc};

use crate::Error;
use crate::backend::BackendObject;

/// How many messages are loaded for a thread unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Delivery state of a [`Message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// Shown optimistically, the backend hasn't confirmed it yet.
    Pending,
    /// Confirmed by the backend.
    Sent,
    /// Could not be delivered, or the answer broke off.
    Failed,
}

/// A message of a thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,
    /// The message text. For an answer being streamed, the text so far.
    pub text: String,
    /// When the message was written, if known.
    pub timestamp: Option<NaiveDateTime>,
    /// The thread this message belongs to.
    pub thread_id: String,
    /// Delivery state.
    pub status: MessageStatus,
}

impl Message {
    /// Creates a pending message typed by the user.
    #[inline]
    pub fn user<S1: Into<String>, S2: Into<String>>(
        thread_id: S1,
        text: S2,
    ) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Some(Utc::now().naive_utc()),
            thread_id: thread_id.into(),
            status: MessageStatus::Pending,
        }
    }

    /// Creates an empty assistant message that streamed text goes into.
    #[inline]
    pub fn assistant_placeholder<S: Into<String>>(thread_id: S) -> Self {
        Self {
            role: Role::Assistant,
            text: String::new(),
            timestamp: Some(Utc::now().naive_utc()),
            thread_id: thread_id.into(),
            status: MessageStatus::Pending,
        }
    }

    #[inline]
    fn from_history(thread_id: &str, msg: HistoryMessage) -> Self {
        Self {
            role: msg.role,
            text: msg.text,
            timestamp: msg.timestamp,
            thread_id: thread_id.to_owned(),
            status: MessageStatus::Sent,
        }
    }
}

/// The ordered message log of one thread.
///
/// Messages are only ever appended. The one mutation allowed is rewriting
/// the text of the last message while its answer is streamed in.
#[derive(Clone, Debug, Default)]
pub struct TranscriptStore {
    thread_id: Option<String>,
    messages: Vec<Message>,
}

impl TranscriptStore {
    /// Returns the thread the messages belong to.
    #[inline]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Returns the messages, oldest first.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the most recent message.
    #[inline]
    pub fn tail(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Drops all messages and binds the store to another thread.
    #[inline]
    pub fn reset(&mut self, thread_id: Option<String>) {
        self.thread_id = thread_id;
        self.messages.clear();
    }

    /// Replaces the whole log with the `limit` most recent messages of the
    /// given history.
    pub fn replace(
        &mut self,
        thread_id: &str,
        history: Vec<HistoryMessage>,
        limit: usize,
    ) {
        let skip = history.len().saturating_sub(limit);
        self.thread_id = Some(thread_id.to_owned());
        self.messages = history
            .into_iter()
            .skip(skip)
            .map(|msg| Message::from_history(thread_id, msg))
            .collect();
    }

    /// Appends a message and returns its index.
    #[inline]
    pub fn append(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Overwrites the text of the last message, which must be an assistant
    /// message.
    pub fn update_tail<S: Into<String>>(&mut self, text: S) {
        let Some(tail) = self.messages.last_mut() else {
            error!("no message to update");
            debug_assert!(false, "update_tail on an empty transcript");
            return;
        };
        if tail.role != Role::Assistant {
            error!("the last message is not an assistant message");
            debug_assert!(false, "update_tail on a {:?} message", tail.role);
            return;
        }
        tail.text = text.into();
    }

    /// Updates the delivery state of the message at `index`.
    #[inline]
    pub fn set_status(&mut self, index: usize, status: MessageStatus) {
        if let Some(message) = self.messages.get_mut(index) {
            message.status = status;
        }
    }
}

/// Fetches the `limit` most recent messages of a thread.
///
/// The returned future doesn't borrow anything, so it can run while the
/// store keeps serving reads. Apply the result with
/// [`TranscriptStore::replace`].
pub(crate) fn load(
    backend: &dyn BackendObject,
    thread_id: &str,
    limit: usize,
) -> impl Future<Output = Result<Vec<HistoryMessage>, Error>> + Send + 'static
{
    let fut = backend.load_history(thread_id, limit);
    let thread_id = thread_id.to_owned();
    async move {
        let history = fut.await.map_err(|err| {
            warn!("failed to load {thread_id}: {err}");
            Error::connectivity(&*err)
        })?;
        debug!("loaded {} messages of {thread_id}", history.len());
        Ok(history)
    }
}
