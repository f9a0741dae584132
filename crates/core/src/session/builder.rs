use std::sync::Arc;

use ched_model::Backend;

use super::SessionController;
use super::state::{IdleFn, NoticeFn, TranscriptFn};
use crate::Notice;
use crate::backend::{AnyBackend, BackendObject};
use crate::transcript::{DEFAULT_HISTORY_LIMIT, Message};

/// [`SessionController`] builder.
pub struct SessionBuilder {
    pub(crate) backend: Arc<dyn BackendObject>,
    pub(crate) history_limit: usize,
    pub(crate) on_notice: Option<NoticeFn>,
    pub(crate) on_transcript: Option<TranscriptFn>,
    pub(crate) on_idle: Option<IdleFn>,
}

impl SessionBuilder {
    /// Creates a new builder with the specified backend.
    #[inline]
    pub fn with_backend<B: Backend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(AnyBackend(backend)),
            history_limit: DEFAULT_HISTORY_LIMIT,
            on_notice: None,
            on_transcript: None,
            on_idle: None,
        }
    }

    /// Sets how many of the most recent messages are loaded when a thread
    /// is opened.
    #[inline]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Attaches a callback to be invoked with every notice for the user.
    #[inline]
    pub fn on_notice(
        mut self,
        on_notice: impl Fn(Notice) + Send + Sync + 'static,
    ) -> Self {
        self.on_notice = Some(Box::new(on_notice));
        self
    }

    /// Attaches a callback to be invoked whenever the transcript changes.
    ///
    /// While an answer streams in, it's invoked for every frame.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&[Message]) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Box::new(on_transcript));
        self
    }

    /// Attaches a callback to be invoked when the session has nothing left
    /// in flight.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds the session and starts it in the default thread.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[inline]
    pub fn build(self) -> SessionController {
        SessionController::spawn_from_builder(self)
    }
}
