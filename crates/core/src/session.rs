mod builder;
mod confirmation;
mod state;

use std::path::PathBuf;

use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::thread::{DEFAULT_THREAD_ID, Thread};
use crate::transcript::Message;
use crate::{Error, Notice};
pub use builder::SessionBuilder;
pub use confirmation::DeleteConfirmation;
use state::{Command, CommandSender, SessionState};

/// Where the user currently is.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ViewState {
    /// Browsing the known threads.
    ThreadList,
    /// Inside a thread.
    Conversation {
        /// The active thread.
        thread_id: String,
        /// Whether a query is in flight.
        loading: bool,
    },
}

impl ViewState {
    #[inline]
    pub(crate) fn conversation<S: Into<String>>(thread_id: S) -> Self {
        ViewState::Conversation {
            thread_id: thread_id.into(),
            loading: false,
        }
    }

    /// Returns the active thread, if any.
    #[inline]
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            ViewState::ThreadList => None,
            ViewState::Conversation { thread_id, .. } => Some(thread_id),
        }
    }

    /// Returns whether a query is in flight.
    #[inline]
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Conversation { loading: true, .. })
    }
}

/// Everything needed to render a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The current view.
    pub view: ViewState,
    /// Messages of the active thread, oldest first.
    pub transcript: Vec<Message>,
    /// The known threads.
    pub threads: Vec<Thread>,
    /// Whether any network operation is still in flight.
    pub busy: bool,
}

/// Handle to a running session.
///
/// The session lives in its own task, which owns the thread list, the
/// transcript and the in-flight query. Every method here only posts a
/// command to that task, so none of them blocks. Outcomes are reported
/// through the callbacks registered on the [`SessionBuilder`], or can be
/// polled with [`SessionController::snapshot`].
///
/// The session starts inside the default thread. Dropping the handle
/// closes the session and cancels whatever is in flight.
pub struct SessionController {
    cmd_tx: mpsc::UnboundedSender<Command>,
    kill_tx: watch::Sender<bool>,
}

impl SessionController {
    /// Opens a thread and loads its history.
    ///
    /// Any in-flight query is cancelled.
    #[inline]
    pub fn select_thread<S: Into<String>>(&self, thread_id: S) {
        self.send(Command::SelectThread(thread_id.into()));
    }

    /// Opens a new, empty thread and returns its identifier.
    ///
    /// Any in-flight query is cancelled. The thread only becomes known to
    /// the backend once a message is sent in it.
    pub fn create_thread(&self) -> String {
        let thread = Thread::create_local();
        let thread_id = thread.id.clone();
        self.send(Command::CreateThread(thread));
        thread_id
    }

    /// Goes back to the thread list, cancelling any in-flight query.
    #[inline]
    pub fn back(&self) {
        self.send(Command::Back);
    }

    /// Sends a message in the active thread, with optional attachments.
    ///
    /// This does nothing while another query is in flight. Attachments
    /// with an unsupported type are left out with a notice, and the query
    /// is not sent at all if any of the remaining ones fails to upload.
    pub fn send_message<S, I, P>(&self, text: S, files: I)
    where
        S: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.send(Command::SendMessage {
            text: text.into(),
            files: files.into_iter().map(Into::into).collect(),
        });
    }

    /// Sends the most recent failed message again, without attachments.
    #[inline]
    pub fn retry(&self) {
        self.send(Command::Retry);
    }

    /// Prepares the deletion of a thread.
    ///
    /// Nothing happens until [`DeleteConfirmation::confirm`] is called on
    /// the returned value.
    #[inline]
    pub fn delete_thread<S: Into<String>>(
        &self,
        thread_id: S,
    ) -> DeleteConfirmation {
        DeleteConfirmation::new(thread_id.into(), self.cmd_tx.downgrade())
    }

    /// Fetches the thread list again.
    ///
    /// This does nothing while a query is in flight, the list is refreshed
    /// once it completes anyway.
    #[inline]
    pub fn refresh_threads(&self) {
        self.send(Command::RefreshThreads);
    }

    /// Returns the current state of the session.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Snapshot(reply_tx))
            .map_err(|_| Error::Closed)?;
        reply_rx.await.map_err(|_| Error::Closed)
    }

    /// Closes the session.
    ///
    /// The session stops handling further commands and cancels whatever
    /// is in flight.
    #[inline]
    pub fn close(&self) {
        self.kill_tx.send(true).ok();
    }

    #[inline]
    fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("the session has been closed, dropping the command");
        }
    }

    fn spawn_from_builder(builder: SessionBuilder) -> Self {
        let SessionBuilder {
            backend,
            history_limit,
            on_notice,
            on_transcript,
            on_idle,
        } = builder;

        let state = SessionState::new(
            backend,
            history_limit,
            on_notice,
            on_transcript,
            on_idle,
        );
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = watch::channel(false);

        // Start in the default thread, with a fresh thread list.
        cmd_tx
            .send(Command::SelectThread(DEFAULT_THREAD_ID.to_owned()))
            .ok();
        cmd_tx.send(Command::RefreshThreads).ok();

        tokio::spawn(
            run_session(state, cmd_tx.downgrade(), cmd_rx, kill_rx)
                .instrument(trace_span!("session")),
        );
        Self { cmd_tx, kill_tx }
    }
}

async fn run_session(
    mut state: SessionState,
    cmd_tx: CommandSender,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut kill_rx: watch::Receiver<bool>,
) {
    debug!("started");
    loop {
        let cmd = select! {
            biased;

            _ = kill_rx.changed() => {
                break;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                cmd
            }
        };
        trace!("received command: {cmd:?}");

        let proc_span = trace_span!("proc cmd");
        proc_span.in_scope(|| {
            state.handle(cmd, &cmd_tx);
            trace!("finished");
        });
    }
    state.shutdown();
    debug!("will terminate");
}
