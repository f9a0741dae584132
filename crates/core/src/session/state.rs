use std::path::PathBuf;
use std::sync::Arc;

use ched_model::{HistoryMessage, QueryRequest, Role, ThreadSummary};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{SessionSnapshot, ViewState};
use crate::attachment::{self, AttachmentPipeline};
use crate::backend::BackendObject;
use crate::query_client::{QueryEvent, StreamingQueryClient};
use crate::thread::{Confirmed, DEFAULT_THREAD_ID, Thread, ThreadRegistry};
use crate::transcript::{self, Message, MessageStatus, TranscriptStore};
use crate::{Error, Notice};

pub(crate) type NoticeFn = Box<dyn Fn(Notice) + Send + Sync>;
pub(crate) type TranscriptFn = Box<dyn Fn(&[Message]) + Send + Sync>;
pub(crate) type IdleFn = Box<dyn Fn() + Send + Sync>;
pub(crate) type CommandSender = mpsc::WeakUnboundedSender<Command>;

#[derive(Debug)]
pub(crate) enum Command {
    SelectThread(String),
    CreateThread(Thread),
    Back,
    SendMessage {
        text: String,
        files: Vec<PathBuf>,
    },
    Retry,
    DeleteThread {
        thread_id: String,
        confirmed: Confirmed,
    },
    RefreshThreads,
    Snapshot(oneshot::Sender<SessionSnapshot>),

    // Posted back by the tasks the session spawns.
    ThreadsListed {
        task_id: u64,
        result: Result<Vec<ThreadSummary>, Error>,
    },
    HistoryLoaded {
        task_id: u64,
        thread_id: String,
        result: Result<Vec<HistoryMessage>, Error>,
    },
    ThreadDeleted {
        thread_id: String,
        result: Result<(), Error>,
    },
    QueryProgress {
        task_id: u64,
        update: QueryUpdate,
    },
}

#[derive(Debug)]
pub(crate) enum QueryUpdate {
    Started,
    Tail(String),
    Finished(Result<String, Error>),
}

impl From<QueryEvent> for QueryUpdate {
    #[inline]
    fn from(event: QueryEvent) -> Self {
        match event {
            QueryEvent::Started => QueryUpdate::Started,
            QueryEvent::Tail(text) => QueryUpdate::Tail(text),
        }
    }
}

/// A spawned task, aborted when dropped.
struct Task {
    id: u64,
    handle: JoinHandle<()>,
}

impl Drop for Task {
    #[inline]
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The query in flight. Dropping it cancels the query and releases the
/// response stream.
struct InFlightQuery {
    task: Task,
    thread_id: String,
    user_idx: usize,
    assistant_idx: Option<usize>,
}

pub(crate) struct SessionState {
    backend: Arc<dyn BackendObject>,
    history_limit: usize,
    view: ViewState,
    transcript: TranscriptStore,
    registry: ThreadRegistry,
    query: Option<InFlightQuery>,
    history_task: Option<Task>,
    list_task: Option<Task>,
    running_deletes: usize,
    next_task_id: u64,

    on_notice: Option<NoticeFn>,
    on_transcript: Option<TranscriptFn>,
    on_idle: Option<IdleFn>,
}

impl SessionState {
    pub fn new(
        backend: Arc<dyn BackendObject>,
        history_limit: usize,
        on_notice: Option<NoticeFn>,
        on_transcript: Option<TranscriptFn>,
        on_idle: Option<IdleFn>,
    ) -> Self {
        let mut transcript = TranscriptStore::default();
        transcript.reset(Some(DEFAULT_THREAD_ID.to_owned()));
        Self {
            registry: ThreadRegistry::new(Arc::clone(&backend)),
            backend,
            history_limit,
            view: ViewState::conversation(DEFAULT_THREAD_ID),
            transcript,
            query: None,
            history_task: None,
            list_task: None,
            running_deletes: 0,
            next_task_id: 1,
            on_notice,
            on_transcript,
            on_idle,
        }
    }

    pub fn handle(&mut self, cmd: Command, cmd_tx: &CommandSender) {
        match cmd {
            Command::SelectThread(thread_id) => {
                self.select_thread(thread_id, cmd_tx)
            }
            Command::CreateThread(thread) => self.create_thread(thread),
            Command::Back => self.back(cmd_tx),
            Command::SendMessage { text, files } => {
                self.send_message(text, files, cmd_tx)
            }
            Command::Retry => self.retry(cmd_tx),
            Command::DeleteThread {
                thread_id,
                confirmed,
            } => self.delete_thread(thread_id, confirmed, cmd_tx),
            Command::RefreshThreads => self.refresh_threads(cmd_tx),
            Command::Snapshot(reply_tx) => {
                reply_tx.send(self.snapshot()).ok();
            }
            Command::ThreadsListed { task_id, result } => {
                self.threads_listed(task_id, result)
            }
            Command::HistoryLoaded {
                task_id,
                thread_id,
                result,
            } => self.history_loaded(task_id, thread_id, result),
            Command::ThreadDeleted { thread_id, result } => {
                self.thread_deleted(thread_id, result, cmd_tx)
            }
            Command::QueryProgress { task_id, update } => {
                self.query_progress(task_id, update, cmd_tx)
            }
        }
    }

    /// Cancels everything in flight.
    pub fn shutdown(&mut self) {
        self.cancel_query();
        self.history_task = None;
        self.list_task = None;
    }

    fn select_thread(&mut self, thread_id: String, cmd_tx: &CommandSender) {
        self.cancel_query();
        self.history_task = None;
        debug!("selecting {thread_id}");

        // Keep the cache when reloading the same thread, so that a failed
        // reload doesn't blank it.
        if self.transcript.thread_id() != Some(thread_id.as_str()) {
            self.transcript.reset(Some(thread_id.clone()));
            self.emit_transcript();
        }
        self.view = ViewState::conversation(thread_id.as_str());

        let fut = transcript::load(
            self.backend.as_ref(),
            &thread_id,
            self.history_limit,
        );
        let cmd_tx = cmd_tx.clone();
        let task = self.spawn_task(|task_id| async move {
            let result = fut.await;
            post(
                &cmd_tx,
                Command::HistoryLoaded {
                    task_id,
                    thread_id,
                    result,
                },
            );
        });
        self.history_task = Some(task);
    }

    fn history_loaded(
        &mut self,
        task_id: u64,
        thread_id: String,
        result: Result<Vec<HistoryMessage>, Error>,
    ) {
        if self.history_task.as_ref().is_none_or(|t| t.id != task_id) {
            trace!("dropping the stale history of {thread_id}");
            return;
        }
        self.history_task = None;

        match result {
            Ok(history) => {
                self.transcript
                    .replace(&thread_id, history, self.history_limit);
                self.emit_transcript();
            }
            Err(err) => self.notify(&err),
        }
        self.check_idle();
    }

    fn create_thread(&mut self, thread: Thread) {
        self.cancel_query();
        self.history_task = None;
        debug!("created {}", thread.id);

        self.view = ViewState::conversation(thread.id.as_str());
        self.transcript.reset(Some(thread.id.clone()));
        self.registry.add_local(thread);
        self.emit_transcript();
    }

    fn back(&mut self, cmd_tx: &CommandSender) {
        self.cancel_query();
        self.history_task = None;
        debug!("back to the thread list");

        self.view = ViewState::ThreadList;
        self.transcript.reset(None);
        self.emit_transcript();
        self.refresh_threads(cmd_tx);
    }

    fn refresh_threads(&mut self, cmd_tx: &CommandSender) {
        if self.query.is_some() {
            debug!("a query is in flight, the threads are refreshed after it");
            return;
        }

        let fut = self.registry.list();
        let cmd_tx = cmd_tx.clone();
        let task = self.spawn_task(|task_id| async move {
            let result = fut.await;
            post(&cmd_tx, Command::ThreadsListed { task_id, result });
        });
        self.list_task = Some(task);
    }

    fn threads_listed(
        &mut self,
        task_id: u64,
        result: Result<Vec<ThreadSummary>, Error>,
    ) {
        if self.list_task.as_ref().is_none_or(|t| t.id != task_id) {
            trace!("dropping a stale thread list");
            return;
        }
        self.list_task = None;

        match result {
            Ok(summaries) => self.registry.replace(summaries),
            Err(err) => self.notify(&err),
        }
        self.check_idle();
    }

    fn send_message(
        &mut self,
        text: String,
        files: Vec<PathBuf>,
        cmd_tx: &CommandSender,
    ) {
        let thread_id = match &self.view {
            ViewState::Conversation { loading: true, .. } => {
                debug!("a query is already in flight, ignoring the message");
                return;
            }
            ViewState::Conversation { thread_id, .. } => thread_id.clone(),
            ViewState::ThreadList => {
                self.notify(&Error::rejected("open a thread to send messages"));
                return;
            }
        };
        if self.history_task.is_some() {
            self.notify(&Error::rejected("the thread is still loading"));
            return;
        }

        let validation = attachment::validate(files);
        if let Some(notice) = validation.rejection_notice() {
            self.emit_notice(notice);
        }
        let mut attachments = validation.accepted;
        if text.trim().is_empty() && attachments.is_empty() {
            debug!("nothing to send");
            return;
        }

        // The thread list is refreshed once the query completes.
        if self.list_task.take().is_some() {
            debug!("dropping the pending thread list until the query is done");
        }

        let message = Message::user(thread_id.as_str(), &text);
        let user_idx = self.transcript.append(message);
        self.emit_transcript();

        let pipeline = AttachmentPipeline::new(Arc::clone(&self.backend));
        let client = StreamingQueryClient::new(Arc::clone(&self.backend));
        let span = trace_span!("query", thread = %thread_id);
        let query_thread_id = thread_id.clone();
        let cmd_tx = cmd_tx.clone();
        let task = self.spawn_task(move |task_id| {
            let post_update = move |update| {
                post(&cmd_tx, Command::QueryProgress { task_id, update });
            };
            async move {
                let file_paths = match pipeline.upload(&mut attachments).await
                {
                    Ok(file_paths) => file_paths,
                    Err(err) => {
                        post_update(QueryUpdate::Finished(Err(err)));
                        return;
                    }
                };
                let req = QueryRequest {
                    query: text,
                    file_paths,
                    thread_id: query_thread_id,
                };
                let result = client
                    .send(&req, |event| post_update(QueryUpdate::from(event)))
                    .await;
                post_update(QueryUpdate::Finished(result));
            }
            .instrument(span)
        });

        self.query = Some(InFlightQuery {
            task,
            thread_id: thread_id.clone(),
            user_idx,
            assistant_idx: None,
        });
        self.view = ViewState::Conversation {
            thread_id,
            loading: true,
        };
    }

    fn query_progress(
        &mut self,
        task_id: u64,
        update: QueryUpdate,
        cmd_tx: &CommandSender,
    ) {
        let Some(query) = self.query.as_mut().filter(|q| q.task.id == task_id)
        else {
            trace!("dropping a late update of query {task_id}");
            return;
        };

        match update {
            QueryUpdate::Started => {
                self.transcript
                    .set_status(query.user_idx, MessageStatus::Sent);
                let placeholder =
                    Message::assistant_placeholder(query.thread_id.as_str());
                query.assistant_idx = Some(self.transcript.append(placeholder));
            }
            QueryUpdate::Tail(text) => {
                if query.assistant_idx.is_none() {
                    error!("got an answer before the query was accepted");
                    return;
                }
                self.transcript.update_tail(text);
            }
            QueryUpdate::Finished(result) => {
                if let Some(query) = self.query.take() {
                    self.finish_query(query, result, cmd_tx);
                }
                return;
            }
        }
        self.emit_transcript();
    }

    fn finish_query(
        &mut self,
        query: InFlightQuery,
        result: Result<String, Error>,
        cmd_tx: &CommandSender,
    ) {
        let InFlightQuery {
            task,
            user_idx,
            assistant_idx,
            ..
        } = query;
        drop(task);

        match result {
            Ok(answer) => {
                debug!("the query completed, {} bytes", answer.len());
                if let Some(idx) = assistant_idx {
                    self.transcript.set_status(idx, MessageStatus::Sent);
                }
            }
            Err(err) => {
                // Before the query was accepted, it's the user message that
                // failed, otherwise the answer broke off.
                let idx = assistant_idx.unwrap_or(user_idx);
                self.transcript.set_status(idx, MessageStatus::Failed);
                self.notify(&err);
            }
        }
        self.emit_transcript();

        if let ViewState::Conversation { loading, .. } = &mut self.view {
            *loading = false;
        }
        self.refresh_threads(cmd_tx);
        self.check_idle();
    }

    fn retry(&mut self, cmd_tx: &CommandSender) {
        let Some(text) = self.retry_text() else {
            self.notify(&Error::rejected("no failed message to retry"));
            return;
        };
        debug!("retrying a failed message");
        self.send_message(text, vec![], cmd_tx);
    }

    /// Returns the user text that led to the most recent failure.
    fn retry_text(&self) -> Option<String> {
        let messages = self.transcript.messages();
        let failed = messages
            .iter()
            .rposition(|m| m.status == MessageStatus::Failed)?;
        messages[..=failed]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.clone())
    }

    fn delete_thread(
        &mut self,
        thread_id: String,
        confirmed: Confirmed,
        cmd_tx: &CommandSender,
    ) {
        let fut = match self.registry.delete(&thread_id, confirmed) {
            Ok(fut) => fut,
            Err(err) => {
                self.notify(&err);
                return;
            }
        };
        debug!("deleting {thread_id}");

        // Deletions are never cancelled by navigation, so they aren't
        // tracked as tasks.
        self.running_deletes += 1;
        let cmd_tx = cmd_tx.clone();
        tokio::spawn(async move {
            let result = fut.await;
            post(&cmd_tx, Command::ThreadDeleted { thread_id, result });
        });
    }

    fn thread_deleted(
        &mut self,
        thread_id: String,
        result: Result<(), Error>,
        cmd_tx: &CommandSender,
    ) {
        self.running_deletes = self.running_deletes.saturating_sub(1);

        match result {
            Ok(()) => {
                self.registry.remove(&thread_id);
                if self.view.thread_id() == Some(thread_id.as_str()) {
                    debug!("the active thread was deleted, going to default");
                    self.cancel_query();
                    self.history_task = None;
                    self.view = ViewState::conversation(DEFAULT_THREAD_ID);
                    self.transcript.reset(Some(DEFAULT_THREAD_ID.to_owned()));
                    self.emit_transcript();
                }
                // A list fetched before the deletion would bring the thread
                // back, so fetch it again.
                if self.list_task.is_some() {
                    self.refresh_threads(cmd_tx);
                }
            }
            Err(err) => self.notify(&err),
        }
        self.check_idle();
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            view: self.view.clone(),
            transcript: self.transcript.messages().to_vec(),
            threads: self.registry.threads().to_vec(),
            busy: self.is_busy(),
        }
    }

    fn cancel_query(&mut self) {
        let Some(query) = self.query.take() else {
            return;
        };
        debug!("cancelling the query in {}", query.thread_id);

        if self.transcript.thread_id() == Some(query.thread_id.as_str()) {
            for idx in [Some(query.user_idx), query.assistant_idx]
                .into_iter()
                .flatten()
            {
                let pending = self
                    .transcript
                    .messages()
                    .get(idx)
                    .is_some_and(|m| m.status == MessageStatus::Pending);
                if pending {
                    self.transcript.set_status(idx, MessageStatus::Failed);
                }
            }
        }
        if let ViewState::Conversation { loading, .. } = &mut self.view {
            *loading = false;
        }
    }

    fn spawn_task<F, Fut>(&mut self, f: F) -> Task
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_task_id;
        self.next_task_id += 1;
        Task {
            id,
            handle: tokio::spawn(f(id)),
        }
    }

    fn is_busy(&self) -> bool {
        self.query.is_some()
            || self.history_task.is_some()
            || self.list_task.is_some()
            || self.running_deletes > 0
    }

    fn check_idle(&self) {
        if self.is_busy() {
            return;
        }
        if let Some(on_idle) = &self.on_idle {
            on_idle();
        }
    }

    #[inline]
    fn notify(&self, err: &Error) {
        self.emit_notice(Notice::from(err));
    }

    fn emit_notice(&self, notice: Notice) {
        warn!("notice: {notice}");
        if let Some(on_notice) = &self.on_notice {
            on_notice(notice);
        }
    }

    fn emit_transcript(&self) {
        if let Some(on_transcript) = &self.on_transcript {
            on_transcript(self.transcript.messages());
        }
    }
}

fn post(cmd_tx: &CommandSender, cmd: Command) {
    let Some(cmd_tx) = cmd_tx.upgrade() else {
        trace!("the session is gone, dropping {cmd:?}");
        return;
    };
    cmd_tx.send(cmd).ok();
}
