//! A local fake backend for testing purpose.

mod preset;

use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use ched_model::{
    Backend, BackendError, ErrorKind, HistoryMessage, QueryRequest,
    QueryResponse, Role, StreamFrame, ThreadSummary,
};
use tokio::sync::Notify;
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A backend call, recorded in the order the calls were made.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    ListThreads,
    LoadHistory { thread_id: String, limit: usize },
    DeleteThread(String),
    Upload(PathBuf),
    SendQuery(QueryRequest),
}

#[derive(Default)]
struct State {
    threads: Vec<ThreadSummary>,
    histories: HashMap<String, Vec<HistoryMessage>>,
    responses: VecDeque<PresetResponse>,
    failing_uploads: HashSet<PathBuf>,
    list_gate: Option<Arc<Notify>>,
    offline: bool,
    calls: Vec<Call>,
    released_responses: usize,
}

pub struct TestQueryResponse {
    frames: VecDeque<PresetFrame>,
    gate: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    state: Arc<Mutex<State>>,
}

impl QueryResponse for TestQueryResponse {
    type Error = crate::Error;

    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Self::Error>> {
        let this = self.get_mut();

        if let Some(gate) = &mut this.gate {
            ready!(gate.as_mut().poll(cx));
            this.gate = None;
        }

        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(this.delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let frame = match this.frames.pop_front() {
            Some(PresetFrame::Token(content)) => StreamFrame::Token { content },
            Some(PresetFrame::Final(response)) => {
                StreamFrame::Final { response }
            }
            Some(PresetFrame::Garbage(record)) => StreamFrame::Unparsable {
                record,
                reason: "garbage preset".to_owned(),
            },
            Some(PresetFrame::Disconnect) => {
                this.frames.clear();
                return Poll::Ready(Err(Error::new(
                    "connection reset",
                    ErrorKind::Stream,
                )));
            }
            None => return Poll::Ready(Ok(None)),
        };
        Poll::Ready(Ok(Some(frame)))
    }
}

impl Drop for TestQueryResponse {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.released_responses += 1;
        }
    }
}

/// A local fake backend for testing purpose.
///
/// Before sending queries, you need to queue the responses, which are
/// handed out in order, one per query. If there is no response left, the
/// query is refused. Thread summaries are updated as queries come in, like
/// the real backend persisting both sides of a conversation.
///
/// Clones share the same state, so a test can keep one clone to inspect
/// the recorded calls.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestBackend {
    state: Arc<Mutex<State>>,
    delay: Option<Duration>,
}

impl TestBackend {
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        self.lock().responses.push_back(preset);
    }

    /// Adds a thread with a history made of alternating user and
    /// assistant messages.
    pub fn add_thread<S: AsRef<str>>(&self, thread_id: &str, texts: &[S]) {
        let history: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| HistoryMessage {
                role: if idx % 2 == 0 {
                    Role::User
                } else {
                    Role::Assistant
                },
                text: text.as_ref().to_owned(),
                timestamp: None,
            })
            .collect();
        let mut state = self.lock();
        state.threads.push(ThreadSummary {
            thread_id: thread_id.to_owned(),
            message_count: history.len() as u64,
            last_message_time: None,
        });
        state.histories.insert(thread_id.to_owned(), history);
    }

    #[inline]
    pub fn fail_upload<P: Into<PathBuf>>(&self, path: P) {
        self.lock().failing_uploads.insert(path.into());
    }

    /// Holds every thread listing back until `gate` is notified, once per
    /// listing. The threads are read after the gate opens.
    #[inline]
    pub fn gate_thread_list(&self, gate: Arc<Notify>) {
        self.lock().list_gate = Some(gate);
    }

    /// Makes listing, loading and deleting fail.
    #[inline]
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    #[inline]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Returns how many query responses have been dropped.
    #[inline]
    pub fn released_responses(&self) -> usize {
        self.lock().released_responses
    }

    #[inline]
    pub fn thread_ids(&self) -> Vec<String> {
        self.lock()
            .threads
            .iter()
            .map(|t| t.thread_id.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn record(&self, call: Call) -> MutexGuard<'_, State> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|err| err.into_inner())
}

impl Backend for TestBackend {
    type Error = crate::Error;
    type Response = TestQueryResponse;

    fn list_threads(
        &self,
    ) -> impl Future<Output = Result<Vec<ThreadSummary>, Self::Error>> + Send + 'static
    {
        let gate = self.record(Call::ListThreads).list_gate.clone();
        let state = Arc::clone(&self.state);
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let state = lock(&state);
            if state.offline {
                Err(Error::new("offline", ErrorKind::Connectivity))
            } else {
                Ok(state.threads.clone())
            }
        }
    }

    fn load_history(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryMessage>, Self::Error>>
    + Send
    + 'static {
        let state = self.record(Call::LoadHistory {
            thread_id: thread_id.to_owned(),
            limit,
        });
        let result = if state.offline {
            Err(Error::new("offline", ErrorKind::Connectivity))
        } else {
            let history = state
                .histories
                .get(thread_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let skip = history.len().saturating_sub(limit);
            Ok(history[skip..].to_vec())
        };
        ready(result)
    }

    fn delete_thread(
        &self,
        thread_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let mut state = self.record(Call::DeleteThread(thread_id.to_owned()));
        let result = if state.offline {
            Err(Error::new("offline", ErrorKind::Connectivity))
        } else {
            state.threads.retain(|t| t.thread_id != thread_id);
            state.histories.remove(thread_id);
            Ok(())
        };
        ready(result)
    }

    fn upload(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static {
        let state = self.record(Call::Upload(path.to_owned()));
        let result = if state.failing_uploads.contains(path) {
            Err(Error::new("upload rejected", ErrorKind::Upload))
        } else {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(format!("uploads/{file_name}"))
        };
        ready(result)
    }

    fn send_query(
        &self,
        req: &QueryRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut state = self.record(Call::SendQuery(req.clone()));
        let result = 'blk: {
            let Some(preset) = state.responses.pop_front() else {
                break 'blk Err(Error::new(
                    "no preset response",
                    ErrorKind::Connectivity,
                ));
            };
            if preset.refused {
                break 'blk Err(Error::new(
                    "query refused",
                    ErrorKind::Connectivity,
                ));
            }

            // The user message is persisted right away, the answer once it
            // has been fully generated.
            let persisted = 1 + preset
                .frames
                .iter()
                .any(|f| matches!(f, PresetFrame::Final(_)))
                as u64;
            match state
                .threads
                .iter_mut()
                .find(|t| t.thread_id == req.thread_id)
            {
                Some(thread) => thread.message_count += persisted,
                None => state.threads.push(ThreadSummary {
                    thread_id: req.thread_id.clone(),
                    message_count: persisted,
                    last_message_time: None,
                }),
            }

            Ok(TestQueryResponse {
                frames: preset.frames.into(),
                gate: preset.gate.map(|gate| {
                    Box::pin(async move { gate.notified().await })
                        as Pin<Box<dyn Future<Output = ()> + Send>>
                }),
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
                state: Arc::clone(&self.state),
            })
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;

    async fn collect_frames(
        resp: TestQueryResponse,
    ) -> (Vec<StreamFrame>, Option<Error>) {
        let mut resp = Box::pin(resp);
        let mut frames = vec![];
        loop {
            match poll_fn(|cx| resp.as_mut().poll_next_frame(cx)).await {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return (frames, None),
                Err(err) => return (frames, Some(err)),
            }
        }
    }

    fn request(thread_id: &str) -> QueryRequest {
        QueryRequest {
            query: "Schedule my classes".to_owned(),
            file_paths: vec![],
            thread_id: thread_id.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_send_query() {
        let backend = TestBackend::default();
        backend.add_response(PresetResponse::with_frames([
            PresetFrame::Token("Sched".to_owned()),
            PresetFrame::Garbage("{".to_owned()),
            PresetFrame::Final("Scheduled 3 classes.".to_owned()),
        ]));

        let resp = backend.send_query(&request("default")).await.unwrap();
        let (frames, err) = collect_frames(resp).await;
        assert!(err.is_none());
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[1], StreamFrame::Unparsable { .. }));
        assert_eq!(backend.released_responses(), 1);

        let threads = backend.list_threads().await.unwrap();
        assert_eq!(threads[0].thread_id, "default");
        assert_eq!(threads[0].message_count, 2);

        // The queue is exhausted now.
        let err = backend.send_query(&request("default")).await.err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Connectivity));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let backend = TestBackend::default();
        backend.add_response(PresetResponse::with_frames([
            PresetFrame::Token("Sched".to_owned()),
            PresetFrame::Disconnect,
            PresetFrame::Token("never".to_owned()),
        ]));
        let resp = backend.send_query(&request("default")).await.unwrap();
        let (frames, err) = collect_frames(resp).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Stream));
    }

    #[tokio::test]
    async fn test_gate() {
        let backend = TestBackend::default();
        let gate = Arc::new(Notify::new());
        backend.add_response(
            PresetResponse::with_frames([PresetFrame::Final("ok".to_owned())])
                .with_gate(Arc::clone(&gate)),
        );
        let resp = backend.send_query(&request("default")).await.unwrap();
        gate.notify_one();
        let (frames, _) = collect_frames(resp).await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn test_gated_thread_list() {
        let backend = TestBackend::default();
        let gate = Arc::new(Notify::new());
        backend.gate_thread_list(Arc::clone(&gate));

        let listing = backend.list_threads();
        backend.add_thread("thread-1", &["a"]);
        gate.notify_one();
        let threads = listing.await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].thread_id, "thread-1");
        assert_eq!(backend.calls(), [Call::ListThreads]);
    }

    #[tokio::test]
    async fn test_history_and_uploads() {
        let backend = TestBackend::default();
        backend.add_thread("thread-1", &["a", "b", "c"]);
        let history = backend.load_history("thread-1", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "b");
        assert_eq!(history[0].role, Role::Assistant);

        backend.fail_upload("b.pdf");
        assert_eq!(
            backend.upload(Path::new("a.pdf")).await.unwrap(),
            "uploads/a.pdf"
        );
        assert!(backend.upload(Path::new("b.pdf")).await.is_err());

        backend.set_offline(true);
        assert!(backend.list_threads().await.is_err());
        assert!(backend.delete_thread("thread-1").await.is_err());
        backend.set_offline(false);
        backend.delete_thread("thread-1").await.unwrap();
        assert!(backend.thread_ids().is_empty());
    }
}
