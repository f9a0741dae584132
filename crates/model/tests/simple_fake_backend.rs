use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::path::Path;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use ched_model::{
    Backend, BackendError, ErrorKind, HistoryMessage, QueryRequest,
    QueryResponse, StreamFrame, ThreadSummary,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeBackendError(ErrorKind);

impl Display for FakeBackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeBackendError {}

impl BackendError for FakeBackendError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct FakeQueryResponse {
    fake_words: VecDeque<String>,
    answer: String,
    finished: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FakeQueryResponse {
    fn new(query: &str) -> Self {
        let answer = format!("You said {query}");
        let fake_words = answer.split(' ').map(ToString::to_string).collect();
        Self {
            fake_words,
            answer,
            finished: false,
            sleep: None,
        }
    }
}

impl QueryResponse for FakeQueryResponse {
    type Error = FakeBackendError;

    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if let Some(mut word) = this.fake_words.pop_front() {
                if !this.fake_words.is_empty() {
                    word.push(' ');
                }
                return Poll::Ready(Ok(Some(StreamFrame::Token {
                    content: word,
                })));
            }
            if !this.finished {
                this.finished = true;
                return Poll::Ready(Ok(Some(StreamFrame::Final {
                    response: this.answer.clone(),
                })));
            }
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_frame(cx)
    }
}

struct FakeBackend;

impl Backend for FakeBackend {
    type Error = FakeBackendError;
    type Response = FakeQueryResponse;

    fn list_threads(
        &self,
    ) -> impl Future<Output = Result<Vec<ThreadSummary>, Self::Error>> + Send + 'static
    {
        ready(Ok(vec![]))
    }

    fn load_history(
        &self,
        _thread_id: &str,
        _limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryMessage>, Self::Error>>
    + Send
    + 'static {
        ready(Ok(vec![]))
    }

    fn delete_thread(
        &self,
        _thread_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        ready(Err(FakeBackendError(ErrorKind::Connectivity)))
    }

    fn upload(
        &self,
        _path: &Path,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static {
        ready(Err(FakeBackendError(ErrorKind::Upload)))
    }

    fn send_query(
        &self,
        req: &QueryRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let result = if req.query.is_empty() {
            Err(FakeBackendError(ErrorKind::Connectivity))
        } else {
            Ok(FakeQueryResponse::new(&req.query))
        };
        ready(result)
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    fn request(query: &str) -> QueryRequest {
        QueryRequest {
            query: query.to_owned(),
            file_paths: vec![],
            thread_id: "default".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_streamed_answer() {
        let backend = FakeBackend;
        let mut resp = backend.send_query(&request("Good morning")).await.unwrap();

        let mut tokens = String::new();
        let mut final_answer = None;
        loop {
            let frame_fut =
                poll_fn(|cx| Pin::new(&mut resp).poll_next_frame(cx));
            match frame_fut.await {
                Ok(Some(StreamFrame::Token { content })) => {
                    tokens.push_str(&content);
                }
                Ok(Some(StreamFrame::Final { response })) => {
                    final_answer = Some(response);
                }
                Ok(Some(frame)) => unreachable!("unexpected frame: {frame:?}"),
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }

        assert_eq!(tokens, "You said Good morning");
        assert_eq!(final_answer.as_deref(), Some("You said Good morning"));
    }

    #[tokio::test]
    async fn test_error() {
        let backend = FakeBackend;
        let err = backend.send_query(&request("")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);

        let err = backend.upload(Path::new("a.pdf")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upload);
    }
}
