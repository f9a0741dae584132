use std::future::poll_fn;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use ched_model::{
    Backend, BackendError, HistoryMessage, QueryRequest, QueryResponse,
    StreamFrame, ThreadSummary,
};

pub(crate) type BackendResult<T> = Result<T, Box<dyn BackendError>>;
type BoxedFuture<T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send>>;

/// An object-safe view of a [`Backend`], so that the session types don't
/// need a generic parameter.
pub(crate) trait BackendObject: Send + Sync + 'static {
    fn list_threads(&self) -> BoxedFuture<Vec<ThreadSummary>>;

    fn load_history(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> BoxedFuture<Vec<HistoryMessage>>;

    fn delete_thread(&self, thread_id: &str) -> BoxedFuture<()>;

    fn upload(&self, path: &Path) -> BoxedFuture<String>;

    fn send_query(&self, req: &QueryRequest) -> BoxedFuture<FrameStream>;
}

pub(crate) struct AnyBackend<B: Backend>(pub B);

impl<B: Backend + 'static> BackendObject for AnyBackend<B> {
    #[inline]
    fn list_threads(&self) -> BoxedFuture<Vec<ThreadSummary>> {
        let fut = self.0.list_threads();
        Box::pin(async move { fut.await.map_err(box_error) })
    }

    #[inline]
    fn load_history(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> BoxedFuture<Vec<HistoryMessage>> {
        let fut = self.0.load_history(thread_id, limit);
        Box::pin(async move { fut.await.map_err(box_error) })
    }

    #[inline]
    fn delete_thread(&self, thread_id: &str) -> BoxedFuture<()> {
        let fut = self.0.delete_thread(thread_id);
        Box::pin(async move { fut.await.map_err(box_error) })
    }

    #[inline]
    fn upload(&self, path: &Path) -> BoxedFuture<String> {
        let fut = self.0.upload(path);
        Box::pin(async move { fut.await.map_err(box_error) })
    }

    #[inline]
    fn send_query(&self, req: &QueryRequest) -> BoxedFuture<FrameStream> {
        let fut = self.0.send_query(req);
        Box::pin(async move {
            let resp = fut.await.map_err(box_error)?;
            Ok(FrameStream(Box::pin(resp)))
        })
    }
}

#[inline]
fn box_error<E: BackendError>(err: E) -> Box<dyn BackendError> {
    Box::new(err)
}

trait ResponseObject: Send {
    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<BackendResult<Option<StreamFrame>>>;
}

impl<R: QueryResponse> ResponseObject for R {
    #[inline]
    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<BackendResult<Option<StreamFrame>>> {
        self.poll_next_frame(cx).map_err(box_error)
    }
}

/// The frames of one streamed answer.
///
/// Dropping it drops the backend response, which releases the connection.
pub(crate) struct FrameStream(Pin<Box<dyn ResponseObject>>);

impl FrameStream {
    /// Waits for the next frame, `None` once the answer is complete.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. No frame is lost when the returned
    /// future is dropped before completion.
    #[inline]
    pub async fn next_frame(&mut self) -> BackendResult<Option<StreamFrame>> {
        poll_fn(|cx| self.0.as_mut().poll_frame(cx)).await
    }
}
