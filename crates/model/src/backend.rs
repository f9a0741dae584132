use std::error::Error;
use std::path::Path;

use crate::error::ErrorKind;
use crate::history::{HistoryMessage, ThreadSummary};
use crate::request::QueryRequest;
use crate::response::QueryResponse;

/// The error type for a backend.
pub trait BackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents the assistant backend, which owns the durable
/// thread history and answers queries.
///
/// Once the backend is created, it should behave like a stateless object.
/// All returned futures are independent of `self`, so callers can move
/// them into spawned tasks. Any answer without a success status must be
/// reported as an error.
pub trait Backend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// The streamed response type for queries.
    type Response: QueryResponse<Error = Self::Error>;

    /// Lists all threads of the current user.
    fn list_threads(
        &self,
    ) -> impl Future<Output = Result<Vec<ThreadSummary>, Self::Error>> + Send + 'static;

    /// Loads up to `limit` messages of a thread, oldest first.
    fn load_history(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryMessage>, Self::Error>>
    + Send
    + 'static;

    /// Deletes a thread together with its history.
    fn delete_thread(
        &self,
        thread_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static;

    /// Uploads a local file and returns its server-side path.
    fn upload(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static;

    /// Sends a query and resolves once the backend starts answering.
    fn send_query(
        &self,
        req: &QueryRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
