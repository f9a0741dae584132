use std::sync::Arc;

use ched_model::{QueryRequest, StreamFrame};

use crate::Error;
use crate::backend::BackendObject;

/// Progress of a query, reported while the answer streams in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum QueryEvent {
    /// The backend accepted the query, frames are about to arrive.
    Started,
    /// The answer text so far.
    Tail(String),
}

/// Sends queries and folds the streamed frames into the answer text.
#[derive(Clone)]
pub(crate) struct StreamingQueryClient {
    backend: Arc<dyn BackendObject>,
}

impl StreamingQueryClient {
    #[inline]
    pub fn new(backend: Arc<dyn BackendObject>) -> Self {
        Self { backend }
    }

    /// Sends a query and returns the complete answer.
    ///
    /// `on_event` is called once the backend accepts the query, then with
    /// the accumulated text every time it changes. Tokens are appended, a
    /// final frame replaces everything received so far. Without a final
    /// frame, the tokens are the answer.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response is released as soon as the
    /// returned future is dropped, and no event is reported afterwards.
    pub async fn send(
        &self,
        req: &QueryRequest,
        mut on_event: impl FnMut(QueryEvent),
    ) -> Result<String, Error> {
        trace!("sending a query: {req:?}");
        let mut frames = self.backend.send_query(req).await.map_err(|err| {
            error!("the query was refused: {err}");
            Error::connectivity(&*err)
        })?;
        on_event(QueryEvent::Started);

        let mut text = String::new();
        let mut finished = false;
        loop {
            let frame = match frames.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    error!("the stream broke off: {err}");
                    return Err(Error::stream(&*err));
                }
            };
            trace!("got a frame: {frame:?}");

            match frame {
                StreamFrame::Token { content } => {
                    if finished {
                        debug!("ignoring a token after the final frame");
                        continue;
                    }
                    text.push_str(&content);
                }
                StreamFrame::Final { response } => {
                    text = response;
                    finished = true;
                }
                StreamFrame::Unparsable { record, reason } => {
                    warn!("skipping record {record:?}: {reason}");
                    continue;
                }
            }
            on_event(QueryEvent::Tail(text.clone()));
        }

        trace!("finished a query");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use ched_test_backend::{PresetFrame, PresetResponse, TestBackend};

    use super::*;
    use crate::backend::AnyBackend;

    fn request() -> QueryRequest {
        QueryRequest {
            query: "Schedule my classes".to_owned(),
            file_paths: vec![],
            thread_id: "default".to_owned(),
        }
    }

    async fn send(
        frames: Vec<PresetFrame>,
    ) -> (Result<String, Error>, Vec<QueryEvent>, TestBackend) {
        let backend = TestBackend::default();
        backend.add_response(PresetResponse::with_frames(frames));
        let client =
            StreamingQueryClient::new(Arc::new(AnyBackend(backend.clone())));
        let mut events = vec![];
        let result = client.send(&request(), |e| events.push(e)).await;
        (result, events, backend)
    }

    #[tokio::test]
    async fn test_final_replaces_tokens() {
        let (result, events, backend) = send(vec![
            PresetFrame::Token("Sched".to_owned()),
            PresetFrame::Token("uling...".to_owned()),
            PresetFrame::Final("Scheduled 3 classes.".to_owned()),
        ])
        .await;
        assert_eq!(result.unwrap(), "Scheduled 3 classes.");
        assert_eq!(
            events,
            [
                QueryEvent::Started,
                QueryEvent::Tail("Sched".to_owned()),
                QueryEvent::Tail("Scheduling...".to_owned()),
                QueryEvent::Tail("Scheduled 3 classes.".to_owned()),
            ]
        );
        assert_eq!(backend.released_responses(), 1);
    }

    #[tokio::test]
    async fn test_tokens_without_final() {
        let (result, events, _) = send(vec![
            PresetFrame::Token("Hi, ".to_owned()),
            PresetFrame::Garbage("{\"type\":".to_owned()),
            PresetFrame::Token("there".to_owned()),
        ])
        .await;
        assert_eq!(result.unwrap(), "Hi, there");
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_tokens_after_final() {
        let (result, _, _) = send(vec![
            PresetFrame::Final("Done.".to_owned()),
            PresetFrame::Token(" Extra".to_owned()),
        ])
        .await;
        assert_eq!(result.unwrap(), "Done.");
    }

    #[tokio::test]
    async fn test_stream_error() {
        let (result, events, backend) = send(vec![
            PresetFrame::Token("Sched".to_owned()),
            PresetFrame::Disconnect,
        ])
        .await;
        assert!(matches!(result, Err(Error::Stream(_))));
        assert_eq!(events.last(), Some(&QueryEvent::Tail("Sched".to_owned())));
        assert_eq!(backend.released_responses(), 1);
    }

    #[tokio::test]
    async fn test_refused() {
        let backend = TestBackend::default();
        backend.add_response(PresetResponse::refused());
        let client =
            StreamingQueryClient::new(Arc::new(AnyBackend(backend.clone())));
        let mut events = vec![];
        let result = client.send(&request(), |e| events.push(e)).await;
        assert!(matches!(result, Err(Error::Connectivity(_))));
        assert!(events.is_empty());
    }
}
