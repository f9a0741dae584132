use std::pin::Pin;
use std::task::{Context, Poll, ready};

use ched_model::{ErrorKind, QueryResponse, StreamFrame};
use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Records;
use crate::proto::decode_record;

type NextFrame = Result<(Option<StreamFrame>, Records), Error>;

pin_project! {
    /// A streamed answer read from a `/query` response body.
    ///
    /// Dropping it closes the connection.
    pub struct HttpQueryResponse {
        next_frame_fut: Option<BoxFuture<'static, NextFrame>>,
    }
}

impl HttpQueryResponse {
    #[inline]
    pub fn from_records(records: Records) -> Self {
        let next_frame_fut = async move { next_frame(records).await };
        Self {
            next_frame_fut: Some(Box::pin(next_frame_fut)),
        }
    }
}

impl QueryResponse for HttpQueryResponse {
    type Error = crate::Error;

    fn poll_next_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamFrame>, Self::Error>> {
        let this = self.project();
        let Some(next_frame_fut) = this.next_frame_fut else {
            return Poll::Ready(Ok(None));
        };
        let (frame, records) = match ready!(next_frame_fut.as_mut().poll(cx)) {
            Ok((Some(frame), records)) => (frame, records),
            Ok((None, _)) => {
                *this.next_frame_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_frame_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        // The body may still have more records, create a new future for
        // the next frame.
        let next_frame_fut = async move { next_frame(records).await };
        *this.next_frame_fut = Some(Box::pin(next_frame_fut));

        Poll::Ready(Ok(Some(frame)))
    }
}

async fn next_frame(
    mut records: Records,
) -> Result<(Option<StreamFrame>, Records), Error> {
    loop {
        let record = match records.next_record().await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok((None, records)),
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Stream));
            }
        };
        if let Some(frame) = decode_record(&record) {
            trace!("got a frame: {frame:?}");
            return Ok((Some(frame), records));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use ched_model::BackendError;

    use super::*;
    use crate::Chunks;

    const RESPONSE: &[u8] = include_bytes!("../fixtures/query_response.txt");

    async fn collect_frames(chunks: Chunks) -> Result<Vec<StreamFrame>, Error> {
        let mut resp = pin!(HttpQueryResponse::from_records(Records::new(chunks)));
        let mut frames = vec![];
        while let Some(frame) =
            poll_fn(|cx| resp.as_mut().poll_next_frame(cx)).await?
        {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[tokio::test]
    async fn test_simple_frames() {
        let chunks =
            Chunks::from_vec_deque(vec![Bytes::from_static(RESPONSE)].into());
        let frames = collect_frames(chunks).await.unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(
            frames[0],
            StreamFrame::Token {
                content: "Sched".to_owned()
            }
        );
        assert!(matches!(frames[2], StreamFrame::Unparsable { .. }));
        assert_eq!(
            frames[4],
            StreamFrame::Final {
                response: "Scheduled 3 classes.".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_split_at_every_offset() {
        let unsplit = collect_frames(Chunks::from_vec_deque(
            vec![Bytes::from_static(RESPONSE)].into(),
        ))
        .await
        .unwrap();

        for offset in 1..RESPONSE.len() {
            let chunks = Chunks::from_vec_deque(
                vec![
                    Bytes::from_static(&RESPONSE[..offset]),
                    Bytes::from_static(&RESPONSE[offset..]),
                ]
                .into(),
            );
            let frames = collect_frames(chunks).await.unwrap();
            assert_eq!(frames, unsplit, "split at offset {offset}");
        }
    }

    #[tokio::test]
    async fn test_byte_by_byte() {
        let chunks = Chunks::from_vec_deque(
            RESPONSE
                .iter()
                .map(|b| Bytes::copy_from_slice(&[*b]))
                .collect(),
        );
        let frames = collect_frames(chunks).await.unwrap();
        assert_eq!(frames.len(), 5);
    }

    #[tokio::test]
    async fn test_broken_stream() {
        let chunks = Chunks::broken_after(vec![Bytes::from_static(
            b"data: {\"type\": \"token\", \"content\": \"Sch\"}\n\ndata: {\"ty",
        )]);
        let mut resp =
            pin!(HttpQueryResponse::from_records(Records::new(chunks)));
        let frame = poll_fn(|cx| resp.as_mut().poll_next_frame(cx))
            .await
            .unwrap();
        assert!(matches!(frame, Some(StreamFrame::Token { .. })));
        let err = poll_fn(|cx| resp.as_mut().poll_next_frame(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stream);
        // Polling after the failure is a completed response.
        let frame = poll_fn(|cx| resp.as_mut().poll_next_frame(cx))
            .await
            .unwrap();
        assert_eq!(frame, None);
    }
}
