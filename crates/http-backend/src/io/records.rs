use bytes::{Bytes, BytesMut};

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
}

/// A type for reading newline-separated records from a chunk stream.
///
/// Chunks may split a record anywhere, even inside a multi-byte character.
/// Bytes are carried over until a line feed completes the record, so the
/// records read never depend on how the transport fragmented them.
pub struct Records {
    buf: BytesMut,
    chunks: Chunks,
    exhausted: bool,
}

impl Records {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: BytesMut::new(),
            chunks,
            exhausted: false,
        }
    }

    /// Reads the next complete record, without its line terminator.
    ///
    /// A trailing fragment left when the stream ends is returned as the
    /// last record.
    pub async fn next_record(&mut self) -> Result<Option<Bytes>, Error> {
        loop {
            if let Some(record) = self.try_take_record() {
                return Ok(Some(record));
            }

            if self.exhausted {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = self.buf.split();
                trace!("flushing unterminated record ({} bytes)", rest.len());
                return Ok(Some(trim_cr(rest)));
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => {
                    trace!("got a chunk ({} bytes)", bytes.len());
                    self.buf.extend_from_slice(&bytes);
                }
                None => self.exhausted = true,
            }
        }
    }

    fn try_take_record(&mut self) -> Option<Bytes> {
        let eol_idx = self.buf.iter().position(|b| *b == b'\n')?;
        let mut record = self.buf.split_to(eol_idx + 1);
        record.truncate(eol_idx);
        Some(trim_cr(record))
    }
}

#[inline]
fn trim_cr(mut record: BytesMut) -> Bytes {
    if record.last() == Some(&b'\r') {
        record.truncate(record.len() - 1);
    }
    record.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut records: Records) -> Vec<Bytes> {
        let mut collected = vec![];
        while let Some(record) = records.next_record().await.unwrap() {
            collected.push(record);
        }
        collected
    }

    #[tokio::test]
    async fn test_normal_records() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n\n"),
                Bytes::from_static(b"data: bye\n\n"),
            ]
            .into(),
        );
        let mut records = Records::new(chunks);
        assert_eq!(records.next_record().await.unwrap().unwrap(), "data: hello");
        assert_eq!(records.next_record().await.unwrap().unwrap(), "");
        assert_eq!(records.next_record().await.unwrap().unwrap(), "data: bye");
        assert_eq!(records.next_record().await.unwrap().unwrap(), "");
        assert_eq!(records.next_record().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"da"),
                Bytes::from_static(b"ta: hel"),
                Bytes::from_static(b"lo\r"),
                Bytes::from_static(b"\n"),
            ]
            .into(),
        );
        let records = collect(Records::new(chunks)).await;
        assert_eq!(records, vec![Bytes::from_static(b"data: hello")]);
    }

    #[tokio::test]
    async fn test_split_multibyte_character() {
        let text = "data: 日程\n".as_bytes();
        // Split in the middle of the first character.
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::copy_from_slice(&text[..7]),
                Bytes::copy_from_slice(&text[7..]),
            ]
            .into(),
        );
        let records = collect(Records::new(chunks)).await;
        assert_eq!(records.len(), 1);
        assert_eq!(std::str::from_utf8(&records[0]).unwrap(), "data: 日程");
    }

    #[tokio::test]
    async fn test_unterminated_tail() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: a\ndata: b")].into(),
        );
        let records = collect(Records::new(chunks)).await;
        assert_eq!(
            records,
            vec![Bytes::from_static(b"data: a"), Bytes::from_static(b"data: b")]
        );
    }

    #[tokio::test]
    async fn test_broken_stream() {
        let chunks =
            Chunks::broken_after(vec![Bytes::from_static(b"data: a\ndata:")]);
        let mut records = Records::new(chunks);
        assert_eq!(records.next_record().await.unwrap().unwrap(), "data: a");
        assert_eq!(
            records.next_record().await.unwrap_err(),
            Error::ChunksError(ChunksError("connection reset".to_owned()))
        );
    }
}
