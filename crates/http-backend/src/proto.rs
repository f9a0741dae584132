use ched_model::{HistoryMessage, Role, StreamFrame, ThreadSummary};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ThreadsResponse {
    #[serde(default)]
    pub threads: Vec<ThreadItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ThreadItem {
    pub thread_id: String,
    #[serde(default)]
    pub message_count: u64,
    pub last_message_time: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<HistoryItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HistoryItem {
    pub role: String,
    pub message: String,
    pub timestamp: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    pub path: String,
}

/// The payload carried by one stream record.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Token {
        content: String,
    },
    Final {
        #[serde(default)]
        response: String,
    },
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryBody<'a> {
    pub query: &'a str,
    pub file_paths: &'a [String],
    pub thread_id: &'a str,
    pub user_id: &'a str,
}

// -----------
// Conversions
// -----------

/// Every record that carries a frame starts with this marker.
pub const RECORD_MARKER: &[u8] = b"data: ";

/// Decodes one record of a query response.
///
/// Returns `None` for records that don't carry a frame, such as the blank
/// separator lines.
pub fn decode_record(record: &[u8]) -> Option<StreamFrame> {
    let Some(payload) = record.strip_prefix(RECORD_MARKER) else {
        if !record.is_empty() {
            trace!("skipping a record without marker");
        }
        return None;
    };
    let payload = match str::from_utf8(payload) {
        Ok(payload) => payload,
        Err(err) => {
            return Some(StreamFrame::Unparsable {
                record: String::from_utf8_lossy(payload).into_owned(),
                reason: format!("{err}"),
            });
        }
    };
    let frame = match serde_json::from_str::<Frame>(payload) {
        Ok(Frame::Token { content }) => StreamFrame::Token { content },
        Ok(Frame::Final { response }) => StreamFrame::Final { response },
        Err(err) => StreamFrame::Unparsable {
            record: payload.to_owned(),
            reason: format!("{err}"),
        },
    };
    Some(frame)
}

impl From<ThreadItem> for ThreadSummary {
    fn from(item: ThreadItem) -> Self {
        ThreadSummary {
            last_message_time: item
                .last_message_time
                .as_deref()
                .and_then(parse_timestamp),
            thread_id: item.thread_id,
            message_count: item.message_count,
        }
    }
}

#[inline]
pub fn create_history_message(item: HistoryItem) -> Option<HistoryMessage> {
    let role = match item.role.as_str() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        other => {
            warn!("skipping a history message with role {other:?}");
            return None;
        }
    };
    Some(HistoryMessage {
        role,
        timestamp: item.timestamp.as_deref().and_then(parse_timestamp),
        text: item.message,
    })
}

/// Parses the timestamps the backend emits. SQLite writes
/// `YYYY-MM-DD HH:MM:SS`, other paths use ISO 8601.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    for format in FORMATS {
        if let Ok(time) = NaiveDateTime::parse_from_str(s, format) {
            return Some(time);
        }
    }
    let time = DateTime::parse_from_rfc3339(s).ok().map(|t| t.naive_utc());
    if time.is_none() {
        debug!("unrecognized timestamp: {s}");
    }
    time
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_records() {
        assert_eq!(
            decode_record(br#"data: {"type": "token", "content": "Sched"}"#),
            Some(StreamFrame::Token {
                content: "Sched".to_owned()
            })
        );
        assert_eq!(
            decode_record(
                br#"data: {"type": "final", "response": "Done.", "status": "complete"}"#
            ),
            Some(StreamFrame::Final {
                response: "Done.".to_owned()
            })
        );
        assert_eq!(decode_record(b""), None);
        assert_eq!(decode_record(b": keep-alive"), None);
    }

    #[test]
    fn test_decode_malformed_records() {
        let frame = decode_record(b"data: {\"type\": \"token\"").unwrap();
        assert!(matches!(frame, StreamFrame::Unparsable { .. }));

        let frame =
            decode_record(br#"data: {"type": "metadata", "intent": "chat"}"#)
                .unwrap();
        let StreamFrame::Unparsable { record, .. } = frame else {
            panic!("unexpected frame: {frame:?}");
        };
        assert_eq!(record, r#"{"type": "metadata", "intent": "chat"}"#);

        let frame = decode_record(b"data: \xff\xfe").unwrap();
        assert!(matches!(frame, StreamFrame::Unparsable { .. }));
    }

    #[test]
    fn test_create_request_body() {
        let file_paths = vec!["uploads/a.pdf".to_owned()];
        let body = QueryBody {
            query: "Schedule my classes",
            file_paths: &file_paths,
            thread_id: "default",
            user_id: "1",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "query": "Schedule my classes",
                "file_paths": ["uploads/a.pdf"],
                "thread_id": "default",
                "user_id": "1"
            })
        );
    }

    #[test]
    fn test_convert_history() {
        let resp: HistoryResponse = serde_json::from_value(json!({
            "user_id": "1",
            "thread_id": "default",
            "messages": [
                {"role": "user", "message": "Hi", "timestamp": "2025-03-01 09:30:00"},
                {"role": "system", "message": "ignored", "timestamp": null},
                {"role": "assistant", "message": "Hello!", "timestamp": "2025-03-01T09:30:02"}
            ],
            "count": 3
        }))
        .unwrap();
        let messages: Vec<_> = resp
            .messages
            .into_iter()
            .filter_map(create_history_message)
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(
            messages[0].timestamp,
            NaiveDate::from_ymd_opt(2025, 3, 1)
                .and_then(|d| d.and_hms_opt(9, 30, 0))
        );
        assert_eq!(messages[1].text, "Hello!");
    }

    #[test]
    fn test_convert_threads() {
        let resp: ThreadsResponse = serde_json::from_value(json!({
            "user_id": "1",
            "threads": [
                {"thread_id": "default", "message_count": 4, "last_message_time": "2025-03-01 09:30:00"},
                {"thread_id": "thread-17", "message_count": 2}
            ],
            "count": 2
        }))
        .unwrap();
        let threads: Vec<ThreadSummary> =
            resp.threads.into_iter().map(Into::into).collect();
        assert_eq!(threads[0].message_count, 4);
        assert!(threads[0].last_message_time.is_some());
        assert_eq!(threads[1].thread_id, "thread-17");
        assert_eq!(threads[1].last_message_time, None);
    }
}
