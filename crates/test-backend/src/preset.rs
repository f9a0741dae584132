use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// The frames in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetFrame {
    #[serde(rename = "token")]
    Token(String),
    #[serde(rename = "final")]
    Final(String),
    /// A record that fails to decode.
    #[serde(rename = "garbage")]
    Garbage(String),
    /// The connection breaks at this point.
    #[serde(rename = "disconnect")]
    Disconnect,
}

/// The preset response for a query.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Frames in this response.
    pub frames: Vec<PresetFrame>,
    /// If set, the query is refused before any frame is sent.
    #[serde(default)]
    pub refused: bool,
    /// If set, no frame is delivered until the gate is notified.
    #[serde(skip)]
    pub gate: Option<Arc<Notify>>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified frames.
    #[inline]
    pub fn with_frames(frames: impl Into<Vec<PresetFrame>>) -> Self {
        Self {
            frames: frames.into(),
            ..Default::default()
        }
    }

    /// Creates a `PresetResponse` for a query the backend refuses.
    #[inline]
    pub fn refused() -> Self {
        Self {
            refused: true,
            ..Default::default()
        }
    }

    /// Holds the frames back until `gate` is notified.
    #[inline]
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_frames([
            PresetFrame::Token("Sched".to_string()),
            PresetFrame::Garbage("{\"type\":".to_string()),
            PresetFrame::Final("Scheduled 3 classes.".to_string()),
            PresetFrame::Disconnect,
        ]);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response.frames, deserialized.frames);
        assert!(!deserialized.refused);
        assert!(deserialized.gate.is_none());
    }
}
