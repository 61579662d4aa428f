use serde::{Deserialize, Serialize};

/// Stream event emitted by the parser after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// Non-empty `choices[0].delta.content`.
    ContentDelta { delta: String },
    /// The `[DONE]` sentinel.
    Done,
    /// An in-stream `{"error": {...}}` object.
    Error {
        code: Option<String>,
        message: String,
    },
}

impl ChatStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}
