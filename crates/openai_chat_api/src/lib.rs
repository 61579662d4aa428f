//! Transport-only client primitives for the OpenAI chat completions endpoint.
//!
//! This crate owns request building, retry and SSE parsing for
//! `POST {base}/chat/completions`. It holds no credential storage and no
//! knowledge of how results are applied to a document.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, ChatApiClient, StreamResult};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::ChatStreamEvent;
pub use payload::{ChatCompletionRequest, ChatMessage, ChatRole};
pub use sse::SseStreamParser;
pub use url::normalize_chat_completions_url;
