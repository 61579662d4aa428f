use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("API key is required")]
    MissingApiKey,
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0} {1}")]
    Status(StatusCode, String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The response parsed but carried no usable content.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("gave up after retries ({})", describe_exhaustion(.status, .last_error))]
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    #[error("{}", describe_stream_failure(.code, .message))]
    StreamFailed {
        code: Option<String>,
        message: String,
    },
    #[error("request was cancelled")]
    Cancelled,
}

impl ChatApiError {
    /// Status code or provider error code, when the failure carries one.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Status(status, _)
            | Self::RetryExhausted {
                status: Some(status),
                ..
            } => Some(status.as_u16().to_string()),
            Self::StreamFailed { code, .. } => code.clone(),
            _ => None,
        }
    }
}

fn describe_exhaustion(status: &Option<StatusCode>, last_error: &Option<String>) -> String {
    match (status, last_error) {
        (Some(status), Some(error)) => format!("HTTP {}: {error}", status.as_u16()),
        (Some(status), None) => format!("HTTP {}", status.as_u16()),
        (None, Some(error)) => error.to_string(),
        (None, None) => "no response".to_string(),
    }
}

fn describe_stream_failure(code: &Option<String>, message: &str) -> String {
    match code.as_deref().map(str::trim).filter(|code| !code.is_empty()) {
        Some(code) => format!("stream failed ({code}): {message}"),
        None => format!("stream failed: {message}"),
    }
}

/// The `error` member OpenAI puts in failure bodies and stream frames.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorObject {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ApiErrorObject {
    fn from_envelope(value: &Value) -> Option<Self> {
        Self::deserialize(value.get("error")?).ok()
    }

    fn message(&self) -> Option<String> {
        first_filled([self.message.as_deref(), self.kind.as_deref()])
    }

    /// Codes arrive as strings or integers; `type` stands in when absent.
    fn code(&self) -> Option<String> {
        let code = match &self.code {
            Some(Value::String(code)) => Some(code.clone()),
            Some(Value::Number(code)) => Some(code.to_string()),
            _ => None,
        };
        first_filled([code.as_deref(), self.kind.as_deref()])
    }
}

fn first_filled<const N: usize>(candidates: [Option<&str>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
}

/// Extract a human-readable message from an error response body.
///
/// Falls back to the raw body, then to the status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(ApiErrorObject::from_envelope)
        .and_then(|error| error.message())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.to_string()
            }
        })
}

/// Reads an in-stream `{"error": {...}}` frame as `(code, message)`.
pub(crate) fn stream_error_from_value(value: &Value) -> Option<(Option<String>, String)> {
    let error = ApiErrorObject::from_envelope(value)?;
    let message = error.message().unwrap_or_else(|| "unknown error".to_string());
    Some((error.code(), message))
}
