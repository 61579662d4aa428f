use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::ChatStreamEvent;
use crate::headers::build_headers;
use crate::payload::{ChatCompletionRequest, ChatCompletionResponse};
use crate::retry::{is_retryable_http_error, retry_delay, MAX_RETRIES};
use crate::sse::SseStreamParser;
use crate::url::normalize_chat_completions_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<ChatStreamEvent>,
    /// Whether the `[DONE]` sentinel arrived before the body ended.
    pub saw_done: bool,
}

impl StreamResult {
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                ChatStreamEvent::ContentDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_chat_completions_url(&self.config.base_url)
    }

    pub fn build_headers(&self, stream: bool) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, stream)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        let headers = self.build_headers(request.stream)?;
        let payload = self.request_with_transport_defaults(request);
        Ok(self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(&payload))
    }

    fn request_with_transport_defaults(
        &self,
        request: &ChatCompletionRequest,
    ) -> ChatCompletionRequest {
        let mut payload = request.clone();
        if payload.model.trim().is_empty() {
            payload.model = self.config.model.clone();
        }
        payload
    }

    /// Sends `request`, retrying transport failures and retryable statuses.
    ///
    /// Each retry waits [`retry_delay`] for its attempt number; the wait
    /// itself is cancellable.
    pub async fn send_with_retry(
        &self,
        request: &ChatCompletionRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ChatApiError> {
        let mut last_status = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            let may_retry = attempt < MAX_RETRIES;

            let sent = await_or_cancel(self.build_request(request)?.send(), cancellation).await?;
            match sent {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    if !(may_retry && is_retryable_http_error(status.as_u16(), &body)) {
                        return Err(ChatApiError::Status(status, message));
                    }
                    last_status = Some(status);
                    last_error = Some(message);
                }
                Err(error) if may_retry => last_error = Some(error.to_string()),
                Err(error) => {
                    return Err(ChatApiError::RetryExhausted {
                        status: last_status,
                        last_error: Some(error.to_string()),
                    })
                }
            }

            await_or_cancel(tokio::time::sleep(retry_delay(attempt)), cancellation).await?;
        }

        Err(ChatApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Streams content deltas to `on_event` until `[DONE]` or end of body.
    ///
    /// Returns whether the sentinel was seen. An in-stream error object
    /// fails the call after earlier deltas were delivered.
    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatCompletionRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<bool, ChatApiError>
    where
        F: FnMut(ChatStreamEvent),
    {
        let request = request.clone().with_stream(true);
        let response = self.send_with_retry(&request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            let chunk = chunk.map_err(ChatApiError::from)?;
            for event in parser.feed(&chunk) {
                if process_stream_event(event, &mut on_event)? {
                    return Ok(true);
                }
            }
        }

        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Some(event) = parser.finish() {
            return process_stream_event(event, &mut on_event);
        }

        Ok(false)
    }

    pub async fn stream(
        &self,
        request: &ChatCompletionRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, ChatApiError> {
        let mut events = Vec::new();
        let saw_done = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, saw_done })
    }

    /// Non-streaming call returning `choices[0].message.content`.
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, ChatApiError> {
        let request = request.clone().with_stream(false);
        let response = self.send_with_retry(&request, cancellation).await?;
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;
        parse_completion_body(&body)
    }
}

/// Extract the message content from a non-streaming response body.
pub fn parse_completion_body(body: &str) -> Result<String, ChatApiError> {
    let parsed = serde_json::from_str::<ChatCompletionResponse>(body)
        .map_err(|error| ChatApiError::MalformedResponse(error.to_string()))?;
    parsed
        .first_content()
        .map(ToOwned::to_owned)
        .ok_or_else(|| ChatApiError::MalformedResponse("missing choices[0].message.content".into()))
}

/// Forward one parsed event. Returns `Ok(true)` once the stream is done.
fn process_stream_event<F>(event: ChatStreamEvent, on_event: &mut F) -> Result<bool, ChatApiError>
where
    F: FnMut(ChatStreamEvent),
{
    match event {
        ChatStreamEvent::Error { code, message } => {
            Err(ChatApiError::StreamFailed { code, message })
        }
        ChatStreamEvent::Done => {
            on_event(ChatStreamEvent::Done);
            Ok(true)
        }
        delta @ ChatStreamEvent::ContentDelta { .. } => {
            on_event(delta);
            Ok(false)
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
