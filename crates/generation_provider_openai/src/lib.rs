//! OpenAI chat completions implementation of the shared `generation_provider` contract.
//!
//! This adapter translates `openai_chat_api` transport results into the
//! `GenerationEvent` sequence expected by the capture pipeline. The API key
//! travels with each call, so a transport client is built per call.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use generation_provider::{
    CancelSignal, ClientInitError, ClientProfile, GenerationCall, GenerationClient,
    GenerationError, GenerationEvent,
};
use openai_chat_api::config::DEFAULT_MODEL;
use openai_chat_api::url::DEFAULT_OPENAI_BASE_URL;
use openai_chat_api::{
    ChatApiClient, ChatApiConfig, ChatApiError, ChatCompletionRequest, ChatStreamEvent,
};

/// Stable provider identifier used for explicit startup selection.
pub const OPENAI_PROVIDER_ID: &str = "openai";

/// Runtime configuration for the OpenAI provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiProviderConfig {
    pub model: String,
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl Default for OpenAiProviderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

impl OpenAiProviderConfig {
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn api_config(&self, api_key: &str) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(api_key)
            .with_base_url(self.base_url.clone())
            .with_model(self.model.clone());
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

trait ChatTransport: Send + Sync {
    fn stream(
        &self,
        config: ChatApiConfig,
        request: &ChatCompletionRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<bool, ChatApiError>;

    fn complete(
        &self,
        config: ChatApiConfig,
        request: &ChatCompletionRequest,
        cancel: &CancelSignal,
    ) -> Result<String, ChatApiError>;
}

#[derive(Debug)]
struct DefaultChatTransport;

impl DefaultChatTransport {
    fn runtime() -> Result<tokio::runtime::Runtime, ChatApiError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| ChatApiError::StreamFailed {
                code: None,
                message: format!("failed to initialize tokio runtime: {error}"),
            })
    }
}

impl ChatTransport for DefaultChatTransport {
    fn stream(
        &self,
        config: ChatApiConfig,
        request: &ChatCompletionRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ChatStreamEvent),
    ) -> Result<bool, ChatApiError> {
        let client = ChatApiClient::new(config)?;
        Self::runtime()?.block_on(client.stream_with_handler(request, Some(cancel), on_event))
    }

    fn complete(
        &self,
        config: ChatApiConfig,
        request: &ChatCompletionRequest,
        cancel: &CancelSignal,
    ) -> Result<String, ChatApiError> {
        let client = ChatApiClient::new(config)?;
        Self::runtime()?.block_on(client.complete(request, Some(cancel)))
    }
}

/// `GenerationClient` adapter backed by `openai_chat_api` transport primitives.
pub struct OpenAiGenerationClient {
    config: OpenAiProviderConfig,
    transport: Arc<dyn ChatTransport>,
}

impl OpenAiGenerationClient {
    /// Creates a client using real HTTP transport.
    pub fn new(config: OpenAiProviderConfig) -> Result<Self, ClientInitError> {
        let config = sanitize_config(config)?;
        Ok(Self {
            config,
            transport: Arc::new(DefaultChatTransport),
        })
    }

    pub fn config(&self) -> &OpenAiProviderConfig {
        &self.config
    }

    #[cfg(test)]
    fn with_transport_for_tests(
        config: OpenAiProviderConfig,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self { config, transport }
    }

    fn chat_request(&self, call: &GenerationCall) -> ChatCompletionRequest {
        ChatCompletionRequest::new(
            self.config.model.clone(),
            call.system_prompt.clone(),
            call.user_text.clone(),
        )
        .with_temperature(call.temperature)
        .with_max_tokens(call.max_output_tokens)
        .with_stream(call.stream)
    }
}

impl GenerationClient for OpenAiGenerationClient {
    fn profile(&self) -> ClientProfile {
        ClientProfile {
            provider_id: OPENAI_PROVIDER_ID.to_string(),
            model_id: self.config.model.clone(),
        }
    }

    fn generate(
        &self,
        call: &GenerationCall,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(GenerationEvent),
    ) -> Result<(), GenerationError> {
        if call.api_key.trim().is_empty() {
            return Err(GenerationError::CredentialMissing);
        }
        if cancel.load(Ordering::Acquire) {
            return Err(GenerationError::Cancelled);
        }

        let api_config = self.config.api_config(&call.api_key);
        let request = self.chat_request(call);

        if !call.stream {
            let text = self
                .transport
                .complete(api_config, &request, &cancel)
                .map_err(map_transport_error)?;
            emit(GenerationEvent::Complete(text));
            return Ok(());
        }

        let saw_done = self
            .transport
            .stream(api_config, &request, &cancel, &mut |event| {
                if let ChatStreamEvent::ContentDelta { delta } = event {
                    emit(GenerationEvent::Fragment(delta));
                }
            })
            .map_err(map_transport_error)?;

        if saw_done {
            emit(GenerationEvent::Done);
        }
        Ok(())
    }
}

fn sanitize_config(mut config: OpenAiProviderConfig) -> Result<OpenAiProviderConfig, ClientInitError> {
    config.model = config.model.trim().to_string();
    if config.model.is_empty() {
        config.model = DEFAULT_MODEL.to_string();
    }

    config.base_url = config.base_url.trim().to_string();
    if config.base_url.is_empty() {
        config.base_url = DEFAULT_OPENAI_BASE_URL.to_string();
    }
    if !(config.base_url.starts_with("https://") || config.base_url.starts_with("http://")) {
        return Err(ClientInitError::new(format!(
            "Failed to initialize openai provider: base URL must be http(s): {}",
            config.base_url
        )));
    }

    Ok(config)
}

fn map_transport_error(error: ChatApiError) -> GenerationError {
    match error {
        ChatApiError::MissingApiKey => GenerationError::CredentialMissing,
        ChatApiError::Cancelled => GenerationError::Cancelled,
        ChatApiError::MalformedResponse(message) => GenerationError::MalformedResponse(message),
        ChatApiError::Serde(error) => GenerationError::MalformedResponse(error.to_string()),
        other => GenerationError::Transport {
            code: other.code(),
            message: format!("OpenAI request failed: {other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::{Mutex, MutexGuard};

    use generation_provider::{GenerationKind, GenerationRequest, GenerationSettings};

    use super::*;

    enum FakeOutcome {
        Stream(Vec<ChatStreamEvent>, bool),
        Complete(String),
        Error(ChatApiError),
    }

    struct FakeChatTransport {
        observed: Mutex<Option<(ChatApiConfig, ChatCompletionRequest)>>,
        outcome: Mutex<Option<FakeOutcome>>,
    }

    impl FakeChatTransport {
        fn new(outcome: FakeOutcome) -> Arc<Self> {
            Arc::new(Self {
                observed: Mutex::new(None),
                outcome: Mutex::new(Some(outcome)),
            })
        }

        fn observed(&self) -> Option<(ChatApiConfig, ChatCompletionRequest)> {
            lock_unpoisoned(&self.observed).clone()
        }

        fn take(&self, config: ChatApiConfig, request: &ChatCompletionRequest) -> FakeOutcome {
            *lock_unpoisoned(&self.observed) = Some((config, request.clone()));
            lock_unpoisoned(&self.outcome)
                .take()
                .expect("fake outcome should be consumed exactly once")
        }
    }

    impl ChatTransport for FakeChatTransport {
        fn stream(
            &self,
            config: ChatApiConfig,
            request: &ChatCompletionRequest,
            _cancel: &CancelSignal,
            on_event: &mut dyn FnMut(ChatStreamEvent),
        ) -> Result<bool, ChatApiError> {
            match self.take(config, request) {
                FakeOutcome::Stream(events, saw_done) => {
                    for event in events {
                        on_event(event);
                    }
                    Ok(saw_done)
                }
                FakeOutcome::Error(error) => Err(error),
                FakeOutcome::Complete(_) => panic!("streaming call expected"),
            }
        }

        fn complete(
            &self,
            config: ChatApiConfig,
            request: &ChatCompletionRequest,
            _cancel: &CancelSignal,
        ) -> Result<String, ChatApiError> {
            match self.take(config, request) {
                FakeOutcome::Complete(text) => Ok(text),
                FakeOutcome::Error(error) => Err(error),
                FakeOutcome::Stream(..) => panic!("one-shot call expected"),
            }
        }
    }

    fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn call(stream: bool, api_key: &str) -> GenerationCall {
        GenerationCall::new(
            &GenerationRequest::new(GenerationKind::Improve, "teh cat"),
            GenerationSettings {
                stream,
                ..GenerationSettings::default()
            },
            api_key,
        )
    }

    fn run(
        client: &OpenAiGenerationClient,
        call: &GenerationCall,
    ) -> (Vec<GenerationEvent>, Result<(), GenerationError>) {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut events = Vec::new();
        let result = client.generate(call, cancel, &mut |event| events.push(event));
        (events, result)
    }

    fn delta(text: &str) -> ChatStreamEvent {
        ChatStreamEvent::ContentDelta {
            delta: text.to_string(),
        }
    }

    #[test]
    fn stream_maps_deltas_to_fragments_and_sentinel_to_done() {
        let transport = FakeChatTransport::new(FakeOutcome::Stream(
            vec![delta("The"), delta(" cat"), ChatStreamEvent::Done],
            true,
        ));
        let client = OpenAiGenerationClient::with_transport_for_tests(
            OpenAiProviderConfig::default(),
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
        );

        let (events, result) = run(&client, &call(true, "sk-test"));

        assert_eq!(result, Ok(()));
        assert_eq!(
            events,
            vec![
                GenerationEvent::Fragment("The".to_string()),
                GenerationEvent::Fragment(" cat".to_string()),
                GenerationEvent::Done,
            ]
        );

        let (config, request) = transport.observed().expect("transport should be called");
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages[0].content, GenerationKind::Improve.system_prompt());
        assert_eq!(request.messages[1].content, "teh cat");
        assert!(request.stream);
    }

    #[test]
    fn stream_without_sentinel_returns_without_done() {
        let transport = FakeChatTransport::new(FakeOutcome::Stream(vec![delta("x")], false));
        let client = OpenAiGenerationClient::with_transport_for_tests(
            OpenAiProviderConfig::default(),
            transport,
        );

        let (events, result) = run(&client, &call(true, "sk-test"));

        assert_eq!(result, Ok(()));
        assert_eq!(events, vec![GenerationEvent::Fragment("x".to_string())]);
    }

    #[test]
    fn one_shot_maps_content_to_complete_event() {
        let transport = FakeChatTransport::new(FakeOutcome::Complete("The cat.".to_string()));
        let client = OpenAiGenerationClient::with_transport_for_tests(
            OpenAiProviderConfig::default().with_model("gpt-4o"),
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
        );

        let (events, result) = run(&client, &call(false, "sk-test"));

        assert_eq!(result, Ok(()));
        assert_eq!(events, vec![GenerationEvent::Complete("The cat.".to_string())]);
        let (_, request) = transport.observed().expect("transport should be called");
        assert_eq!(request.model, "gpt-4o");
        assert!(!request.stream);
    }

    #[test]
    fn blank_api_key_fails_before_transport() {
        let transport = FakeChatTransport::new(FakeOutcome::Complete(String::new()));
        let client = OpenAiGenerationClient::with_transport_for_tests(
            OpenAiProviderConfig::default(),
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
        );

        let (events, result) = run(&client, &call(true, "  "));

        assert!(events.is_empty());
        assert_eq!(result, Err(GenerationError::CredentialMissing));
        assert!(transport.observed().is_none());
    }

    #[test]
    fn transport_errors_map_to_generation_taxonomy() {
        assert_eq!(
            map_transport_error(ChatApiError::Cancelled),
            GenerationError::Cancelled
        );
        assert_eq!(
            map_transport_error(ChatApiError::MissingApiKey),
            GenerationError::CredentialMissing
        );
        assert!(matches!(
            map_transport_error(ChatApiError::MalformedResponse("no content".to_string())),
            GenerationError::MalformedResponse(_)
        ));

        let mapped = map_transport_error(ChatApiError::StreamFailed {
            code: Some("server_error".to_string()),
            message: "boom".to_string(),
        });
        assert_eq!(mapped.code(), Some("server_error"));
        assert!(mapped.to_string().contains("boom"));
    }

    #[test]
    fn stream_failure_surfaces_as_transport_error() {
        let transport = FakeChatTransport::new(FakeOutcome::Error(ChatApiError::StreamFailed {
            code: None,
            message: "reset".to_string(),
        }));
        let client = OpenAiGenerationClient::with_transport_for_tests(
            OpenAiProviderConfig::default(),
            transport,
        );

        let (_, result) = run(&client, &call(true, "sk-test"));

        assert!(matches!(result, Err(GenerationError::Transport { .. })));
    }

    #[test]
    fn config_sanitization_defaults_blank_values_and_rejects_bad_scheme() {
        let client = OpenAiGenerationClient::new(
            OpenAiProviderConfig::default()
                .with_model("  ")
                .with_base_url(""),
        )
        .expect("blank values fall back to defaults");
        assert_eq!(client.config().model, DEFAULT_MODEL);
        assert_eq!(client.config().base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(client.profile().provider_id, OPENAI_PROVIDER_ID);

        let error = OpenAiGenerationClient::new(
            OpenAiProviderConfig::default().with_base_url("ftp://example.com"),
        )
        .err()
        .expect("ftp scheme should be rejected");
        assert!(error.message().contains("http(s)"));
    }
}
