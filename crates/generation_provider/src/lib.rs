//! Provider-neutral contract for one text-generation request.
//!
//! This crate defines the request/response lifecycle shared by every
//! generation backend: what is asked for, the incremental events a backend
//! emits, and the error taxonomy callers branch on. Transport details live in
//! backend crates.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use thiserror::Error;

pub mod prompts;

/// Shared cancellation flag for an in-flight generation.
pub type CancelSignal = Arc<AtomicBool>;

/// Environment variable read by [`EnvCredentialProvider::default`].
pub const DEFAULT_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Kind of rewrite (or question) a user action requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationKind {
    Improve,
    Shorten,
    Lengthen,
    Ask,
}

impl GenerationKind {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_ascii_lowercase().as_str() {
            "improve" => Self::Improve,
            "shorten" => Self::Shorten,
            "lengthen" => Self::Lengthen,
            "ask" => Self::Ask,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improve => "improve",
            Self::Shorten => "shorten",
            Self::Lengthen => "lengthen",
            Self::Ask => "ask",
        }
    }

    /// Human-readable heading for a result of this kind.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Improve => "Improved Text",
            Self::Shorten => "Shortened Text",
            Self::Lengthen => "Lengthened Text",
            Self::Ask => "AI Response",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Improve => prompts::IMPROVE_PROMPT,
            Self::Shorten => prompts::SHORTEN_PROMPT,
            Self::Lengthen => prompts::LENGTHEN_PROMPT,
            Self::Ask => prompts::ASK_PROMPT,
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user action's request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub input_text: String,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(kind: GenerationKind, input_text: impl Into<String>) -> Self {
        Self {
            kind,
            input_text: input_text.into(),
        }
    }
}

/// Sampling and transport knobs applied to every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub stream: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 10_000,
            stream: true,
        }
    }
}

/// Fully resolved call handed to a [`GenerationClient`].
#[derive(Clone, PartialEq)]
pub struct GenerationCall {
    pub kind: GenerationKind,
    pub system_prompt: String,
    pub user_text: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub stream: bool,
    pub api_key: String,
}

impl GenerationCall {
    #[must_use]
    pub fn new(
        request: &GenerationRequest,
        settings: GenerationSettings,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: request.kind,
            system_prompt: request.kind.system_prompt().to_string(),
            user_text: request.input_text.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            stream: settings.stream,
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for GenerationCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationCall")
            .field("kind", &self.kind)
            .field("user_text_len", &self.user_text.len())
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("stream", &self.stream)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Event emitted by a client while a call is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// Incremental piece of generated text.
    Fragment(String),
    /// Whole response from a one-shot (non-streaming) transport.
    Complete(String),
    /// Explicit end-of-stream sentinel.
    Done,
}

/// Failure taxonomy for generation calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// No credential is configured. Raised before any network call; never retried.
    #[error("API key not configured. Please add your OpenAI API key in the app settings.")]
    CredentialMissing,
    /// Network or transport failure before or during the response.
    #[error("{message}")]
    Transport {
        message: String,
        code: Option<String>,
    },
    /// Response shape could not be understood.
    #[error("invalid response format: {0}")]
    MalformedResponse(String),
    #[error("request was cancelled")]
    Cancelled,
}

impl GenerationError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            code: None,
        }
    }

    /// Machine-readable code distinguishing fatal from transient failures.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::CredentialMissing => Some("credential_missing"),
            Self::Transport { code, .. } => code.as_deref(),
            Self::MalformedResponse(_) => Some("malformed_response"),
            Self::Cancelled => Some("cancelled"),
        }
    }

    /// Returns true when re-issuing the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::MalformedResponse(_))
    }
}

/// Error returned while constructing a client before any call starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ClientInitError {
    message: String,
}

impl ClientInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ClientInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Immutable metadata describing a generation client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Backend executing one generation call.
pub trait GenerationClient: Send + Sync + 'static {
    fn profile(&self) -> ClientProfile;

    /// Executes `call`, emitting events in arrival order.
    ///
    /// Streaming backends emit `Fragment`s followed by `Done`; one-shot backends
    /// emit a single `Complete`. Returning without `Done` closes the stream.
    fn generate(
        &self,
        call: &GenerationCall,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(GenerationEvent),
    ) -> Result<(), GenerationError>;
}

/// Source of the API credential, resolved right before each dispatch.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Fixed credential, mostly for tests and embedding hosts.
#[derive(Clone, Default)]
pub struct StaticCredential {
    api_key: Option<String>,
}

impl StaticCredential {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    #[must_use]
    pub fn missing() -> Self {
        Self { api_key: None }
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredential")
            .field("configured", &self.api_key.is_some())
            .finish()
    }
}

impl CredentialProvider for StaticCredential {
    fn api_key(&self) -> Option<String> {
        non_blank(self.api_key.clone())
    }
}

/// Reads the credential from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new(DEFAULT_API_KEY_ENV_VAR)
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn api_key(&self) -> Option<String> {
        non_blank(std::env::var(&self.var).ok())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
