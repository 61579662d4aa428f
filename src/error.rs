use generation_provider::GenerationError;
use thiserror::Error;

/// Failure of a pipeline action. No variant leaves the document mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The captured text (or typed question) was blank. No request was made.
    #[error("No text to improve")]
    EmptyInput,
    /// No credential is configured. Raised before dispatch; never retried.
    #[error("API key not configured. Please add your OpenAI API key in the app settings.")]
    CredentialMissing,
    #[error("{message}")]
    Transport {
        message: String,
        code: Option<String>,
    },
    #[error("invalid response format: {0}")]
    MalformedResponse(String),
    #[error("request was cancelled")]
    Cancelled,
    /// Another action is still in flight on this session.
    #[error("another action is already running")]
    Busy,
    /// Replace or Insert was requested without a generated result.
    #[error("no generated text to apply")]
    NoPendingResult,
    /// Retry was requested before any capture or question.
    #[error("nothing to retry")]
    NothingToRetry,
    #[error("failed to start generation worker: {0}")]
    Worker(String),
    /// The document host stopped answering, so an edit could not be applied.
    #[error("the document is no longer reachable")]
    HostUnavailable,
}

impl PipelineError {
    /// Machine-readable code, when one applies.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::EmptyInput => Some("empty_input"),
            Self::CredentialMissing => Some("credential_missing"),
            Self::Transport { code, .. } => code.as_deref(),
            Self::MalformedResponse(_) => Some("malformed_response"),
            Self::Cancelled => Some("cancelled"),
            Self::Busy => Some("busy"),
            Self::NoPendingResult => Some("no_pending_result"),
            Self::NothingToRetry => Some("nothing_to_retry"),
            Self::Worker(_) => Some("worker"),
            Self::HostUnavailable => Some("host_unavailable"),
        }
    }

    /// Whether a retry of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::MalformedResponse(_))
    }

    /// Status line suitable for display to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput | Self::CredentialMissing | Self::Busy => self.to_string(),
            other => format!("Error: {other}"),
        }
    }
}

impl From<GenerationError> for PipelineError {
    fn from(error: GenerationError) -> Self {
        match error {
            GenerationError::CredentialMissing => Self::CredentialMissing,
            GenerationError::Transport { message, code } => Self::Transport { message, code },
            GenerationError::MalformedResponse(message) => Self::MalformedResponse(message),
            GenerationError::Cancelled => Self::Cancelled,
        }
    }
}

/// Non-fatal notice that a capture did not confirm both document boundaries.
///
/// The capture is still usable but may be missing text on the unconfirmed side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("capture may be incomplete: {hops} of {max_hops} hops used (start reached: {reached_start}, end reached: {reached_end})")]
pub struct ScanStalledWarning {
    pub hops: usize,
    pub max_hops: usize,
    pub reached_start: bool,
    pub reached_end: bool,
}

impl ScanStalledWarning {
    /// True when the hop budget ran out, as opposed to a host that stopped
    /// responding before the budget was spent.
    pub fn budget_exhausted(&self) -> bool {
        self.hops >= self.max_hops
    }
}
