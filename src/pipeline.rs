//! Capture, truncate, generate, then apply the result to the document.
//!
//! A [`CaptureSession`] owns the proxy for one document together with the
//! generation backend and the credential source. Every action runs to
//! completion on the calling thread; use [`crate::driver`] to run actions in
//! the background.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use caret_proxy::{char_count, prefix_chars, CaretWindowProxy};
use generation_provider::{
    CancelSignal, CredentialProvider, GenerationCall, GenerationClient, GenerationError,
    GenerationEvent, GenerationKind, GenerationRequest, GenerationSettings,
};
use tracing::{debug, info, warn};

use crate::assembler::{StreamAssembler, StreamState};
use crate::error::{PipelineError, ScanStalledWarning};
use crate::scanner::{capture_with, CaptureResult, ScanOptions, DEFAULT_MAX_HOPS};

/// Token budget assumed when none is configured.
pub const DEFAULT_TARGET_TOKEN_BUDGET: usize = 10_000;

pub const DEFAULT_APPROX_CHARS_PER_TOKEN: usize = 4;

/// Cap on how much captured text is forwarded to a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub target_token_budget: usize,
    pub approx_chars_per_token: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            target_token_budget: DEFAULT_TARGET_TOKEN_BUDGET,
            approx_chars_per_token: DEFAULT_APPROX_CHARS_PER_TOKEN,
        }
    }
}

impl Budget {
    pub fn input_char_budget(&self) -> usize {
        self.target_token_budget
            .saturating_mul(self.approx_chars_per_token)
    }
}

/// Text actually sent to the backend after applying the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedInput {
    pub text: String,
    pub original_length: usize,
    pub was_truncated: bool,
}

impl TruncatedInput {
    pub fn len(&self) -> usize {
        char_count(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Hard prefix cut to the budget's character count.
pub fn truncate_to_budget(text: &str, budget: Budget) -> TruncatedInput {
    let limit = budget.input_char_budget();
    let original_length = char_count(text);
    let was_truncated = original_length > limit;

    TruncatedInput {
        text: if was_truncated {
            prefix_chars(text, limit).to_string()
        } else {
            text.to_string()
        },
        original_length,
        was_truncated,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub max_hops: usize,
    pub scan: ScanOptions,
    pub budget: Budget,
    pub generation: GenerationSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            scan: ScanOptions::default(),
            budget: Budget::default(),
            generation: GenerationSettings::default(),
        }
    }
}

/// Progress reported while an action runs, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    CaptureStarted,
    Captured {
        length: usize,
        reached_start: bool,
        reached_end: bool,
        hops: usize,
    },
    /// The capture is usable but may be missing text.
    ScanStalled(ScanStalledWarning),
    Truncated {
        original_length: usize,
        budget: usize,
    },
    GenerationStarted {
        kind: GenerationKind,
    },
    Snapshot(StreamState),
}

/// Generated text waiting for Replace or Insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResult {
    pub kind: GenerationKind,
    pub text: String,
    /// Characters Replace deletes before the caret.
    pub replace_len: usize,
    pub input_length: usize,
    pub was_truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub kind: GenerationKind,
    pub text: String,
    pub input_length: usize,
    pub was_truncated: bool,
}

/// What Replace or Insert did to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub deleted: usize,
    pub inserted: usize,
    pub was_truncated: bool,
    pub status: String,
}

/// One user action against a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Run(GenerationKind),
    Ask(String),
    Retry,
    Replace,
    Insert,
}

impl SessionAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Run(kind) => kind.as_str(),
            Self::Ask(_) => "ask",
            Self::Retry => "retry",
            Self::Replace => "replace",
            Self::Insert => "insert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Generated(GenerationOutcome),
    Applied(ApplyReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LastInput {
    kind: GenerationKind,
    text: String,
    replace_len: usize,
    was_truncated: bool,
}

/// Per-document state shared by every action.
pub struct CaptureSession<P> {
    proxy: P,
    client: Arc<dyn GenerationClient>,
    credentials: Arc<dyn CredentialProvider>,
    config: PipelineConfig,
    cancel: CancelSignal,
    last_input: Option<LastInput>,
    pending: Option<PendingResult>,
    last_capture: Option<CaptureResult>,
}

impl<P: CaretWindowProxy> CaptureSession<P> {
    pub fn new(
        proxy: P,
        client: Arc<dyn GenerationClient>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            proxy,
            client,
            credentials,
            config: PipelineConfig::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            last_input: None,
            pending: None,
            last_capture: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Flag that cancels the network phase of the running action.
    pub fn cancel_signal(&self) -> CancelSignal {
        Arc::clone(&self.cancel)
    }

    pub fn pending(&self) -> Option<&PendingResult> {
        self.pending.as_ref()
    }

    pub fn last_capture(&self) -> Option<&CaptureResult> {
        self.last_capture.as_ref()
    }

    pub fn proxy(&self) -> &P {
        &self.proxy
    }

    pub fn proxy_mut(&mut self) -> &mut P {
        &mut self.proxy
    }

    pub fn into_proxy(self) -> P {
        self.proxy
    }

    /// Captures the whole document and remembers the result.
    pub fn capture(&mut self) -> CaptureResult {
        let result = capture_with(&mut self.proxy, self.config.max_hops, &self.config.scan);
        self.last_capture = Some(result.clone());
        result
    }

    /// Captures the document and generates a `kind` rewrite of it.
    ///
    /// On success the text is held as the pending result for
    /// [`replace`](Self::replace) or [`insert`](Self::insert). Failures
    /// never touch the document.
    pub fn run(
        &mut self,
        kind: GenerationKind,
        on_progress: &mut dyn FnMut(PipelineEvent),
    ) -> Result<GenerationOutcome, PipelineError> {
        let result = self.run_captured(kind, on_progress);
        self.finish_action(result)
    }

    /// Sends a typed question instead of the document. Nothing is scanned
    /// and a later Replace deletes nothing.
    pub fn ask(
        &mut self,
        question: &str,
        on_progress: &mut dyn FnMut(PipelineEvent),
    ) -> Result<GenerationOutcome, PipelineError> {
        self.pending = None;
        let result = if question.trim().is_empty() {
            Err(PipelineError::EmptyInput)
        } else {
            let input = truncate_to_budget(question, self.config.budget);
            self.report_truncation(&input, on_progress);
            let last = LastInput {
                kind: GenerationKind::Ask,
                replace_len: 0,
                was_truncated: input.was_truncated,
                text: input.text,
            };
            self.last_input = Some(last.clone());
            self.generate(&last, on_progress)
        };
        self.finish_action(result)
    }

    /// Re-issues the last request with the text already captured.
    pub fn retry(
        &mut self,
        on_progress: &mut dyn FnMut(PipelineEvent),
    ) -> Result<GenerationOutcome, PipelineError> {
        self.pending = None;
        let result = match self.last_input.clone() {
            Some(last) => self.generate(&last, on_progress),
            None => Err(PipelineError::NothingToRetry),
        };
        self.finish_action(result)
    }

    /// Deletes the captured characters before the caret, then inserts the
    /// pending text in one call.
    pub fn replace(&mut self) -> Result<ApplyReport, PipelineError> {
        let pending = self.take_pending_for_edit()?;

        for _ in 0..pending.replace_len {
            self.proxy.delete_backward();
        }
        self.proxy.insert_text(&pending.text);
        self.confirm_edit_delivered()?;

        let status = if pending.was_truncated {
            format!("Text replaced (first {} chars only)", pending.input_length)
        } else {
            "Text replaced".to_string()
        };
        debug!(deleted = pending.replace_len, "replaced captured text");
        Ok(apply_report(&pending, pending.replace_len, status))
    }

    /// Inserts the pending text at the caret without deleting anything.
    pub fn insert(&mut self) -> Result<ApplyReport, PipelineError> {
        let pending = self.take_pending_for_edit()?;

        self.proxy.insert_text(&pending.text);
        self.confirm_edit_delivered()?;

        let status = if pending.was_truncated {
            format!("Inserted (first {} chars only)", pending.input_length)
        } else {
            "Inserted".to_string()
        };
        debug!("inserted generated text");
        Ok(apply_report(&pending, 0, status))
    }

    /// Keeps the pending result when the host is already unreachable, so the
    /// edit can be applied once it is back.
    fn take_pending_for_edit(&mut self) -> Result<PendingResult, PipelineError> {
        if self.pending.is_none() {
            return Err(PipelineError::NoPendingResult);
        }
        if !self.proxy.is_available() {
            warn!("host unreachable, edit not applied");
            return Err(PipelineError::HostUnavailable);
        }
        self.pending.take().ok_or(PipelineError::NoPendingResult)
    }

    fn confirm_edit_delivered(&mut self) -> Result<(), PipelineError> {
        if self.proxy.is_available() {
            Ok(())
        } else {
            warn!("host went away while applying an edit");
            Err(PipelineError::HostUnavailable)
        }
    }

    pub fn dispatch(
        &mut self,
        action: SessionAction,
        on_progress: &mut dyn FnMut(PipelineEvent),
    ) -> Result<ActionOutcome, PipelineError> {
        match action {
            SessionAction::Run(kind) => self.run(kind, on_progress).map(ActionOutcome::Generated),
            SessionAction::Ask(question) => self
                .ask(&question, on_progress)
                .map(ActionOutcome::Generated),
            SessionAction::Retry => self.retry(on_progress).map(ActionOutcome::Generated),
            SessionAction::Replace => self.replace().map(ActionOutcome::Applied),
            SessionAction::Insert => self.insert().map(ActionOutcome::Applied),
        }
    }

    fn run_captured(
        &mut self,
        kind: GenerationKind,
        on_progress: &mut dyn FnMut(PipelineEvent),
    ) -> Result<GenerationOutcome, PipelineError> {
        self.pending = None;

        on_progress(PipelineEvent::CaptureStarted);
        let captured = self.capture();
        on_progress(PipelineEvent::Captured {
            length: captured.total_length,
            reached_start: captured.reached_start,
            reached_end: captured.reached_end,
            hops: captured.hops,
        });
        if let Some(warning) = captured.stall_warning() {
            on_progress(PipelineEvent::ScanStalled(warning));
        }

        if captured.text.trim().is_empty() {
            self.last_input = None;
            return Err(PipelineError::EmptyInput);
        }

        let input = truncate_to_budget(&captured.text, self.config.budget);
        self.report_truncation(&input, on_progress);

        let last = LastInput {
            kind,
            replace_len: input.len(),
            was_truncated: input.was_truncated,
            text: input.text,
        };
        self.last_input = Some(last.clone());
        self.generate(&last, on_progress)
    }

    fn report_truncation(
        &self,
        input: &TruncatedInput,
        on_progress: &mut dyn FnMut(PipelineEvent),
    ) {
        if input.was_truncated {
            let budget = self.config.budget.input_char_budget();
            info!(
                original_length = input.original_length,
                budget, "input truncated to budget"
            );
            on_progress(PipelineEvent::Truncated {
                original_length: input.original_length,
                budget,
            });
        }
    }

    fn generate(
        &mut self,
        last: &LastInput,
        on_progress: &mut dyn FnMut(PipelineEvent),
    ) -> Result<GenerationOutcome, PipelineError> {
        let api_key = self
            .credentials
            .api_key()
            .ok_or(PipelineError::CredentialMissing)?;

        let request = GenerationRequest::new(last.kind, last.text.clone());
        let call = GenerationCall::new(&request, self.config.generation, api_key);
        let input_length = char_count(&last.text);

        info!(kind = %last.kind, input_length, "starting generation");
        on_progress(PipelineEvent::GenerationStarted { kind: last.kind });

        let (worker, events) =
            spawn_generation(Arc::clone(&self.client), call, Arc::clone(&self.cancel))?;
        let assembled = StreamAssembler::drive(events.iter(), |state| {
            on_progress(PipelineEvent::Snapshot(state.clone()));
        });
        // Stop reading before waiting so a client still emitting cannot block on us.
        drop(events);
        if worker.join().is_err() {
            warn!("generation worker exited abnormally");
        }

        if self.cancel.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled);
        }
        let text = assembled?;
        if text.is_empty() {
            return Err(PipelineError::MalformedResponse(
                "empty response".to_string(),
            ));
        }

        self.pending = Some(PendingResult {
            kind: last.kind,
            text: text.clone(),
            replace_len: last.replace_len,
            input_length,
            was_truncated: last.was_truncated,
        });

        Ok(GenerationOutcome {
            kind: last.kind,
            text,
            input_length,
            was_truncated: last.was_truncated,
        })
    }

    fn finish_action<T>(
        &mut self,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        self.cancel.store(false, Ordering::SeqCst);
        if let Err(error) = &result {
            warn!(code = error.code().unwrap_or("unknown"), "action failed: {error}");
        }
        result
    }
}

fn apply_report(pending: &PendingResult, deleted: usize, status: String) -> ApplyReport {
    ApplyReport {
        deleted,
        inserted: char_count(&pending.text),
        was_truncated: pending.was_truncated,
        status,
    }
}

type EventReceiver = Receiver<Result<GenerationEvent, GenerationError>>;

/// Runs `call` on a worker thread, forwarding its events over a channel.
///
/// A client error is sent as the last item; a panic becomes a transport
/// error. The channel closes when the client returns.
fn spawn_generation(
    client: Arc<dyn GenerationClient>,
    call: GenerationCall,
    cancel: CancelSignal,
) -> Result<(JoinHandle<()>, EventReceiver), PipelineError> {
    let (sender, receiver) = mpsc::channel();
    let worker = thread::Builder::new()
        .name(format!("caret-capture-generate-{}", call.kind))
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let mut emit = |event: GenerationEvent| {
                    let _ = sender.send(Ok(event));
                };
                client.generate(&call, cancel, &mut emit)
            }));

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(error),
                Err(_) => Some(GenerationError::transport("generation client panicked")),
            };
            if let Some(error) = failure {
                let _ = sender.send(Err(error));
            }
        })
        .map_err(|error| PipelineError::Worker(error.to_string()))?;

    Ok((worker, receiver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use caret_proxy_mock::SimulatedHost;
    use generation_provider::StaticCredential;
    use generation_provider_mock::MockGenerationClient;

    fn session(text: &str, client: MockGenerationClient) -> CaptureSession<SimulatedHost> {
        CaptureSession::new(
            SimulatedHost::new(text),
            Arc::new(client),
            Arc::new(StaticCredential::new("sk-test")),
        )
        .with_config(PipelineConfig {
            scan: ScanOptions::immediate(),
            ..PipelineConfig::default()
        })
    }

    #[test]
    fn default_budget_is_forty_thousand_chars() {
        assert_eq!(Budget::default().input_char_budget(), 40_000);
    }

    #[test]
    fn truncation_is_a_hard_prefix_cut() {
        let budget = Budget {
            target_token_budget: 2,
            approx_chars_per_token: 3,
        };

        let cut = truncate_to_budget("The quick brown fox", budget);
        assert_eq!(cut.text, "The qu");
        assert_eq!(cut.original_length, 19);
        assert!(cut.was_truncated);

        let exact = truncate_to_budget("sixsix", budget);
        assert_eq!(exact.text, "sixsix");
        assert!(!exact.was_truncated);
    }

    #[test]
    fn run_holds_result_until_insert() {
        let mut session = session("Draft text.", MockGenerationClient::one_shot("Better."));

        let outcome = session
            .run(GenerationKind::Improve, &mut |_| {})
            .expect("run succeeds");
        assert_eq!(outcome.text, "Better.");
        assert_eq!(outcome.input_length, 11);
        assert!(session.proxy().mutation_calls().is_empty());

        let report = session.insert().expect("insert");
        assert_eq!(report.status, "Inserted");
        assert_eq!(report.deleted, 0);
        assert_eq!(session.proxy().text(), "Draft text.Better.");
        assert_eq!(session.insert(), Err(PipelineError::NoPendingResult));
    }

    #[test]
    fn blank_document_fails_before_any_request() {
        let client = Arc::new(MockGenerationClient::echo());
        let mut session = CaptureSession::new(
            SimulatedHost::new("  \n "),
            client.clone(),
            Arc::new(StaticCredential::new("sk-test")),
        );

        let result = session.run(GenerationKind::Shorten, &mut |_| {});
        assert_eq!(result, Err(PipelineError::EmptyInput));
        assert_eq!(client.call_count(), 0);
        assert_eq!(session.retry(&mut |_| {}), Err(PipelineError::NothingToRetry));
    }

    #[test]
    fn empty_generation_is_a_malformed_response() {
        let mut session = session("Some text", MockGenerationClient::new(vec!["  ".into()]));

        let result = session.run(GenerationKind::Lengthen, &mut |_| {});
        assert!(matches!(result, Err(PipelineError::MalformedResponse(_))));
        assert!(session.pending().is_none());
    }

    #[test]
    fn truncated_replace_reports_the_prefix_length() {
        let mut session = session("abcdefghij", MockGenerationClient::one_shot("Z")).with_config(
            PipelineConfig {
                scan: ScanOptions::immediate(),
                budget: Budget {
                    target_token_budget: 2,
                    approx_chars_per_token: 2,
                },
                ..PipelineConfig::default()
            },
        );

        let mut events = Vec::new();
        session
            .run(GenerationKind::Improve, &mut |event| events.push(event))
            .expect("run succeeds");
        assert!(events.contains(&PipelineEvent::Truncated {
            original_length: 10,
            budget: 4,
        }));

        let report = session.replace().expect("replace");
        assert_eq!(report.deleted, 4);
        assert_eq!(report.status, "Text replaced (first 4 chars only)");
        assert_eq!(session.proxy().text(), "abcdefZ");
    }

    #[test]
    fn cancel_flag_is_cleared_after_each_action() {
        let mut session = session("text", MockGenerationClient::one_shot("done"));
        session.cancel_signal().store(true, Ordering::SeqCst);

        let result = session.run(GenerationKind::Improve, &mut |_| {});
        assert_eq!(result, Err(PipelineError::Cancelled));
        assert!(!session.cancel_signal().load(Ordering::SeqCst));

        let retried = session.retry(&mut |_| {}).expect("retry succeeds");
        assert_eq!(retried.text, "done");
    }

    #[test]
    fn action_names_are_stable() {
        assert_eq!(SessionAction::Run(GenerationKind::Shorten).name(), "shorten");
        assert_eq!(SessionAction::Ask("q".into()).name(), "ask");
        assert_eq!(SessionAction::Replace.name(), "replace");
    }
}
