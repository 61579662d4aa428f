//! Deterministic mock implementation of the shared `generation_provider` contract.
//!
//! This crate contains no transport logic. It replays scripted fragments,
//! failures and cancellation waits, and records every call it receives so
//! tests can assert how many requests were dispatched and with what input.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use generation_provider::{
    CancelSignal, ClientProfile, GenerationCall, GenerationClient, GenerationError,
    GenerationEvent,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// One scripted step replayed by [`MockGenerationClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    Fragment(String),
    Fail(GenerationError),
    /// Blocks until the call is cancelled.
    WaitForCancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Scripted(Vec<MockStep>),
    OneShot(String),
    Echo,
}

/// Scripted generation client with call recording.
#[derive(Debug)]
pub struct MockGenerationClient {
    mode: Mode,
    fragment_delay: Duration,
    emit_done: bool,
    queued_failures: Mutex<VecDeque<GenerationError>>,
    calls: Mutex<Vec<GenerationCall>>,
}

impl MockGenerationClient {
    /// Streams `fragments` in order, then the end-of-stream sentinel.
    #[must_use]
    pub fn new(fragments: Vec<String>) -> Self {
        Self::from_steps(fragments.into_iter().map(MockStep::Fragment).collect())
    }

    #[must_use]
    pub fn from_steps(steps: Vec<MockStep>) -> Self {
        Self::with_mode(Mode::Scripted(steps))
    }

    /// Answers every call with one complete response, like a non-streaming transport.
    #[must_use]
    pub fn one_shot(text: impl Into<String>) -> Self {
        Self::with_mode(Mode::OneShot(text.into()))
    }

    /// Streams the user text back word by word.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            fragment_delay: Duration::ZERO,
            emit_done: true,
            queued_failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Ends streams by returning instead of emitting the sentinel.
    #[must_use]
    pub fn without_done_sentinel(mut self) -> Self {
        self.emit_done = false;
        self
    }

    /// Fails the next call with `error` before any event is emitted.
    #[must_use]
    pub fn fail_next(self, error: GenerationError) -> Self {
        lock_unpoisoned(&self.queued_failures).push_back(error);
        self
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GenerationCall> {
        lock_unpoisoned(&self.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock_unpoisoned(&self.calls).len()
    }

    const CANCEL_POLL: Duration = Duration::from_millis(5);

    fn steps_for(&self, call: &GenerationCall) -> Vec<MockStep> {
        match &self.mode {
            Mode::Scripted(steps) => steps.clone(),
            Mode::OneShot(_) => Vec::new(),
            Mode::Echo => split_words(&call.user_text)
                .into_iter()
                .map(MockStep::Fragment)
                .collect(),
        }
    }
}

impl Default for MockGenerationClient {
    fn default() -> Self {
        Self::echo()
    }
}

impl GenerationClient for MockGenerationClient {
    fn profile(&self) -> ClientProfile {
        ClientProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: "mock".to_string(),
        }
    }

    fn generate(
        &self,
        call: &GenerationCall,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(GenerationEvent),
    ) -> Result<(), GenerationError> {
        lock_unpoisoned(&self.calls).push(call.clone());

        if let Some(error) = lock_unpoisoned(&self.queued_failures).pop_front() {
            return Err(error);
        }

        if let Mode::OneShot(text) = &self.mode {
            if cancel.load(Ordering::SeqCst) {
                return Err(GenerationError::Cancelled);
            }
            emit(GenerationEvent::Complete(text.clone()));
            return Ok(());
        }

        for step in self.steps_for(call) {
            if cancel.load(Ordering::SeqCst) {
                return Err(GenerationError::Cancelled);
            }

            match step {
                MockStep::Fragment(text) => {
                    emit(GenerationEvent::Fragment(text));
                    if !self.fragment_delay.is_zero() {
                        thread::sleep(self.fragment_delay);
                    }
                }
                MockStep::Fail(error) => return Err(error),
                MockStep::WaitForCancel => {
                    while !cancel.load(Ordering::SeqCst) {
                        thread::sleep(Self::CANCEL_POLL);
                    }
                    return Err(GenerationError::Cancelled);
                }
            }
        }

        if self.emit_done {
            emit(GenerationEvent::Done);
        }
        Ok(())
    }
}

fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut pending = String::new();

    for ch in text.chars() {
        pending.push(ch);
        if matches!(ch, ' ' | '\n') {
            words.push(std::mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        words.push(pending);
    }

    words
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
